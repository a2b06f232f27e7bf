//! Vending Engine
//!
//! The vending engine holds the core logic of the vending machine backend: it takes an order from creation, through
//! payment confirmation and the dispense command, to the hardware result that finally decrements stock. It is
//! provider-agnostic; the payment gateway and the messaging transport that reaches the machine are traits
//! ([`traits::PaymentGateway`] and [`traits::CommandPublisher`]) implemented by the server.
//!
//! The library is divided into two main sections:
//! 1. Database management ([`mod@traits`] and [`SqliteDatabase`]). SQLite is the supported backend. You should never
//!    need to access the database directly. Instead, use the public API provided by the engine. The exception is the
//!    data types used in the database. These are defined in the `db_types` module and are public.
//! 2. The engine public API:
//!    * [`OrderFlowApi`] owns every order status transition (create, confirm payment, trigger dispense, reconcile
//!      the hardware result).
//!    * [`StockLedgerApi`] is the only mutator of slot stock, and pairs every mutation with an audit entry.
//!    * [`MachineApi`] handles machine heartbeats, telemetry and status reports.
pub mod db_types;
pub mod helpers;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;
mod vm_api;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, SqliteDatabaseError};
pub use vm_api::{
    dispense_objects,
    errors::{MachineApiError, OrderFlowError},
    machine_api::MachineApi,
    machine_objects,
    order_flow_api::{OrderFlowApi, OrderFlowConfig},
    order_locks::OrderLocks,
    order_objects,
    payment_objects,
    stock_ledger_api::StockLedgerApi,
    stock_objects,
};
