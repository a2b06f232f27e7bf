//! # Vending engine public API
//!
//! The `vm_api` module exposes the programmatic API of the vending engine. The API is modular, so that clients can
//! pick the functionality they need.
//!
//! * [`order_flow_api`] owns the order state machine: order creation, payment confirmation, dispense triggering and
//!   the reconciliation of hardware results into stock and order status.
//! * [`stock_ledger_api`] is the only mutator of slot stock. Every change is paired with an audit entry.
//! * [`machine_api`] handles telemetry and status reports from the machines.
//!
//! The other submodules hold the request and response types of these APIs.
//!
//! # API usage
//!
//! An API instance is created by supplying a database backend that implements the backend traits required by the
//! API, plus any collaborators (payment gateway, command publisher) the API drives.
//!
//! ```rust,ignore
//! use vending_engine::{SqliteDatabase, StockLedgerApi};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! // SqliteDatabase implements StockManagement
//! let api = StockLedgerApi::new(db, Duration::from_secs(5));
//! let levels = api.stock_levels("VM01").await?;
//! ```
pub mod dispense_objects;
pub mod errors;
pub mod machine_api;
pub mod machine_objects;
pub mod order_flow_api;
pub mod order_locks;
pub mod order_objects;
pub mod payment_objects;
pub mod stock_ledger_api;
pub mod stock_objects;
