//! # Engine backend and collaborator traits
//!
//! This module defines the contracts the engine relies on. The engine itself never talks to a concrete database,
//! payment provider or message broker.
//!
//! ## Database backends
//! * [`OrderManagement`] creates orders and owns their status column. Every status change is a compare-and-set on
//!   the status the caller last saw, so concurrent writers cannot move an order backwards.
//! * [`DispenseManagement`] records dispense attempts and reconciles hardware results into stock and order status in
//!   a single transaction.
//! * [`StockManagement`] is the stock ledger backend: the only code path that writes `current_stock`.
//! * [`MachineManagement`] stores telemetry, temperature samples and status reports.
//!
//! ## Collaborators
//! * [`PaymentGateway`] registers checkouts and reports the authoritative state of a transaction.
//! * [`CommandPublisher`] delivers dispense commands to a machine.
mod command_publisher;
mod dispense_management;
mod machine_management;
mod order_management;
mod payment_gateway;
mod stock_management;

pub use command_publisher::CommandPublisher;
pub use dispense_management::DispenseManagement;
pub use machine_management::{MachineManagement, MachineManagementError};
pub use order_management::{OrderManagement, OrderManagementError};
pub use payment_gateway::{GatewayError, PaymentGateway};
pub use stock_management::{StockLedgerError, StockManagement};
