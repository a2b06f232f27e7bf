use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType},
    traits::{GatewayError, MachineManagementError, OrderManagementError, StockLedgerError},
};

/// Errors surfaced by the order coordinator. Each variant belongs to one bucket of the error taxonomy: validation,
/// not found, conflict, downstream unavailable, or an internal database failure.
#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Invalid request. {0}")]
    ValidationError(String),
    #[error("Slot {0} does not exist or is not active")]
    SlotNotFound(i64),
    #[error("Product in slot {0} is not available")]
    ProductUnavailable(i64),
    #[error("Insufficient stock for {product}. {available} available, {requested} requested")]
    InsufficientStock { product: String, available: i64, requested: i64 },
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Order {order_id} is {status} and cannot be {action}")]
    InvalidOrderStatus { order_id: OrderId, status: OrderStatusType, action: String },
    #[error("Order {order_id} changed concurrently. Expected {expected}, found {actual}")]
    StatusConflict { order_id: OrderId, expected: OrderStatusType, actual: OrderStatusType },
    #[error("Payment gateway is unavailable. {0}")]
    PaymentGatewayUnavailable(String),
    #[error("Messaging bridge is not connected. Order {0} is waiting to be dispensed.")]
    MessagingUnavailable(OrderId),
    #[error("Malformed dispense result. {0}")]
    MalformedDispenseResult(String),
    #[error("Order {order_id} belongs to machine {expected}, not {actual}")]
    MachineMismatch { order_id: OrderId, expected: String, actual: String },
    #[error("Slot {slot_number} is not part of order {order_id}")]
    SlotNotInOrder { order_id: OrderId, slot_number: i64 },
    #[error("No dispense has been recorded for order {0}")]
    DispenseStatusNotFound(OrderId),
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl OrderFlowError {
    pub fn invalid_status<S: Into<String>>(order_id: &OrderId, status: OrderStatusType, action: S) -> Self {
        Self::InvalidOrderStatus { order_id: order_id.clone(), status, action: action.into() }
    }
}

impl From<OrderManagementError> for OrderFlowError {
    fn from(e: OrderManagementError) -> Self {
        match e {
            OrderManagementError::DatabaseError(s) => Self::DatabaseError(s),
            OrderManagementError::OrderNotFound(id) => Self::OrderNotFound(id),
            OrderManagementError::OrderAlreadyExists(id) => Self::DatabaseError(format!("Order {id} already exists")),
            OrderManagementError::SlotNotFound(id) => Self::SlotNotFound(id),
            OrderManagementError::StatusConflict { order_id, expected, actual } => {
                Self::StatusConflict { order_id, expected, actual }
            },
            OrderManagementError::InvalidTransition { from, to } => {
                Self::ValidationError(format!("An order cannot move from {from} to {to}"))
            },
            OrderManagementError::SlotNotInOrder { order_id, slot_number } => {
                Self::SlotNotInOrder { order_id, slot_number }
            },
            OrderManagementError::MachineMismatch { order_id, expected, actual } => {
                Self::MachineMismatch { order_id, expected, actual }
            },
            OrderManagementError::PaymentNotFound(id) => {
                Self::DatabaseError(format!("Order {id} has no payment record"))
            },
            OrderManagementError::DispenseNotExpected { order_id, status } => {
                Self::invalid_status(&order_id, status, "marked as dispensed")
            },
        }
    }
}

impl From<GatewayError> for OrderFlowError {
    fn from(e: GatewayError) -> Self {
        Self::PaymentGatewayUnavailable(e.to_string())
    }
}

/// Errors from the machine (telemetry and status) API.
#[derive(Debug, Clone, Error)]
pub enum MachineApiError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Machine {0} does not exist")]
    MachineNotFound(String),
    #[error("Invalid machine report. {0}")]
    InvalidReport(String),
    #[error("Stock sync failed. {0}")]
    StockSyncError(#[from] StockLedgerError),
}

impl From<MachineManagementError> for MachineApiError {
    fn from(e: MachineManagementError) -> Self {
        match e {
            MachineManagementError::DatabaseError(s) => Self::DatabaseError(s),
            MachineManagementError::MachineNotFound(id) => Self::MachineNotFound(id),
        }
    }
}
