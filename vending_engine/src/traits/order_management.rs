use thiserror::Error;

use crate::{
    db_types::{
        NewOrder,
        Order,
        OrderId,
        OrderItem,
        OrderStatusType,
        Payment,
        PaymentMethodUpdate,
        PaymentUpdate,
        SaleSlot,
        StatusTransition,
    },
    order_objects::OrderQueryFilter,
};

#[derive(Debug, Clone, Error)]
pub enum OrderManagementError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Cannot insert order, since it already exists with id {0}")]
    OrderAlreadyExists(OrderId),
    #[error("Slot {0} does not exist")]
    SlotNotFound(i64),
    #[error("Order {order_id} is {actual}, not {expected}")]
    StatusConflict { order_id: OrderId, expected: OrderStatusType, actual: OrderStatusType },
    #[error("An order cannot move from {from} to {to}")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("Slot {slot_number} is not part of order {order_id}")]
    SlotNotInOrder { order_id: OrderId, slot_number: i64 },
    #[error("Order {order_id} belongs to machine {expected}, not {actual}")]
    MachineMismatch { order_id: OrderId, expected: String, actual: String },
    #[error("Order {0} has no payment record")]
    PaymentNotFound(OrderId),
    #[error("Order {order_id} is {status} and was never sent to the machine")]
    DispenseNotExpected { order_id: OrderId, status: OrderStatusType },
}

impl From<sqlx::Error> for OrderManagementError {
    fn from(e: sqlx::Error) -> Self {
        OrderManagementError::DatabaseError(e.to_string())
    }
}

/// Order storage. Implementations are the single writer of `orders.status`.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Fetches a slot of the given machine together with the product it sells.
    async fn fetch_sale_slot(&self, machine_id: &str, slot_id: i64) -> Result<Option<SaleSlot>, OrderManagementError>;

    /// In a single atomic transaction, stores the order, its line items and a `PENDING` payment stub.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, OrderManagementError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, OrderManagementError>;

    /// Fetches the line items of the order, in slot number order.
    async fn fetch_order_items(&self, order_id: &OrderId) -> Result<Vec<OrderItem>, OrderManagementError>;

    async fn fetch_payment(&self, order_id: &OrderId) -> Result<Option<Payment>, OrderManagementError>;

    /// Resolves the reference an order was registered under at the gateway back to the order id.
    async fn fetch_order_id_for_gateway_ref(&self, gateway_ref: &str)
        -> Result<Option<OrderId>, OrderManagementError>;

    /// Fetches orders matching the filter, newest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, OrderManagementError>;

    /// Moves the order from `transition.from` to `transition.to`.
    ///
    /// The change only applies if the order is still in `transition.from`; otherwise `StatusConflict` is returned and
    /// nothing changes. `note`, if given, replaces the order's notes. `paid_at` and `dispensed_at` are stamped when
    /// the order first becomes `PAID` or `COMPLETED` respectively.
    async fn transition_order_status(
        &self,
        order_id: &OrderId,
        transition: StatusTransition,
        note: Option<String>,
    ) -> Result<Order, OrderManagementError>;

    /// In a single atomic transaction, stores the gateway's verdict on the payment and, if given, applies the order
    /// status transition (with the same compare-and-set semantics as [`Self::transition_order_status`]).
    async fn record_payment_result(
        &self,
        order_id: &OrderId,
        update: PaymentUpdate,
        transition: Option<StatusTransition>,
        note: Option<String>,
    ) -> Result<(Order, Payment), OrderManagementError>;

    /// Re-registers a `PENDING` order's payment under a new gateway reference and payment method.
    async fn update_payment_method(
        &self,
        order_id: &OrderId,
        update: PaymentMethodUpdate,
    ) -> Result<(Order, Payment), OrderManagementError>;
}
