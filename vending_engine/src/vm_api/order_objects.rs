use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, OrderItem, OrderStatusType, Payment, PaymentMethod, Rupiah};

pub const MAX_ITEMS_PER_ORDER: usize = 10;
pub const MAX_QUANTITY_PER_ITEM: i64 = 10;
pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// A single-item order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub slot_id: i64,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderItemRequest {
    pub slot_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMultiOrderRequest {
    pub items: Vec<OrderItemRequest>,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl From<NewOrderRequest> for NewMultiOrderRequest {
    fn from(req: NewOrderRequest) -> Self {
        let item = OrderItemRequest { slot_id: req.slot_id, quantity: req.quantity.unwrap_or(1) };
        Self { items: vec![item], customer_phone: req.customer_phone, payment_method: req.payment_method }
    }
}

/// The response to a successful order creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub total_amount: Rupiah,
    pub quantity: i64,
    pub payment_url: Option<String>,
    pub payment_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub status: OrderStatusType,
    pub items: Vec<OrderItem>,
}

impl OrderCreated {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self {
            order_id: order.id,
            total_amount: order.total_amount,
            quantity: order.quantity,
            payment_url: order.payment_url,
            payment_token: order.payment_token,
            expires_at: order.expires_at,
            status: order.status,
            items,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub payment: Option<Payment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: DEFAULT_PAGE_SIZE, offset: 0 }
    }
}

impl Pagination {
    pub fn new(limit: i64, offset: i64) -> Self {
        Self { limit, offset }.normalized()
    }

    /// Clamps the page size to `1..=MAX_PAGE_SIZE` and the offset to non-negative values.
    pub fn normalized(self) -> Self {
        Self { limit: self.limit.max(1).min(MAX_PAGE_SIZE), offset: self.offset.max(0) }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OrderQueryFilter {
    pub machine_id: Option<String>,
    pub status: Option<Vec<OrderStatusType>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

impl OrderQueryFilter {
    pub fn with_machine_id<S: Into<String>>(mut self, machine_id: S) -> Self {
        self.machine_id = Some(machine_id.into());
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination.normalized();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.machine_id.is_none() &&
            self.status.as_ref().map(|s| s.is_empty()).unwrap_or(true) &&
            self.since.is_none() &&
            self.until.is_none()
    }
}
