use std::fmt::Display;

use serde::{Deserialize, Serialize};
use vending_engine::{
    db_types::{OrderStatusType, PaymentMethod, StockChangeType, StockUpdateType},
    dispense_objects::DispenseResultPayload,
    order_objects::{Pagination, DEFAULT_PAGE_SIZE},
    stock_objects::{StockLogFilter, StockUpdateRequest, DEFAULT_PERFORMER},
};

/// The acknowledgement sent back to the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
}

impl WebhookResponse {
    pub fn ok<S: Display>(message: S) -> Self {
        Self { status: "OK".to_string(), message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockUpdateParams {
    pub slot_id: i64,
    pub quantity: i64,
    pub change_type: StockUpdateType,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub expected_current_stock: Option<i64>,
    #[serde(default)]
    pub performed_by: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
}

impl From<StockUpdateParams> for StockUpdateRequest {
    fn from(params: StockUpdateParams) -> Self {
        let performer = params.performed_by.filter(|p| !p.trim().is_empty());
        StockUpdateRequest {
            slot_id: params.slot_id,
            quantity: params.quantity,
            change_type: params.change_type,
            reason: params.reason,
            expected_current_stock: params.expected_current_stock,
            performed_by: performer.unwrap_or_else(|| DEFAULT_PERFORMER.to_string()),
            request_id: params.request_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerDispenseParams {
    pub order_id: String,
}

/// A dispense result delivered over HTTP rather than MQTT.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispenseConfirmParams {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub slot_number: Option<i64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub drop_detected: Option<bool>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl From<DispenseConfirmParams> for DispenseResultPayload {
    fn from(params: DispenseConfirmParams) -> Self {
        DispenseResultPayload {
            order_id: params.order_id,
            slot: params.slot_number,
            success: params.success,
            drop_detected: params.drop_detected,
            duration_ms: params.duration_ms,
            error: params.error_message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodParams {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl OrderListParams {
    /// The status filter. Query strings may spell statuses in any case.
    pub fn status(&self) -> Result<Option<OrderStatusType>, String> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse::<OrderStatusType>().map(Some).map_err(|e| e.to_string()),
        }
    }

    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockLogParams {
    #[serde(default)]
    pub slot_id: Option<i64>,
    #[serde(default)]
    pub change_type: Option<StockChangeType>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl StockLogParams {
    pub fn into_filter(self, machine_id: &str) -> StockLogFilter {
        let mut filter =
            StockLogFilter::for_machine(machine_id).with_pagination(Pagination::new(self.limit, self.offset));
        if let Some(slot_id) = self.slot_id {
            filter = filter.with_slot(slot_id);
        }
        if let Some(change_type) = self.change_type {
            filter = filter.with_change_type(change_type);
        }
        filter
    }
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}
