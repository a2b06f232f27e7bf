use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{DispenseLog, Order, OrderId, OrderItem, OrderStatusType, StatusTransition, StockLogEntry},
    vm_api::errors::OrderFlowError,
};

pub const DISPENSE_COMMAND: &str = "dispense";

/// The command published to a machine for each item of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseCommand {
    pub cmd: String,
    pub slot: i64,
    pub order_id: OrderId,
    pub timeout_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_items: Option<i64>,
}

impl DispenseCommand {
    pub fn new(order_id: OrderId, slot: i64, timeout_ms: i64) -> Self {
        Self { cmd: DISPENSE_COMMAND.to_string(), slot, order_id, timeout_ms, item_index: None, total_items: None }
    }

    /// Marks the command as one step of a multi-item sequence.
    pub fn in_sequence(mut self, item_index: i64, total_items: i64) -> Self {
        self.item_index = Some(item_index);
        self.total_items = Some(total_items);
        self
    }
}

/// A dispense result as the hardware reports it. Every field is optional on the wire so that a malformed message can
/// be rejected with a useful error instead of a parse failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispenseResultPayload {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub slot: Option<i64>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub drop_detected: Option<bool>,
    #[serde(default)]
    pub duration_ms: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DispenseResultPayload {
    /// Checks that the payload names an order, a slot and an outcome.
    pub fn validate(self, reported_at: DateTime<Utc>) -> Result<DispenseResult, OrderFlowError> {
        let order_id = match self.order_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => OrderId::from(id),
            _ => return Err(OrderFlowError::MalformedDispenseResult("orderId is missing".into())),
        };
        let slot_number = match self.slot {
            Some(slot) if slot >= 1 => slot,
            Some(slot) => {
                return Err(OrderFlowError::MalformedDispenseResult(format!("slot {slot} is not a valid slot number")))
            },
            None => return Err(OrderFlowError::MalformedDispenseResult(format!("slot is missing for order {order_id}"))),
        };
        let success = self.success.ok_or_else(|| {
            OrderFlowError::MalformedDispenseResult(format!("success flag is missing for order {order_id}"))
        })?;
        if let Some(d) = self.duration_ms {
            if d < 0 {
                return Err(OrderFlowError::MalformedDispenseResult(format!("duration {d} ms is negative")));
            }
        }
        Ok(DispenseResult {
            order_id,
            slot_number,
            success,
            drop_detected: self.drop_detected.unwrap_or(false),
            duration_ms: self.duration_ms,
            error_message: self.error,
            reported_at,
        })
    }
}

/// A validated dispense result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenseResult {
    pub order_id: OrderId,
    pub slot_number: i64,
    pub success: bool,
    pub drop_detected: bool,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub reported_at: DateTime<Utc>,
}

/// Decides what counts as a delivered item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispensePolicy {
    /// When set, `success` alone is not enough: the drop sensor must also have seen the product fall.
    pub require_drop_detection: bool,
}

impl DispensePolicy {
    pub fn is_delivered(&self, success: Option<bool>, drop_detected: Option<bool>) -> bool {
        success == Some(true) && (!self.require_drop_detection || drop_detected == Some(true))
    }

    pub fn log_delivered(&self, log: &DispenseLog) -> bool {
        self.is_delivered(log.success, log.drop_detected)
    }

    /// A log with a reported result that does not count as a delivery.
    pub fn log_failed(&self, log: &DispenseLog) -> bool {
        log.success.is_some() && !self.log_delivered(log)
    }
}

/// One dispense command that is about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispenseTarget {
    pub slot_number: i64,
    pub item_index: Option<i64>,
}

/// The result of reconciling a hardware result into the database.
#[derive(Debug, Clone)]
pub struct DispenseResultOutcome {
    pub order: Order,
    pub log: DispenseLog,
    /// The `DISPENSE` stock entry, if this result decremented stock.
    pub stock_entry: Option<StockLogEntry>,
    pub transition: Option<StatusTransition>,
}

/// The latest dispense attempt of an order, next to the order's own status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispenseStatus {
    #[serde(flatten)]
    pub log: DispenseLog,
    pub order_status: OrderStatusType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub order_id: OrderId,
    pub status: OrderStatusType,
    pub commands_sent: usize,
}

/// Derives the order status from its items' dispense logs. Any failed item fails the order. The order completes once
/// every item has been delivered. Otherwise, the status is left alone.
pub fn resolve_order_status(
    items: &[OrderItem],
    logs: &[DispenseLog],
    policy: DispensePolicy,
) -> Option<OrderStatusType> {
    let item_logs = items.iter().map(|item| logs.iter().find(|l| l.slot_number == item.slot_number));
    if logs.iter().any(|l| policy.log_failed(l) && items.iter().any(|i| i.slot_number == l.slot_number)) {
        return Some(OrderStatusType::Failed);
    }
    let mut all_delivered = !items.is_empty();
    for log in item_logs {
        all_delivered &= log.map(|l| policy.log_delivered(l)).unwrap_or(false);
    }
    all_delivered.then_some(OrderStatusType::Completed)
}
