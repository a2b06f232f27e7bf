use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    db_types::{ConversionError, OrderId, Slot, StockChangeType, StockLogEntry, StockUpdateType},
    vm_api::order_objects::Pagination,
};

pub const MAX_REASON_LEN: usize = 200;
pub const DEFAULT_PERFORMER: &str = "system";

/// A request to change the stock held in a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockUpdateRequest {
    pub slot_id: i64,
    /// For `RESTOCK` and `REMOVE` the number of units to add or take away. For `MANUAL_ADJUST` and `AUDIT` the new
    /// absolute value.
    pub quantity: i64,
    pub change_type: StockUpdateType,
    pub reason: Option<String>,
    /// If supplied, the update is rejected unless the slot holds exactly this many units.
    pub expected_current_stock: Option<i64>,
    pub performed_by: String,
    /// A client-chosen key. Retries carrying the same key are recognised as duplicates regardless of timing.
    pub request_id: Option<String>,
}

impl StockUpdateRequest {
    pub fn new(slot_id: i64, quantity: i64, change_type: StockUpdateType) -> Self {
        Self {
            slot_id,
            quantity,
            change_type,
            reason: None,
            expected_current_stock: None,
            performed_by: DEFAULT_PERFORMER.to_string(),
            request_id: None,
        }
    }

    pub fn with_reason<S: Into<String>>(mut self, reason: S) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_expected_stock(mut self, expected: i64) -> Self {
        self.expected_current_stock = Some(expected);
        self
    }

    pub fn performed_by<S: Into<String>>(mut self, performer: S) -> Self {
        self.performed_by = performer.into();
        self
    }

    pub fn with_request_id<S: Into<String>>(mut self, request_id: S) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.quantity < 0 {
            return Err(format!("Quantity must be zero or more, but was {}", self.quantity));
        }
        if self.reason.as_ref().map(|r| r.chars().count() > MAX_REASON_LEN).unwrap_or(false) {
            return Err(format!("Reason must be at most {MAX_REASON_LEN} characters"));
        }
        if self.expected_current_stock.map(|e| e < 0).unwrap_or(false) {
            return Err("Expected current stock cannot be negative".to_string());
        }
        if self.request_id.as_ref().map(|r| r.trim().is_empty()).unwrap_or(false) {
            return Err("Request id cannot be empty".to_string());
        }
        Ok(())
    }

    pub fn idempotency_key(&self) -> Option<String> {
        self.request_id.as_ref().map(|r| format!("stock-update:{}", r.trim()))
    }
}

/// The key under which the stock effect of delivering one order item is recorded.
pub fn dispense_idempotency_key(order_id: &OrderId, slot_id: i64) -> String {
    format!("dispense:{order_id}:{slot_id}")
}

/// A clamped stock change. `after` always lies in `[0, capacity]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockChange {
    pub before: i64,
    pub after: i64,
}

impl StockChange {
    pub fn compute(change_type: StockUpdateType, quantity: i64, current: i64, capacity: i64) -> Self {
        let target = match change_type {
            StockUpdateType::Restock => current.saturating_add(quantity),
            StockUpdateType::ManualAdjust | StockUpdateType::Audit => quantity,
            StockUpdateType::Remove => current.saturating_sub(quantity),
        };
        Self { before: current, after: clamp_stock(target, capacity) }
    }

    pub fn dispense(current: i64, quantity: i64, capacity: i64) -> Self {
        Self { before: current, after: clamp_stock(current.saturating_sub(quantity), capacity) }
    }

    pub fn change(&self) -> i64 {
        self.after - self.before
    }

    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

fn clamp_stock(value: i64, capacity: i64) -> i64 {
    value.min(capacity.max(0)).max(0)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockUpdateOutcome {
    pub entry: StockLogEntry,
    pub slot: Slot,
    /// The request repeated an earlier one. `entry` is the earlier entry and nothing was changed.
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockLevel {
    Empty,
    Low,
    Medium,
    Full,
}

impl StockLevel {
    pub fn from_percentage(pct: i64) -> Self {
        match pct {
            p if p <= 0 => Self::Empty,
            p if p <= 20 => Self::Low,
            p if p <= 50 => Self::Medium,
            _ => Self::Full,
        }
    }
}

impl Display for StockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Empty => "EMPTY",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::Full => "FULL",
        };
        f.write_str(s)
    }
}

/// The coarse fill levels reported by machine sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TelemetryLevel {
    Full,
    High,
    Medium,
    Low,
    Empty,
}

impl TelemetryLevel {
    /// The number of units a sensor level stands for.
    pub fn estimated_units(&self) -> i64 {
        match self {
            Self::Full => 10,
            Self::High => 8,
            Self::Medium => 5,
            Self::Low => 2,
            Self::Empty => 0,
        }
    }
}

impl FromStr for TelemetryLevel {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FULL" => Ok(Self::Full),
            "HIGH" => Ok(Self::High),
            "MEDIUM" => Ok(Self::Medium),
            "LOW" => Ok(Self::Low),
            "EMPTY" => Ok(Self::Empty),
            _ => Err(ConversionError::new(format!("Unknown stock level: {s}"))),
        }
    }
}

/// A slot joined with its product name, as read for stock reports.
#[derive(Debug, Clone, FromRow)]
pub struct SlotStockRow {
    pub slot_id: i64,
    pub slot_number: i64,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub current_stock: i64,
    pub capacity: i64,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotStock {
    pub slot_id: i64,
    pub slot_number: i64,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub current_stock: i64,
    pub capacity: i64,
    pub is_active: bool,
    pub stock_percentage: i64,
    pub stock_level: StockLevel,
}

impl From<SlotStockRow> for SlotStock {
    fn from(row: SlotStockRow) -> Self {
        let stock_percentage = if row.capacity > 0 {
            ((row.current_stock as f64 / row.capacity as f64) * 100.0).round() as i64
        } else {
            0
        };
        Self {
            slot_id: row.slot_id,
            slot_number: row.slot_number,
            product_id: row.product_id,
            product_name: row.product_name,
            current_stock: row.current_stock,
            capacity: row.capacity,
            is_active: row.is_active,
            stock_percentage,
            stock_level: StockLevel::from_percentage(stock_percentage),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSummary {
    pub total_slots: usize,
    pub active_slots: usize,
    pub empty_slots: usize,
    pub low_stock_slots: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineStockReport {
    pub machine_id: String,
    pub slots: Vec<SlotStock>,
    pub summary: StockSummary,
}

impl MachineStockReport {
    pub fn new(machine_id: String, slots: Vec<SlotStock>) -> Self {
        let summary = StockSummary {
            total_slots: slots.len(),
            active_slots: slots.iter().filter(|s| s.is_active).count(),
            empty_slots: slots.iter().filter(|s| s.stock_level == StockLevel::Empty).count(),
            low_stock_slots: slots.iter().filter(|s| s.stock_level == StockLevel::Low).count(),
        };
        Self { machine_id, slots, summary }
    }
}

/// The snapshot written by a machine's periodic stock report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReportReceipt {
    pub machine_id: String,
    pub reported_at: DateTime<Utc>,
    pub stock_count: usize,
    pub stock_snapshot: Vec<SlotStock>,
}

#[derive(Debug, Clone, Default)]
pub struct StockLogFilter {
    pub machine_id: String,
    pub slot_id: Option<i64>,
    pub change_type: Option<StockChangeType>,
    pub pagination: Pagination,
}

impl StockLogFilter {
    pub fn for_machine<S: Into<String>>(machine_id: S) -> Self {
        Self { machine_id: machine_id.into(), ..Default::default() }
    }

    pub fn with_slot(mut self, slot_id: i64) -> Self {
        self.slot_id = Some(slot_id);
        self
    }

    pub fn with_change_type(mut self, change_type: StockChangeType) -> Self {
        self.change_type = Some(change_type);
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination.normalized();
        self
    }
}
