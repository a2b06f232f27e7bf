use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
pub use vm_common::Rupiah;

#[derive(Debug, Clone, Error)]
#[error("Conversion error: {0}")]
pub struct ConversionError(String);

impl ConversionError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been created and is waiting for payment.
    Pending,
    /// The gateway has confirmed the payment.
    Paid,
    /// Dispense commands have been sent to the machine and results are outstanding.
    Dispensing,
    /// The order is paid, but the dispense command could not be sent. An operator must re-trigger the dispense.
    PendingDispense,
    /// Every item was delivered.
    Completed,
    /// Payment failed, the order expired before payment, or the machine reported a failed dispense.
    Failed,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Orders may only be sent to the machine when they are paid, or parked after a failed attempt.
    pub fn is_dispensable(&self) -> bool {
        matches!(self, Self::Paid | Self::PendingDispense)
    }

    /// The order state machine. Statuses only ever move forward; `PendingDispense` is the one recoverable side-branch.
    pub fn can_transition_to(&self, next: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, next),
            (Pending, Paid | Failed) |
                (Paid, Dispensing | PendingDispense | Completed | Failed) |
                (PendingDispense, Dispensing | Completed | Failed) |
                (Dispensing, PendingDispense | Completed | Failed)
        )
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Dispensing => "DISPENSING",
            Self::PendingDispense => "PENDING_DISPENSE",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "DISPENSING" => Ok(Self::Dispensing),
            "PENDING_DISPENSE" => Ok(Self::PendingDispense),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

/// A compare-and-set status change: it only applies if the order is still in `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: OrderStatusType,
    pub to: OrderStatusType,
}

impl StatusTransition {
    pub fn new(from: OrderStatusType, to: OrderStatusType) -> Self {
        Self { from, to }
    }

    pub fn is_valid(&self) -> bool {
        self.from.can_transition_to(self.to)
    }
}

//--------------------------------------   PaymentStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    /// The gateway's fraud screening flagged the payment for review.
    Challenge,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Challenge => "CHALLENGE",
        };
        f.write_str(s)
    }
}

//--------------------------------------   PaymentMethod       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Qris,
    Va,
    Gopay,
    Shopeepay,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qris => "qris",
            Self::Va => "va",
            Self::Gopay => "gopay",
            Self::Shopeepay => "shopeepay",
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "qris" => Ok(Self::Qris),
            "va" => Ok(Self::Va),
            "gopay" => Ok(Self::Gopay),
            "shopeepay" => Ok(Self::Shopeepay),
            _ => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------   Stock change types  ---------------------------------------------------------
/// The change types recorded in the stock audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockChangeType {
    Restock,
    Dispense,
    ManualAdjust,
    Audit,
}

impl Display for StockChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Restock => "RESTOCK",
            Self::Dispense => "DISPENSE",
            Self::ManualAdjust => "MANUAL_ADJUST",
            Self::Audit => "AUDIT",
        };
        f.write_str(s)
    }
}

impl FromStr for StockChangeType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "RESTOCK" => Ok(Self::Restock),
            "DISPENSE" => Ok(Self::Dispense),
            "MANUAL_ADJUST" => Ok(Self::ManualAdjust),
            "AUDIT" => Ok(Self::Audit),
            _ => Err(ConversionError(format!("Invalid stock change type: {s}"))),
        }
    }
}

/// The change types a caller may request from the stock ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockUpdateType {
    /// Adds to the current stock, capped at capacity.
    Restock,
    /// Sets an absolute value.
    ManualAdjust,
    /// Sets an absolute value after a physical count.
    Audit,
    /// Subtracts from the current stock, floored at zero. Logged as `MANUAL_ADJUST`.
    Remove,
}

impl StockUpdateType {
    pub fn audit_type(&self) -> StockChangeType {
        match self {
            Self::Restock => StockChangeType::Restock,
            Self::ManualAdjust | Self::Remove => StockChangeType::ManualAdjust,
            Self::Audit => StockChangeType::Audit,
        }
    }
}

impl Display for StockUpdateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Restock => "RESTOCK",
            Self::ManualAdjust => "MANUAL_ADJUST",
            Self::Audit => "AUDIT",
            Self::Remove => "REMOVE",
        };
        f.write_str(s)
    }
}

impl FromStr for StockUpdateType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "RESTOCK" => Ok(Self::Restock),
            "MANUAL_ADJUST" => Ok(Self::ManualAdjust),
            "AUDIT" => Ok(Self::Audit),
            "REMOVE" => Ok(Self::Remove),
            "DISPENSE" => Err(ConversionError("DISPENSE changes are only recorded by the dispense flow".into())),
            _ => Err(ConversionError(format!("Invalid stock change type: {s}"))),
        }
    }
}

//--------------------------------------   MachineStatus       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Online,
    Offline,
    Maintenance,
}

impl MachineStatus {
    /// Machines report free-form status strings. Anything other than an explicit offline or maintenance report means
    /// the machine is alive.
    pub fn from_report(status: Option<&str>) -> Self {
        match status.map(|s| s.trim().to_ascii_uppercase()).as_deref() {
            Some("OFFLINE") => Self::Offline,
            Some("MAINTENANCE") => Self::Maintenance,
            _ => Self::Online,
        }
    }
}

impl Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Online => "ONLINE",
            Self::Offline => "OFFLINE",
            Self::Maintenance => "MAINTENANCE",
        };
        f.write_str(s)
    }
}

//--------------------------------------        OrderId        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl FromStr for OrderId {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ConversionError("Order id cannot be empty".into()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl OrderId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------        Order       ------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub machine_id: String,
    /// The slot of the first line item.
    pub slot_id: i64,
    /// The product of the first line item.
    pub product_id: i64,
    /// Total number of units across all line items.
    pub quantity: i64,
    pub total_amount: Rupiah,
    pub status: OrderStatusType,
    pub payment_method: PaymentMethod,
    pub payment_url: Option<String>,
    pub payment_token: Option<String>,
    pub customer_phone: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub dispensed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// An unpaid order past its expiry time. Expiry is applied lazily, whenever such an order is read.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == OrderStatusType::Pending && now > self.expires_at
    }
}

//--------------------------------------        OrderItem       --------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: OrderId,
    pub slot_id: i64,
    pub slot_number: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Rupiah,
    pub total: Rupiah,
    #[serde(skip_serializing)]
    pub motor_duration_ms: Option<i64>,
}

//--------------------------------------        NewOrder       ---------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub slot_id: i64,
    pub slot_number: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Rupiah,
}

impl NewOrderItem {
    pub fn total(&self) -> Rupiah {
        self.unit_price * self.quantity
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub machine_id: String,
    pub items: Vec<NewOrderItem>,
    pub payment_method: PaymentMethod,
    pub customer_phone: Option<String>,
    pub payment_url: Option<String>,
    pub payment_token: Option<String>,
    pub gateway_name: String,
    /// The reference under which the checkout was registered with the gateway.
    pub gateway_order_ref: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl NewOrder {
    pub fn total_amount(&self) -> Rupiah {
        self.items.iter().map(NewOrderItem::total).sum()
    }

    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

//--------------------------------------        Payment       ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub order_id: OrderId,
    pub gateway_name: String,
    pub gateway_order_ref: String,
    pub gateway_transaction_id: Option<String>,
    pub amount: Rupiah,
    pub status: PaymentStatus,
    pub payment_type: String,
    pub transaction_status: Option<String>,
    #[serde(skip_serializing)]
    pub raw_response: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// The result of a gateway status check, as it is stored against the payment.
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub status: PaymentStatus,
    pub gateway_transaction_id: Option<String>,
    pub payment_type: Option<String>,
    pub transaction_status: String,
    pub raw_response: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PaymentMethodUpdate {
    pub payment_method: PaymentMethod,
    pub gateway_order_ref: String,
    pub payment_url: String,
    pub payment_token: String,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------        Slot       -------------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Slot {
    pub id: i64,
    pub machine_id: String,
    pub slot_number: i64,
    pub product_id: Option<i64>,
    pub capacity: i64,
    pub current_stock: i64,
    pub price_override: Option<Rupiah>,
    pub motor_duration_ms: Option<i64>,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A slot joined with the product it sells.
#[derive(Debug, Clone, FromRow)]
pub struct SaleSlot {
    pub slot_id: i64,
    pub machine_id: String,
    pub slot_number: i64,
    pub capacity: i64,
    pub current_stock: i64,
    pub is_active: bool,
    pub price_override: Option<Rupiah>,
    pub product_id: Option<i64>,
    pub product_name: Option<String>,
    pub product_price: Option<Rupiah>,
    pub product_active: Option<bool>,
}

impl SaleSlot {
    pub fn unit_price(&self) -> Option<Rupiah> {
        self.price_override.or(self.product_price)
    }
}

//--------------------------------------     StockLogEntry     ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StockLogEntry {
    pub id: i64,
    pub machine_id: String,
    pub slot_id: i64,
    pub change_type: StockChangeType,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub quantity_change: i64,
    pub reason: Option<String>,
    pub performed_by: String,
    #[serde(skip_serializing)]
    pub requested_type: Option<StockUpdateType>,
    #[serde(skip_serializing)]
    pub requested_quantity: Option<i64>,
    #[serde(skip_serializing)]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewStockLogEntry {
    pub machine_id: String,
    pub slot_id: i64,
    pub change_type: StockChangeType,
    pub quantity_before: i64,
    pub quantity_after: i64,
    pub reason: Option<String>,
    pub performed_by: String,
    pub requested_type: Option<StockUpdateType>,
    pub requested_quantity: Option<i64>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewStockLogEntry {
    pub fn quantity_change(&self) -> i64 {
        self.quantity_after - self.quantity_before
    }
}

//--------------------------------------      DispenseLog      ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DispenseLog {
    pub id: i64,
    pub order_id: OrderId,
    pub machine_id: String,
    pub slot_number: i64,
    pub item_index: Option<i64>,
    /// Empty when the machine reported a result for a dispense it started itself.
    pub command_sent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub success: Option<bool>,
    pub drop_detected: Option<bool>,
    pub error_message: Option<String>,
    pub retry_count: i64,
}

//--------------------------------------        Machine       ----------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    pub status: MachineStatus,
    pub last_seen: Option<DateTime<Utc>>,
    /// Free-form JSON object with diagnostics reported by the machine.
    pub config: Option<String>,
}

impl Machine {
    pub fn config_json(&self) -> serde_json::Map<String, serde_json::Value> {
        self.config
            .as_deref()
            .and_then(|c| match serde_json::from_str::<serde_json::Value>(c) {
                Ok(serde_json::Value::Object(map)) => Some(map),
                Ok(_) => None,
                Err(e) => {
                    warn!("🗃️ Machine {} has an unreadable config. {e}", self.id);
                    None
                },
            })
            .unwrap_or_default()
    }
}
