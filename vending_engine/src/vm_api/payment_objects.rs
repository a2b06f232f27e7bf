use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderId, Payment, PaymentMethod, PaymentStatus, Rupiah};

/// A line on the checkout page shown by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutItem {
    pub id: String,
    pub name: String,
    pub price: Rupiah,
    pub quantity: i64,
}

/// Everything a payment gateway needs to register a checkout for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// The reference the order is registered under at the gateway.
    pub order_ref: String,
    pub amount: Rupiah,
    pub items: Vec<CheckoutItem>,
    pub payment_method: PaymentMethod,
    pub customer_phone: Option<String>,
}

/// The payment handle returned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub token: String,
    pub redirect_url: String,
}

/// The state of a transaction, as reported by the payment gateway, either through its status API or a notification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayTransaction {
    pub order_ref: String,
    pub transaction_status: String,
    pub fraud_status: Option<String>,
    pub transaction_id: Option<String>,
    pub payment_type: Option<String>,
    pub gross_amount: Option<String>,
    /// The gateway's payload, verbatim.
    pub raw: serde_json::Value,
}

impl GatewayTransaction {
    /// Maps the gateway's transaction state onto a payment status. A captured card payment that fraud screening
    /// flagged is held as `Challenge` until the gateway settles or denies it.
    pub fn payment_status(&self) -> PaymentStatus {
        let fraud = self.fraud_status.as_deref().map(str::to_ascii_lowercase);
        match self.transaction_status.to_ascii_lowercase().as_str() {
            "capture" if fraud.as_deref() == Some("challenge") => PaymentStatus::Challenge,
            "capture" | "settlement" => PaymentStatus::Success,
            "pending" => PaymentStatus::Pending,
            "deny" | "cancel" | "expire" | "failure" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

/// Where a payment confirmation came from.
#[derive(Debug, Clone)]
pub enum ConfirmationSource {
    /// An operator or the customer's app asked for the payment to be verified. Only the gateway's own status report
    /// is trusted.
    ManualVerify,
    /// The gateway sent a notification. If the status re-check fails, a notification whose signature was verified
    /// may stand in for the gateway's answer.
    Webhook { notification: GatewayTransaction, signature_verified: bool },
}

impl ConfirmationSource {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ManualVerify => "manual verification",
            Self::Webhook { .. } => "webhook",
        }
    }
}

/// What happened to the dispense step after a payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DispenseAttempt {
    NotAttempted,
    Sent { commands: usize },
    /// The order is paid but parked in `PENDING_DISPENSE`.
    Deferred { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub order: Order,
    pub payment: Payment,
    pub payment_status: PaymentStatus,
    pub dispense: DispenseAttempt,
}

/// The new payment handle after a payment method change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodChange {
    pub order_id: OrderId,
    pub payment_method: PaymentMethod,
    pub gateway_order_ref: String,
    pub payment_url: Option<String>,
    pub payment_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}
