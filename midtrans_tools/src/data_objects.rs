use serde::{Deserialize, Serialize};
use vm_common::Rupiah;

//-------------------------------------------   Snap checkout   -------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapTransactionRequest {
    pub transaction_details: TransactionDetails,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_details: Vec<ItemDetail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_payments: Option<Vec<String>>,
    pub credit_card: CreditCard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionDetails {
    pub order_id: String,
    pub gross_amount: Rupiah,
}

/// Midtrans rejects a checkout whose item lines do not add up to `gross_amount`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetail {
    pub id: String,
    pub price: Rupiah,
    pub quantity: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCard {
    pub secure: bool,
}

impl Default for CreditCard {
    fn default() -> Self {
        Self { secure: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapToken {
    pub token: String,
    pub redirect_url: String,
}

//-------------------------------------------   Core status API   -----------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub status_code: String,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub gross_amount: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub transaction_time: Option<String>,
}

//-------------------------------------------   HTTP notification   ---------------------------------------------------
/// The body of a Midtrans HTTP notification. Every field is optional here so that malformed notifications can be
/// rejected with a meaningful message rather than a deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionNotification {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub transaction_status: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub status_code: Option<String>,
    #[serde(default)]
    pub gross_amount: Option<String>,
    #[serde(default)]
    pub signature_key: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
}
