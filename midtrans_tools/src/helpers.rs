use sha2::{Digest, Sha512};

use crate::TransactionNotification;

/// Maps a customer-facing payment method onto the Snap `enabled_payments` channels. `None` lets Snap offer every
/// channel enabled on the merchant account.
pub fn enabled_payments_for(payment_method: &str) -> Option<Vec<String>> {
    let channels: &[&str] = match payment_method {
        "qris" => &["other_qris"],
        "gopay" => &["gopay"],
        "shopeepay" => &["shopeepay"],
        "va" => &["bca_va", "bni_va", "bri_va", "permata_va", "echannel", "other_va"],
        _ => return None,
    };
    Some(channels.iter().map(|c| c.to_string()).collect())
}

/// `SHA512(order_id + status_code + gross_amount + server_key)`, hex encoded.
pub fn notification_signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Checks the `signature_key` of a notification. Notifications missing any of the signed fields are never valid.
pub fn verify_notification_signature(notification: &TransactionNotification, server_key: &str) -> bool {
    let (Some(order_id), Some(status_code), Some(gross_amount), Some(signature)) = (
        notification.order_id.as_deref(),
        notification.status_code.as_deref(),
        notification.gross_amount.as_deref(),
        notification.signature_key.as_deref(),
    ) else {
        return false;
    };
    let expected = notification_signature(order_id, status_code, gross_amount, server_key);
    expected.eq_ignore_ascii_case(signature)
}
