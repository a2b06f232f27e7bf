use chrono::{DateTime, Utc};
use log::*;
use regex::Regex;

use crate::db_types::OrderId;

/// Indonesian mobile numbers: `08…`, `628…` or `+628…`, followed by 7 to 12 more digits.
pub const PHONE_PATTERN: &str = r"^(\+62|62|0)8[1-9][0-9]{6,11}$";

/// Generates a new order id of the form `ORD-YYYYMMDD-XXXXXXXX`, where the suffix is 8 random upper-case hex digits.
pub fn new_order_id(now: DateTime<Utc>) -> OrderId {
    let suffix = rand::random::<u32>();
    OrderId(format!("ORD-{}-{suffix:08X}", now.format("%Y%m%d")))
}

/// Produces a fresh gateway reference for an order. Gateways refuse to register the same order reference twice, so a
/// changed payment method is registered under `{order_id}-{millis}`.
pub fn gateway_order_ref(order_id: &OrderId, now: DateTime<Utc>) -> String {
    format!("{order_id}-{}", now.timestamp_millis())
}

pub fn is_valid_phone_number(phone: &str) -> bool {
    match Regex::new(PHONE_PATTERN) {
        Ok(re) => re.is_match(phone.trim()),
        Err(e) => {
            error!("Phone number pattern is invalid. {e}");
            false
        },
    }
}
