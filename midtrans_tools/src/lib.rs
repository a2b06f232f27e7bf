//! Midtrans tools
//!
//! A thin, typed client for the two Midtrans APIs the vending backend relies on:
//! * Snap, which creates a checkout session and hands back a payment token and redirect URL.
//! * Core, which is queried for the authoritative status of a transaction.
//!
//! It also knows how to check the `signature_key` carried by HTTP notifications.
mod api;
mod config;
mod error;

mod data_objects;
pub mod helpers;

pub use api::MidtransApi;
pub use config::MidtransConfig;
pub use data_objects::{
    CreditCard,
    CustomerDetails,
    ItemDetail,
    SnapToken,
    SnapTransactionRequest,
    TransactionDetails,
    TransactionNotification,
    TransactionStatus,
};
pub use error::MidtransApiError;
