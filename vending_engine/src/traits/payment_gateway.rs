use thiserror::Error;

use crate::payment_objects::{Checkout, CheckoutRequest, GatewayTransaction};

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The payment gateway is unavailable. {0}")]
    Unavailable(String),
    #[error("The payment gateway rejected the request. {0}")]
    Rejected(String),
    #[error("The payment gateway has no transaction for {0}")]
    TransactionNotFound(String),
}

/// A third-party checkout provider.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway {
    /// The name stored against payments handled by this gateway.
    fn gateway_name(&self) -> String;

    /// Registers a checkout for an order and returns the payment handle (token and redirect URL).
    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, GatewayError>;

    /// Asks the gateway for the current state of the transaction registered under `order_ref`.
    async fn transaction_status(&self, order_ref: &str) -> Result<GatewayTransaction, GatewayError>;
}
