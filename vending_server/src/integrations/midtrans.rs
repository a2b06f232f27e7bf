use log::*;
use midtrans_tools::{
    helpers::{enabled_payments_for, verify_notification_signature},
    CreditCard,
    CustomerDetails,
    ItemDetail,
    MidtransApi,
    MidtransApiError,
    SnapTransactionRequest,
    TransactionDetails,
    TransactionNotification,
    TransactionStatus,
};
use thiserror::Error;
use vending_engine::{
    payment_objects::{Checkout, CheckoutRequest, GatewayTransaction},
    traits::{GatewayError, PaymentGateway},
};
use vm_common::Secret;

pub const MIDTRANS_GATEWAY_NAME: &str = "midtrans";

/// Adapts the Midtrans client to the engine's [`PaymentGateway`] trait.
#[derive(Clone)]
pub struct MidtransGateway {
    api: MidtransApi,
}

impl MidtransGateway {
    pub fn new(api: MidtransApi) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &MidtransApi {
        &self.api
    }
}

/// Checks the `signature_key` of webhook notifications against the server key.
#[derive(Clone, Debug)]
pub struct NotificationVerifier {
    server_key: Secret<String>,
    enabled: bool,
}

impl NotificationVerifier {
    pub fn new(server_key: Secret<String>, enabled: bool) -> Self {
        Self { server_key, enabled }
    }

    /// A verifier that accepts every notification, unauthenticated.
    pub fn disabled() -> Self {
        Self { server_key: Secret::default(), enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `Ok(true)` if the signature was checked and matches, `Ok(false)` if checking is switched off.
    pub fn verify(&self, notification: &TransactionNotification) -> Result<bool, SignatureMismatch> {
        if !self.enabled {
            return Ok(false);
        }
        if verify_notification_signature(notification, self.server_key.reveal()) {
            Ok(true)
        } else {
            Err(SignatureMismatch)
        }
    }
}

#[derive(Debug, Clone, Copy, Error)]
#[error("The notification signature does not match")]
pub struct SignatureMismatch;

impl PaymentGateway for MidtransGateway {
    fn gateway_name(&self) -> String {
        MIDTRANS_GATEWAY_NAME.to_string()
    }

    async fn create_checkout(&self, request: &CheckoutRequest) -> Result<Checkout, GatewayError> {
        let snap_request = snap_request(request);
        let token = self.api.create_snap_transaction(&snap_request).await.map_err(|e| {
            warn!("💳️ Could not create a Snap checkout for {}. {e}", request.order_ref);
            gateway_error(e)
        })?;
        debug!("💳️ Snap checkout {} created for {}", token.token, request.order_ref);
        Ok(Checkout { token: token.token, redirect_url: token.redirect_url })
    }

    async fn transaction_status(&self, order_ref: &str) -> Result<GatewayTransaction, GatewayError> {
        let status = self.api.transaction_status(order_ref).await.map_err(|e| {
            warn!("💳️ Could not fetch the transaction status of {order_ref}. {e}");
            gateway_error(e)
        })?;
        Ok(status_to_transaction(order_ref, status))
    }
}

fn gateway_error(e: MidtransApiError) -> GatewayError {
    match e {
        MidtransApiError::TransactionNotFound(r) => GatewayError::TransactionNotFound(r),
        e if e.is_unavailable() => GatewayError::Unavailable(e.to_string()),
        e => GatewayError::Rejected(e.to_string()),
    }
}

pub fn snap_request(request: &CheckoutRequest) -> SnapTransactionRequest {
    let item_details = request
        .items
        .iter()
        .map(|item| ItemDetail {
            id: item.id.clone(),
            price: item.price,
            quantity: item.quantity,
            name: item.name.clone(),
        })
        .collect();
    SnapTransactionRequest {
        transaction_details: TransactionDetails { order_id: request.order_ref.clone(), gross_amount: request.amount },
        item_details,
        customer_details: request.customer_phone.as_ref().map(|phone| CustomerDetails { phone: phone.clone() }),
        enabled_payments: enabled_payments_for(request.payment_method.as_str()),
        credit_card: CreditCard::default(),
    }
}

fn status_to_transaction(order_ref: &str, status: TransactionStatus) -> GatewayTransaction {
    let raw = serde_json::to_value(&status).unwrap_or_default();
    GatewayTransaction {
        order_ref: status.order_id.unwrap_or_else(|| order_ref.to_string()),
        transaction_status: status.transaction_status.unwrap_or_default(),
        fraud_status: status.fraud_status,
        transaction_id: status.transaction_id,
        payment_type: status.payment_type,
        gross_amount: status.gross_amount,
        raw,
    }
}

/// Turns a webhook notification into the engine's view of a transaction. Returns `None` if the notification does not
/// name an order and a transaction status.
pub fn notification_to_transaction(notification: &TransactionNotification) -> Option<GatewayTransaction> {
    let order_ref = notification.order_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let status = notification.transaction_status.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    Some(GatewayTransaction {
        order_ref: order_ref.to_string(),
        transaction_status: status.to_string(),
        fraud_status: notification.fraud_status.clone(),
        transaction_id: notification.transaction_id.clone(),
        payment_type: notification.payment_type.clone(),
        gross_amount: notification.gross_amount.clone(),
        raw: serde_json::to_value(notification).unwrap_or_default(),
    })
}
