use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::MidtransConfig,
    data_objects::{SnapToken, SnapTransactionRequest, TransactionStatus},
    MidtransApiError,
};

#[derive(Clone)]
pub struct MidtransApi {
    config: MidtransConfig,
    client: Arc<Client>,
}

impl MidtransApi {
    pub fn new(config: MidtransConfig) -> Result<Self, MidtransApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MidtransApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub fn config(&self) -> &MidtransConfig {
        &self.config
    }

    /// Sends a request authenticated with the server key (HTTP basic auth, empty password) and deserializes the
    /// response body.
    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        url: &str,
        body: Option<B>,
    ) -> Result<T, MidtransApiError> {
        trace!("Sending REST query: {method} {url}");
        let mut req = self.client.request(method, url).basic_auth(self.config.server_key.reveal(), Some(""));
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| MidtransApiError::RestRequestError(e.to_string()))?;
        if response.status().is_success() {
            trace!("REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| MidtransApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| MidtransApiError::RestResponseError(e.to_string()))?;
            Err(MidtransApiError::QueryError { status, message })
        }
    }

    /// Registers a checkout with Snap. The returned token identifies the payment page for the customer.
    pub async fn create_snap_transaction(
        &self,
        request: &SnapTransactionRequest,
    ) -> Result<SnapToken, MidtransApiError> {
        let url = format!("{}/snap/v1/transactions", self.config.snap_url());
        let order_id = &request.transaction_details.order_id;
        debug!("Creating Snap transaction for {order_id}");
        let token = self.rest_query::<SnapToken, _>(Method::POST, &url, Some(request)).await?;
        info!("Snap transaction created for {order_id}");
        Ok(token)
    }

    /// Fetches the authoritative status of the transaction registered under `order_ref`.
    ///
    /// Midtrans reports a missing transaction with HTTP 200 and `"status_code": "404"` in the body, so the embedded
    /// status code is checked as well.
    pub async fn transaction_status(&self, order_ref: &str) -> Result<TransactionStatus, MidtransApiError> {
        let url = format!("{}/v2/{order_ref}/status", self.config.core_api_url());
        debug!("Fetching transaction status for {order_ref}");
        let status = self.rest_query::<TransactionStatus, ()>(Method::GET, &url, None).await?;
        match status.status_code.as_str() {
            "404" => Err(MidtransApiError::TransactionNotFound(order_ref.to_string())),
            code if code.starts_with('4') || code.starts_with('5') => Err(MidtransApiError::GatewayError {
                status_code: status.status_code.clone(),
                message: status.status_message.clone().unwrap_or_default(),
            }),
            _ => {
                trace!("Transaction {order_ref} is {:?}", status.transaction_status);
                Ok(status)
            },
        }
    }
}
