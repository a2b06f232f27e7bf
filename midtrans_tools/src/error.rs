use thiserror::Error;

#[derive(Debug, Error)]
pub enum MidtransApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Midtrans has no transaction for {0}")]
    TransactionNotFound(String),
    #[error("Midtrans returned status code {status_code}. {message}")]
    GatewayError { status_code: String, message: String },
}

impl MidtransApiError {
    /// True for failures where Midtrans could not be reached or did not answer sensibly, as opposed to an answer
    /// that rejects the request.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::RestRequestError(_) | Self::RestResponseError(_) | Self::JsonError(_) => true,
            Self::QueryError { status, .. } => *status >= 500,
            Self::GatewayError { status_code, .. } => status_code.starts_with('5'),
            Self::Initialization(_) | Self::TransactionNotFound(_) => false,
        }
    }
}
