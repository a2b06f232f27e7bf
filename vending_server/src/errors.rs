use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use serde_json::json;
use thiserror::Error;
use vending_engine::{traits::StockLedgerError, OrderFlowError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("Invalid query parameter: {0}")]
    InvalidQuery(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("Invalid notification signature")]
    InvalidSignature,
    #[error("{0}")]
    OrderFlow(#[from] OrderFlowError),
    #[error("{0}")]
    StockLedger(#[from] StockLedgerError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::OrderFlow(e) => match e {
                OrderFlowError::ValidationError(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::ProductUnavailable(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::InsufficientStock { .. } => StatusCode::BAD_REQUEST,
                OrderFlowError::InvalidOrderStatus { .. } => StatusCode::BAD_REQUEST,
                OrderFlowError::MalformedDispenseResult(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::SlotNotInOrder { .. } => StatusCode::BAD_REQUEST,
                OrderFlowError::MachineMismatch { .. } => StatusCode::BAD_REQUEST,
                OrderFlowError::SlotNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::DispenseStatusNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::StatusConflict { .. } => StatusCode::CONFLICT,
                OrderFlowError::PaymentGatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                OrderFlowError::MessagingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                OrderFlowError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::StockLedger(e) => match e {
                StockLedgerError::ValidationError(_) => StatusCode::BAD_REQUEST,
                StockLedgerError::SlotNotFound(_) => StatusCode::NOT_FOUND,
                StockLedgerError::MachineNotFound(_) => StatusCode::NOT_FOUND,
                StockLedgerError::StockConflict { .. } => StatusCode::CONFLICT,
                StockLedgerError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            Self::StockLedger(StockLedgerError::StockConflict { slot_id, expected, actual }) => json!({
                "error": self.to_string(),
                "slot_id": slot_id,
                "expected_current_stock": expected,
                "current_stock": actual,
            }),
            Self::OrderFlow(OrderFlowError::InvalidOrderStatus { order_id, status, .. }) => json!({
                "error": self.to_string(),
                "order_id": order_id,
                "status": status,
            }),
            Self::OrderFlow(OrderFlowError::MessagingUnavailable(order_id)) => json!({
                "error": self.to_string(),
                "order_id": order_id,
                "status": "PENDING_DISPENSE",
            }),
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(self.status_code()).insert_header(ContentType::json()).body(body.to_string())
    }
}
