use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;

use crate::prelude::ringkv_core::error::Error as CoreError;

#[derive(Debug)]
pub enum HttpError {
    BadRequest(String),
    NotFound(String),
    MisdirectedRequest(String),
    BadGateway(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
    Internal(String),
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (code, msg) = match self {
            HttpError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            HttpError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            HttpError::MisdirectedRequest(m) => (StatusCode::MISDIRECTED_REQUEST, m),
            HttpError::BadGateway(m) => (StatusCode::BAD_GATEWAY, m),
            HttpError::ServiceUnavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            HttpError::GatewayTimeout(m) => (StatusCode::GATEWAY_TIMEOUT, m),
            HttpError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };

        (code, msg).into_response()
    }
}

impl From<CoreError> for HttpError {
    fn from(e: CoreError) -> Self {
        let msg = e.to_string();
        match e {
            CoreError::KeyNotFound(_) => HttpError::NotFound(msg),
            CoreError::NotOwner(_) => HttpError::MisdirectedRequest(msg),
            CoreError::ContactUnreachable(_) => HttpError::BadGateway(msg),
            CoreError::RoutingTimeout(_) => HttpError::GatewayTimeout(msg),
            CoreError::NodeCrashed(_) | CoreError::AlreadyLeft => {
                HttpError::ServiceUnavailable(msg)
            }
            CoreError::BadHexDid
            | CoreError::InvalidAddress(_)
            | CoreError::InvalidSuccessorListSize => HttpError::BadRequest(msg),
            _ => {
                tracing::error!("internal error: {}", msg);
                HttpError::Internal(msg)
            }
        }
    }
}
