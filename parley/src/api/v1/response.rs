//! # V1 API Response Envelope & Error Contract
//!
//! Every v1 endpoint returns an [`ApiResponse<T>`] envelope:
//!
//! ```json
//! {
//!   "data": { ... },                     // present on success
//!   "meta": { "total": 42, "nextOffset": 20 },  // optional pagination
//!   "error": { "code": "not_found", "message": "..." }  // present on error
//! }
//! ```
//!
//! List endpoints page with `limit` and `offset`. Internal error details never reach
//! the client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorClass, ParleyError};

/// Machine-readable error code, serialized as snake_case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Malformed body or parameters, or data that fails schema validation. HTTP 400.
    InvalidRequest,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 404.
    NotFound,
    /// The request conflicts with current state, e.g. a taken collection name. HTTP 409.
    Conflict,
    /// HTTP 500.
    InternalError,
    /// A dependency (lock store, reasoning backend) cannot serve the request. HTTP 503.
    Unavailable,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequest => write!(f, "invalid_request"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::InternalError => write!(f, "internal_error"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ApiError {
    pub code: ErrorCode,
    /// Safe to show to end users.
    pub message: String,
}

/// Pagination metadata for list responses.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Offset of the next page. `None` when this page is the last.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_offset: Option<u64>,
}

impl ResponseMeta {
    pub fn page(total: u64, offset: u64, returned: usize) -> Self {
        let end = offset + returned as u64;
        Self {
            total: Some(total),
            next_offset: (end < total).then_some(end),
        }
    }
}

/// The v1 envelope. `data` and `error` are mutually exclusive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    /// Not serialized on the wire.
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            meta: None,
            error: None,
            status: StatusCode::OK,
        }
    }

    pub fn success_with_meta(data: T, meta: ResponseMeta) -> Self {
        Self {
            data: Some(data),
            meta: Some(meta),
            error: None,
            status: StatusCode::OK,
        }
    }

    /// HTTP status is derived from the [`ErrorCode`].
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let status = code.status();
        Self {
            data: None,
            meta: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
            status,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        match serde_json::to_value(&self) {
            Ok(body) => (status, Json(body)).into_response(),
            Err(_) => {
                let body = serde_json::json!({
                    "error": {
                        "code": "internal_error",
                        "message": "An internal error occurred"
                    }
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

impl<T: Serialize> From<ParleyError> for ApiResponse<T> {
    /// Infrastructure errors are logged and replaced by a generic message.
    fn from(err: ParleyError) -> Self {
        match err {
            ParleyError::SchemaConflict(_) => {
                ApiResponse::error(ErrorCode::Conflict, err.to_string())
            }
            ParleyError::LockTimeout(_) => ApiResponse::error(
                ErrorCode::Conflict,
                "Another message for this conversation is still being handled",
            ),
            ParleyError::LlmUnavailable(_) | ParleyError::LockStore(_) => {
                tracing::error!(error = %err, "Dependency unavailable");
                ApiResponse::error(ErrorCode::Unavailable, "A required service is unavailable")
            }
            ParleyError::LlmRateLimit { retry_after } => {
                let msg = match retry_after {
                    Some(secs) => format!("Rate limit exceeded, retry after {secs} seconds"),
                    None => "Rate limit exceeded".to_string(),
                };
                ApiResponse::error(ErrorCode::Unavailable, msg)
            }
            _ => match err.class() {
                ErrorClass::Validation | ErrorClass::Conversational => {
                    ApiResponse::error(ErrorCode::InvalidRequest, err.to_string())
                }
                ErrorClass::NotFound => ApiResponse::error(ErrorCode::NotFound, err.to_string()),
                ErrorClass::Concurrency | ErrorClass::Infrastructure => {
                    tracing::error!(error = %err, "Internal error mapped to v1 response");
                    ApiResponse::error(ErrorCode::InternalError, "An internal error occurred")
                }
            },
        }
    }
}
