use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::ParleyError;

/// `axum::Json` whose rejections render as the v1 error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ParleyError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for ParleyError {
    fn from(rejection: JsonRejection) -> Self {
        map_json_rejection(rejection)
    }
}

fn map_json_rejection(rejection: JsonRejection) -> ParleyError {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let message = err.body_text();
            if let Some(field) = extract_missing_field(&message) {
                ParleyError::InvalidRequest(format!("Missing required field: {field}"))
            } else {
                ParleyError::InvalidRequest(format!("Invalid JSON: {message}"))
            }
        }
        JsonRejection::JsonSyntaxError(err) => {
            ParleyError::InvalidRequest(format!("JSON syntax error: {}", err.body_text()))
        }
        JsonRejection::MissingJsonContentType(_) => ParleyError::InvalidRequest(
            "Missing `Content-Type: application/json` header".to_string(),
        ),
        JsonRejection::BytesRejection(_) => {
            ParleyError::Internal("Failed to read request body".to_string())
        }
        _ => ParleyError::InvalidRequest(rejection.body_text()),
    }
}

fn extract_missing_field(message: &str) -> Option<&str> {
    let prefix = "missing field `";
    let start = message.find(prefix)? + prefix.len();
    let remaining = message.get(start..)?;
    let end = remaining.find('`')?;
    remaining.get(..end)
}
