//! v1 message intake handler.

use axum::extract::State;

use crate::api::extractors::AppJson;
use crate::api::v1::dto::{SendMessageRequest, SendMessageResponse};
use crate::api::v1::response::{ApiError, ApiResponse};
use crate::api::AppState;

/// `POST /api/v1/messages`
///
/// Runs one conversational turn. Recoverable outcomes (clarification, busy, a failed
/// turn) are still HTTP 200 with the matching `status`.
#[utoipa::path(
    post,
    path = "/api/v1/messages",
    tag = "messages",
    operation_id = "messages.send",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "Turn handled", body = SendMessageResponse),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Missing or invalid API key", body = ApiError),
    )
)]
pub async fn send_message(
    State(state): State<AppState>,
    AppJson(req): AppJson<SendMessageRequest>,
) -> ApiResponse<SendMessageResponse> {
    let message = match req.into_message() {
        Ok(message) => message,
        Err(e) => return e.into(),
    };

    match state.messages.handle(message).await {
        Ok(outcome) => ApiResponse::success(SendMessageResponse::from(outcome)),
        Err(e) => e.into(),
    }
}
