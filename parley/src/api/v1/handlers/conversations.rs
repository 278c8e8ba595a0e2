//! v1 conversation handlers.

use axum::extract::{Path, State};
use axum_extra::extract::Query;

use crate::api::v1::dto::{
    ConversationDetailResponse, ConversationResponse, ListConversationsResponse, PageQuery,
    TurnResponse,
};
use crate::api::v1::response::{ApiError, ApiResponse, ResponseMeta};
use crate::api::AppState;

/// `GET /api/v1/users/{userId}/conversations`
#[utoipa::path(
    get,
    path = "/api/v1/users/{userId}/conversations",
    tag = "conversations",
    operation_id = "conversations.list",
    params(("userId" = String, Path, description = "User ID"), PageQuery),
    responses(
        (
            status = 200,
            description = "Most recently active first",
            body = ListConversationsResponse
        ),
    )
)]
pub async fn list_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(page): Query<PageQuery>,
) -> ApiResponse<ListConversationsResponse> {
    let (limit, offset) = (page.limit(), page.offset());
    match state
        .messages
        .context()
        .list_conversations(&user_id, limit, offset)
        .await
    {
        Ok((conversations, total)) => {
            let meta = ResponseMeta::page(total, offset, conversations.len());
            ApiResponse::success_with_meta(
                ListConversationsResponse {
                    conversations: conversations
                        .into_iter()
                        .map(ConversationResponse::from)
                        .collect(),
                },
                meta,
            )
        }
        Err(e) => e.into(),
    }
}

/// `GET /api/v1/users/{userId}/conversations/{conversationId}`
#[utoipa::path(
    get,
    path = "/api/v1/users/{userId}/conversations/{conversationId}",
    tag = "conversations",
    operation_id = "conversations.get",
    params(
        ("userId" = String, Path, description = "User ID"),
        ("conversationId" = String, Path, description = "Conversation ID"),
    ),
    responses(
        (
            status = 200,
            description = "Conversation with every turn",
            body = ConversationDetailResponse
        ),
        (status = 404, description = "Conversation not found", body = ApiError),
    )
)]
pub async fn get_conversation(
    State(state): State<AppState>,
    Path((user_id, conversation_id)): Path<(String, String)>,
) -> ApiResponse<ConversationDetailResponse> {
    let context = state.messages.context();
    let conversation = match context.get_conversation(&user_id, &conversation_id).await {
        Ok(conversation) => conversation,
        Err(e) => return e.into(),
    };
    match context.turns(&user_id, &conversation_id).await {
        Ok(turns) => ApiResponse::success(ConversationDetailResponse {
            conversation: ConversationResponse::from(conversation),
            turns: turns.into_iter().map(TurnResponse::from).collect(),
        }),
        Err(e) => e.into(),
    }
}

/// `DELETE /api/v1/users/{userId}/conversations/{conversationId}`
#[utoipa::path(
    delete,
    path = "/api/v1/users/{userId}/conversations/{conversationId}",
    tag = "conversations",
    operation_id = "conversations.delete",
    params(
        ("userId" = String, Path, description = "User ID"),
        ("conversationId" = String, Path, description = "Conversation ID"),
    ),
    responses(
        (status = 200, description = "Conversation deleted"),
        (status = 404, description = "Conversation not found", body = ApiError),
    )
)]
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path((user_id, conversation_id)): Path<(String, String)>,
) -> ApiResponse<serde_json::Value> {
    match state
        .messages
        .context()
        .delete_conversation(&user_id, &conversation_id)
        .await
    {
        Ok(()) => ApiResponse::success(serde_json::json!({ "deleted": true })),
        Err(e) => e.into(),
    }
}
