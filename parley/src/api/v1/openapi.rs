use axum::Json;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use super::dto;
use super::handlers;
use super::response;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Parley API",
        version = "1.0.0",
        description = "Self-hostable personal data manager driven by natural-language messages.",
    ),
    paths(
        handlers::health::health_check,
        handlers::messages::send_message,
        handlers::collections::list_collections,
        handlers::collections::get_collection,
        handlers::collections::delete_collection,
        handlers::collections::list_documents,
        handlers::conversations::list_conversations,
        handlers::conversations::get_conversation,
        handlers::conversations::delete_conversation,
    ),
    components(schemas(
        // Response envelope
        response::ErrorCode,
        response::ApiError,
        response::ResponseMeta,
        // Common
        dto::PageQuery,
        // Messages
        dto::SendMessageRequest,
        dto::SendMessageResponse,
        // Collections
        dto::CollectionResponse,
        dto::ListCollectionsResponse,
        dto::ListDocumentsQuery,
        dto::ListDocumentsResponse,
        // Conversations
        dto::ConversationResponse,
        dto::TurnResponse,
        dto::ConversationDetailResponse,
        dto::ListConversationsResponse,
        // Health (handler-local types)
        handlers::health::HealthData,
        handlers::health::DatabaseStatus,
        handlers::health::LlmStatus,
        handlers::health::LockStatus,
    )),
    tags(
        (name = "health", description = "Health check"),
        (name = "messages", description = "Natural-language message intake"),
        (name = "collections", description = "Read access to collections and their documents"),
        (name = "conversations", description = "Conversation history"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            utoipa::openapi::security::SecurityScheme::Http(utoipa::openapi::security::Http::new(
                utoipa::openapi::security::HttpAuthScheme::Bearer,
            )),
        );
    }
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn redoc_router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    Redoc::with_url("/docs", ApiDoc::openapi()).into()
}
