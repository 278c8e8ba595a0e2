use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::api::state::AppState;

use super::handlers;
use super::middleware::v1_auth_middleware;

pub fn v1_router(state: AppState) -> Router<AppState> {
    let collections = Router::new()
        .route("/", get(handlers::collections::list_collections))
        .route(
            "/{name}",
            get(handlers::collections::get_collection)
                .delete(handlers::collections::delete_collection),
        )
        .route(
            "/{name}/documents",
            get(handlers::collections::list_documents),
        );

    let conversations = Router::new()
        .route("/", get(handlers::conversations::list_conversations))
        .route(
            "/{conversationId}",
            get(handlers::conversations::get_conversation)
                .delete(handlers::conversations::delete_conversation),
        );

    let public_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/openapi.json", get(super::openapi::openapi_json))
        .merge(super::openapi::redoc_router());

    let protected_routes = Router::new()
        .route("/messages", post(handlers::messages::send_message))
        .nest("/users/{userId}/collections", collections)
        .nest("/users/{userId}/conversations", conversations)
        .route_layer(middleware::from_fn_with_state(state, v1_auth_middleware));

    Router::new().merge(public_routes).merge(protected_routes)
}
