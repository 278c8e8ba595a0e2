use axum::http::{header, Method, Uri};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::v1;
use super::v1::response::{ApiResponse, ErrorCode};
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let v1 = v1::router::v1_router(state.clone());

    Router::new()
        .nest("/api/v1", v1)
        .fallback(unknown_route)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn unknown_route(uri: Uri) -> ApiResponse<()> {
    ApiResponse::error(ErrorCode::NotFound, format!("No route for {}", uri.path()))
}
