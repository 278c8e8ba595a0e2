//! v1 collection and document read handlers. Writes go through messages.

use axum::extract::{Path, State};
use axum_extra::extract::Query;

use crate::api::v1::dto::{
    CollectionResponse, ListCollectionsResponse, ListDocumentsQuery, ListDocumentsResponse,
};
use crate::api::v1::response::{ApiError, ApiResponse, ResponseMeta};
use crate::api::AppState;
use crate::models::{QueryRequest, SortKey};

/// `GET /api/v1/users/{userId}/collections`
#[utoipa::path(
    get,
    path = "/api/v1/users/{userId}/collections",
    tag = "collections",
    operation_id = "collections.list",
    params(("userId" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "The user's collections", body = ListCollectionsResponse),
    )
)]
pub async fn list_collections(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResponse<ListCollectionsResponse> {
    match state.documents.list_collections(&user_id).await {
        Ok(schemas) => ApiResponse::success(ListCollectionsResponse {
            collections: schemas.into_iter().map(CollectionResponse::from).collect(),
        }),
        Err(e) => e.into(),
    }
}

/// `GET /api/v1/users/{userId}/collections/{name}`
#[utoipa::path(
    get,
    path = "/api/v1/users/{userId}/collections/{name}",
    tag = "collections",
    operation_id = "collections.get",
    params(
        ("userId" = String, Path, description = "User ID"),
        ("name" = String, Path, description = "Collection name, case-insensitive"),
    ),
    responses(
        (status = 200, description = "Collection schema", body = CollectionResponse),
        (status = 404, description = "Unknown collection", body = ApiError),
    )
)]
pub async fn get_collection(
    State(state): State<AppState>,
    Path((user_id, name)): Path<(String, String)>,
) -> ApiResponse<CollectionResponse> {
    match state.documents.get_collection(&user_id, &name).await {
        Ok(schema) => ApiResponse::success(CollectionResponse::from(schema)),
        Err(e) => e.into(),
    }
}

/// `DELETE /api/v1/users/{userId}/collections/{name}`
///
/// Removes the schema and every document in it.
#[utoipa::path(
    delete,
    path = "/api/v1/users/{userId}/collections/{name}",
    tag = "collections",
    operation_id = "collections.delete",
    params(
        ("userId" = String, Path, description = "User ID"),
        ("name" = String, Path, description = "Collection name, case-insensitive"),
    ),
    responses(
        (status = 200, description = "Collection deleted"),
        (status = 404, description = "Unknown collection", body = ApiError),
    )
)]
pub async fn delete_collection(
    State(state): State<AppState>,
    Path((user_id, name)): Path<(String, String)>,
) -> ApiResponse<serde_json::Value> {
    match state.documents.delete_collection(&user_id, &name).await {
        Ok(()) => ApiResponse::success(serde_json::json!({ "deleted": true })),
        Err(e) => e.into(),
    }
}

/// `GET /api/v1/users/{userId}/collections/{name}/documents`
#[utoipa::path(
    get,
    path = "/api/v1/users/{userId}/collections/{name}/documents",
    tag = "collections",
    operation_id = "collections.documents",
    params(
        ("userId" = String, Path, description = "User ID"),
        ("name" = String, Path, description = "Collection name, case-insensitive"),
        ListDocumentsQuery,
    ),
    responses(
        (status = 200, description = "One page of documents", body = ListDocumentsResponse),
        (status = 400, description = "Unknown sort field", body = ApiError),
        (status = 404, description = "Unknown collection", body = ApiError),
    )
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Path((user_id, name)): Path<(String, String)>,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResponse<ListDocumentsResponse> {
    let sort = match query.sort.as_deref().map(str::trim) {
        Some(field) if !field.is_empty() => match field.strip_prefix('-') {
            Some(desc) => vec![SortKey::desc(desc)],
            None => vec![SortKey::asc(field)],
        },
        _ => Vec::new(),
    };
    let offset = query.offset.unwrap_or(0);
    let request = QueryRequest {
        sort,
        skip: offset,
        limit: query.limit(),
        ..QueryRequest::default()
    };

    match state.documents.query(&user_id, &name, &request).await {
        Ok(page) => {
            let meta = ResponseMeta::page(page.total, offset, page.documents.len());
            let body = ListDocumentsResponse::from_documents(&page.documents);
            ApiResponse::success_with_meta(body, meta)
        }
        Err(e) => e.into(),
    }
}
