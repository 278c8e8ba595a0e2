//! Collection and document DTOs for the v1 API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{CollectionSchema, Document, FieldDefinition, MAX_QUERY_LIMIT};

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CollectionResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared fields in order: name, type, required, default, options, unique.
    #[schema(value_type = Vec<Object>)]
    pub fields: Vec<FieldDefinition>,
    #[schema(value_type = String)]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String)]
    pub updated_at: DateTime<Utc>,
}

impl From<CollectionSchema> for CollectionResponse {
    fn from(schema: CollectionSchema) -> Self {
        Self {
            name: schema.name,
            description: schema.description,
            fields: schema.fields,
            created_at: schema.created_at,
            updated_at: schema.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListCollectionsResponse {
    pub collections: Vec<CollectionResponse>,
}

/// Query parameters for `GET /api/v1/users/{userId}/collections/{name}/documents`.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsQuery {
    /// Field to sort by, optionally prefixed with `-` for descending.
    pub sort: Option<String>,
    /// Maximum documents per page (default 50, max 500).
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListDocumentsQuery {
    pub fn limit(&self) -> Option<u64> {
        self.limit.map(|limit| limit.clamp(1, MAX_QUERY_LIMIT))
    }
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    /// Each document as a flat object: `id`, its fields, `created_at`, `updated_at`.
    #[schema(value_type = Vec<Object>)]
    pub documents: Vec<Value>,
}

impl ListDocumentsResponse {
    pub fn from_documents(documents: &[Document]) -> Self {
        Self {
            documents: documents.iter().map(Document::to_json).collect(),
        }
    }
}
