use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    CollectionSchema, Conversation, ConversationTurn, Document, FieldDefinition, Role,
};

// ---------------------------------------------------------------------------
// Individual store traits
// ---------------------------------------------------------------------------

/// Persistence for collection schemas. Every call is scoped to one user.
#[async_trait]
pub trait CollectionStore: Send + Sync {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()>;
    async fn get_collection_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<CollectionSchema>>;
    async fn get_collection_by_id(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<CollectionSchema>>;
    async fn list_collections(&self, user_id: &str) -> Result<Vec<CollectionSchema>>;
    /// Compare-and-set on `updated_at`; false means the schema changed underneath us.
    async fn update_collection_fields(
        &self,
        user_id: &str,
        id: &str,
        fields: &[FieldDefinition],
        expected_updated_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool>;
    /// Removes the collection along with its documents.
    async fn delete_collection(&self, user_id: &str, id: &str) -> Result<bool>;
}

/// Persistence for documents, addressed by user and collection.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn create_document(&self, doc: &Document) -> Result<()>;
    async fn create_documents_batch(&self, docs: &[Document]) -> Result<()>;
    async fn get_document(
        &self,
        user_id: &str,
        collection_id: &str,
        id: &str,
    ) -> Result<Option<Document>>;
    async fn list_documents(&self, user_id: &str, collection_id: &str) -> Result<Vec<Document>>;
    /// Compare-and-set on `updated_at`; false means the document changed or vanished.
    async fn update_document(
        &self,
        doc: &Document,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn delete_document(&self, user_id: &str, collection_id: &str, id: &str)
        -> Result<bool>;
}

/// Conversations and their turn history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation_if_absent(&self, conversation: &Conversation) -> Result<bool>;
    async fn get_conversation(&self, user_id: &str, id: &str) -> Result<Option<Conversation>>;
    async fn list_conversations(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Conversation>, u64)>;
    async fn delete_conversation(&self, user_id: &str, id: &str) -> Result<bool>;
    async fn append_turns(
        &self,
        user_id: &str,
        conversation_id: &str,
        turns: &[(Role, String)],
    ) -> Result<Vec<ConversationTurn>>;
    async fn recent_turns(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: u64,
    ) -> Result<Vec<ConversationTurn>>;
    async fn list_turns(&self, user_id: &str, conversation_id: &str)
        -> Result<Vec<ConversationTurn>>;
    /// Highest stored sequence number, 0 for a conversation with no turns.
    async fn last_seq(&self, user_id: &str, conversation_id: &str) -> Result<i64>;
}

// ---------------------------------------------------------------------------
// Unified backend supertrait
// ---------------------------------------------------------------------------

/// A complete database backend that combines all store traits plus lifecycle
/// operations.
#[async_trait]
pub trait DatabaseBackend: CollectionStore + DocumentStore + ConversationStore {
    /// Sync with remote (e.g. Turso replication). No-op for local-only backends.
    async fn sync(&self) -> Result<()>;

    /// Round-trips a trivial query; used by the health endpoint.
    async fn ping(&self) -> Result<()>;
}
