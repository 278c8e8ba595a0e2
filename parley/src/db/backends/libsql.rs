use crate::db::connection::Database;
use crate::db::repository::{CollectionRepository, ConversationRepository, DocumentRepository};
use crate::db::traits::{CollectionStore, ConversationStore, DatabaseBackend, DocumentStore};
use crate::error::Result;
use crate::models::{
    CollectionSchema, Conversation, ConversationTurn, Document, FieldDefinition, Role,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub struct LibSqlBackend {
    db: Database,
}

impl LibSqlBackend {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CollectionStore for LibSqlBackend {
    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        let conn = self.db.connect()?;
        CollectionRepository::create(&conn, schema).await
    }
    async fn get_collection_by_name(
        &self,
        user_id: &str,
        name: &str,
    ) -> Result<Option<CollectionSchema>> {
        let conn = self.db.connect()?;
        CollectionRepository::get_by_name(&conn, user_id, name).await
    }
    async fn get_collection_by_id(
        &self,
        user_id: &str,
        id: &str,
    ) -> Result<Option<CollectionSchema>> {
        let conn = self.db.connect()?;
        CollectionRepository::get_by_id(&conn, user_id, id).await
    }
    async fn list_collections(&self, user_id: &str) -> Result<Vec<CollectionSchema>> {
        let conn = self.db.connect()?;
        CollectionRepository::list(&conn, user_id).await
    }
    async fn update_collection_fields(
        &self,
        user_id: &str,
        id: &str,
        fields: &[FieldDefinition],
        expected_updated_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.db.connect()?;
        CollectionRepository::update_fields(
            &conn,
            user_id,
            id,
            fields,
            expected_updated_at,
            updated_at,
        )
        .await
    }
    async fn delete_collection(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        CollectionRepository::delete(&conn, user_id, id).await
    }
}

#[async_trait]
impl DocumentStore for LibSqlBackend {
    async fn create_document(&self, doc: &Document) -> Result<()> {
        let conn = self.db.connect()?;
        DocumentRepository::create(&conn, doc).await
    }
    async fn create_documents_batch(&self, docs: &[Document]) -> Result<()> {
        let conn = self.db.connect()?;
        DocumentRepository::create_batch(&conn, docs).await
    }
    async fn get_document(
        &self,
        user_id: &str,
        collection_id: &str,
        id: &str,
    ) -> Result<Option<Document>> {
        let conn = self.db.connect()?;
        DocumentRepository::get_by_id(&conn, user_id, collection_id, id).await
    }
    async fn list_documents(&self, user_id: &str, collection_id: &str) -> Result<Vec<Document>> {
        let conn = self.db.connect()?;
        DocumentRepository::list(&conn, user_id, collection_id).await
    }
    async fn update_document(
        &self,
        doc: &Document,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let conn = self.db.connect()?;
        DocumentRepository::update(&conn, doc, expected_updated_at).await
    }
    async fn delete_document(
        &self,
        user_id: &str,
        collection_id: &str,
        id: &str,
    ) -> Result<bool> {
        let conn = self.db.connect()?;
        DocumentRepository::delete(&conn, user_id, collection_id, id).await
    }
}

#[async_trait]
impl ConversationStore for LibSqlBackend {
    async fn create_conversation_if_absent(&self, conversation: &Conversation) -> Result<bool> {
        let conn = self.db.connect()?;
        ConversationRepository::create_if_absent(&conn, conversation).await
    }
    async fn get_conversation(&self, user_id: &str, id: &str) -> Result<Option<Conversation>> {
        let conn = self.db.connect()?;
        ConversationRepository::get(&conn, user_id, id).await
    }
    async fn list_conversations(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Conversation>, u64)> {
        let conn = self.db.connect()?;
        ConversationRepository::list(&conn, user_id, limit, offset).await
    }
    async fn delete_conversation(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.db.connect()?;
        ConversationRepository::delete(&conn, user_id, id).await
    }
    async fn append_turns(
        &self,
        user_id: &str,
        conversation_id: &str,
        turns: &[(Role, String)],
    ) -> Result<Vec<ConversationTurn>> {
        let conn = self.db.connect()?;
        ConversationRepository::append_turns(&conn, user_id, conversation_id, turns).await
    }
    async fn recent_turns(
        &self,
        user_id: &str,
        conversation_id: &str,
        limit: u64,
    ) -> Result<Vec<ConversationTurn>> {
        let conn = self.db.connect()?;
        ConversationRepository::recent_turns(&conn, user_id, conversation_id, limit).await
    }
    async fn list_turns(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ConversationTurn>> {
        let conn = self.db.connect()?;
        ConversationRepository::list_turns(&conn, user_id, conversation_id).await
    }
    async fn last_seq(&self, user_id: &str, conversation_id: &str) -> Result<i64> {
        let conn = self.db.connect()?;
        ConversationRepository::last_seq(&conn, user_id, conversation_id).await
    }
}

#[async_trait]
impl DatabaseBackend for LibSqlBackend {
    async fn sync(&self) -> Result<()> {
        self.db.sync().await
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.db.connect()?;
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?;
        Ok(())
    }
}
