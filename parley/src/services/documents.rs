use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::db::DatabaseBackend;
use crate::error::{IssueReason, ParleyError, Result, ValidationErrors};
use crate::models::{
    AggregateRequest, AggregateRow, CollectionSchema, Document, DocumentPage, FieldDefinition,
    FieldMap, FieldValue, NewCollection, QueryRequest,
};
use crate::query;
use crate::schema::{self, SchemaRegistry};

const UPDATE_ATTEMPTS: usize = 3;

/// Schema-validated, user-scoped collection and document operations.
///
/// Writes to a collection with unique fields hold a per-collection lock across the
/// uniqueness check and the write. The lock lives in this process, so deployments
/// running several instances against one database can still race on unique values.
#[derive(Clone)]
pub struct DocumentService {
    db: Arc<dyn DatabaseBackend>,
    registry: SchemaRegistry,
    write_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl DocumentService {
    pub fn new(db: Arc<dyn DatabaseBackend>) -> Self {
        let registry = SchemaRegistry::new(db.clone());
        Self {
            db,
            registry,
            write_locks: Arc::default(),
        }
    }

    /// Serializes writers of one collection while uniqueness is checked.
    async fn unique_write_lock(&self, schema: &CollectionSchema) -> Option<OwnedMutexGuard<()>> {
        if !has_unique_fields(schema) {
            return None;
        }
        let lock = self
            .write_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(schema.id.clone())
            .or_default()
            .clone();
        Some(lock.lock_owned().await)
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub async fn create_collection(
        &self,
        user_id: &str,
        collection: &NewCollection,
    ) -> Result<CollectionSchema> {
        self.registry
            .define(
                user_id,
                &collection.name,
                collection.description.as_deref(),
                &collection.fields,
            )
            .await
    }

    pub async fn extend_collection(
        &self,
        user_id: &str,
        name: &str,
        fields: &[FieldDefinition],
    ) -> Result<CollectionSchema> {
        self.registry.extend(user_id, name, fields).await
    }

    /// Drops the fields added by `extend_collection`, provided nothing changed since.
    pub async fn revert_extension(
        &self,
        user_id: &str,
        extended: &CollectionSchema,
        added: &[FieldDefinition],
    ) -> Result<CollectionSchema> {
        self.registry.revert_extension(user_id, extended, added).await
    }

    pub async fn list_collections(&self, user_id: &str) -> Result<Vec<CollectionSchema>> {
        self.registry.list(user_id).await
    }

    pub async fn get_collection(&self, user_id: &str, name: &str) -> Result<CollectionSchema> {
        self.registry.get(user_id, name).await
    }

    /// Removes the schema and every document in it atomically.
    pub async fn delete_collection(&self, user_id: &str, name: &str) -> Result<()> {
        let schema = self.registry.get(user_id, name).await?;
        if !self.db.delete_collection(user_id, &schema.id).await? {
            return Err(ParleyError::UnknownCollection(schema.name));
        }
        tracing::info!(user_id, collection = %schema.name, "Collection deleted");
        Ok(())
    }

    pub async fn insert(
        &self,
        user_id: &str,
        collection: &str,
        raw: &Map<String, Value>,
    ) -> Result<Document> {
        let schema = self.registry.get(user_id, collection).await?;
        let now = Utc::now();
        let fields = schema::validate(&schema, raw, now)?;

        let _write = self.unique_write_lock(&schema).await;
        if has_unique_fields(&schema) {
            let existing = self.db.list_documents(user_id, &schema.id).await?;
            check_unique(&schema, &fields, &existing, None)?;
        }

        let doc = new_document(&schema, fields, now);
        self.db.create_document(&doc).await?;
        tracing::debug!(
            user_id,
            collection = %schema.name,
            document_id = %doc.id,
            "Document inserted"
        );
        Ok(doc)
    }

    /// Validates every document first, then stores them in one transaction.
    pub async fn insert_many(
        &self,
        user_id: &str,
        collection: &str,
        raws: &[Map<String, Value>],
    ) -> Result<Vec<Document>> {
        let schema = self.registry.get(user_id, collection).await?;
        let now = Utc::now();

        let _write = self.unique_write_lock(&schema).await;
        let batch = self.check_batch(&schema, raws, now).await?;

        let docs: Vec<Document> = batch
            .into_iter()
            .map(|fields| new_document(&schema, fields, now))
            .collect();
        self.db.create_documents_batch(&docs).await?;
        tracing::debug!(
            user_id,
            collection = %schema.name,
            count = docs.len(),
            "Documents inserted"
        );
        Ok(docs)
    }

    /// Validates a batch against `schema` and against what is already stored in it,
    /// including repeated unique values inside the batch. Writes nothing. A schema that
    /// is not stored yet has no documents to collide with.
    pub async fn check_batch(
        &self,
        schema: &CollectionSchema,
        raws: &[Map<String, Value>],
        now: DateTime<Utc>,
    ) -> Result<Vec<FieldMap>> {
        let mut batch: Vec<FieldMap> = Vec::with_capacity(raws.len());
        for (index, raw) in raws.iter().enumerate() {
            let fields = schema::validate(schema, raw, now)
                .map_err(|error| label_item(error, index, raws.len()))?;
            batch.push(fields);
        }

        if has_unique_fields(schema) {
            let mut seen = if schema.id.is_empty() {
                Vec::new()
            } else {
                self.db.list_documents(&schema.user_id, &schema.id).await?
            };
            for (index, fields) in batch.iter().enumerate() {
                check_unique(schema, fields, &seen, None)
                    .map_err(|error| label_item(error, index, raws.len()))?;
                seen.push(new_document(schema, fields.clone(), now));
            }
        }
        Ok(batch)
    }

    pub async fn get(&self, user_id: &str, collection: &str, id: &str) -> Result<Document> {
        let schema = self.registry.get(user_id, collection).await?;
        self.db
            .get_document(user_id, &schema.id, id)
            .await?
            .ok_or_else(|| ParleyError::NotFound(format!("document {id} in {}", schema.name)))
    }

    /// Merges `partial` into the stored document (`null` removes a key) and writes the
    /// result only if it validates. A concurrent write is retried against the fresh copy.
    pub async fn update(
        &self,
        user_id: &str,
        collection: &str,
        id: &str,
        partial: &Map<String, Value>,
    ) -> Result<Document> {
        let schema = self.registry.get(user_id, collection).await?;
        let _write = self.unique_write_lock(&schema).await;

        for _ in 0..UPDATE_ATTEMPTS {
            let current = self
                .db
                .get_document(user_id, &schema.id, id)
                .await?
                .ok_or_else(|| ParleyError::NotFound(format!("document {id} in {}", schema.name)))?;

            let now = Utc::now().max(current.updated_at + Duration::microseconds(1));
            let fields = schema::merge_update(&schema, &current.fields, partial, now)?;

            if has_unique_fields(&schema) {
                let existing = self.db.list_documents(user_id, &schema.id).await?;
                check_unique(&schema, &fields, &existing, Some(id))?;
            }

            let updated = Document {
                fields,
                updated_at: now,
                ..current.clone()
            };
            if self.db.update_document(&updated, current.updated_at).await? {
                tracing::debug!(
                    user_id,
                    collection = %schema.name,
                    document_id = id,
                    "Document updated"
                );
                return Ok(updated);
            }
            tracing::debug!(user_id, document_id = id, "Document changed during update, retrying");
        }

        Err(ParleyError::Internal(format!(
            "document {id} kept changing during update"
        )))
    }

    /// Applies the same partial update to every id, or to none of them. Every id must
    /// exist and every merged document must validate before the first write; a write
    /// that fails later puts the documents already written back.
    pub async fn update_all(
        &self,
        user_id: &str,
        collection: &str,
        ids: &[String],
        partial: &Map<String, Value>,
    ) -> Result<Vec<Document>> {
        let schema = self.registry.get(user_id, collection).await?;
        let _write = self.unique_write_lock(&schema).await;

        let currents = self.fetch_all(user_id, &schema, ids).await?;
        let now = Utc::now();
        let mut planned = Vec::with_capacity(currents.len());
        for (index, current) in currents.iter().enumerate() {
            let at = now.max(current.updated_at + Duration::microseconds(1));
            let fields = schema::merge_update(&schema, &current.fields, partial, at)
                .map_err(|error| label_item(error, index, currents.len()))?;
            planned.push(Document {
                fields,
                updated_at: at,
                ..current.clone()
            });
        }

        if has_unique_fields(&schema) {
            let mut seen = self.db.list_documents(user_id, &schema.id).await?;
            seen.retain(|doc| !ids.contains(&doc.id));
            for (index, doc) in planned.iter().enumerate() {
                check_unique(&schema, &doc.fields, &seen, None)
                    .map_err(|error| label_item(error, index, planned.len()))?;
                seen.push(doc.clone());
            }
        }

        for (written, (current, doc)) in currents.iter().zip(&planned).enumerate() {
            let outcome = match self.db.update_document(doc, current.updated_at).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(ParleyError::Internal(format!(
                    "document {} changed during update",
                    doc.id
                ))),
                Err(error) => Err(error),
            };
            if let Err(error) = outcome {
                self.restore_updated(&currents[..written], &planned[..written])
                    .await;
                return Err(error);
            }
        }

        tracing::debug!(
            user_id,
            collection = %schema.name,
            count = planned.len(),
            "Documents updated"
        );
        Ok(planned)
    }

    /// Deletes every id or none of them. Missing ids fail before anything is deleted.
    pub async fn delete_all(
        &self,
        user_id: &str,
        collection: &str,
        ids: &[String],
    ) -> Result<Vec<Document>> {
        let schema = self.registry.get(user_id, collection).await?;
        let docs = self.fetch_all(user_id, &schema, ids).await?;

        for (deleted, doc) in docs.iter().enumerate() {
            let outcome = match self.db.delete_document(user_id, &schema.id, &doc.id).await {
                Ok(true) => Ok(()),
                Ok(false) => Err(ParleyError::NotFound(format!(
                    "document {} in {}",
                    doc.id, schema.name
                ))),
                Err(error) => Err(error),
            };
            if let Err(error) = outcome {
                self.restore_deleted(&docs[..deleted]).await;
                return Err(error);
            }
        }

        tracing::debug!(
            user_id,
            collection = %schema.name,
            count = docs.len(),
            "Documents deleted"
        );
        Ok(docs)
    }

    async fn fetch_all(
        &self,
        user_id: &str,
        schema: &CollectionSchema,
        ids: &[String],
    ) -> Result<Vec<Document>> {
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            let doc = self
                .db
                .get_document(user_id, &schema.id, id)
                .await?
                .ok_or_else(|| ParleyError::NotFound(format!("document {id} in {}", schema.name)))?;
            docs.push(doc);
        }
        Ok(docs)
    }

    async fn restore_updated(&self, originals: &[Document], written: &[Document]) {
        for (original, doc) in originals.iter().zip(written) {
            match self.db.update_document(original, doc.updated_at).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::error!(
                        document_id = %doc.id,
                        "Document changed before it could be restored"
                    );
                }
                Err(error) => {
                    tracing::error!(
                        document_id = %doc.id,
                        error = %error,
                        "Failed to restore document"
                    );
                }
            }
        }
    }

    async fn restore_deleted(&self, docs: &[Document]) {
        for doc in docs {
            if let Err(error) = self.db.create_document(doc).await {
                tracing::error!(
                    document_id = %doc.id,
                    error = %error,
                    "Failed to restore document"
                );
            }
        }
    }

    /// Deleting a missing document is `NotFound` every time and changes nothing.
    pub async fn delete(&self, user_id: &str, collection: &str, id: &str) -> Result<()> {
        let schema = self.registry.get(user_id, collection).await?;
        if !self.db.delete_document(user_id, &schema.id, id).await? {
            return Err(ParleyError::NotFound(format!(
                "document {id} in {}",
                schema.name
            )));
        }
        tracing::debug!(user_id, collection = %schema.name, document_id = id, "Document deleted");
        Ok(())
    }

    pub async fn query(
        &self,
        user_id: &str,
        collection: &str,
        request: &QueryRequest,
    ) -> Result<DocumentPage> {
        let schema = self.registry.get(user_id, collection).await?;
        let docs = self.db.list_documents(user_id, &schema.id).await?;
        query::run_query(&schema, docs, request)
    }

    pub async fn aggregate(
        &self,
        user_id: &str,
        collection: &str,
        request: &AggregateRequest,
    ) -> Result<Vec<AggregateRow>> {
        let schema = self.registry.get(user_id, collection).await?;
        let docs = self.db.list_documents(user_id, &schema.id).await?;
        query::run_aggregate(&schema, &docs, request)
    }
}

fn new_document(schema: &CollectionSchema, fields: FieldMap, now: DateTime<Utc>) -> Document {
    Document {
        id: nanoid::nanoid!(),
        user_id: schema.user_id.clone(),
        collection_id: schema.id.clone(),
        fields,
        created_at: now,
        updated_at: now,
    }
}

fn has_unique_fields(schema: &CollectionSchema) -> bool {
    schema.fields.iter().any(|field| field.unique)
}

fn check_unique(
    schema: &CollectionSchema,
    fields: &FieldMap,
    existing: &[Document],
    skip_id: Option<&str>,
) -> Result<()> {
    let mut errors = ValidationErrors::default();
    for field in schema.fields.iter().filter(|field| field.unique) {
        let Some(value) = fields.get(&field.name) else {
            continue;
        };
        let taken = existing
            .iter()
            .filter(|doc| Some(doc.id.as_str()) != skip_id)
            .filter_map(|doc| doc.fields.get(&field.name))
            .any(|other| same_value(value, other));
        if taken {
            errors.push(
                field.name.clone(),
                IssueReason::NotUnique {
                    value: value.to_string(),
                },
            );
        }
    }
    errors.into_result()
}

fn same_value(a: &FieldValue, b: &FieldValue) -> bool {
    match (a, b) {
        (FieldValue::String(x), FieldValue::String(y)) => x.to_lowercase() == y.to_lowercase(),
        _ => a.compare(b).is_some_and(|ordering| ordering.is_eq()),
    }
}

fn label_item(error: ParleyError, index: usize, total: usize) -> ParleyError {
    match error {
        ParleyError::Validation(mut errors) if total > 1 => {
            for issue in &mut errors.issues {
                issue.field = format!("{} (item {})", issue.field, index + 1);
            }
            ParleyError::Validation(errors)
        }
        other => other,
    }
}
