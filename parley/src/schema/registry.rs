use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::db::DatabaseBackend;
use crate::error::{ParleyError, Result};
use crate::models::{CollectionSchema, FieldDefinition, FieldMap, NewCollection};

use super::validate;

const MAX_COLLECTION_NAME_CHARS: usize = 80;
const EXTEND_ATTEMPTS: usize = 3;

/// Per-user collection schemas backed by the collection store.
#[derive(Clone)]
pub struct SchemaRegistry {
    db: Arc<dyn DatabaseBackend>,
}

impl SchemaRegistry {
    pub fn new(db: Arc<dyn DatabaseBackend>) -> Self {
        Self { db }
    }

    /// Checks a proposed collection without writing anything. A name that is already
    /// taken is a [`ParleyError::SchemaConflict`].
    pub async fn prepare(&self, user_id: &str, proposal: &NewCollection) -> Result<NewCollection> {
        let name = check_collection_name(&proposal.name)?;
        let fields = validate::check_field_definitions(&proposal.fields)?;

        if self.db.get_collection_by_name(user_id, &name).await?.is_some() {
            return Err(ParleyError::SchemaConflict(name));
        }

        Ok(NewCollection {
            name,
            description: proposal
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            fields,
        })
    }

    pub async fn define(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
        fields: &[FieldDefinition],
    ) -> Result<CollectionSchema> {
        let proposal = NewCollection {
            name: name.to_string(),
            description: description.map(str::to_string),
            fields: fields.to_vec(),
        };
        let checked = self.prepare(user_id, &proposal).await?;

        let now = Utc::now();
        let schema = CollectionSchema {
            id: nanoid::nanoid!(),
            user_id: user_id.to_string(),
            name: checked.name,
            description: checked.description,
            fields: checked.fields,
            created_at: now,
            updated_at: now,
        };
        self.db.create_collection(&schema).await?;

        tracing::info!(
            user_id,
            collection = %schema.name,
            fields = schema.fields.len(),
            "Collection defined"
        );
        Ok(schema)
    }

    /// Appends fields to an existing collection. Concurrent extensions are retried
    /// against the freshest schema.
    pub async fn extend(
        &self,
        user_id: &str,
        name: &str,
        new_fields: &[FieldDefinition],
    ) -> Result<CollectionSchema> {
        for _ in 0..EXTEND_ATTEMPTS {
            let schema = self.get(user_id, name).await?;
            let added = validate::check_extension(&schema, new_fields)?;
            if added.is_empty() {
                return Ok(schema);
            }

            let mut fields = schema.fields.clone();
            fields.extend(added);
            let now = Utc::now().max(schema.updated_at + chrono::Duration::microseconds(1));

            if self
                .db
                .update_collection_fields(user_id, &schema.id, &fields, schema.updated_at, now)
                .await?
            {
                tracing::info!(
                    user_id,
                    collection = %schema.name,
                    added = new_fields.len(),
                    "Collection extended"
                );
                return Ok(CollectionSchema {
                    fields,
                    updated_at: now,
                    ..schema
                });
            }
            tracing::debug!(
                user_id,
                collection = %schema.name,
                "Schema changed during extend, retrying"
            );
        }

        Err(ParleyError::SchemaConflict(format!(
            "{name} (changed concurrently, try again)"
        )))
    }

    /// Takes `added` back out of a schema returned by [`SchemaRegistry::extend`]. Fails
    /// with a conflict when the schema changed in between.
    pub async fn revert_extension(
        &self,
        user_id: &str,
        extended: &CollectionSchema,
        added: &[FieldDefinition],
    ) -> Result<CollectionSchema> {
        let fields: Vec<FieldDefinition> = extended
            .fields
            .iter()
            .filter(|field| {
                !added
                    .iter()
                    .any(|new| new.name.trim().eq_ignore_ascii_case(&field.name))
            })
            .cloned()
            .collect();
        let now = Utc::now().max(extended.updated_at + chrono::Duration::microseconds(1));

        if !self
            .db
            .update_collection_fields(user_id, &extended.id, &fields, extended.updated_at, now)
            .await?
        {
            return Err(ParleyError::SchemaConflict(format!(
                "{} (changed before the extension could be undone)",
                extended.name
            )));
        }
        tracing::info!(
            user_id,
            collection = %extended.name,
            removed = added.len(),
            "Extension reverted"
        );
        Ok(CollectionSchema {
            fields,
            updated_at: now,
            ..extended.clone()
        })
    }

    pub async fn get(&self, user_id: &str, name: &str) -> Result<CollectionSchema> {
        self.find(user_id, name)
            .await?
            .ok_or_else(|| ParleyError::UnknownCollection(name.trim().to_string()))
    }

    pub async fn find(&self, user_id: &str, name: &str) -> Result<Option<CollectionSchema>> {
        self.db.get_collection_by_name(user_id, name).await
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<CollectionSchema>> {
        self.db.list_collections(user_id).await
    }

    pub fn validate(
        &self,
        schema: &CollectionSchema,
        mapping: &Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<FieldMap> {
        validate::validate(schema, mapping, now)
    }
}

fn check_collection_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ParleyError::InvalidField(
            "collection name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_COLLECTION_NAME_CHARS {
        return Err(ParleyError::InvalidField(format!(
            "collection name is longer than {MAX_COLLECTION_NAME_CHARS} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(ParleyError::InvalidField(
            "collection name cannot contain control characters".to_string(),
        ));
    }
    Ok(name.to_string())
}
