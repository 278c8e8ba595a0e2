use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::{ParleyError, Result};
use crate::models::{collection_name_key, CollectionSchema, FieldDefinition};

use super::parse_timestamp;

pub struct CollectionRepository;

const COLUMNS: &str = "id, user_id, name, description, fields, created_at, updated_at";

impl CollectionRepository {
    pub async fn create(conn: &Connection, schema: &CollectionSchema) -> Result<()> {
        let result = conn
            .execute(
                r#"
                INSERT INTO collections (
                    id, user_id, name, name_key, description, fields, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    schema.id.clone(),
                    schema.user_id.clone(),
                    schema.name.clone(),
                    collection_name_key(&schema.name),
                    schema.description.clone(),
                    serde_json::to_string(&schema.fields)?,
                    schema.created_at.to_rfc3339(),
                    schema.updated_at.to_rfc3339(),
                ],
            )
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(error) if error.to_string().contains("UNIQUE") => {
                Err(ParleyError::SchemaConflict(schema.name.clone()))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn get_by_name(
        conn: &Connection,
        user_id: &str,
        name: &str,
    ) -> Result<Option<CollectionSchema>> {
        let sql = format!("SELECT {COLUMNS} FROM collections WHERE user_id = ?1 AND name_key = ?2");
        let mut rows = conn
            .query(&sql, params![user_id, collection_name_key(name)])
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_schema(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn get_by_id(
        conn: &Connection,
        user_id: &str,
        id: &str,
    ) -> Result<Option<CollectionSchema>> {
        let sql = format!("SELECT {COLUMNS} FROM collections WHERE user_id = ?1 AND id = ?2");
        let mut rows = conn.query(&sql, params![user_id, id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_schema(&row)?))
        } else {
            Ok(None)
        }
    }

    pub async fn list(conn: &Connection, user_id: &str) -> Result<Vec<CollectionSchema>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM collections WHERE user_id = ?1 ORDER BY created_at ASC, name_key ASC"
        );
        let mut rows = conn.query(&sql, params![user_id]).await?;

        let mut schemas = Vec::new();
        while let Some(row) = rows.next().await? {
            schemas.push(Self::row_to_schema(&row)?);
        }
        Ok(schemas)
    }

    /// Replaces the field list if the row is still at `expected_updated_at`.
    /// Returns false when another writer got there first.
    pub async fn update_fields(
        conn: &Connection,
        user_id: &str,
        id: &str,
        fields: &[FieldDefinition],
        expected_updated_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows_affected = conn
            .execute(
                r#"
                UPDATE collections SET fields = ?4, updated_at = ?5
                WHERE user_id = ?1 AND id = ?2 AND updated_at = ?3
                "#,
                params![
                    user_id,
                    id,
                    expected_updated_at.to_rfc3339(),
                    serde_json::to_string(fields)?,
                    updated_at.to_rfc3339(),
                ],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    /// Deletes the collection and all of its documents in one transaction.
    pub async fn delete(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
        let tx = conn.transaction().await?;
        tx.execute(
            "DELETE FROM documents WHERE user_id = ?1 AND collection_id = ?2",
            params![user_id, id],
        )
        .await?;
        let rows_affected = tx
            .execute(
                "DELETE FROM collections WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
            )
            .await?;
        tx.commit().await?;

        Ok(rows_affected > 0)
    }

    fn row_to_schema(row: &libsql::Row) -> Result<CollectionSchema> {
        Ok(CollectionSchema {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            fields: serde_json::from_str(&row.get::<String>(4)?)?,
            created_at: parse_timestamp(&row.get::<String>(5)?),
            updated_at: parse_timestamp(&row.get::<String>(6)?),
        })
    }
}
