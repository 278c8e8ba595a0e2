use chrono::{DateTime, Utc};
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::Document;

use super::parse_timestamp;

pub struct DocumentRepository;

const COLUMNS: &str = "id, user_id, collection_id, data, created_at, updated_at";

impl DocumentRepository {
    pub async fn create(conn: &Connection, doc: &Document) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO documents (id, user_id, collection_id, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                doc.id.clone(),
                doc.user_id.clone(),
                doc.collection_id.clone(),
                serde_json::to_string(&doc.fields)?,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .await?;

        Ok(())
    }

    /// Inserts every document or none of them.
    pub async fn create_batch(conn: &Connection, docs: &[Document]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let tx = conn.transaction().await?;
        for doc in docs {
            Self::create(&tx, doc).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    pub async fn get_by_id(
        conn: &Connection,
        user_id: &str,
        collection_id: &str,
        id: &str,
    ) -> Result<Option<Document>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM documents WHERE user_id = ?1 AND collection_id = ?2 AND id = ?3"
        );
        let mut rows = conn.query(&sql, params![user_id, collection_id, id]).await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_document(&row)?))
        } else {
            Ok(None)
        }
    }

    /// All documents of one collection in insertion order.
    pub async fn list(
        conn: &Connection,
        user_id: &str,
        collection_id: &str,
    ) -> Result<Vec<Document>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM documents WHERE user_id = ?1 AND collection_id = ?2 ORDER BY created_at ASC, id ASC"
        );
        let mut rows = conn.query(&sql, params![user_id, collection_id]).await?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next().await? {
            documents.push(Self::row_to_document(&row)?);
        }
        Ok(documents)
    }

    /// Writes the new field map if the stored row is still at `expected_updated_at`.
    pub async fn update(
        conn: &Connection,
        doc: &Document,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool> {
        let rows_affected = conn
            .execute(
                r#"
                UPDATE documents SET data = ?5, updated_at = ?6
                WHERE user_id = ?1 AND collection_id = ?2 AND id = ?3 AND updated_at = ?4
                "#,
                params![
                    doc.user_id.clone(),
                    doc.collection_id.clone(),
                    doc.id.clone(),
                    expected_updated_at.to_rfc3339(),
                    serde_json::to_string(&doc.fields)?,
                    doc.updated_at.to_rfc3339(),
                ],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    pub async fn delete(
        conn: &Connection,
        user_id: &str,
        collection_id: &str,
        id: &str,
    ) -> Result<bool> {
        let rows_affected = conn
            .execute(
                "DELETE FROM documents WHERE user_id = ?1 AND collection_id = ?2 AND id = ?3",
                params![user_id, collection_id, id],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    fn row_to_document(row: &libsql::Row) -> Result<Document> {
        Ok(Document {
            id: row.get(0)?,
            user_id: row.get(1)?,
            collection_id: row.get(2)?,
            fields: serde_json::from_str(&row.get::<String>(3)?)?,
            created_at: parse_timestamp(&row.get::<String>(4)?),
            updated_at: parse_timestamp(&row.get::<String>(5)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;
    use crate::models::{FieldMap, FieldValue};

    async fn setup_test_db() -> Connection {
        let conn = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .unwrap()
            .connect()
            .unwrap();
        init_schema(&conn).await.unwrap();
        conn
    }

    fn make_doc(user_id: &str, title: &str) -> Document {
        let mut fields = FieldMap::new();
        fields.insert("title".to_string(), FieldValue::String(title.to_string()));
        fields.insert("completed".to_string(), FieldValue::Boolean(false));
        Document::new(user_id, "c1", fields)
    }

    #[tokio::test]
    async fn test_create_and_get_round_trips_typed_values() {
        let conn = setup_test_db().await;
        let doc = make_doc("user-a", "Write report");
        DocumentRepository::create(&conn, &doc).await.unwrap();

        let stored = DocumentRepository::get_by_id(&conn, "user-a", "c1", &doc.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields, doc.fields);
        assert_eq!(stored.created_at, doc.created_at);
    }

    #[tokio::test]
    async fn test_other_users_cannot_see_documents() {
        let conn = setup_test_db().await;
        let doc = make_doc("user-a", "Write report");
        DocumentRepository::create(&conn, &doc).await.unwrap();

        assert!(DocumentRepository::get_by_id(&conn, "user-b", "c1", &doc.id)
            .await
            .unwrap()
            .is_none());
        assert!(DocumentRepository::list(&conn, "user-b", "c1")
            .await
            .unwrap()
            .is_empty());
        assert!(!DocumentRepository::delete(&conn, "user-b", "c1", &doc.id)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_batch_insert_is_all_or_nothing() {
        let conn = setup_test_db().await;
        let first = make_doc("user-a", "one");
        let mut duplicate = make_doc("user-a", "two");
        duplicate.id = first.id.clone();

        let result = DocumentRepository::create_batch(&conn, &[first, duplicate]).await;
        assert!(result.is_err());
        assert!(DocumentRepository::list(&conn, "user-a", "c1")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_matching_version() {
        let conn = setup_test_db().await;
        let doc = make_doc("user-a", "Write report");
        DocumentRepository::create(&conn, &doc).await.unwrap();

        let mut changed = doc.clone();
        changed
            .fields
            .insert("completed".to_string(), FieldValue::Boolean(true));
        changed.updated_at = doc.updated_at + chrono::Duration::seconds(5);

        assert!(DocumentRepository::update(&conn, &changed, doc.updated_at)
            .await
            .unwrap());
        assert!(!DocumentRepository::update(&conn, &changed, doc.updated_at)
            .await
            .unwrap());

        let stored = DocumentRepository::get_by_id(&conn, "user-a", "c1", &doc.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.fields.get("completed"), Some(&FieldValue::Boolean(true)));
    }

    #[tokio::test]
    async fn test_delete_reports_whether_a_row_went_away() {
        let conn = setup_test_db().await;
        let doc = make_doc("user-a", "Write report");
        DocumentRepository::create(&conn, &doc).await.unwrap();

        assert!(DocumentRepository::delete(&conn, "user-a", "c1", &doc.id)
            .await
            .unwrap());
        assert!(!DocumentRepository::delete(&conn, "user-a", "c1", &doc.id)
            .await
            .unwrap());
    }
}
