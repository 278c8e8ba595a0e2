use libsql::{Builder, Connection};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::Result;

use super::schema;

/// Handle to the libsql database. Cheap to clone; every clone shares the same pool.
#[derive(Clone)]
pub struct Database {
    pub(crate) db: Arc<libsql::Database>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let db = if config.url.starts_with("libsql://") || config.url.starts_with("https://") {
            let token = config.auth_token.clone().unwrap_or_default();
            match config.local_path {
                Some(ref local_path) => {
                    Builder::new_remote_replica(local_path, config.url.clone(), token)
                        .build()
                        .await?
                }
                None => Builder::new_remote(config.url.clone(), token).build().await?,
            }
        } else if config.url == ":memory:" {
            Builder::new_local(":memory:").build().await?
        } else {
            let path = config.url.strip_prefix("file:").unwrap_or(&config.url);
            Builder::new_local(path).build().await?
        };

        let pragmas = vec![
            ("busy_timeout", config.busy_timeout_ms.to_string()),
            (
                "journal_mode",
                normalize_journal_mode(&config.journal_mode).to_string(),
            ),
            (
                "synchronous",
                normalize_synchronous(&config.synchronous).to_string(),
            ),
        ];

        let database = Self { db: Arc::new(db) };

        let conn = database.connect()?;
        apply_pragmas(&conn, &pragmas).await;
        schema::init_schema(&conn).await?;
        tracing::debug!(url = %config.url, "Database schema ready");

        Ok(database)
    }

    pub fn connect(&self) -> Result<Connection> {
        Ok(self.db.connect()?)
    }

    pub async fn sync(&self) -> Result<()> {
        if let Ok(sync) = self.db.sync().await {
            tracing::info!("Database synced: {:?}", sync);
        }
        Ok(())
    }
}

/// A pragma the backend refuses (remote databases reject most of them) is logged and
/// skipped.
async fn apply_pragmas(conn: &Connection, pragmas: &[(&str, String)]) {
    for (name, value) in pragmas {
        if let Err(error) = conn.execute_batch(&format!("PRAGMA {name} = {value}")).await {
            tracing::warn!(
                pragma = %name,
                value = %value,
                error = %error,
                "Failed to set SQLite pragma"
            );
        }
    }
}

fn normalize_journal_mode(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "DELETE" => "DELETE",
        "TRUNCATE" => "TRUNCATE",
        "PERSIST" => "PERSIST",
        "MEMORY" => "MEMORY",
        "OFF" => "OFF",
        _ => "WAL",
    }
}

fn normalize_synchronous(value: &str) -> &'static str {
    match value.trim().to_uppercase().as_str() {
        "OFF" => "OFF",
        "FULL" => "FULL",
        "EXTRA" => "EXTRA",
        _ => "NORMAL",
    }
}
