use libsql::Connection;

use crate::error::Result;

pub async fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Collection schemas, one row per user collection
        CREATE TABLE IF NOT EXISTS collections (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            description TEXT,
            fields TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, name_key)
        );

        CREATE INDEX IF NOT EXISTS idx_collections_user_id ON collections(user_id);

        -- Documents, field values stored as tagged JSON
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            collection_id TEXT NOT NULL,
            data TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_user_collection
            ON documents(user_id, collection_id);
        CREATE INDEX IF NOT EXISTS idx_documents_user_collection_id
            ON documents(user_id, collection_id, id);
        CREATE INDEX IF NOT EXISTS idx_documents_created_at
            ON documents(user_id, collection_id, created_at);

        -- Conversations and their ordered turns
        CREATE TABLE IF NOT EXISTS conversations (
            id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            title TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, id)
        );

        CREATE INDEX IF NOT EXISTS idx_conversations_updated_at
            ON conversations(user_id, updated_at);

        CREATE TABLE IF NOT EXISTS conversation_turns (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            conversation_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at TEXT NOT NULL,
            UNIQUE (user_id, conversation_id, seq)
        );
        "#,
    )
    .await?;

    Ok(())
}
