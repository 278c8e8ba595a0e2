use chrono::Utc;
use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{Conversation, ConversationTurn, Role};

use super::parse_timestamp;

pub struct ConversationRepository;

const TURN_COLUMNS: &str = "id, user_id, conversation_id, seq, role, content, created_at";

impl ConversationRepository {
    /// Inserts the conversation unless it already exists. Returns true when a row was created.
    pub async fn create_if_absent(conn: &Connection, conversation: &Conversation) -> Result<bool> {
        let rows_affected = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO conversations (id, user_id, title, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    conversation.id.clone(),
                    conversation.user_id.clone(),
                    conversation.title.clone(),
                    conversation.created_at.to_rfc3339(),
                    conversation.updated_at.to_rfc3339(),
                ],
            )
            .await?;

        Ok(rows_affected > 0)
    }

    pub async fn get(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Conversation>> {
        let mut rows = conn
            .query(
                "SELECT id, user_id, title, created_at, updated_at FROM conversations WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::row_to_conversation(&row)?))
        } else {
            Ok(None)
        }
    }

    /// Most recently active first, with the total count for paging.
    pub async fn list(
        conn: &Connection,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Conversation>, u64)> {
        let mut count_rows = conn
            .query(
                "SELECT COUNT(*) FROM conversations WHERE user_id = ?1",
                params![user_id],
            )
            .await?;
        let total: i64 = if let Some(row) = count_rows.next().await? {
            row.get(0)?
        } else {
            0
        };

        let mut rows = conn
            .query(
                r#"
                SELECT id, user_id, title, created_at, updated_at FROM conversations
                WHERE user_id = ?1
                ORDER BY updated_at DESC, id ASC
                LIMIT ?2 OFFSET ?3
                "#,
                params![user_id, limit as i64, offset as i64],
            )
            .await?;

        let mut conversations = Vec::new();
        while let Some(row) = rows.next().await? {
            conversations.push(Self::row_to_conversation(&row)?);
        }
        Ok((conversations, total.max(0) as u64))
    }

    pub async fn delete(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
        let tx = conn.transaction().await?;
        tx.execute(
            "DELETE FROM conversation_turns WHERE user_id = ?1 AND conversation_id = ?2",
            params![user_id, id],
        )
        .await?;
        let rows_affected = tx
            .execute(
                "DELETE FROM conversations WHERE user_id = ?1 AND id = ?2",
                params![user_id, id],
            )
            .await?;
        tx.commit().await?;

        Ok(rows_affected > 0)
    }

    /// Appends turns in order with consecutive sequence numbers, all in one transaction.
    pub async fn append_turns(
        conn: &Connection,
        user_id: &str,
        conversation_id: &str,
        turns: &[(Role, String)],
    ) -> Result<Vec<ConversationTurn>> {
        if turns.is_empty() {
            return Ok(Vec::new());
        }

        let tx = conn.transaction().await?;
        let mut rows = tx
            .query(
                "SELECT COALESCE(MAX(seq), 0) FROM conversation_turns WHERE user_id = ?1 AND conversation_id = ?2",
                params![user_id, conversation_id],
            )
            .await?;
        let mut seq: i64 = if let Some(row) = rows.next().await? {
            row.get(0)?
        } else {
            0
        };
        drop(rows);

        let now = Utc::now();
        let mut appended = Vec::with_capacity(turns.len());
        for (role, content) in turns {
            seq += 1;
            let turn = ConversationTurn {
                id: nanoid::nanoid!(),
                user_id: user_id.to_string(),
                conversation_id: conversation_id.to_string(),
                seq,
                role: *role,
                content: content.clone(),
                created_at: now,
            };
            tx.execute(
                r#"
                INSERT INTO conversation_turns (id, user_id, conversation_id, seq, role, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    turn.id.clone(),
                    turn.user_id.clone(),
                    turn.conversation_id.clone(),
                    turn.seq,
                    turn.role.to_string(),
                    turn.content.clone(),
                    turn.created_at.to_rfc3339(),
                ],
            )
            .await?;
            appended.push(turn);
        }

        tx.execute(
            "UPDATE conversations SET updated_at = ?3 WHERE user_id = ?1 AND id = ?2",
            params![user_id, conversation_id, now.to_rfc3339()],
        )
        .await?;
        tx.commit().await?;

        Ok(appended)
    }

    pub async fn last_seq(conn: &Connection, user_id: &str, conversation_id: &str) -> Result<i64> {
        let mut rows = conn
            .query(
                "SELECT COALESCE(MAX(seq), 0) FROM conversation_turns \
                 WHERE user_id = ?1 AND conversation_id = ?2",
                params![user_id, conversation_id],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(row.get(0)?),
            None => Ok(0),
        }
    }

    /// The last `limit` turns, oldest first.
    pub async fn recent_turns(
        conn: &Connection,
        user_id: &str,
        conversation_id: &str,
        limit: u64,
    ) -> Result<Vec<ConversationTurn>> {
        let sql = format!(
            "SELECT {TURN_COLUMNS} FROM conversation_turns WHERE user_id = ?1 AND conversation_id = ?2 ORDER BY seq DESC LIMIT ?3"
        );
        let mut rows = conn
            .query(&sql, params![user_id, conversation_id, limit as i64])
            .await?;

        let mut turns = Vec::new();
        while let Some(row) = rows.next().await? {
            turns.push(Self::row_to_turn(&row)?);
        }
        turns.reverse();
        Ok(turns)
    }

    pub async fn list_turns(
        conn: &Connection,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ConversationTurn>> {
        let sql = format!(
            "SELECT {TURN_COLUMNS} FROM conversation_turns WHERE user_id = ?1 AND conversation_id = ?2 ORDER BY seq ASC"
        );
        let mut rows = conn.query(&sql, params![user_id, conversation_id]).await?;

        let mut turns = Vec::new();
        while let Some(row) = rows.next().await? {
            turns.push(Self::row_to_turn(&row)?);
        }
        Ok(turns)
    }

    fn row_to_conversation(row: &libsql::Row) -> Result<Conversation> {
        Ok(Conversation {
            id: row.get(0)?,
            user_id: row.get(1)?,
            title: row.get(2)?,
            created_at: parse_timestamp(&row.get::<String>(3)?),
            updated_at: parse_timestamp(&row.get::<String>(4)?),
        })
    }

    fn row_to_turn(row: &libsql::Row) -> Result<ConversationTurn> {
        Ok(ConversationTurn {
            id: row.get(0)?,
            user_id: row.get(1)?,
            conversation_id: row.get(2)?,
            seq: row.get(3)?,
            role: row.get::<String>(4)?.parse().unwrap_or(Role::User),
            content: row.get(5)?,
            created_at: parse_timestamp(&row.get::<String>(6)?),
        })
    }
}
