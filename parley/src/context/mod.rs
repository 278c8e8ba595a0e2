//! Conversation history and the per-conversation cache of resolved references.

mod cache;

pub use cache::{CachedResolution, ResolutionCache, ResolvedValue};

use std::sync::Arc;

use crate::db::DatabaseBackend;
use crate::error::{ParleyError, Result};
use crate::models::{collection_name_key, Conversation, ConversationTurn, Role};

/// Cache key for the most recently touched document in a conversation.
pub const LAST_KEY: &str = "@last";

/// Cache key for the most recently touched document of one collection.
pub fn last_in(collection: &str) -> String {
    format!("{LAST_KEY}:{}", collection_name_key(collection))
}

/// Lowercases, trims and collapses whitespace so "That  Task" and "that task" share a key.
pub fn normalize_expression(expression: &str) -> String {
    expression
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[derive(Clone)]
pub struct ContextManager {
    db: Arc<dyn DatabaseBackend>,
    cache: ResolutionCache,
    ttl_turns: i64,
}

impl ContextManager {
    pub fn new(db: Arc<dyn DatabaseBackend>, cache: ResolutionCache, ttl_turns: i64) -> Self {
        Self {
            db,
            cache,
            ttl_turns: ttl_turns.max(0),
        }
    }

    pub async fn append(
        &self,
        user_id: &str,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<ConversationTurn> {
        self.db
            .append_turns(user_id, conversation_id, &[(role, content.to_string())])
            .await?
            .pop()
            .ok_or_else(|| ParleyError::Internal("turn was not appended".to_string()))
    }

    /// Appends a user message and its reply with consecutive sequence numbers.
    pub async fn append_exchange(
        &self,
        user_id: &str,
        conversation_id: &str,
        message: &str,
        reply: &str,
    ) -> Result<Vec<ConversationTurn>> {
        self.db
            .append_turns(
                user_id,
                conversation_id,
                &[
                    (Role::User, message.to_string()),
                    (Role::Assistant, reply.to_string()),
                ],
            )
            .await
    }

    /// The last `n` turns, oldest first.
    pub async fn recent_window(
        &self,
        user_id: &str,
        conversation_id: &str,
        n: u64,
    ) -> Result<Vec<ConversationTurn>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        self.db.recent_turns(user_id, conversation_id, n).await
    }

    /// Sequence number the next stored turn will get.
    pub async fn next_seq(&self, user_id: &str, conversation_id: &str) -> Result<i64> {
        Ok(self.db.last_seq(user_id, conversation_id).await? + 1)
    }

    pub async fn turns(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Vec<ConversationTurn>> {
        self.db.list_turns(user_id, conversation_id).await
    }

    pub fn cache_resolution(
        &self,
        user_id: &str,
        conversation_id: &str,
        expression: &str,
        value: ResolvedValue,
        seq: i64,
    ) {
        self.cache.put(
            user_id,
            conversation_id,
            &normalize_expression(expression),
            CachedResolution { value, seq },
        );
    }

    /// Returns the cached value unless it was recorded more than `ttl_turns` turns
    /// before `current_seq`. Stale entries are dropped.
    pub fn lookup_resolution(
        &self,
        user_id: &str,
        conversation_id: &str,
        expression: &str,
        current_seq: i64,
    ) -> Option<ResolvedValue> {
        let expression = normalize_expression(expression);
        let cached = self.cache.get(user_id, conversation_id, &expression)?;
        if current_seq - cached.seq > self.ttl_turns {
            tracing::debug!(
                user_id,
                conversation_id,
                expression = %expression,
                cached_at = cached.seq,
                current_seq,
                "Cached resolution is stale"
            );
            self.cache.remove(user_id, conversation_id, &expression);
            return None;
        }
        Some(cached.value)
    }

    /// Anaphora lookup: the exact surface, then the last document of the hinted
    /// collection, then the last document overall.
    pub fn lookup_reference(
        &self,
        user_id: &str,
        conversation_id: &str,
        surface: &str,
        collection_hint: Option<&str>,
        current_seq: i64,
    ) -> Option<ResolvedValue> {
        let mut keys = vec![surface.to_string()];
        if let Some(hint) = collection_hint {
            keys.push(last_in(hint));
        }
        keys.push(LAST_KEY.to_string());

        keys.iter()
            .find_map(|key| self.lookup_resolution(user_id, conversation_id, key, current_seq))
    }

    /// Records the document a turn touched last as `@last` and `@last:<collection>`.
    pub fn record_touched(
        &self,
        user_id: &str,
        conversation_id: &str,
        collection: &str,
        document_id: &str,
        seq: i64,
    ) {
        let value = ResolvedValue::Document {
            collection: collection.to_string(),
            id: document_id.to_string(),
        };
        self.cache_resolution(user_id, conversation_id, &last_in(collection), value.clone(), seq);
        self.cache_resolution(user_id, conversation_id, LAST_KEY, value, seq);
    }

    /// Creates the conversation on its first message, titled after that message.
    pub async fn ensure_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
        first_message: &str,
    ) -> Result<Conversation> {
        let fresh = Conversation::new(user_id, conversation_id, first_message);
        if self.db.create_conversation_if_absent(&fresh).await? {
            tracing::info!(user_id, conversation_id, "Conversation started");
            return Ok(fresh);
        }
        self.get_conversation(user_id, conversation_id).await
    }

    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Conversation> {
        self.db
            .get_conversation(user_id, conversation_id)
            .await?
            .ok_or_else(|| ParleyError::NotFound(format!("conversation {conversation_id}")))
    }

    pub async fn list_conversations(
        &self,
        user_id: &str,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<Conversation>, u64)> {
        self.db.list_conversations(user_id, limit, offset).await
    }

    /// Deletes the conversation with its turns and forgets its cached references.
    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> Result<()> {
        if !self.db.delete_conversation(user_id, conversation_id).await? {
            return Err(ParleyError::NotFound(format!("conversation {conversation_id}")));
        }
        let evicted = self.cache.evict_conversation(user_id, conversation_id);
        tracing::info!(user_id, conversation_id, evicted, "Conversation deleted");
        Ok(())
    }
}
