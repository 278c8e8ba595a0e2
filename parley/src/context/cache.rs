use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

/// What a cached expression stands for.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Document { collection: String, id: String },
    Instant(DateTime<Utc>),
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// A resolution stamped with the turn it was recorded in.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResolution {
    pub value: ResolvedValue,
    pub seq: i64,
}

type CacheKey = (String, String, String);

/// Thread-safe LRU of resolved references, keyed by (user, conversation, expression).
///
/// Created once per deployment and shared by every turn. The lock is only held for
/// the duration of a single map operation.
#[derive(Clone)]
pub struct ResolutionCache {
    cache: Arc<Mutex<LruCache<CacheKey, CachedResolution>>>,
}

impl ResolutionCache {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, CachedResolution>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(
        &self,
        user_id: &str,
        conversation_id: &str,
        expression: &str,
    ) -> Option<CachedResolution> {
        self.lock()
            .get(&key(user_id, conversation_id, expression))
            .cloned()
    }

    /// The most recent write for a key wins.
    pub fn put(
        &self,
        user_id: &str,
        conversation_id: &str,
        expression: &str,
        resolution: CachedResolution,
    ) {
        self.lock()
            .put(key(user_id, conversation_id, expression), resolution);
    }

    pub fn remove(&self, user_id: &str, conversation_id: &str, expression: &str) {
        self.lock().pop(&key(user_id, conversation_id, expression));
    }

    /// Drops every entry of one conversation.
    pub fn evict_conversation(&self, user_id: &str, conversation_id: &str) -> usize {
        let mut cache = self.lock();
        let doomed: Vec<CacheKey> = cache
            .iter()
            .filter(|((user, conversation, _), _)| {
                user == user_id && conversation == conversation_id
            })
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            cache.pop(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn key(user_id: &str, conversation_id: &str, expression: &str) -> CacheKey {
    (
        user_id.to_string(),
        conversation_id.to_string(),
        expression.to_string(),
    )
}
