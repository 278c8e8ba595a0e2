use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::Result;

use super::LockNode;

/// Process-local lock node for single-instance deployments and tests.
pub struct InMemoryLockNode {
    name: String,
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryLockNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryLockNode {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl LockNode for InMemoryLockNode {
    fn name(&self) -> &str {
        &self.name
    }

    async fn set_if_absent(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(resource) {
            Some((_, expires_at)) if *expires_at > now => Ok(false),
            _ => {
                entries.insert(resource.to_string(), (token.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn delete_if_matches(&self, resource: &str, token: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(resource) {
            Some((held, expires_at)) if held == token && *expires_at > now => {
                entries.remove(resource);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend_if_matches(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(resource) {
            Some((held, expires_at)) if held == token && *expires_at > now => {
                *expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_set_fails_until_released() {
        let node = InMemoryLockNode::default();
        let ttl = Duration::from_secs(5);
        assert!(node.set_if_absent("r", "t1", ttl).await.unwrap());
        assert!(!node.set_if_absent("r", "t2", ttl).await.unwrap());

        assert!(!node.delete_if_matches("r", "t2").await.unwrap());
        assert!(node.delete_if_matches("r", "t1").await.unwrap());
        assert!(node.set_if_absent("r", "t2", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entries_can_be_taken() {
        let node = InMemoryLockNode::default();
        assert!(node
            .set_if_absent("r", "t1", Duration::from_millis(10))
            .await
            .unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(node.set_if_absent("r", "t2", Duration::from_secs(5)).await.unwrap());
        assert!(!node.delete_if_matches("r", "t1").await.unwrap());
    }

    #[tokio::test]
    async fn test_extend_needs_the_live_token() {
        let node = InMemoryLockNode::default();
        let short = Duration::from_millis(40);
        assert!(node.set_if_absent("r", "t1", short).await.unwrap());
        assert!(!node.extend_if_matches("r", "t2", Duration::from_secs(5)).await.unwrap());
        assert!(node.extend_if_matches("r", "t1", Duration::from_secs(5)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!node.set_if_absent("r", "t2", short).await.unwrap());
    }
}
