//! Quorum mutex over independent lock stores, serializing turns per conversation.
//!
//! A lock is held once a majority of nodes granted it and the remaining validity
//! (ttl minus elapsed time minus clock drift) is positive. Nodes never talk to
//! each other; an unreachable node simply counts as a refusal.
//!
//! A held lock must be kept alive with [`LockGuard::keep_alive`] for as long as the
//! work it protects runs. Redis deployments need at least three nodes; an odd count
//! tolerates the most failures for its size.

mod memory;
mod redis_node;

pub use memory::InMemoryLockNode;
pub use redis_node::RedisLockNode;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;

use crate::config::LockConfig;
use crate::error::{ParleyError, Result};

/// One lock store. Both operations must be atomic on the node.
#[async_trait]
pub trait LockNode: Send + Sync {
    fn name(&self) -> &str;

    /// Sets `resource` to `token` with an expiry, only if it is unset or expired.
    async fn set_if_absent(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;

    /// Deletes `resource` only if it still holds `token`.
    async fn delete_if_matches(&self, resource: &str, token: &str) -> Result<bool>;

    /// Resets the expiry of `resource` to `ttl` only if it still holds `token`.
    async fn extend_if_matches(&self, resource: &str, token: &str, ttl: Duration) -> Result<bool>;
}

/// Fewest Redis nodes that still make a quorum meaningful.
pub const MIN_REDIS_NODES: usize = 3;

/// The lock resource for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey {
    pub user_id: String,
    pub conversation_id: String,
}

impl LockKey {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parley:lock:{}:{}",
            escape_component(&self.user_id),
            escape_component(&self.conversation_id)
        )
    }
}

/// Keeps `a:b` + `c` distinct from `a` + `b:c`.
fn escape_component(component: &str) -> String {
    let mut escaped = String::with_capacity(component.len());
    for ch in component.chars() {
        match ch {
            '%' => escaped.push_str("%25"),
            ':' => escaped.push_str("%3A"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    pub ttl: Duration,
    pub acquire_timeout: Duration,
    pub retry_delay: Duration,
    pub retry_jitter: Duration,
    pub node_timeout: Duration,
}

impl From<&LockConfig> for LockSettings {
    fn from(config: &LockConfig) -> Self {
        Self {
            ttl: Duration::from_millis(config.ttl_ms.max(1)),
            acquire_timeout: Duration::from_millis(config.acquire_timeout_ms),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            retry_jitter: Duration::from_millis(config.retry_jitter_ms),
            node_timeout: Duration::from_millis(config.node_timeout_ms.max(1)),
        }
    }
}

#[derive(Clone)]
pub struct DistributedMutex {
    nodes: Arc<Vec<Arc<dyn LockNode>>>,
    settings: LockSettings,
}

impl DistributedMutex {
    pub fn new(nodes: Vec<Arc<dyn LockNode>>, settings: LockSettings) -> Result<Self> {
        if nodes.is_empty() {
            return Err(ParleyError::LockStore(
                "at least one lock node is required".to_string(),
            ));
        }
        Ok(Self {
            nodes: Arc::new(nodes),
            settings,
        })
    }

    /// Redis nodes for each configured URL, or a single in-process node when none are set.
    pub fn from_config(config: &LockConfig) -> Result<Self> {
        let nodes: Vec<Arc<dyn LockNode>> = if config.redis_urls.is_empty() {
            tracing::warn!(
                "No lock stores configured; turns are serialized within this process only"
            );
            vec![Arc::new(InMemoryLockNode::default())]
        } else {
            let count = config.redis_urls.len();
            if count < MIN_REDIS_NODES {
                return Err(ParleyError::LockStore(format!(
                    "{count} Redis lock node(s) configured, at least {MIN_REDIS_NODES} are required"
                )));
            }
            if count % 2 == 0 {
                tracing::warn!(
                    nodes = count,
                    "Even number of lock nodes; one fewer tolerates the same number of failures"
                );
            }
            config
                .redis_urls
                .iter()
                .map(|url| RedisLockNode::new(url).map(|node| Arc::new(node) as Arc<dyn LockNode>))
                .collect::<Result<_>>()?
        };
        tracing::info!(nodes = nodes.len(), quorum = nodes.len() / 2 + 1, "Lock configured");
        Self::new(nodes, LockSettings::from(config))
    }

    pub fn quorum(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    pub fn settings(&self) -> LockSettings {
        self.settings
    }

    pub async fn acquire(&self, key: &LockKey) -> Result<LockGuard> {
        self.acquire_with_ttl(key, self.settings.ttl).await
    }

    /// Retries until a quorum grants the lock or the acquire timeout passes.
    pub async fn acquire_with_ttl(&self, key: &LockKey, ttl: Duration) -> Result<LockGuard> {
        let resource = key.to_string();
        let deadline = Instant::now() + self.settings.acquire_timeout;
        let drift = ttl / 100 + Duration::from_millis(2);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let token = uuid::Uuid::new_v4().to_string();
            let started = Instant::now();

            let granted = self.try_all(&resource, &token, ttl).await;
            let elapsed = started.elapsed();
            let validity = ttl.checked_sub(elapsed + drift);

            match validity {
                Some(validity) if granted >= self.quorum() && !validity.is_zero() => {
                    tracing::debug!(resource = %resource, attempt, granted, "Lock acquired");
                    return Ok(LockGuard {
                        mutex: self.clone(),
                        resource,
                        token,
                        ttl,
                        validity,
                        released: false,
                    });
                }
                _ => {
                    if granted > 0 {
                        self.release(&resource, &token).await;
                    }
                }
            }

            let pause = self.settings.retry_delay + self.jitter();
            if Instant::now() + pause >= deadline {
                tracing::warn!(resource = %resource, attempt, "Lock acquire timed out");
                return Err(ParleyError::LockTimeout(resource));
            }
            tokio::time::sleep(pause).await;
        }
    }

    /// Pushes the expiry of a held lock out to `ttl` from now. True only when a
    /// majority confirmed within the remaining validity.
    pub async fn extend(&self, resource: &str, token: &str, ttl: Duration) -> bool {
        let started = Instant::now();
        let extensions = self.nodes.iter().map(|node| async move {
            match tokio::time::timeout(
                self.settings.node_timeout,
                node.extend_if_matches(resource, token, ttl),
            )
            .await
            {
                Ok(Ok(extended)) => extended,
                Ok(Err(error)) => {
                    tracing::warn!(node = node.name(), error = %error, "Lock extend failed");
                    false
                }
                Err(_) => {
                    tracing::warn!(node = node.name(), "Lock node timed out");
                    false
                }
            }
        });
        let extended = join_all(extensions)
            .await
            .into_iter()
            .filter(|extended| *extended)
            .count();
        let drift = ttl / 100 + Duration::from_millis(2);
        extended >= self.quorum() && started.elapsed() + drift < ttl
    }

    async fn try_all(&self, resource: &str, token: &str, ttl: Duration) -> usize {
        let attempts = self.nodes.iter().map(|node| async move {
            match tokio::time::timeout(
                self.settings.node_timeout,
                node.set_if_absent(resource, token, ttl),
            )
            .await
            {
                Ok(Ok(granted)) => granted,
                Ok(Err(error)) => {
                    tracing::warn!(node = node.name(), error = %error, "Lock node refused");
                    false
                }
                Err(_) => {
                    tracing::warn!(node = node.name(), "Lock node timed out");
                    false
                }
            }
        });
        join_all(attempts).await.into_iter().filter(|granted| *granted).count()
    }

    /// Best-effort release on every node. True when a majority confirmed it.
    pub async fn release(&self, resource: &str, token: &str) -> bool {
        let releases = self.nodes.iter().map(|node| async move {
            match tokio::time::timeout(
                self.settings.node_timeout,
                node.delete_if_matches(resource, token),
            )
            .await
            {
                Ok(Ok(released)) => released,
                Ok(Err(error)) => {
                    tracing::debug!(node = node.name(), error = %error, "Lock release failed");
                    false
                }
                Err(_) => false,
            }
        });
        let released = join_all(releases)
            .await
            .into_iter()
            .filter(|released| *released)
            .count();
        released >= self.quorum()
    }

    fn jitter(&self) -> Duration {
        let bound = self.settings.retry_jitter.as_millis();
        if bound == 0 {
            return Duration::ZERO;
        }
        let random = uuid::Uuid::new_v4().as_u128() % (bound + 1);
        Duration::from_millis(u64::try_from(random).unwrap_or(0))
    }
}

/// A held lock. Dropping it without [`LockGuard::release`] releases in the background.
pub struct LockGuard {
    mutex: DistributedMutex,
    resource: String,
    token: String,
    ttl: Duration,
    validity: Duration,
    released: bool,
}

impl LockGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// How long the lock was guaranteed for at the moment it was acquired.
    pub fn validity(&self) -> Duration {
        self.validity
    }

    /// Renews the lock every third of its ttl. Resolves only when a renewal fails to
    /// reach a quorum, at which point another holder may already have the lock.
    pub async fn keep_alive(&self) -> ParleyError {
        let period = (self.ttl / 3).max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            if !self.mutex.extend(&self.resource, &self.token, self.ttl).await {
                tracing::warn!(resource = %self.resource, "Lock could not be renewed");
                return ParleyError::LockLost(self.resource.clone());
            }
            tracing::trace!(resource = %self.resource, "Lock renewed");
        }
    }

    pub async fn release(mut self) -> bool {
        self.released = true;
        let released = self.mutex.release(&self.resource, &self.token).await;
        if !released {
            tracing::warn!(
                resource = %self.resource,
                "Lock had already expired on a majority of nodes"
            );
        }
        released
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let mutex = self.mutex.clone();
        let resource = std::mem::take(&mut self.resource);
        let token = std::mem::take(&mut self.token);
        handle.spawn(async move {
            mutex.release(&resource, &token).await;
        });
    }
}
