//! CSRF token storage.
//!
//! # Responsibilities
//! - Single-key `get` / `set_ex` against a shared store
//! - Bound every store call with its own timeout
//! - Verify connectivity at startup
//!
//! # Design Decisions
//! - Keys are per session identity; no multi-key operations, no locking
//! - The TTL bounds staleness, rotation simply overwrites
//! - A timed-out call is reported like any other store failure

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

/// Errors raised by a token store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token store connection failed: {0}")]
    Connection(String),

    #[error("token store read of `{key}` failed: {reason}")]
    Read { key: String, reason: String },

    #[error("token store write of `{key}` failed: {reason}")]
    Write { key: String, reason: String },

    #[error("token store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Key-value capability used by the CSRF guard.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch the value at `key`; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` at `key`, overwriting, expiring after `ttl`.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
}

/// Redis-backed store with automatic reconnection.
#[derive(Clone)]
pub struct RedisTokenStore {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisTokenStore {
    /// Connect and PING. Accepts `host:port` as well as full redis URLs.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(normalize_redis_url(url))
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| StoreError::Timeout(timeout))?
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { conn, timeout };
        store.ping().await?;
        Ok(store)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let reply: redis::RedisResult<String> =
            tokio::time::timeout(self.timeout, redis::cmd("PING").query_async(&mut conn))
                .await
                .map_err(|_| StoreError::Timeout(self.timeout))?;
        let pong = reply.map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::debug!(reply = %pong, "Token store reachable");
        Ok(())
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let reply: redis::RedisResult<Option<String>> =
            tokio::time::timeout(self.timeout, conn.get(key))
                .await
                .map_err(|_| StoreError::Timeout(self.timeout))?;
        reply.map_err(|e| StoreError::Read {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let seconds = ttl.as_secs().max(1);
        let reply: redis::RedisResult<()> =
            tokio::time::timeout(self.timeout, conn.set_ex(key, value, seconds))
                .await
                .map_err(|_| StoreError::Timeout(self.timeout))?;
        reply.map_err(|e| StoreError::Write {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }
}

/// `localhost:6379` → `redis://localhost:6379`.
pub fn normalize_redis_url(url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!("redis://{}", url)
    }
}

/// Process-local store for single-instance deployments and tests.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone());

        if value.is_none() {
            self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        }
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}
