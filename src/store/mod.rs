//! Durable state: the delivery watermark and the published-message log.
//!
//! Data model (Valkey):
//!   {prefix}:watermark   → integer string, seconds since epoch
//!   {prefix}:published   → LIST of message ids (newest first, capped by the tracker)
//!
//! `MemoryStore` implements the same ports without a server; tests and
//! throwaway paper runs use it.

pub mod memory;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("valkey error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Single-value cursor surviving restarts.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn get(&mut self) -> Result<Option<i64>, StoreError>;
    async fn set(&mut self, timestamp: i64) -> Result<(), StoreError>;
}

/// Ordered list of published message ids, index 0 is the newest.
#[async_trait]
pub trait MessageLog: Send + Sync {
    async fn push_front(&mut self, id: &str) -> Result<(), StoreError>;
    async fn len(&mut self) -> Result<usize, StoreError>;
    /// The last (oldest) entry.
    async fn oldest(&mut self) -> Result<Option<String>, StoreError>;
    /// Keep only `[start, stop]` inclusive, as Valkey's LTRIM does.
    async fn trim(&mut self, start: usize, stop: usize) -> Result<(), StoreError>;
}

/// Valkey-backed state store.
///
/// Keys are namespaced under a configurable prefix so several bots can share
/// one Valkey instance. Default prefix: "herald".
#[derive(Clone)]
pub struct StateStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl StateStore {
    /// Connect to Valkey/Redis.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        info!(url = url, prefix = prefix, "connected to Valkey");
        Ok(Self {
            conn,
            prefix: prefix.to_string(),
        })
    }

    /// Build a namespaced key: "{prefix}:{suffix}"
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    /// Test connectivity.
    pub async fn ping(&mut self) -> Result<(), StoreError> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        debug!(response = %pong, "Valkey ping");
        Ok(())
    }
}

#[async_trait]
impl WatermarkStore for StateStore {
    async fn get(&mut self) -> Result<Option<i64>, StoreError> {
        let key = self.key("watermark");
        let raw: Option<String> = self.conn.get(&key).await?;
        match raw {
            Some(s) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|_| StoreError::Corrupt(format!("{} = {:?}", key, s))),
            None => Ok(None),
        }
    }

    async fn set(&mut self, timestamp: i64) -> Result<(), StoreError> {
        if let Some(current) = self.get().await? {
            if timestamp < current {
                warn!(current = current, requested = timestamp, "refusing to move watermark backwards");
                return Ok(());
            }
        }
        let key = self.key("watermark");
        self.conn.set::<_, _, ()>(&key, timestamp).await?;
        debug!(watermark = timestamp, "watermark persisted");
        Ok(())
    }
}

#[async_trait]
impl MessageLog for StateStore {
    async fn push_front(&mut self, id: &str) -> Result<(), StoreError> {
        let key = self.key("published");
        self.conn.lpush::<_, _, ()>(&key, id).await?;
        Ok(())
    }

    async fn len(&mut self) -> Result<usize, StoreError> {
        let key = self.key("published");
        let len: usize = self.conn.llen(&key).await?;
        Ok(len)
    }

    async fn oldest(&mut self) -> Result<Option<String>, StoreError> {
        let key = self.key("published");
        let id: Option<String> = self.conn.lindex(&key, -1).await?;
        Ok(id)
    }

    async fn trim(&mut self, start: usize, stop: usize) -> Result<(), StoreError> {
        let key = self.key("published");
        self.conn
            .ltrim::<_, ()>(&key, start as isize, stop as isize)
            .await?;
        Ok(())
    }
}
