//! Publish sink port.
//!
//! `BroadcastClient` posts to the social broadcast API; `PaperSink` only logs,
//! for dry runs against a live feed.

pub mod broadcast;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::info;

pub use broadcast::BroadcastClient;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("broadcast API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("malformed broadcast response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Publish a message, returning the id the API assigned it.
    async fn publish(&self, text: &str) -> Result<String, PublishError>;
    /// Remove a previously published message.
    async fn retract(&self, message_id: &str) -> Result<(), PublishError>;
}

/// Logs messages instead of posting them.
#[derive(Debug, Default)]
pub struct PaperSink {
    counter: AtomicU64,
}

impl PaperSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PublishSink for PaperSink {
    async fn publish(&self, text: &str) -> Result<String, PublishError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("paper-{}", n);
        info!(id = %id, text = %text, "[PAPER] would publish");
        Ok(id)
    }

    async fn retract(&self, message_id: &str) -> Result<(), PublishError> {
        info!(id = %message_id, "[PAPER] would retract");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_paper_sink_assigns_sequential_ids() {
        let sink = PaperSink::new();
        assert_eq!(sink.publish("one").await.unwrap(), "paper-1");
        assert_eq!(sink.publish("two").await.unwrap(), "paper-2");
        assert!(sink.retract("paper-1").await.is_ok());
    }
}
