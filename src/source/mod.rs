//! Event source port.
//!
//! The poller only needs "give me raw records newer than T"; how the query is
//! transported lives behind `EventSource`. `graphql` is the production
//! implementation.

pub mod graphql;

use async_trait::async_trait;
use thiserror::Error;

pub use graphql::GraphQlSource;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("feed returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("feed reported errors: {0}")]
    GraphQl(String),
    #[error("malformed feed response: {0}")]
    Decode(String),
}

/// Raw records as fetched, before normalization.
///
/// `kind_hint` is set when the batch came from a kind-specific slice, so
/// records that carry no discriminator of their own can still be classified.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    pub kind_hint: Option<String>,
    pub records: Vec<serde_json::Value>,
    /// The slice was cut off at the page limit; newer records of this kind
    /// exist past the last one returned.
    pub truncated: bool,
}

impl RawBatch {
    pub fn new(kind_hint: Option<&str>, records: Vec<serde_json::Value>) -> Self {
        Self {
            kind_hint: kind_hint.map(str::to_string),
            records,
            truncated: false,
        }
    }

    pub fn truncated(mut self, truncated: bool) -> Self {
        self.truncated = truncated;
        self
    }
}

/// One page of results. Record order within batches is unspecified.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub batches: Vec<RawBatch>,
}

impl FetchPage {
    /// At least one slice was cut off at the page limit.
    pub fn has_more(&self) -> bool {
        self.batches.iter().any(|b| b.truncated)
    }

    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }
}

#[async_trait]
pub trait EventSource: Send + Sync {
    /// Records with a timestamp strictly greater than `since`, at most
    /// `limit` per slice.
    async fn fetch_events_since(&self, since: i64, limit: usize) -> Result<FetchPage, FetchError>;
}
