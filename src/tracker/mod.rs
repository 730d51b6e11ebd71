//! Bounded record of published message ids.
//!
//! Every successful delivery is pushed to the front of a persisted list. Once
//! the list holds more than `retention_max` ids the oldest is evicted and
//! handed back so the caller can retract the post it belongs to.

use tracing::debug;

use crate::store::{MessageLog, StoreError};

pub struct DeliveryTracker<L> {
    log: L,
    retention_max: usize,
}

impl<L: MessageLog> DeliveryTracker<L> {
    /// `retention_max` is clamped to at least 1.
    pub fn new(log: L, retention_max: usize) -> Self {
        Self {
            log,
            retention_max: retention_max.max(1),
        }
    }

    pub fn retention_max(&self) -> usize {
        self.retention_max
    }

    /// Record a delivered message. Returns the evicted id, if any.
    pub async fn record(&mut self, message_id: &str) -> Result<Option<String>, StoreError> {
        self.log.push_front(message_id).await?;
        let len = self.log.len().await?;
        if len <= self.retention_max {
            return Ok(None);
        }

        let evicted = self.log.oldest().await?;
        self.log.trim(0, self.retention_max - 1).await?;
        debug!(
            evicted = ?evicted,
            retained = self.retention_max,
            "delivery log trimmed"
        );
        Ok(evicted)
    }

    /// The id that the next overflow would evict.
    pub async fn peek_oldest(&mut self) -> Result<Option<String>, StoreError> {
        self.log.oldest().await
    }

    pub async fn len(&mut self) -> Result<usize, StoreError> {
        self.log.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_no_eviction_until_over_max() {
        let store = MemoryStore::new();
        let mut tracker = DeliveryTracker::new(store.clone(), 3);
        for id in ["m1", "m2", "m3"] {
            assert_eq!(tracker.record(id).await.unwrap(), None);
        }
        assert_eq!(tracker.len().await.unwrap(), 3);
        assert_eq!(tracker.peek_oldest().await.unwrap().as_deref(), Some("m1"));
    }

    #[tokio::test]
    async fn test_overflow_evicts_exactly_the_oldest() {
        let store = MemoryStore::new();
        let mut tracker = DeliveryTracker::new(store.clone(), 3);
        let mut evicted = Vec::new();
        for i in 1..=4 {
            if let Some(id) = tracker.record(&format!("m{}", i)).await.unwrap() {
                evicted.push(id);
            }
            assert!(tracker.len().await.unwrap() <= 3);
        }
        assert_eq!(evicted, vec!["m1".to_string()]);
        assert_eq!(store.published(), vec!["m4", "m3", "m2"]);
    }

    #[tokio::test]
    async fn test_peek_does_not_mutate() {
        let store = MemoryStore::new();
        let mut tracker = DeliveryTracker::new(store.clone(), 2);
        tracker.record("a").await.unwrap();
        tracker.record("b").await.unwrap();
        assert_eq!(tracker.peek_oldest().await.unwrap().as_deref(), Some("a"));
        assert_eq!(tracker.peek_oldest().await.unwrap().as_deref(), Some("a"));
        assert_eq!(tracker.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_zero_retention_is_clamped() {
        let mut tracker = DeliveryTracker::new(MemoryStore::new(), 0);
        assert_eq!(tracker.retention_max(), 1);
        assert_eq!(tracker.record("a").await.unwrap(), None);
        assert_eq!(tracker.record("b").await.unwrap().as_deref(), Some("a"));
    }
}
