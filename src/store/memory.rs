//! In-process store implementing both persistence ports.
//!
//! Clones share state, so a test can hand one clone to the poller and keep
//! another to inspect what was written.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

use super::{MessageLog, StoreError, WatermarkStore};

#[derive(Debug, Default)]
struct Inner {
    watermark: Option<i64>,
    published: VecDeque<String>,
    unavailable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_watermark(timestamp: i64) -> Self {
        let store = Self::new();
        store.lock().watermark = Some(timestamp);
        store
    }

    /// Make every subsequent operation fail, as a dropped connection would.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn watermark(&self) -> Option<i64> {
        self.lock().watermark
    }

    /// Published ids, newest first.
    pub fn published(&self) -> Vec<String> {
        self.lock().published.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-write; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn guard(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        let inner = self.lock();
        if inner.unavailable {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(inner)
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn get(&mut self) -> Result<Option<i64>, StoreError> {
        Ok(self.guard()?.watermark)
    }

    async fn set(&mut self, timestamp: i64) -> Result<(), StoreError> {
        let mut inner = self.guard()?;
        match inner.watermark {
            Some(current) if timestamp < current => {
                warn!(current = current, requested = timestamp, "refusing to move watermark backwards");
            }
            _ => inner.watermark = Some(timestamp),
        }
        Ok(())
    }
}

#[async_trait]
impl MessageLog for MemoryStore {
    async fn push_front(&mut self, id: &str) -> Result<(), StoreError> {
        self.guard()?.published.push_front(id.to_string());
        Ok(())
    }

    async fn len(&mut self) -> Result<usize, StoreError> {
        Ok(self.guard()?.published.len())
    }

    async fn oldest(&mut self) -> Result<Option<String>, StoreError> {
        Ok(self.guard()?.published.back().cloned())
    }

    async fn trim(&mut self, start: usize, stop: usize) -> Result<(), StoreError> {
        let mut inner = self.guard()?;
        let kept: VecDeque<String> = inner
            .published
            .iter()
            .skip(start)
            .take(stop.saturating_sub(start) + 1)
            .cloned()
            .collect();
        inner.published = kept;
        Ok(())
    }
}
