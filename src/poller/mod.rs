//! Poll-process loop.
//!
//! One cycle: read the watermark, fetch records newer than it, normalize,
//! then deliver events strictly one at a time. The watermark is persisted
//! after every successful publish, so a failure mid-batch leaves it at the
//! last delivered event and the next cycle resumes from there.
//!
//! `run_cycle` is the single step; `run` repeats it with a fixed delay
//! measured from the end of the previous cycle until cancelled. Cycles never
//! overlap.

pub mod clock;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::PollerConfig;
use crate::events::CanonicalEvent;
use crate::format::format_message;
use crate::normalizer::normalize;
use crate::publish::{PublishError, PublishSink};
use crate::source::{EventSource, FetchError};
use crate::store::{MessageLog, StoreError, WatermarkStore};
use crate::tracker::DeliveryTracker;

pub use clock::{Clock, FixedClock, SystemClock};

#[derive(Error, Debug)]
pub enum CycleError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("delivery of event {event_id} failed: {source}")]
    Delivery {
        event_id: String,
        source: PublishError,
    },
    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Fetching,
    Normalizing,
    Delivering,
    ShuttingDown,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Idle => write!(f, "idle"),
            LoopState::Fetching => write!(f, "fetching"),
            LoopState::Normalizing => write!(f, "normalizing"),
            LoopState::Delivering => write!(f, "delivering"),
            LoopState::ShuttingDown => write!(f, "shutting_down"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Records requested per slice per fetch.
    pub page_size: usize,
    /// Pages fetched back-to-back within one cycle while the feed reports more.
    pub max_pages_per_cycle: usize,
    pub poll_interval: Duration,
    /// How far behind "now" the first-ever watermark starts, in seconds.
    pub grace_secs: i64,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&PollerConfig::default())
    }
}

impl From<&PollerConfig> for PollerSettings {
    fn from(config: &PollerConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            max_pages_per_cycle: config.max_pages_per_cycle.max(1),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            grace_secs: config.grace_secs,
        }
    }
}

/// What a cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub pages: usize,
    pub fetched: usize,
    pub delivered: usize,
    pub retracted: usize,
    pub retract_failures: usize,
    /// Watermark when the cycle ended.
    pub watermark: i64,
    /// Stopped early because of cancellation.
    pub interrupted: bool,
}

pub struct Poller<W, L> {
    source: Arc<dyn EventSource>,
    sink: Arc<dyn PublishSink>,
    watermark: W,
    tracker: DeliveryTracker<L>,
    clock: Arc<dyn Clock>,
    settings: PollerSettings,
    state: LoopState,
}

impl<W: WatermarkStore, L: MessageLog> Poller<W, L> {
    pub fn new(
        source: Arc<dyn EventSource>,
        sink: Arc<dyn PublishSink>,
        watermark: W,
        tracker: DeliveryTracker<L>,
        clock: Arc<dyn Clock>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            source,
            sink,
            watermark,
            tracker,
            clock,
            settings,
            state: LoopState::Idle,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    fn transition(&mut self, next: LoopState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "poller state");
            self.state = next;
        }
    }

    /// Repeat cycles until `cancel` fires. Cycle errors are logged, never fatal.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            page_size = self.settings.page_size,
            retention = self.tracker.retention_max(),
            "poller started"
        );

        while !cancel.is_cancelled() {
            match self.run_cycle(&cancel).await {
                Ok(report) if report.delivered > 0 || report.interrupted => {
                    info!(
                        delivered = report.delivered,
                        fetched = report.fetched,
                        pages = report.pages,
                        retracted = report.retracted,
                        watermark = report.watermark,
                        interrupted = report.interrupted,
                        "cycle complete"
                    );
                }
                Ok(report) => {
                    debug!(fetched = report.fetched, watermark = report.watermark, "cycle idle");
                }
                Err(e) => {
                    error!(error = %e, "cycle failed, retrying next tick");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }
        }

        self.transition(LoopState::ShuttingDown);
        info!("poller stopped");
    }

    /// Run one fetch-normalize-deliver cycle.
    pub async fn run_cycle(&mut self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        let result = self.cycle(cancel).await;
        self.transition(LoopState::Idle);
        result
    }

    async fn cycle(&mut self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
        let mut watermark = self.load_watermark().await?;
        let mut report = CycleReport {
            watermark,
            ..CycleReport::default()
        };

        'pages: while report.pages < self.settings.max_pages_per_cycle {
            self.transition(LoopState::Fetching);
            let fetch = self
                .source
                .fetch_events_since(watermark, self.settings.page_size);
            let page = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.interrupted = true;
                    break 'pages;
                }
                page = fetch => page?,
            };
            report.pages += 1;
            report.fetched += page.record_count();

            self.transition(LoopState::Normalizing);
            let normalized = normalize(&page.batches);
            if normalized.skipped > 0 || normalized.duplicates > 0 {
                debug!(
                    skipped = normalized.skipped,
                    duplicates = normalized.duplicates,
                    "records dropped during normalization"
                );
            }
            // Past the horizon a truncated slice may still hold older events,
            // so delivery stops there and the next page resumes from it.
            let horizon = normalized.horizon.unwrap_or(i64::MAX);
            let pending: Vec<CanonicalEvent> = normalized
                .events
                .into_iter()
                .filter(|e| e.occurred_at > watermark && e.occurred_at <= horizon)
                .collect();
            if pending.is_empty() {
                break;
            }

            self.transition(LoopState::Delivering);
            let page_start = watermark;
            for event in &pending {
                if cancel.is_cancelled() {
                    report.interrupted = true;
                    break 'pages;
                }
                self.deliver(event, &mut report).await?;
                watermark = event.occurred_at;
                report.watermark = watermark;
                report.delivered += 1;
            }

            // No progress means the next fetch would return the same page.
            if !page.has_more() || watermark == page_start {
                break;
            }
        }

        Ok(report)
    }

    async fn load_watermark(&mut self) -> Result<i64, CycleError> {
        if let Some(watermark) = self.watermark.get().await? {
            return Ok(watermark);
        }
        let initial = self.clock.now() - self.settings.grace_secs;
        self.watermark.set(initial).await?;
        info!(
            watermark = initial,
            grace_secs = self.settings.grace_secs,
            "no watermark found, starting from grace window"
        );
        Ok(initial)
    }

    /// Publish one event, then persist the watermark and update the tracker.
    async fn deliver(&mut self, event: &CanonicalEvent, report: &mut CycleReport) -> Result<(), CycleError> {
        let text = format_message(event);
        let message_id = self.sink.publish(&text).await.map_err(|source| {
            warn!(
                event_id = %event.id,
                kind = %event.kind(),
                occurred_at = event.occurred_at,
                "publish failed, aborting rest of batch"
            );
            CycleError::Delivery {
                event_id: event.id.clone(),
                source,
            }
        })?;

        self.watermark.set(event.occurred_at).await?;
        info!(
            event_id = %event.id,
            kind = %event.kind(),
            occurred_at = event.occurred_at,
            message_id = %message_id,
            "event published"
        );

        if let Some(stale) = self.tracker.record(&message_id).await? {
            match self.sink.retract(&stale).await {
                Ok(()) => {
                    report.retracted += 1;
                    debug!(message_id = %stale, "retracted oldest message");
                }
                Err(e) => {
                    report.retract_failures += 1;
                    warn!(message_id = %stale, error = %e, "failed to retract evicted message");
                }
            }
        }
        Ok(())
    }
}
