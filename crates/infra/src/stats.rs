//! Sync counters shared between the translator, the pipeline and diagnostics.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use binsync_core::{CoreResult, LogPosition, RowAction, RowsEvent};
use serde::Serialize;

/// Atomic counters for one pipeline.
///
/// Writers are the translator (row counts, queue depth up, read position)
/// and the pipeline loop (queue depth down, publish counters). Readers only
/// ever see a [`StatsSnapshot`].
#[derive(Debug, Default)]
pub struct SyncStats {
    inserted: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    published_batches: AtomicU64,
    published_items: AtomicU64,
    publish_failures: AtomicU64,
    queue_depth: AtomicUsize,
    last_read: Mutex<Option<LogPosition>>,
}

/// Point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub inserted: u64,
    pub updated: u64,
    pub deleted: u64,
    pub published_batches: u64,
    pub published_items: u64,
    pub publish_failures: u64,
    /// Messages queued or being handed over. A reader blocked on a full
    /// channel counts, so this can read one above capacity.
    pub queue_depth: usize,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count the rows affected by `event`.
    ///
    /// A malformed event (unpaired update images) is reported and leaves the
    /// counters untouched.
    pub fn record_rows(&self, event: &RowsEvent) -> CoreResult<()> {
        let rows = event.affected_rows()? as u64;
        let counter = match event.action {
            RowAction::Insert => &self.inserted,
            RowAction::Update => &self.updated,
            RowAction::Delete => &self.deleted,
        };
        counter.fetch_add(rows, Ordering::Relaxed);
        Ok(())
    }

    pub fn record_published(&self, items: usize) {
        self.published_batches.fetch_add(1, Ordering::Relaxed);
        self.published_items.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub fn record_publish_failure(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn enqueued(&self) {
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dequeued(&self) {
        // Saturate so an unmatched decrement cannot wrap.
        let _ = self
            .queue_depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)));
    }

    /// Remember the latest boundary position handed over by the reader.
    pub fn record_read(&self, position: &LogPosition) {
        let mut last = self.last_read.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(position.clone());
    }

    /// Latest position the reader reached, published or not.
    pub fn last_read(&self) -> Option<LogPosition> {
        self.last_read
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            inserted: self.inserted.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            published_batches: self.published_batches.load(Ordering::Relaxed),
            published_items: self.published_items.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
        }
    }
}
