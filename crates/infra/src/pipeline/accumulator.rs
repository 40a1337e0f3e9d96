//! Loop-owned batch state and the size/time flush decision.

use binsync_core::LogPosition;
use binsync_events::{PipelineMessage, PositionMarker};
use tokio::time::Instant;

use super::config::PipelineConfig;

/// What the loop must do after accepting a message.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct FlushDecision {
    pub flush: bool,
    /// Only ever set together with `flush`.
    pub save: bool,
}

/// Pending payload items plus the checkpoint they lead up to.
///
/// Owned by the pipeline loop; never shared.
#[derive(Debug)]
pub struct Accumulator<I> {
    items: Vec<I>,
    /// Position to checkpoint once the current items are published.
    pending: Option<LogPosition>,
    /// Most recent marker seen, saved or not.
    last_seen: Option<LogPosition>,
    /// Last position handed to the tracker.
    advanced: Option<LogPosition>,
    last_marker_save: Instant,
    last_flush: Instant,
}

impl<I> Accumulator<I> {
    pub fn new(now: Instant) -> Self {
        Self {
            items: Vec::with_capacity(1024),
            pending: None,
            last_seen: None,
            advanced: None,
            last_marker_save: now,
            last_flush: now,
        }
    }

    pub fn accept(
        &mut self,
        message: PipelineMessage<I>,
        config: &PipelineConfig,
        now: Instant,
    ) -> FlushDecision {
        let mut decision = match message {
            PipelineMessage::Marker(marker) => self.accept_marker(marker, config, now),
            PipelineMessage::Batch(items) => {
                self.items.extend(items);
                FlushDecision {
                    flush: self.items.len() >= config.batch_size,
                    save: false,
                }
            }
        };
        // A backlog can keep the ticker from ever being polled.
        if !decision.flush && self.flush_overdue(config, now) {
            decision.flush = true;
        }
        decision
    }

    fn flush_overdue(&self, config: &PipelineConfig, now: Instant) -> bool {
        !self.items.is_empty() && now.duration_since(self.last_flush) >= config.flush_interval
    }

    fn accept_marker(
        &mut self,
        marker: PositionMarker,
        config: &PipelineConfig,
        now: Instant,
    ) -> FlushDecision {
        self.last_seen = Some(marker.position.clone());

        let due = now.duration_since(self.last_marker_save) >= config.marker_save_interval;
        if !marker.force_flush && !due {
            return FlushDecision::default();
        }

        self.last_marker_save = now;
        self.pending = Some(marker.position);
        FlushDecision {
            flush: true,
            save: true,
        }
    }

    pub fn items(&self) -> &[I] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop published items, keeping the allocation, and restart the
    /// flush interval.
    pub fn flushed(&mut self, now: Instant) {
        self.items.clear();
        self.last_flush = now;
    }

    /// Take the pending checkpoint, if any.
    pub fn take_pending(&mut self) -> Option<LogPosition> {
        self.pending.take()
    }

    pub fn mark_advanced(&mut self, position: LogPosition) {
        self.advanced = Some(position);
    }

    /// Schedule the last seen marker for saving if it is ahead of what was saved.
    ///
    /// Used when draining: every item before that marker has been published.
    pub fn promote_last_seen(&mut self) {
        if let Some(last) = self.last_seen.clone() {
            if self.advanced.as_ref() < Some(&last) {
                self.pending = Some(last);
            }
        }
    }
}
