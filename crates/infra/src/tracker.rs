//! In-memory position cache with debounced write-through to a checkpoint store.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use binsync_core::LogPosition;
use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::checkpoint::{CheckpointError, CheckpointStore};

/// Default minimum spacing between two persisted writes.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(1);

/// Snapshot of the tracker's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub position: LogPosition,
    /// When the store was last written by this tracker (`None` if never).
    pub saved_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct TrackerState {
    position: Option<LogPosition>,
    last_save: Instant,
    saved_at: Option<DateTime<Utc>>,
}

/// Tracks the current checkpoint and persists it at most once per save interval.
///
/// The debounce bounds write amplification on busy commit streams while
/// keeping replay after a crash to roughly one save interval of events.
///
/// The "is a save due" decision and the save itself happen under one lock, so
/// concurrent callers can never both skip (or both perform) the same write.
#[derive(Debug)]
pub struct PositionTracker<S> {
    store: S,
    save_interval: Duration,
    state: Mutex<TrackerState>,
}

impl<S> PositionTracker<S>
where
    S: CheckpointStore,
{
    /// Read the store once and seed the tracker from it.
    ///
    /// With no stored position the tracker starts empty and the source reader
    /// falls back to its own default start.
    pub fn load_initial(store: S) -> Result<Self, CheckpointError> {
        let position = store.load()?;

        match &position {
            Some(pos) => info!(position = %pos, "loaded checkpoint"),
            None => info!("no checkpoint found, starting from source default"),
        }

        Ok(Self {
            store,
            save_interval: DEFAULT_SAVE_INTERVAL,
            state: Mutex::new(TrackerState {
                position,
                last_save: Instant::now(),
                saved_at: None,
            }),
        })
    }

    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Record `position` and persist it if the save interval has elapsed.
    ///
    /// Positions must be non-decreasing; that is the caller's contract.
    ///
    /// The store write runs on the calling thread while the lock is held. For
    /// the pipeline that is an async worker, blocked at most once per save
    /// interval.
    pub fn advance(&self, position: LogPosition) -> Result<(), CheckpointError> {
        let mut state = self.state();

        debug_assert!(
            state.position.as_ref().is_none_or(|prev| *prev <= position),
            "checkpoint regressed from {:?} to {position}",
            state.position
        );
        state.position = Some(position.clone());

        let now = Instant::now();
        if now.duration_since(state.last_save) < self.save_interval {
            return Ok(());
        }

        debug!(%position, "saving checkpoint");
        self.store.save(&position)?;
        state.last_save = now;
        state.saved_at = Some(Utc::now());
        Ok(())
    }

    /// Current in-memory position.
    pub fn position(&self) -> Option<LogPosition> {
        self.state().position.clone()
    }

    pub fn checkpoint(&self) -> Option<Checkpoint> {
        let state = self.state();
        state.position.clone().map(|position| Checkpoint {
            position,
            saved_at: state.saved_at,
        })
    }

    /// Persist the current position regardless of the debounce window.
    ///
    /// A tracker that never held a position writes nothing. Blocks on the
    /// store; async callers should run it on a blocking thread.
    pub fn close(&self) -> Result<(), CheckpointError> {
        let mut state = self.state();

        let Some(position) = state.position.clone() else {
            return Ok(());
        };

        info!(%position, "saving final checkpoint");
        self.store.save(&position)?;
        state.last_save = Instant::now();
        state.saved_at = Some(Utc::now());
        Ok(())
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        // The guarded state is plain data and stays consistent across a panic.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::checkpoint::{FileCheckpointStore, InMemoryCheckpointStore};

    fn pos(segment: u32, offset: u64) -> LogPosition {
        LogPosition::new(format!("mysql-bin.{segment:06}"), offset)
    }

    #[test]
    fn seeds_from_store() {
        let store = InMemoryCheckpointStore::with_position(pos(7, 4523));
        let tracker = PositionTracker::load_initial(store).unwrap();

        assert_eq!(tracker.position(), Some(pos(7, 4523)));
    }

    #[test]
    fn empty_store_leaves_tracker_empty() {
        let tracker = PositionTracker::load_initial(InMemoryCheckpointStore::new()).unwrap();
        assert_eq!(tracker.position(), None);
        assert_eq!(tracker.checkpoint(), None);
    }

    #[test]
    fn load_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("master.info"), "not-a-position").unwrap();

        let result = PositionTracker::load_initial(FileCheckpointStore::new(dir.path()));
        assert!(matches!(result, Err(CheckpointError::Parse { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn advances_within_the_interval_are_debounced() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let tracker = PositionTracker::load_initial(store.clone()).unwrap();

        tokio::time::advance(Duration::from_millis(1500)).await;
        tracker.advance(pos(1, 100)).unwrap();
        tokio::time::advance(Duration::from_millis(300)).await;
        tracker.advance(pos(1, 200)).unwrap();

        assert_eq!(store.save_count(), 1);
        assert_eq!(store.stored(), Some(pos(1, 100)));
        assert_eq!(tracker.position(), Some(pos(1, 200)));

        tokio::time::advance(Duration::from_secs(1)).await;
        tracker.advance(pos(1, 300)).unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.stored(), Some(pos(1, 300)));
    }

    #[tokio::test(start_paused = true)]
    async fn first_advance_right_after_load_is_deferred() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let tracker = PositionTracker::load_initial(store.clone()).unwrap();

        tracker.advance(pos(1, 100)).unwrap();
        assert_eq!(store.save_count(), 0);
        assert!(tracker.checkpoint().unwrap().saved_at.is_none());
    }

    #[test]
    fn close_saves_ignoring_debounce() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let tracker = PositionTracker::load_initial(store.clone()).unwrap();

        tracker.advance(pos(2, 10)).unwrap();
        tracker.advance(pos(2, 20)).unwrap();
        tracker.close().unwrap();

        assert_eq!(store.stored(), Some(pos(2, 20)));
        assert!(tracker.checkpoint().unwrap().saved_at.is_some());
    }

    #[test]
    fn load_then_close_leaves_file_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("master.info");
        std::fs::write(&record, "mysql-bin.000004:880").unwrap();

        let tracker = PositionTracker::load_initial(FileCheckpointStore::new(dir.path())).unwrap();
        tracker.close().unwrap();

        assert_eq!(std::fs::read_to_string(&record).unwrap(), "mysql-bin.000004:880");
    }

    #[test]
    fn close_without_position_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = PositionTracker::load_initial(FileCheckpointStore::new(dir.path())).unwrap();
        tracker.close().unwrap();

        assert!(!dir.path().join("master.info").exists());
    }

    #[test]
    fn save_failure_propagates() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let tracker = PositionTracker::load_initial(store.clone())
            .unwrap()
            .with_save_interval(Duration::ZERO);

        store.set_fail_saves(true);
        assert!(tracker.advance(pos(1, 1)).is_err());
        // The in-memory value still moved forward.
        assert_eq!(tracker.position(), Some(pos(1, 1)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: after any non-decreasing run of advances, close() leaves the
        /// last advanced position in the store.
        #[test]
        fn close_persists_last_advance(
            steps in prop::collection::vec((0u32..3, 0u64..10_000), 1..40)
        ) {
            let mut positions: Vec<(u32, u64)> = steps;
            positions.sort();

            let store = Arc::new(InMemoryCheckpointStore::new());
            let tracker = PositionTracker::load_initial(store.clone()).unwrap();

            for (segment, offset) in &positions {
                tracker.advance(pos(*segment, *offset)).unwrap();
            }
            tracker.close().unwrap();

            let (segment, offset) = *positions.last().unwrap();
            prop_assert_eq!(store.stored(), Some(pos(segment, offset)));
        }
    }
}
