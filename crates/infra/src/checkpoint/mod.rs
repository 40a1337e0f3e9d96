//! Checkpoint persistence ("how far have we read").
//!
//! A checkpoint store holds a single [`LogPosition`] per source. It is written
//! far less often than events flow (see [`crate::tracker::PositionTracker`] for
//! the debounce) but every write must be crash-safe: after a crash the store
//! holds either the previous record or the new one, never a torn write.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use binsync_core::{CoreError, LogPosition};
use thiserror::Error;

pub mod file;

pub use file::FileCheckpointStore;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed checkpoint {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: CoreError,
    },
}

/// Durable storage for the last checkpointed log position.
pub trait CheckpointStore: Send + Sync {
    /// Read the stored position.
    ///
    /// A store that has never been written returns `Ok(None)`; that is the
    /// normal first-run case, not an error.
    fn load(&self) -> Result<Option<LogPosition>, CheckpointError>;

    /// Atomically replace the stored position.
    fn save(&self, position: &LogPosition) -> Result<(), CheckpointError>;
}

impl<S> CheckpointStore for std::sync::Arc<S>
where
    S: CheckpointStore + ?Sized,
{
    fn load(&self) -> Result<Option<LogPosition>, CheckpointError> {
        (**self).load()
    }

    fn save(&self, position: &LogPosition) -> Result<(), CheckpointError> {
        (**self).save(position)
    }
}

/// In-memory checkpoint store for tests/dev.
///
/// Counts successful saves so write amplification can be asserted, and can be
/// switched into a failing mode to exercise fatal save handling.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    position: Mutex<Option<LogPosition>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `position`, as if written by a previous run.
    pub fn with_position(position: LogPosition) -> Self {
        Self {
            position: Mutex::new(Some(position)),
            ..Self::default()
        }
    }

    /// Last persisted position.
    pub fn stored(&self) -> Option<LogPosition> {
        self.position.lock().ok().and_then(|p| p.clone())
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl CheckpointStore for InMemoryCheckpointStore {
    fn load(&self) -> Result<Option<LogPosition>, CheckpointError> {
        Ok(self.stored())
    }

    fn save(&self, position: &LogPosition) -> Result<(), CheckpointError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(CheckpointError::Io(std::io::Error::other(
                "checkpoint store unavailable",
            )));
        }

        let mut slot = self
            .position
            .lock()
            .map_err(|_| CheckpointError::Io(std::io::Error::other("checkpoint lock poisoned")))?;
        *slot = Some(position.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
