//! Source reader contract (external collaborator).

use std::sync::Arc;

use binsync_core::LogPosition;
use thiserror::Error;

use crate::handler::{EventHandler, HandlerError};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source connection error: {0}")]
    Connection(String),

    /// A log record could not be decoded.
    #[error("decode error at record {record}: {message}")]
    Decode { record: u64, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A handler callback asked the reader to stop.
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

impl SourceError {
    /// Whether the reader stopped only because the pipeline was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SourceError::Handler(HandlerError::Cancelled))
    }
}

/// Reads the replication log and drives an [`EventHandler`].
///
/// `run_from` blocks the calling thread until the log is exhausted, `close` is
/// called, or a callback returns an error. `close` and `head_position` may be
/// called concurrently from other threads while `run_from` is in progress.
pub trait SourceReader: Send + Sync {
    /// Stream events starting after `start`, or from the source default when
    /// `None`.
    fn run_from(
        &self,
        start: Option<LogPosition>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), SourceError>;

    /// Ask a running reader to stop. Idempotent.
    fn close(&self);

    /// The source's own current head position, if known.
    fn head_position(&self) -> Result<Option<LogPosition>, SourceError>;
}
