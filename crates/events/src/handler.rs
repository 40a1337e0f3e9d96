use binsync_core::{LogPosition, RowsEvent};
use thiserror::Error;

use crate::sink::SinkError;

/// Returned by [`EventHandler`] callbacks to tell the source reader to stop.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The pipeline has been cancelled (shutdown or an earlier fatal error).
    #[error("sync pipeline cancelled")]
    Cancelled,

    /// The sink could not translate a row event; the pipeline has been cancelled.
    #[error("translate {table} {action} event: {source}")]
    Translate {
        table: String,
        action: String,
        #[source]
        source: SinkError,
    },
}

/// Callbacks a source reader invokes while decoding the replication log.
///
/// The reader calls these synchronously, in log order, on its own thread. Any
/// `Err` means "stop reading": the reader should return from its run loop as
/// soon as possible. Callbacks may block while the pipeline applies
/// backpressure.
///
/// `next` is the position **after** the boundary event, i.e. where a restarted
/// reader should resume.
pub trait EventHandler: Send + Sync {
    /// The log rotated to a new segment.
    fn on_rotate(&self, next: LogPosition) -> Result<(), HandlerError>;

    /// A schema change was applied.
    fn on_ddl(&self, next: LogPosition) -> Result<(), HandlerError>;

    /// A transaction committed.
    fn on_xid(&self, next: LogPosition) -> Result<(), HandlerError>;

    /// Rows were inserted, updated or deleted.
    fn on_row(&self, event: RowsEvent) -> Result<(), HandlerError>;
}
