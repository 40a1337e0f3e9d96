//! Event pipeline contracts (mechanics only).
//!
//! This crate defines the seams between the sync core and its external
//! collaborators: the source reader that decodes the replication log, the
//! callbacks it drives, and the sink that receives batched payloads. It makes
//! no I/O or storage assumptions.

pub mod handler;
pub mod mapper;
pub mod message;
pub mod sink;
pub mod source;

pub use handler::{EventHandler, HandlerError};
pub use mapper::{IdentityRowMapper, RowMapper};
pub use message::{PipelineMessage, PositionMarker};
pub use sink::{Sink, SinkError};
pub use source::{SourceError, SourceReader};
