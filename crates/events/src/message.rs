//! Messages carried on the bounded pipeline channel.

use binsync_core::LogPosition;

/// A checkpoint candidate emitted at a log boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionMarker {
    pub position: LogPosition,

    /// `true` on rotation and DDL boundaries: the checkpoint must advance now.
    /// `false` on ordinary commits, where saves may be coalesced.
    pub force_flush: bool,
}

impl PositionMarker {
    pub fn forced(position: LogPosition) -> Self {
        Self {
            position,
            force_flush: true,
        }
    }

    pub fn deferred(position: LogPosition) -> Self {
        Self {
            position,
            force_flush: false,
        }
    }
}

/// The closed set of things a producer can hand to the pipeline loop.
///
/// `I` is the sink's opaque payload item type.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage<I> {
    Marker(PositionMarker),
    /// Payload items produced by the sink from a single row event.
    Batch(Vec<I>),
}
