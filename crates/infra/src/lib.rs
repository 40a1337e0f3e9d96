//! Infrastructure layer: checkpoints, the sync pipeline and its wiring.

pub mod checkpoint;
pub mod config;
pub mod manager;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod stats;
pub mod status;
pub mod tracker;
pub mod translator;

pub use checkpoint::{CheckpointError, CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use config::{ConfigError, Flavor, SourceConfig, SyncConfig};
pub use manager::{SyncError, SyncManager};
pub use pipeline::{PipelineConfig, PipelineError, PipelineState, SyncPipeline};
pub use stats::{StatsSnapshot, SyncStats};
pub use status::{StatusReport, StatusSource};
pub use tracker::PositionTracker;

#[cfg(test)]
mod test_support;
