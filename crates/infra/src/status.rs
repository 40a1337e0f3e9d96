//! Point-in-time status of a running sync, for diagnostics.

use binsync_core::LogPosition;
use binsync_events::SourceError;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::PipelineState;
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub label: String,
    /// Where the source itself currently is.
    pub head_position: Option<LogPosition>,
    /// Latest boundary the reader handed to the pipeline.
    pub read_position: Option<LogPosition>,
    /// Latest position the pipeline confirmed as published.
    pub synced_position: Option<LogPosition>,
    pub saved_at: Option<DateTime<Utc>>,
    pub state: PipelineState,
    pub queue_capacity: usize,
    pub stats: StatsSnapshot,
}

/// Something that can describe one sync pipeline.
pub trait StatusSource: Send + Sync {
    fn label(&self) -> &str;

    /// Fails when the source head cannot be queried.
    fn status(&self) -> Result<StatusReport, SourceError>;
}
