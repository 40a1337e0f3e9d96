//! Wires one source reader, translator, pipeline and tracker together.
//!
//! Shutdown order, whichever side stops first:
//!
//! 1. the pipeline loop exits (drained, cancelled or failed)
//! 2. the cancellation token fires and the reader is closed
//! 3. the reader thread is joined, with a grace period
//! 4. the tracker persists its final position on a blocking thread

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use binsync_core::LogPosition;
use binsync_events::{EventHandler, IdentityRowMapper, RowMapper, Sink, SourceError, SourceReader};
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::config::{ConfigError, SyncConfig};
use crate::pipeline::{self, PipelineError, PipelineExit, PipelineState, StateCell, SyncPipeline};
use crate::stats::SyncStats;
use crate::status::{StatusReport, StatusSource};
use crate::tracker::PositionTracker;
use crate::translator::EventTranslator;

/// How long `run` waits for the reader thread after closing it.
pub const READER_STOP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("source reader failed: {0}")]
    Source(#[from] SourceError),

    #[error("sync task failed: {0}")]
    Task(String),
}

/// Owns one sync pipeline from checkpoint load to final save.
///
/// A manager runs once; after `run` returns it only serves status reports.
pub struct SyncManager<S, C, R>
where
    S: Sink,
{
    config: SyncConfig,
    sink: Arc<S>,
    reader: Arc<R>,
    tracker: Arc<PositionTracker<C>>,
    mapper: Arc<dyn RowMapper>,
    stats: Arc<SyncStats>,
    state: Arc<StateCell>,
    cancel: CancellationToken,
}

impl<S, C, R> SyncManager<S, C, R>
where
    S: Sink,
    C: CheckpointStore + 'static,
    R: SourceReader + 'static,
{
    /// Validate `config` and load the stored checkpoint.
    pub fn new(config: SyncConfig, store: C, reader: R, sink: S) -> Result<Self, SyncError> {
        config.validate()?;
        let tracker = PositionTracker::load_initial(store)?;

        Ok(Self {
            config,
            sink: Arc::new(sink),
            reader: Arc::new(reader),
            tracker: Arc::new(tracker),
            mapper: Arc::new(IdentityRowMapper),
            stats: Arc::new(SyncStats::new()),
            state: Arc::new(StateCell::default()),
            cancel: CancellationToken::new(),
        })
    }

    pub fn with_row_mapper(mut self, mapper: Arc<dyn RowMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn tracker(&self) -> &PositionTracker<C> {
        &self.tracker
    }

    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Stop reading and let `run` wind down. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.reader.close();
    }

    /// Run until the source is exhausted, `shutdown` is called, or a fatal
    /// error occurs.
    pub async fn run(&self) -> Result<(), SyncError> {
        let label = self.config.label.as_str();
        let pipeline_config = self.config.pipeline_config();
        let (tx, rx) = pipeline::channel(pipeline_config.channel_capacity);

        let handle = SyncPipeline::new(
            pipeline_config,
            self.sink.clone(),
            self.tracker.clone(),
            rx,
            self.stats.clone(),
            self.cancel.clone(),
        )
        .with_state(self.state.clone())
        .spawn();

        let translator = EventTranslator::new(
            tx,
            self.sink.clone(),
            self.stats.clone(),
            self.cancel.clone(),
        )
        .with_row_mapper(self.mapper.clone())
        .with_publish_tables(self.config.publish_tables.iter().cloned());

        let start = self.tracker.position();
        info!(label, start = ?start, "starting sync");

        let reader_done = match self.spawn_reader(start, Arc::new(translator)) {
            Ok(done) => done,
            Err(err) => {
                self.cancel.cancel();
                let _ = handle.wait().await;
                return Err(err);
            }
        };

        let pipeline_result = handle.wait().await;

        self.shutdown();
        let reader_result = match tokio::time::timeout(READER_STOP_GRACE, reader_done).await {
            Ok(Ok(result)) => Some(result),
            Ok(Err(_)) => {
                error!(label, "source reader thread exited without reporting");
                None
            }
            Err(_) => {
                warn!(label, grace = ?READER_STOP_GRACE, "source reader did not stop in time");
                None
            }
        };

        let tracker = self.tracker.clone();
        let close_result = match tokio::task::spawn_blocking(move || tracker.close()).await {
            Ok(result) => result.map_err(SyncError::from),
            Err(e) => Err(SyncError::Task(format!("final checkpoint save: {e}"))),
        };
        if let Err(err) = &close_result {
            error!(label, error = %err, "final checkpoint save failed");
        }

        match pipeline_result {
            Ok(PipelineExit::Drained) => info!(label, "sync finished, source exhausted"),
            Ok(PipelineExit::Cancelled) => info!(label, "sync stopped"),
            Err(err) => return Err(err.into()),
        }

        if let Some(Err(err)) = reader_result {
            if !err.is_cancelled() {
                error!(label, error = %err, "source reader failed");
                return Err(err.into());
            }
        }

        close_result?;
        Ok(())
    }

    fn spawn_reader(
        &self,
        start: Option<LogPosition>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<oneshot::Receiver<Result<(), SourceError>>, SyncError> {
        let (done_tx, done_rx) = oneshot::channel();
        let reader = self.reader.clone();

        thread::Builder::new()
            .name(format!("binsync-reader-{}", self.config.label))
            .spawn(move || {
                let result = reader.run_from(start, handler);
                let _ = done_tx.send(result);
            })
            .map_err(|e| SyncError::Task(format!("spawn source reader: {e}")))?;

        Ok(done_rx)
    }
}

impl<S, C, R> StatusSource for SyncManager<S, C, R>
where
    S: Sink,
    C: CheckpointStore + 'static,
    R: SourceReader + 'static,
{
    fn label(&self) -> &str {
        &self.config.label
    }

    fn status(&self) -> Result<StatusReport, SourceError> {
        let head_position = self.reader.head_position()?;
        let checkpoint = self.tracker.checkpoint();

        Ok(StatusReport {
            label: self.config.label.clone(),
            head_position,
            read_position: self.stats.last_read(),
            synced_position: checkpoint.as_ref().map(|c| c.position.clone()),
            saved_at: checkpoint.and_then(|c| c.saved_at),
            state: self.state.get(),
            queue_capacity: self.config.channel_capacity,
            stats: self.stats.snapshot(),
        })
    }
}
