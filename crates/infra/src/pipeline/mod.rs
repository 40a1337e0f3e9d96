//! The sync pipeline: single consumer loop between the translator and the sink.
//!
//! ## Loop
//!
//! Each iteration waits on three sources, polled in this order:
//!
//! ```text
//! cancel ──▶ exit immediately, no final flush
//! tick   ──▶ flush whatever is pending
//! recv   ──▶ marker: maybe flush + save │ batch: accumulate, flush at batch_size
//! ```
//!
//! Accepting a message also flushes when the flush interval is overdue, so a
//! channel that never runs dry cannot hold back a partial batch.
//!
//! A save only happens after the flush of the same iteration succeeded, so a
//! checkpoint never runs ahead of the data the sink has accepted.
//!
//! ## Failure
//!
//! Publish failures are retried with linear backoff; exhausting the retries,
//! or failing to save a checkpoint, cancels the whole pipeline. Recovery is a
//! process restart that replays from the last durable checkpoint.

use std::sync::Arc;

use binsync_events::{PipelineMessage, Sink, SinkError};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::stats::SyncStats;
use crate::tracker::PositionTracker;

pub mod accumulator;
pub mod config;
pub mod state;

pub use accumulator::{Accumulator, FlushDecision};
pub use config::PipelineConfig;
pub use state::{PipelineState, StateCell};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("publish failed after {attempts} attempts: {source}")]
    PublishExhausted {
        attempts: u32,
        #[source]
        source: SinkError,
    },

    #[error("checkpoint save failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("pipeline task failed: {0}")]
    Task(String),
}

/// Why a pipeline loop stopped without error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    /// The cancellation token fired.
    Cancelled,
    /// Every producer went away and the remaining work was flushed.
    Drained,
}

/// Create the bounded producer → pipeline channel.
pub fn channel<I>(
    capacity: usize,
) -> (
    mpsc::Sender<PipelineMessage<I>>,
    mpsc::Receiver<PipelineMessage<I>>,
) {
    mpsc::channel(capacity)
}

/// Single-consumer sync loop.
pub struct SyncPipeline<S, C>
where
    S: Sink,
{
    config: PipelineConfig,
    sink: Arc<S>,
    tracker: Arc<PositionTracker<C>>,
    rx: mpsc::Receiver<PipelineMessage<S::Item>>,
    stats: Arc<SyncStats>,
    cancel: CancellationToken,
    state: Arc<StateCell>,
}

impl<S, C> SyncPipeline<S, C>
where
    S: Sink,
    C: CheckpointStore + 'static,
{
    pub fn new(
        config: PipelineConfig,
        sink: Arc<S>,
        tracker: Arc<PositionTracker<C>>,
        rx: mpsc::Receiver<PipelineMessage<S::Item>>,
        stats: Arc<SyncStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            sink,
            tracker,
            rx,
            stats,
            cancel,
            state: Arc::new(StateCell::default()),
        }
    }

    /// Share an externally observed state cell (e.g. with diagnostics).
    pub fn with_state(mut self, state: Arc<StateCell>) -> Self {
        self.state = state;
        self
    }

    /// Run the loop on the current tokio runtime.
    pub fn spawn(self) -> PipelineHandle {
        let state = self.state.clone();
        let join = tokio::spawn(self.run());

        PipelineHandle { join, state }
    }

    /// Run the loop to completion.
    ///
    /// Any error has already cancelled the pipeline when this returns.
    pub async fn run(mut self) -> Result<PipelineExit, PipelineError> {
        self.state.set(PipelineState::Running);
        info!(
            batch_size = self.config.batch_size,
            flush_interval = ?self.config.flush_interval,
            "sync pipeline started"
        );

        let result = match self.run_loop().await {
            Err(PipelineError::Cancelled) => Ok(PipelineExit::Cancelled),
            other => other,
        };

        if let Err(err) = &result {
            error!(error = %err, "sync pipeline failed, cancelling");
            self.cancel.cancel();
        }

        // Unblock a waiting producer and settle the queue depth for whatever
        // is left unread.
        self.rx.close();
        let mut discarded = 0usize;
        while self.rx.try_recv().is_ok() {
            self.stats.dequeued();
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "dropped unread messages");
        }

        self.state.set(PipelineState::Closed);
        info!(?result, "sync pipeline closed");
        result
    }

    async fn run_loop(&mut self) -> Result<PipelineExit, PipelineError> {
        let period = self.config.flush_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut acc = Accumulator::new(Instant::now());

        loop {
            let mut decision = FlushDecision::default();

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    info!(dropped = acc.len(), "sync pipeline cancelled");
                    return Ok(PipelineExit::Cancelled);
                }
                _ = ticker.tick() => {
                    decision.flush = true;
                }
                message = self.rx.recv() => match message {
                    Some(message) => {
                        self.stats.dequeued();
                        decision = acc.accept(message, &self.config, Instant::now());
                    }
                    None => return self.drain(&mut acc).await,
                },
            }

            if decision.flush {
                self.flush(&mut acc).await?;
            }
            if decision.save {
                self.save_pending(&mut acc)?;
            }
        }
    }

    async fn flush(&self, acc: &mut Accumulator<S::Item>) -> Result<(), PipelineError> {
        if acc.is_empty() {
            acc.flushed(Instant::now());
            return Ok(());
        }

        let mut retries = 0u32;
        while let Err(err) = self.sink.publish(acc.items()).await {
            self.stats.record_publish_failure();

            if retries >= self.config.max_publish_retries {
                error!(
                    attempts = retries + 1,
                    items = acc.len(),
                    error = %err,
                    "batch publish failed, giving up"
                );
                return Err(PipelineError::PublishExhausted {
                    attempts: retries + 1,
                    source: err,
                });
            }

            retries += 1;
            let backoff = self.config.retry_backoff_step * retries;
            warn!(retry = retries, ?backoff, error = %err, "batch publish failed, retrying");

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        debug!(items = acc.len(), "published batch");
        self.stats.record_published(acc.len());
        acc.flushed(Instant::now());
        Ok(())
    }

    fn save_pending(&self, acc: &mut Accumulator<S::Item>) -> Result<(), PipelineError> {
        let Some(position) = acc.take_pending() else {
            return Ok(());
        };

        if let Err(err) = self.tracker.advance(position.clone()) {
            error!(%position, error = %err, "checkpoint save failed");
            return Err(err.into());
        }
        acc.mark_advanced(position);
        Ok(())
    }

    async fn drain(
        &self,
        acc: &mut Accumulator<S::Item>,
    ) -> Result<PipelineExit, PipelineError> {
        self.state.set(PipelineState::Draining);
        info!(pending = acc.len(), "producers finished, draining pipeline");

        self.flush(acc).await?;
        acc.promote_last_seen();
        self.save_pending(acc)?;
        Ok(PipelineExit::Drained)
    }
}

/// Handle to observe and join a spawned pipeline.
#[derive(Debug)]
pub struct PipelineHandle {
    join: JoinHandle<Result<PipelineExit, PipelineError>>,
    state: Arc<StateCell>,
}

impl PipelineHandle {
    pub fn state(&self) -> PipelineState {
        self.state.get()
    }

    /// Wait for the loop to exit.
    pub async fn wait(self) -> Result<PipelineExit, PipelineError> {
        self.join
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }
}
