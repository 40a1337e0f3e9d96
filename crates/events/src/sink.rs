//! Sink capability consumed by the sync core.
//!
//! A sink is the downstream target (a search index, a queue, a warehouse...).
//! The core treats it as an opaque two-step capability:
//!
//! ```text
//! RowsEvent ──translate──▶ Vec<Item> ──(accumulate)──▶ publish(&[Item])
//! ```
//!
//! ## Delivery Guarantees
//!
//! The pipeline retries failed publishes, and after a crash it replays from the
//! last durable checkpoint. A batch may therefore be delivered **more than
//! once**. Sinks that need exactness downstream must make `publish` idempotent
//! (e.g. upserts keyed by primary key).

use async_trait::async_trait;
use thiserror::Error;

use binsync_core::RowsEvent;

/// Sink-side failure.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink could not turn a row event into payload items.
    #[error("translate failed: {0}")]
    Translate(String),

    /// Delivering a batch failed.
    #[error("publish failed: {0}")]
    Publish(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SinkError {
    pub fn translate(msg: impl Into<String>) -> Self {
        Self::Translate(msg.into())
    }

    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }
}

/// Downstream target of the pipeline.
///
/// `translate` runs synchronously on the source reader's thread for every row
/// event that passes filtering; `publish` runs on the pipeline task with the
/// accumulated items, in source order.
///
/// A `translate` error is fatal to the whole pipeline: skipping an event would
/// silently corrupt downstream state. A `publish` error is treated as transient
/// and retried a bounded number of times.
#[async_trait]
pub trait Sink: Send + Sync + 'static {
    type Item: Send + Sync + 'static;

    fn translate(&self, event: &RowsEvent) -> Result<Vec<Self::Item>, SinkError>;

    async fn publish(&self, items: &[Self::Item]) -> Result<(), SinkError>;
}

#[async_trait]
impl<S> Sink for std::sync::Arc<S>
where
    S: Sink + ?Sized,
{
    type Item = S::Item;

    fn translate(&self, event: &RowsEvent) -> Result<Vec<Self::Item>, SinkError> {
        (**self).translate(event)
    }

    async fn publish(&self, items: &[Self::Item]) -> Result<(), SinkError> {
        (**self).publish(items).await
    }
}
