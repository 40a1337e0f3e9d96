use std::time::Duration;

/// Tuning knobs for [`super::SyncPipeline`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Flush as soon as this many payload items are pending.
    pub batch_size: usize,
    /// Period of the unconditional flush tick.
    pub flush_interval: Duration,
    /// A commit marker triggers flush + save once this long after the last one did.
    pub marker_save_interval: Duration,
    /// Retries after the first failed publish of a batch.
    pub max_publish_retries: u32,
    /// Backoff before retry `n` is `n * retry_backoff_step`.
    pub retry_backoff_step: Duration,
    /// Bound of the producer → pipeline channel.
    pub channel_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            flush_interval: Duration::from_millis(200),
            marker_save_interval: Duration::from_secs(3),
            max_publish_retries: 3,
            retry_backoff_step: Duration::from_secs(1),
            channel_capacity: 4096,
        }
    }
}

impl PipelineConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_max_publish_retries(mut self, retries: u32) -> Self {
        self.max_publish_retries = retries;
        self
    }
}
