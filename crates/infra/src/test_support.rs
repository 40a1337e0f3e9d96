//! Shared test doubles.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use binsync_core::{LogPosition, RowAction, RowsEvent, TableRef};
use binsync_events::{Sink, SinkError};
use serde_json::json;
use tokio::time::Instant;

/// Sink that renders one string per row and records every publish call.
#[derive(Debug, Default)]
pub struct RecordingSink {
    published: Mutex<Vec<Vec<String>>>,
    publish_calls: AtomicUsize,
    attempts: Mutex<Vec<Instant>>,
    failures_left: AtomicUsize,
    fail_translate: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` publish calls (`usize::MAX` fails forever).
    pub fn fail_next_publishes(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn fail_translate(&self) {
        self.fail_translate.store(true, Ordering::SeqCst);
    }

    /// Successfully published batches, in order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.published.lock().unwrap().clone()
    }

    /// Every publish attempt, successful or not.
    pub fn publish_calls(&self) -> usize {
        self.publish_calls.load(Ordering::SeqCst)
    }

    /// When each publish attempt started.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for RecordingSink {
    type Item = String;

    fn translate(&self, event: &RowsEvent) -> Result<Vec<String>, SinkError> {
        if self.fail_translate.load(Ordering::SeqCst) {
            return Err(SinkError::translate("unsupported column type"));
        }
        Ok(event
            .rows
            .iter()
            .map(|row| format!("{}:{}:{}", event.table, event.action, json!(row)))
            .collect())
    }

    async fn publish(&self, items: &[String]) -> Result<(), SinkError> {
        self.publish_calls.fetch_add(1, Ordering::SeqCst);
        self.attempts.lock().unwrap().push(Instant::now());

        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            if left != usize::MAX {
                self.failures_left.store(left - 1, Ordering::SeqCst);
            }
            return Err(SinkError::publish("target unavailable"));
        }

        self.published.lock().unwrap().push(items.to_vec());
        Ok(())
    }
}

pub fn pos(segment: u32, offset: u64) -> LogPosition {
    LogPosition::new(format!("mysql-bin.{segment:06}"), offset)
}

pub fn insert(schema: &str, table: &str, ids: &[i64]) -> RowsEvent {
    RowsEvent::new(
        TableRef::new(schema, table),
        RowAction::Insert,
        ids.iter().map(|id| vec![json!(id)]).collect(),
    )
}
