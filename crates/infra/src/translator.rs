//! Translates source reader callbacks into pipeline messages.

use std::collections::HashSet;
use std::sync::Arc;

use binsync_core::{LogPosition, RowsEvent, TableRef};
use binsync_events::{
    EventHandler, HandlerError, IdentityRowMapper, PipelineMessage, PositionMarker, RowMapper,
    Sink,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::stats::SyncStats;

/// The [`EventHandler`] injected into the source reader.
///
/// - rotation / DDL → forced position marker
/// - commit → deferred position marker
/// - rows → transform, filter, translate via the sink, enqueue the payload
///
/// Enqueueing blocks while the channel is full, which is how a slow sink or
/// slow disk throttles log reading. Every callback reports pipeline
/// cancellation back to the reader so it stops pulling.
pub struct EventTranslator<S>
where
    S: Sink,
{
    tx: mpsc::Sender<PipelineMessage<S::Item>>,
    sink: Arc<S>,
    mapper: Arc<dyn RowMapper>,
    publish_tables: HashSet<String>,
    stats: Arc<SyncStats>,
    cancel: CancellationToken,
}

impl<S> EventTranslator<S>
where
    S: Sink,
{
    pub fn new(
        tx: mpsc::Sender<PipelineMessage<S::Item>>,
        sink: Arc<S>,
        stats: Arc<SyncStats>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            tx,
            sink,
            mapper: Arc::new(IdentityRowMapper),
            publish_tables: HashSet::new(),
            stats,
            cancel,
        }
    }

    pub fn with_row_mapper(mut self, mapper: Arc<dyn RowMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Restrict publishing to these `schema.table` names (empty = everything).
    pub fn with_publish_tables(mut self, tables: impl IntoIterator<Item = String>) -> Self {
        self.publish_tables = tables.into_iter().collect();
        self
    }

    fn should_publish(&self, table: &TableRef) -> bool {
        self.publish_tables.is_empty() || self.publish_tables.contains(&table.qualified_name())
    }

    fn enqueue(&self, message: PipelineMessage<S::Item>) -> Result<(), HandlerError> {
        self.stats.enqueued();
        if self.tx.blocking_send(message).is_err() {
            // The pipeline loop is gone; nothing will ever drain this channel.
            self.stats.dequeued();
            return Err(HandlerError::Cancelled);
        }
        Ok(())
    }

    fn marker(&self, position: LogPosition, force_flush: bool) -> Result<(), HandlerError> {
        self.stats.record_read(&position);
        self.enqueue(PipelineMessage::Marker(PositionMarker {
            position,
            force_flush,
        }))?;
        self.check_cancelled()
    }

    fn check_cancelled(&self) -> Result<(), HandlerError> {
        if self.cancel.is_cancelled() {
            return Err(HandlerError::Cancelled);
        }
        Ok(())
    }
}

impl<S> EventHandler for EventTranslator<S>
where
    S: Sink,
{
    fn on_rotate(&self, next: LogPosition) -> Result<(), HandlerError> {
        self.marker(next, true)
    }

    fn on_ddl(&self, next: LogPosition) -> Result<(), HandlerError> {
        self.marker(next, true)
    }

    fn on_xid(&self, next: LogPosition) -> Result<(), HandlerError> {
        self.marker(next, false)
    }

    fn on_row(&self, event: RowsEvent) -> Result<(), HandlerError> {
        let event = self.mapper.transform(event);

        if !self.should_publish(&event.table) {
            return self.check_cancelled();
        }

        if let Err(err) = self.stats.record_rows(&event) {
            warn!(table = %event.table, error = %err, "row counters skipped for malformed event");
        }

        let items = match self.sink.translate(&event) {
            Ok(items) => items,
            Err(source) => {
                error!(
                    table = %event.table,
                    action = %event.action,
                    error = %source,
                    "cannot translate row event, cancelling sync"
                );
                self.cancel.cancel();
                return Err(HandlerError::Translate {
                    table: event.table.qualified_name(),
                    action: event.action.to_string(),
                    source,
                });
            }
        };

        if !items.is_empty() {
            self.enqueue(PipelineMessage::Batch(items))?;
        }
        self.check_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use binsync_core::RowAction;
    use serde_json::json;

    use super::*;
    use crate::test_support::{RecordingSink, insert, pos};

    type Rx = mpsc::Receiver<PipelineMessage<String>>;

    fn translator(capacity: usize) -> (EventTranslator<RecordingSink>, Rx, Arc<RecordingSink>) {
        let (tx, rx) = mpsc::channel(capacity);
        let sink = Arc::new(RecordingSink::new());
        let t = EventTranslator::new(
            tx,
            sink.clone(),
            Arc::new(SyncStats::new()),
            CancellationToken::new(),
        );
        (t, rx, sink)
    }

    #[test]
    fn rotation_and_ddl_force_a_flush() {
        let (t, mut rx, _) = translator(8);

        t.on_rotate(pos(2, 4)).unwrap();
        t.on_ddl(pos(2, 300)).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineMessage::Marker(PositionMarker::forced(pos(2, 4)))
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineMessage::Marker(PositionMarker::forced(pos(2, 300)))
        );
    }

    #[test]
    fn commit_marker_is_deferred() {
        let (t, mut rx, _) = translator(8);

        t.on_xid(pos(1, 900)).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineMessage::Marker(PositionMarker::deferred(pos(1, 900)))
        );
    }

    #[test]
    fn rows_become_one_batch_per_event() {
        let (t, mut rx, _) = translator(8);

        t.on_row(insert("shop", "orders", &[1, 2])).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineMessage::Batch(vec![
                "shop.orders:insert:[1]".to_string(),
                "shop.orders:insert:[2]".to_string(),
            ])
        );
        assert_eq!(t.stats.snapshot().inserted, 2);
        assert_eq!(t.stats.snapshot().queue_depth, 1);
    }

    #[test]
    fn publish_allow_list_is_exact_match() {
        let (t, mut rx, _) = translator(8);
        let t = t.with_publish_tables(["shop.orders".to_string()]);

        t.on_row(insert("shop", "orders_archive", &[1])).unwrap();
        t.on_row(insert("crm", "orders", &[2])).unwrap();
        t.on_row(insert("shop", "orders", &[3])).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineMessage::Batch(vec!["shop.orders:insert:[3]".to_string()])
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(t.stats.snapshot().inserted, 1);
    }

    #[test]
    fn row_mapper_runs_before_filtering() {
        let (t, mut rx, _) = translator(8);

        struct Rename;
        impl RowMapper for Rename {
            fn transform(&self, mut event: RowsEvent) -> RowsEvent {
                event.table.name = "orders".to_string();
                event
            }
        }

        let t = t
            .with_row_mapper(Arc::new(Rename))
            .with_publish_tables(["shop.orders".to_string()]);
        t.on_row(insert("shop", "orders_v2", &[7])).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineMessage::Batch(vec!["shop.orders:insert:[7]".to_string()])
        );
    }

    #[test]
    fn empty_translation_enqueues_nothing() {
        let (t, mut rx, _) = translator(8);

        t.on_row(insert("shop", "orders", &[])).unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn malformed_update_is_still_translated() {
        let (t, mut rx, _) = translator(8);
        let event = RowsEvent::new(
            TableRef::new("shop", "orders"),
            RowAction::Update,
            vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]],
        );

        t.on_row(event).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), PipelineMessage::Batch(items) if items.len() == 3));
        assert_eq!(t.stats.snapshot().updated, 0);
    }

    #[test]
    fn translate_failure_cancels_the_pipeline() {
        let (t, mut rx, sink) = translator(8);
        sink.fail_translate();

        let err = t.on_row(insert("shop", "orders", &[1])).unwrap_err();

        assert!(matches!(err, HandlerError::Translate { ref table, .. } if table == "shop.orders"));
        assert!(t.cancel.is_cancelled());
        assert!(rx.try_recv().is_err());

        // Every later callback tells the reader to stop.
        assert!(matches!(t.on_xid(pos(1, 10)), Err(HandlerError::Cancelled)));
    }

    #[test]
    fn closed_channel_reports_cancelled() {
        let (t, rx, _) = translator(1);
        drop(rx);

        assert!(matches!(t.on_rotate(pos(1, 4)), Err(HandlerError::Cancelled)));
        assert_eq!(t.stats.snapshot().queue_depth, 0);
    }

    #[test]
    fn full_channel_blocks_until_drained() {
        let (tx, mut rx) = mpsc::channel(1);
        let stats = Arc::new(SyncStats::new());
        let t = EventTranslator::new(
            tx,
            Arc::new(RecordingSink::new()),
            stats.clone(),
            CancellationToken::new(),
        );
        t.on_xid(pos(1, 1)).unwrap();

        let producer = std::thread::spawn(move || {
            t.on_xid(pos(1, 2)).unwrap();
        });

        // A depth of two means the producer is inside the send; with the
        // single slot taken it cannot return until we receive.
        while stats.snapshot().queue_depth < 2 {
            std::thread::yield_now();
        }
        assert!(!producer.is_finished(), "second enqueue should wait for capacity");
        assert_eq!(stats.last_read(), Some(pos(1, 2)));

        assert_eq!(
            rx.blocking_recv().unwrap(),
            PipelineMessage::Marker(PositionMarker::deferred(pos(1, 1)))
        );
        producer.join().unwrap();
        assert_eq!(
            rx.blocking_recv().unwrap(),
            PipelineMessage::Marker(PositionMarker::deferred(pos(1, 2)))
        );
    }
}
