//! Replays a recorded change log from JSON lines.
//!
//! One record per line:
//!
//! ```text
//! {"type":"rotate","next":{"segment":"mysql-bin.000002","offset":4}}
//! {"type":"row","schema":"shop","table":"orders","action":"insert","rows":[[1,"a"]]}
//! {"type":"xid","next":{"segment":"mysql-bin.000002","offset":310}}
//! ```
//!
//! `ddl` records look like `xid`. Blank lines are ignored.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use binsync_core::{LogPosition, Row, RowAction, RowsEvent, TableRef};
use binsync_events::{EventHandler, SourceError, SourceReader};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayRecord {
    Rotate {
        next: LogPosition,
    },
    Ddl {
        next: LogPosition,
    },
    Xid {
        next: LogPosition,
    },
    Row {
        schema: String,
        table: String,
        action: RowAction,
        rows: Vec<Row>,
        #[serde(default)]
        position: Option<LogPosition>,
    },
}

/// [`SourceReader`] over a recorded log.
///
/// Records at or before the start checkpoint are skipped, so resuming from a
/// saved position replays only what the checkpoint does not cover.
pub struct JsonLinesSource<B> {
    input: Mutex<Option<B>>,
    subscribe: Vec<Regex>,
    head: Mutex<Option<LogPosition>>,
    closed: AtomicBool,
}

impl<B> JsonLinesSource<B>
where
    B: BufRead + Send,
{
    pub fn new(input: B) -> Self {
        Self {
            input: Mutex::new(Some(input)),
            subscribe: Vec::new(),
            head: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Only replay row events whose `schema.table` matches one of `patterns`.
    pub fn with_subscribe(mut self, patterns: Vec<Regex>) -> Self {
        self.subscribe = patterns;
        self
    }

    fn subscribed(&self, table: &TableRef) -> bool {
        if self.subscribe.is_empty() {
            return true;
        }
        let name = table.qualified_name();
        self.subscribe.iter().any(|re| re.is_match(&name))
    }

    fn observe(&self, position: &LogPosition) {
        let mut head = self.head.lock().unwrap_or_else(|e| e.into_inner());
        if head.as_ref() < Some(position) {
            *head = Some(position.clone());
        }
    }

    /// Whether a boundary leading to `next` must be delivered.
    ///
    /// A boundary landing exactly on `start` is the one the checkpoint was
    /// taken from: it is not delivered again, but everything after it is.
    fn boundary_due(
        &self,
        next: &LogPosition,
        start: Option<&LogPosition>,
        resumed: &mut bool,
    ) -> bool {
        self.observe(next);
        if let Some(start) = start {
            if next <= start {
                *resumed |= next == start;
                return false;
            }
        }
        *resumed = true;
        true
    }
}

impl<B> SourceReader for JsonLinesSource<B>
where
    B: BufRead + Send,
{
    fn run_from(
        &self,
        start: Option<LogPosition>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), SourceError> {
        let mut input = self
            .input
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| SourceError::Connection("replay input already consumed".to_string()))?;

        info!(start = ?start, "replaying change log");

        // Rows without a position are skipped until a boundary reaches `start`.
        let mut resumed = start.is_none();
        let mut record = 0u64;
        let mut line = String::new();

        loop {
            if self.closed.load(Ordering::Acquire) {
                info!(record, "replay closed");
                return Ok(());
            }

            line.clear();
            if input.read_line(&mut line)? == 0 {
                info!(record, "replay exhausted");
                return Ok(());
            }
            record += 1;

            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            let parsed: ReplayRecord =
                serde_json::from_str(text).map_err(|e| SourceError::Decode {
                    record,
                    message: e.to_string(),
                })?;

            match parsed {
                ReplayRecord::Rotate { next } => {
                    if self.boundary_due(&next, start.as_ref(), &mut resumed) {
                        handler.on_rotate(next)?;
                    }
                }
                ReplayRecord::Ddl { next } => {
                    if self.boundary_due(&next, start.as_ref(), &mut resumed) {
                        handler.on_ddl(next)?;
                    }
                }
                ReplayRecord::Xid { next } => {
                    if self.boundary_due(&next, start.as_ref(), &mut resumed) {
                        handler.on_xid(next)?;
                    }
                }
                ReplayRecord::Row {
                    schema,
                    table,
                    action,
                    rows,
                    position,
                } => {
                    if let Some(position) = &position {
                        self.observe(position);
                    }
                    let replay = match (&start, &position) {
                        (Some(start), Some(position)) => position >= start,
                        _ => resumed,
                    };
                    if !replay {
                        continue;
                    }

                    let table = TableRef::new(schema, table);
                    if !self.subscribed(&table) {
                        debug!(%table, "table not subscribed, skipping rows");
                        continue;
                    }

                    let mut event = RowsEvent::new(table, action, rows);
                    if let Some(position) = position {
                        event = event.with_position(position);
                    }
                    handler.on_row(event)?;
                }
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn head_position(&self) -> Result<Option<LogPosition>, SourceError> {
        Ok(self.head.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use binsync_events::HandlerError;

    use super::*;
    use crate::test_support::pos;

    /// Handler that logs every callback as a short string.
    #[derive(Default)]
    struct Log(Mutex<Vec<String>>);

    impl Log {
        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }

        fn push(&self, entry: String) -> Result<(), HandlerError> {
            self.0.lock().unwrap().push(entry);
            Ok(())
        }
    }

    impl EventHandler for Log {
        fn on_rotate(&self, next: LogPosition) -> Result<(), HandlerError> {
            self.push(format!("rotate {next}"))
        }

        fn on_ddl(&self, next: LogPosition) -> Result<(), HandlerError> {
            self.push(format!("ddl {next}"))
        }

        fn on_xid(&self, next: LogPosition) -> Result<(), HandlerError> {
            self.push(format!("xid {next}"))
        }

        fn on_row(&self, event: RowsEvent) -> Result<(), HandlerError> {
            self.push(format!("{} {} x{}", event.table, event.action, event.rows.len()))
        }
    }

    const LOG: &str = r#"
{"type":"rotate","next":{"segment":"mysql-bin.000001","offset":4}}
{"type":"row","schema":"shop","table":"orders","action":"insert","rows":[[1],[2]]}
{"type":"xid","next":{"segment":"mysql-bin.000001","offset":100}}
{"type":"row","schema":"crm","table":"contacts","action":"delete","rows":[[9]]}
{"type":"row","schema":"shop","table":"orders","action":"update","rows":[[1],[1]]}
{"type":"xid","next":{"segment":"mysql-bin.000001","offset":200}}
{"type":"ddl","next":{"segment":"mysql-bin.000001","offset":260}}
"#;

    fn run(source: &JsonLinesSource<Cursor<&'static str>>, start: Option<LogPosition>) -> Vec<String> {
        let log = Arc::new(Log::default());
        source.run_from(start, log.clone()).unwrap();
        log.take()
    }

    #[test]
    fn replays_every_record_in_order() {
        let source = JsonLinesSource::new(Cursor::new(LOG));

        assert_eq!(
            run(&source, None),
            vec![
                "rotate mysql-bin.000001:4",
                "shop.orders insert x2",
                "xid mysql-bin.000001:100",
                "crm.contacts delete x1",
                "shop.orders update x2",
                "xid mysql-bin.000001:200",
                "ddl mysql-bin.000001:260",
            ]
        );
        assert_eq!(source.head_position().unwrap(), Some(pos(1, 260)));
    }

    #[test]
    fn resumes_after_the_start_checkpoint() {
        let source = JsonLinesSource::new(Cursor::new(LOG));

        assert_eq!(
            run(&source, Some(pos(1, 100))),
            vec![
                "crm.contacts delete x1",
                "shop.orders update x2",
                "xid mysql-bin.000001:200",
                "ddl mysql-bin.000001:260",
            ]
        );
    }

    #[test]
    fn subscribe_patterns_filter_row_events_only() {
        let source = JsonLinesSource::new(Cursor::new(LOG))
            .with_subscribe(vec![Regex::new(r"^shop\.").unwrap()]);

        let seen = run(&source, None);

        assert!(!seen.iter().any(|e| e.starts_with("crm.")));
        assert!(seen.contains(&"xid mysql-bin.000001:200".to_string()));
    }

    #[test]
    fn undecodable_line_reports_its_record_number() {
        let source = JsonLinesSource::new(Cursor::new(
            "{\"type\":\"xid\",\"next\":{\"segment\":\"mysql-bin.000001\",\"offset\":8}}\n{oops}\n",
        ));

        let err = source
            .run_from(None, Arc::new(Log::default()))
            .unwrap_err();

        assert!(matches!(err, SourceError::Decode { record: 2, .. }), "got {err:?}");
    }

    #[test]
    fn closed_source_stops_before_reading() {
        let source = JsonLinesSource::new(Cursor::new(LOG));
        source.close();

        assert!(run(&source, None).is_empty());
    }

    #[test]
    fn input_can_only_be_replayed_once() {
        let source = JsonLinesSource::new(Cursor::new(LOG));
        run(&source, None);

        let err = source
            .run_from(None, Arc::new(Log::default()))
            .unwrap_err();
        assert!(matches!(err, SourceError::Connection(_)));
    }

    #[test]
    fn handler_error_stops_the_replay() {
        struct Refuse;
        impl EventHandler for Refuse {
            fn on_rotate(&self, _: LogPosition) -> Result<(), HandlerError> {
                Err(HandlerError::Cancelled)
            }
            fn on_ddl(&self, _: LogPosition) -> Result<(), HandlerError> {
                unreachable!()
            }
            fn on_xid(&self, _: LogPosition) -> Result<(), HandlerError> {
                unreachable!()
            }
            fn on_row(&self, _: RowsEvent) -> Result<(), HandlerError> {
                unreachable!()
            }
        }

        let source = JsonLinesSource::new(Cursor::new(LOG));
        let err = source.run_from(None, Arc::new(Refuse)).unwrap_err();

        assert!(err.is_cancelled());
    }
}
