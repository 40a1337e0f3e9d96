//! Writes every changed row as one JSON object per line.

use std::io::Write;
use std::sync::Mutex;

use async_trait::async_trait;
use binsync_core::{Row, RowAction, RowsEvent};
use binsync_events::{Sink, SinkError};
use serde_json::{Value, json};

/// [`Sink`] emitting `{"schema","table","action","row"}` lines.
///
/// Updates also carry `"before"`. An update with a trailing unpaired image
/// emits that image without `"before"` rather than dropping it.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W> JsonLinesSink<W>
where
    W: Write + Send + 'static,
{
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(|e| e.into_inner())
    }
}

fn line(event: &RowsEvent, row: &Row, before: Option<&Row>) -> Value {
    let mut value = json!({
        "schema": event.table.schema,
        "table": event.table.name,
        "action": event.action,
        "row": row,
    });
    if let Some(before) = before {
        value["before"] = json!(before);
    }
    value
}

#[async_trait]
impl<W> Sink for JsonLinesSink<W>
where
    W: Write + Send + 'static,
{
    type Item = Value;

    fn translate(&self, event: &RowsEvent) -> Result<Vec<Value>, SinkError> {
        let items = match event.action {
            RowAction::Insert | RowAction::Delete => {
                event.rows.iter().map(|row| line(event, row, None)).collect()
            }
            RowAction::Update => {
                let mut items: Vec<Value> = event
                    .update_pairs()
                    .map(|(before, after)| line(event, after, Some(before)))
                    .collect();
                if event.rows.len() % 2 == 1 {
                    if let Some(last) = event.rows.last() {
                        items.push(line(event, last, None));
                    }
                }
                items
            }
        };
        Ok(items)
    }

    async fn publish(&self, items: &[Value]) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        for item in items {
            serde_json::to_writer(&mut *out, item)
                .map_err(|e| SinkError::publish(e.to_string()))?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use binsync_core::TableRef;

    use super::*;

    fn event(action: RowAction, rows: Vec<Row>) -> RowsEvent {
        RowsEvent::new(TableRef::new("shop", "orders"), action, rows)
    }

    #[test]
    fn inserts_become_one_line_per_row() {
        let sink = JsonLinesSink::new(Vec::new());

        let items = sink
            .translate(&event(RowAction::Insert, vec![vec![json!(1), json!("a")], vec![json!(2), json!("b")]]))
            .unwrap();

        assert_eq!(
            items,
            vec![
                json!({"schema": "shop", "table": "orders", "action": "insert", "row": [1, "a"]}),
                json!({"schema": "shop", "table": "orders", "action": "insert", "row": [2, "b"]}),
            ]
        );
    }

    #[test]
    fn updates_pair_before_and_after_images() {
        let sink = JsonLinesSink::new(Vec::new());

        let items = sink
            .translate(&event(
                RowAction::Update,
                vec![vec![json!(1), json!("old")], vec![json!(1), json!("new")], vec![json!(2), json!("x")]],
            ))
            .unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["before"], json!([1, "old"]));
        assert_eq!(items[0]["row"], json!([1, "new"]));
        assert!(items[1].get("before").is_none());
        assert_eq!(items[1]["row"], json!([2, "x"]));
    }

    #[tokio::test]
    async fn publish_writes_newline_delimited_json() {
        let sink = JsonLinesSink::new(Vec::new());
        let items = sink
            .translate(&event(RowAction::Delete, vec![vec![json!(7)]]))
            .unwrap();

        sink.publish(&items).await.unwrap();
        sink.publish(&items).await.unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["action"], "delete");
        assert_eq!(lines[0]["row"], json!([7]));
    }
}
