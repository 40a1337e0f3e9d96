//! Row-level change events decoded from the source log.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::position::LogPosition;

/// One row image: column values in table column order.
pub type Row = Vec<serde_json::Value>;

/// Kind of row mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Insert,
    Update,
    Delete,
}

impl RowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowAction::Insert => "insert",
            RowAction::Update => "update",
            RowAction::Delete => "delete",
        }
    }
}

impl fmt::Display for RowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `schema.table` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// `schema.table`, the form used by publish allow-lists.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// A batch of row mutations against one table, as decoded from one log event.
///
/// Update events carry before/after image pairs: `rows[0]` is the before image
/// of the first changed row, `rows[1]` its after image, and so on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowsEvent {
    pub table: TableRef,
    pub action: RowAction,
    pub rows: Vec<Row>,

    /// Header position of the event, when the reader knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<LogPosition>,
}

impl RowsEvent {
    pub fn new(table: TableRef, action: RowAction, rows: Vec<Row>) -> Self {
        Self {
            table,
            action,
            rows,
            position: None,
        }
    }

    pub fn with_position(mut self, position: LogPosition) -> Self {
        self.position = Some(position);
        self
    }

    /// Number of logical rows affected by this event.
    ///
    /// For updates this is half the number of row images; an odd image count
    /// is reported as [`CoreError::MalformedEvent`].
    pub fn affected_rows(&self) -> CoreResult<usize> {
        match self.action {
            RowAction::Insert | RowAction::Delete => Ok(self.rows.len()),
            RowAction::Update => {
                if self.rows.len() % 2 != 0 {
                    return Err(CoreError::malformed(format!(
                        "update on {} must carry before/after pairs, got {} rows",
                        self.table,
                        self.rows.len()
                    )));
                }
                Ok(self.rows.len() / 2)
            }
        }
    }

    /// Iterate `(before, after)` image pairs of an update event.
    ///
    /// A trailing unpaired image is ignored; use [`RowsEvent::affected_rows`]
    /// to detect that case.
    pub fn update_pairs(&self) -> impl Iterator<Item = (&Row, &Row)> {
        self.rows.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
    }
}
