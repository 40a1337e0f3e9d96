//! Positions in a replicated source log.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A point in the source log: a segment (binlog file) plus a byte offset into it.
///
/// Positions are totally ordered within one source stream. The derived ordering
/// compares `segment` lexically first and `offset` numerically second, which
/// matches how segment files are named (`mysql-bin.000007` < `mysql-bin.000010`).
///
/// The text form is `<segment>:<offset>`; this is also the on-disk checkpoint
/// format.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogPosition {
    segment: String,
    offset: u64,
}

impl LogPosition {
    pub fn new(segment: impl Into<String>, offset: u64) -> Self {
        Self {
            segment: segment.into(),
            offset,
        }
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

impl FromStr for LogPosition {
    type Err = CoreError;

    /// Parse `<segment>:<offset>`.
    ///
    /// Surrounding whitespace is ignored. Exactly one `:` is accepted and the
    /// segment must be non-empty.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.split(':');

        let (segment, offset) = match (parts.next(), parts.next(), parts.next()) {
            (Some(segment), Some(offset), None) => (segment, offset),
            _ => {
                return Err(CoreError::invalid_position(format!(
                    "expected `<segment>:<offset>`, got {s:?}"
                )));
            }
        };

        if segment.is_empty() {
            return Err(CoreError::invalid_position(format!("empty segment in {s:?}")));
        }

        let offset = offset
            .parse::<u64>()
            .map_err(|e| CoreError::invalid_position(format!("offset {offset:?}: {e}")))?;

        Ok(Self::new(segment, offset))
    }
}
