//! Pluggable row transformation applied before publishing.

use binsync_core::RowsEvent;

/// Rewrites a row event before it is filtered and handed to the sink.
///
/// Typical uses: dropping sensitive columns, renaming tables, normalizing
/// values. Implementations run on the source reader thread and must be cheap.
pub trait RowMapper: Send + Sync {
    fn transform(&self, event: RowsEvent) -> RowsEvent;
}

/// The default mapper: passes events through untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityRowMapper;

impl RowMapper for IdentityRowMapper {
    fn transform(&self, event: RowsEvent) -> RowsEvent {
        event
    }
}
