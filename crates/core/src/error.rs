//! Core error model.

use thiserror::Error;

/// Result type used by the core value types.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failures produced while building or inspecting core values.
///
/// These are deterministic input problems (bad text, inconsistent events).
/// I/O and delivery failures live in the crates that do the I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A log position could not be parsed from its text form.
    #[error("invalid log position: {0}")]
    InvalidPosition(String),

    /// A row event violated its own shape (e.g. unpaired update images).
    #[error("malformed event: {0}")]
    MalformedEvent(String),
}

impl CoreError {
    pub fn invalid_position(msg: impl Into<String>) -> Self {
        Self::InvalidPosition(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEvent(msg.into())
    }
}
