use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;

/// Lifecycle of a pipeline loop.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PipelineState {
    Running,
    /// Producers are gone; flushing what is left before closing.
    Draining,
    Closed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Running => "running",
            PipelineState::Draining => "draining",
            PipelineState::Closed => "closed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, lock-free view of a [`PipelineState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: PipelineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn get(&self) -> PipelineState {
        match self.0.load(Ordering::Acquire) {
            0 => PipelineState::Running,
            1 => PipelineState::Draining,
            _ => PipelineState::Closed,
        }
    }

    pub fn set(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(PipelineState::Running)
    }
}
