//! Service surface: CLI configuration and the diagnostics HTTP API.

pub mod app;
pub mod cli;
