//! Source readers bundled with the service.

pub mod json_lines;

pub use json_lines::JsonLinesSource;
