//! `binsync-core` — value types shared by every layer of the sync pipeline.
//!
//! This crate is **pure data** (no I/O, no async): log positions, row change
//! events and the error model used to validate them.

pub mod error;
pub mod position;
pub mod row;

pub use error::{CoreError, CoreResult};
pub use position::LogPosition;
pub use row::{Row, RowAction, RowsEvent, TableRef};
