//! Streaming layer for flatfile.
//!
//! This crate provides:
//! - Cooperative row streams that yield to the scheduler between rows
//! - A callback driver with exactly one terminal callback per pass
//! - Column projection, distinct, and set difference over flatfiles

pub mod column;
pub mod stream;

pub use column::{
    ColumnScanner, ColumnStream, collect_column, collect_difference, collect_distinct,
    column_difference, column_distinct, column_get,
};
pub use stream::{RowConsumer, RowStream, StreamOutcome, open_stream, stream, stream_with};
