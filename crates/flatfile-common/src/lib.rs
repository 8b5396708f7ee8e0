//! Flatfile common types, errors, and configuration.
//!
//! This crate provides the schema model and value vocabulary shared by the
//! storage and streaming crates.

pub mod config;
pub mod error;
pub mod row;
pub mod schema;
pub mod types;

pub use config::{CompressionType, StorageConfig};
pub use error::{FlatfileError, Result};
pub use row::Row;
pub use schema::{ColumnDef, Schema};
pub use types::{ColumnType, Value};
