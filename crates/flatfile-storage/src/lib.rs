//! Storage backend for flatfile.
//!
//! This crate provides:
//! - The file header carrying the persisted schema
//! - Row validation and the row codec
//! - Writer handles for appending rows
//! - Reader handles for forward-only scans

pub mod constants;
pub mod header;
pub mod reader;
pub mod row;
pub mod writer;

pub use header::FileHeader;
pub use reader::Reader;
pub use row::{encode_row, encoded_size, validate_row};
pub use writer::Writer;
