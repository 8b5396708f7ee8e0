//! Error types for flatfile.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using FlatfileError.
pub type Result<T> = std::result::Result<T, FlatfileError>;

/// Errors that can occur in flatfile operations.
#[derive(Debug, Error)]
pub enum FlatfileError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Handle lifecycle errors
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("File already exists: {}", path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Operation on closed handle")]
    ClosedHandle,

    // Schema errors
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Schema mismatch at column {index}: {reason}")]
    SchemaMismatch { index: usize, reason: String },

    // Row validation errors
    #[error("Type mismatch in column {column}: expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Null value not allowed in column {column}")]
    NullNotAllowed { column: String },

    #[error("Row arity mismatch: expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("Value too large in column {column}: {size} bytes")]
    ValueTooLarge { column: String, size: usize },

    // Format errors
    #[error("Decode error at offset {offset}: {reason}")]
    Decode { offset: u64, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl FlatfileError {
    /// Creates a decode error at the given byte offset.
    pub fn decode(offset: u64, reason: impl Into<String>) -> Self {
        FlatfileError::Decode {
            offset,
            reason: reason.into(),
        }
    }

    /// Returns true if the error reports corrupt or truncated file contents.
    pub fn is_decode(&self) -> bool {
        matches!(self, FlatfileError::Decode { .. })
    }
}
