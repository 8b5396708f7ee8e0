//! Configuration structures for flatfile handles.

use crate::error::{FlatfileError, Result};
use serde::{Deserialize, Serialize};

/// Default buffer size for reader and writer handles (64 KB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Storage configuration shared by writer and reader handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Capacity of the write buffer in bytes.
    pub write_buffer_size: usize,
    /// Capacity of the read buffer in bytes.
    pub read_buffer_size: usize,
    /// Call fsync when a writer is flushed or closed.
    pub fsync_on_flush: bool,
    /// Verify the per-row checksum while reading.
    pub verify_checksums: bool,
    /// Trim a partially written last row when reopening for append.
    pub truncate_torn_tail: bool,
    /// Compression applied to string values on write.
    pub compression: CompressionType,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: DEFAULT_BUFFER_SIZE,
            read_buffer_size: DEFAULT_BUFFER_SIZE,
            fsync_on_flush: true,
            verify_checksums: true,
            truncate_torn_tail: true,
            compression: CompressionType::Lz4,
        }
    }
}

/// Compression algorithm for string values.
///
/// Readers decode either form regardless of this setting, so files written
/// with different settings stay readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// Strings are stored as raw UTF-8.
    None,
    /// LZ4 block compression, kept only when smaller than the raw bytes.
    #[default]
    Lz4,
}

impl StorageConfig {
    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.write_buffer_size == 0 {
            return Err(FlatfileError::ConfigError(
                "write_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(FlatfileError::ConfigError(
                "read_buffer_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
