//! On-disk format constants.

// File header constants

/// Magic bytes identifying a flatfile.
pub const FILE_MAGIC: [u8; 4] = *b"FLAT";

/// Current format version.
pub const FORMAT_VERSION: u16 = 1;

/// Size of the fixed header prefix: magic, version, column count.
pub const HEADER_PREFIX_SIZE: usize = 8;

/// Offset of the version field in the header.
pub const OFF_VERSION: usize = 4;

/// Offset of the column count field in the header.
pub const OFF_COLUMN_COUNT: usize = 6;

/// Column entry flag: column accepts null.
pub const COLUMN_FLAG_NULLABLE: u8 = 0x01;

/// Maximum number of columns in a schema.
pub const MAX_COLUMNS: usize = u16::MAX as usize;

/// Maximum column name length in bytes.
pub const MAX_COLUMN_NAME_LEN: usize = u16::MAX as usize;

// Row constants

/// Size of the checksum trailing the header and every row.
pub const CHECKSUM_SIZE: usize = 4;

/// Size of the length prefix of a string value.
pub const STRING_LEN_SIZE: usize = 4;

/// Maximum string value length in bytes.
pub const MAX_STRING_LEN: usize = u32::MAX as usize;

/// Size of the encoding marker in front of a string value.
pub const STRING_MARKER_SIZE: usize = 1;

/// String marker: raw UTF-8 bytes follow.
pub const STRING_MARKER_RAW: u8 = 0;

/// String marker: an LZ4 block prefixed with its decompressed size follows.
pub const STRING_MARKER_LZ4: u8 = b'L';

/// Strings shorter than this are never compressed.
pub const MIN_COMPRESS_LEN: usize = 16;

/// Upper bound of the LZ4 block expansion ratio.
pub const MAX_LZ4_RATIO: u64 = 255;

/// Returns the size of the null bitmap for a row of `columns` values.
#[inline]
pub const fn null_bitmap_size(columns: usize) -> usize {
    columns.div_ceil(8)
}
