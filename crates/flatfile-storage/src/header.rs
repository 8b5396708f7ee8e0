//! File header: magic, version and the serialized schema.

use crate::constants::{
    CHECKSUM_SIZE, COLUMN_FLAG_NULLABLE, FILE_MAGIC, FORMAT_VERSION, HEADER_PREFIX_SIZE,
    MAX_COLUMN_NAME_LEN, MAX_COLUMNS, OFF_COLUMN_COUNT, OFF_VERSION,
};
use crate::row::read_up_to;
use bytes::{BufMut, Bytes, BytesMut};
use flatfile_common::{ColumnDef, ColumnType, FlatfileError, Result, Schema};
use std::io::Read;

/// Header at the beginning of every file.
///
/// Layout:
/// - magic: 4 bytes ("FLAT")
/// - version: 2 bytes
/// - column_count: 2 bytes
/// - per column: name_len (2 bytes), name (UTF-8), type tag (1 byte), flags (1 byte)
/// - checksum: 4 bytes (CRC32 of everything before it)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    /// Schema persisted in the header.
    pub schema: Schema,
}

impl FileHeader {
    /// Creates a header for the given schema.
    pub fn new(schema: Schema) -> Self {
        Self { schema }
    }

    /// Returns the encoded size of this header in bytes.
    pub fn size_on_disk(&self) -> usize {
        let columns: usize = self
            .schema
            .columns()
            .map(|c| 2 + c.name.len() + 2)
            .sum();
        HEADER_PREFIX_SIZE + columns + CHECKSUM_SIZE
    }

    /// Checks that the schema can be bound to a file.
    pub fn validate(&self) -> Result<()> {
        if self.schema.is_empty() {
            return Err(FlatfileError::InvalidSchema(
                "schema must have at least one column".to_string(),
            ));
        }
        if self.schema.len() > MAX_COLUMNS {
            return Err(FlatfileError::InvalidSchema(format!(
                "too many columns: {} (max {})",
                self.schema.len(),
                MAX_COLUMNS
            )));
        }
        for column in self.schema.columns() {
            if column.name.len() > MAX_COLUMN_NAME_LEN {
                return Err(FlatfileError::InvalidSchema(format!(
                    "column name too long: {} bytes (max {})",
                    column.name.len(),
                    MAX_COLUMN_NAME_LEN
                )));
            }
        }
        Ok(())
    }

    /// Serializes the header to bytes.
    pub fn serialize(&self) -> Result<Bytes> {
        self.validate()?;

        let mut buf = BytesMut::with_capacity(self.size_on_disk());
        buf.put_slice(&FILE_MAGIC);
        buf.put_u16_le(FORMAT_VERSION);
        buf.put_u16_le(self.schema.len() as u16);

        for column in self.schema.columns() {
            buf.put_u16_le(column.name.len() as u16);
            buf.put_slice(column.name.as_bytes());
            buf.put_u8(column.ctype as u8);
            buf.put_u8(if column.nullable { COLUMN_FLAG_NULLABLE } else { 0 });
        }

        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);

        Ok(buf.freeze())
    }

    /// Reads and validates a header from the start of a file.
    ///
    /// Returns the header and the number of bytes it occupied.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<(Self, u64)> {
        let mut hasher = crc32fast::Hasher::new();
        let mut offset = 0u64;

        let mut prefix = [0u8; HEADER_PREFIX_SIZE];
        read_header_bytes(reader, &mut prefix, &mut offset)?;
        hasher.update(&prefix);

        if prefix[0..4] != FILE_MAGIC {
            return Err(FlatfileError::decode(0, "invalid magic bytes"));
        }
        let version = u16::from_le_bytes([prefix[OFF_VERSION], prefix[OFF_VERSION + 1]]);
        if version != FORMAT_VERSION {
            return Err(FlatfileError::decode(
                OFF_VERSION as u64,
                format!("unsupported version: {}", version),
            ));
        }
        let column_count =
            u16::from_le_bytes([prefix[OFF_COLUMN_COUNT], prefix[OFF_COLUMN_COUNT + 1]]) as usize;
        if column_count == 0 {
            return Err(FlatfileError::decode(
                OFF_COLUMN_COUNT as u64,
                "header declares no columns",
            ));
        }

        let mut schema = Schema::new();
        for _ in 0..column_count {
            let entry_offset = offset;

            let mut len_buf = [0u8; 2];
            read_header_bytes(reader, &mut len_buf, &mut offset)?;
            hasher.update(&len_buf);
            let name_len = u16::from_le_bytes(len_buf) as usize;

            let mut name = vec![0u8; name_len];
            read_header_bytes(reader, &mut name, &mut offset)?;
            hasher.update(&name);
            let name = String::from_utf8(name)
                .map_err(|_| FlatfileError::decode(entry_offset, "column name is not UTF-8"))?;

            let mut tail = [0u8; 2];
            read_header_bytes(reader, &mut tail, &mut offset)?;
            hasher.update(&tail);
            let ctype = ColumnType::try_from(tail[0])
                .map_err(|e| FlatfileError::decode(entry_offset, e.to_string()))?;
            let nullable = tail[1] & COLUMN_FLAG_NULLABLE != 0;

            schema
                .push(ColumnDef::new(name, ctype, nullable))
                .map_err(|e| FlatfileError::decode(entry_offset, e.to_string()))?;
        }

        let checksum_offset = offset;
        let mut checksum = [0u8; CHECKSUM_SIZE];
        read_header_bytes(reader, &mut checksum, &mut offset)?;
        if u32::from_le_bytes(checksum) != hasher.finalize() {
            return Err(FlatfileError::decode(
                checksum_offset,
                "header checksum mismatch",
            ));
        }

        Ok((Self { schema }, offset))
    }
}

/// Fills `buf` from the header region, failing on a short read.
fn read_header_bytes<R: Read>(reader: &mut R, buf: &mut [u8], offset: &mut u64) -> Result<()> {
    let n = read_up_to(reader, buf)?;
    if n < buf.len() {
        return Err(FlatfileError::decode(*offset + n as u64, "truncated header"));
    }
    *offset += n as u64;
    Ok(())
}
