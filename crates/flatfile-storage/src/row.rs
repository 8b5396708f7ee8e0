//! Row validation and serialization.
//!
//! Row format on disk:
//! - null bitmap: ceil(columns / 8) bytes, bit `i` set when column `i` is null
//! - values: each non-null column in schema order
//!   - u32: 4 bytes
//!   - u64: 8 bytes
//!   - string: 1-byte marker + 4-byte stored length + stored bytes
//! - checksum: 4 bytes (CRC32 of bitmap + values)
//!
//! The string marker is `0` for raw UTF-8 or `L` for an LZ4 block whose
//! first 4 bytes hold the decompressed length. A compressed form is only
//! stored when it is smaller than the raw bytes.
//!
//! Rows carry no length prefix. The schema alone drives decoding, so a file
//! can only be scanned forward from the first row.

use crate::constants::{
    CHECKSUM_SIZE, MAX_LZ4_RATIO, MAX_STRING_LEN, MIN_COMPRESS_LEN, STRING_LEN_SIZE,
    STRING_MARKER_LZ4, STRING_MARKER_RAW, STRING_MARKER_SIZE, null_bitmap_size,
};
use bytes::{BufMut, BytesMut};
use flatfile_common::{ColumnType, CompressionType, FlatfileError, Result, Row, Schema, Value};
use std::io::{ErrorKind, Read};

/// Checks a row against the schema without encoding it.
pub fn validate_row(schema: &Schema, values: &[Value]) -> Result<()> {
    if values.len() != schema.len() {
        return Err(FlatfileError::ArityMismatch {
            expected: schema.len(),
            actual: values.len(),
        });
    }

    for (column, value) in schema.columns().zip(values) {
        match (column.ctype, value) {
            (_, Value::Null) if !column.nullable => {
                return Err(FlatfileError::NullNotAllowed {
                    column: column.name.clone(),
                });
            }
            (_, Value::Null) | (ColumnType::U32, Value::U32(_)) | (ColumnType::U64, Value::U64(_)) => {}
            (ColumnType::String, Value::String(s)) => {
                if s.len() > MAX_STRING_LEN {
                    return Err(FlatfileError::ValueTooLarge {
                        column: column.name.clone(),
                        size: s.len(),
                    });
                }
            }
            (expected, actual) => {
                return Err(FlatfileError::TypeMismatch {
                    column: column.name.clone(),
                    expected: expected.to_string(),
                    actual: actual.type_name().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Returns the encoded size of a row that passed validation, with strings
/// stored raw. Compression never makes a row larger than this.
pub fn encoded_size(values: &[Value]) -> usize {
    let payload: usize = values
        .iter()
        .map(|v| match v {
            Value::String(s) => STRING_MARKER_SIZE + STRING_LEN_SIZE + s.len(),
            other => other
                .column_type()
                .and_then(|ctype| ctype.fixed_size())
                .unwrap_or(0),
        })
        .sum();
    null_bitmap_size(values.len()) + payload + CHECKSUM_SIZE
}

/// Validates a row and appends its encoding to `buf`.
pub fn encode_row(
    schema: &Schema,
    values: &[Value],
    compression: CompressionType,
    buf: &mut BytesMut,
) -> Result<()> {
    validate_row(schema, values)?;

    let start = buf.len();
    buf.reserve(encoded_size(values));

    let mut bitmap = vec![0u8; null_bitmap_size(values.len())];
    for (i, value) in values.iter().enumerate() {
        if value.is_null() {
            bitmap[i / 8] |= 1 << (i % 8);
        }
    }
    buf.put_slice(&bitmap);

    for value in values {
        match value {
            Value::Null => {}
            Value::U32(v) => buf.put_u32_le(*v),
            Value::U64(v) => buf.put_u64_le(*v),
            Value::String(s) => put_string(buf, s, compression),
        }
    }

    let checksum = crc32fast::hash(&buf[start..]);
    buf.put_u32_le(checksum);
    Ok(())
}

fn put_string(buf: &mut BytesMut, s: &str, compression: CompressionType) {
    if compression == CompressionType::Lz4 && s.len() >= MIN_COMPRESS_LEN {
        let packed = lz4_flex::compress_prepend_size(s.as_bytes());
        if packed.len() < s.len() {
            buf.put_u8(STRING_MARKER_LZ4);
            buf.put_u32_le(packed.len() as u32);
            buf.put_slice(&packed);
            return;
        }
    }
    buf.put_u8(STRING_MARKER_RAW);
    buf.put_u32_le(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Turns a stored string back into its UTF-8 bytes.
fn unpack_string(marker: u8, stored: Vec<u8>, column: &str, offset: u64) -> Result<Vec<u8>> {
    match marker {
        STRING_MARKER_RAW => Ok(stored),
        STRING_MARKER_LZ4 => {
            // Bound the allocation before trusting the stored size.
            let declared = match stored.get(..4) {
                Some(b) => u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as u64,
                None => 0,
            };
            if stored.len() < 4 || declared > stored.len() as u64 * MAX_LZ4_RATIO {
                return Err(FlatfileError::decode(
                    offset,
                    format!("column {} holds an invalid lz4 size", column),
                ));
            }
            lz4_flex::decompress_size_prepended(&stored).map_err(|e| {
                FlatfileError::decode(
                    offset,
                    format!("column {} holds corrupt lz4 data: {}", column, e),
                )
            })
        }
        other => Err(FlatfileError::decode(
            offset,
            format!("column {} has unknown string encoding {}", column, other),
        )),
    }
}

/// Result of reading one row frame from a stream of bytes.
#[derive(Debug)]
pub(crate) enum RowFrame {
    /// A complete row and its size on disk.
    Row { row: Row, size: u64 },
    /// Clean end of data at a row boundary.
    End,
    /// The data ended partway through a row.
    Truncated { bytes_read: u64 },
}

/// Decodes the next row starting at `offset`.
pub(crate) fn read_row<R: Read>(
    schema: &Schema,
    reader: &mut R,
    offset: u64,
    verify_checksum: bool,
) -> Result<RowFrame> {
    let mut frame = FrameReader {
        reader,
        hasher: crc32fast::Hasher::new(),
        read: 0,
    };

    let mut bitmap = vec![0u8; null_bitmap_size(schema.len())];
    match frame.fill(&mut bitmap)? {
        0 => return Ok(RowFrame::End),
        n if n < bitmap.len() => return Ok(RowFrame::Truncated { bytes_read: n as u64 }),
        _ => {}
    }

    let mut values = Vec::with_capacity(schema.len());
    for (i, column) in schema.columns().enumerate() {
        if bitmap[i / 8] & (1 << (i % 8)) != 0 {
            if !column.nullable {
                return Err(FlatfileError::decode(
                    offset,
                    format!("null in non-nullable column {}", column.name),
                ));
            }
            values.push(Value::Null);
            continue;
        }

        let value = match column.ctype {
            ColumnType::U32 => {
                let mut buf = [0u8; 4];
                if !frame.fill_exact(&mut buf)? {
                    return Ok(frame.truncated());
                }
                Value::U32(u32::from_le_bytes(buf))
            }
            ColumnType::U64 => {
                let mut buf = [0u8; 8];
                if !frame.fill_exact(&mut buf)? {
                    return Ok(frame.truncated());
                }
                Value::U64(u64::from_le_bytes(buf))
            }
            ColumnType::String => {
                let mut marker = [0u8; STRING_MARKER_SIZE];
                let mut len_buf = [0u8; STRING_LEN_SIZE];
                if !frame.fill_exact(&mut marker)? || !frame.fill_exact(&mut len_buf)? {
                    return Ok(frame.truncated());
                }
                let len = u32::from_le_bytes(len_buf) as u64;
                let mut stored = Vec::new();
                if !frame.fill_vec(&mut stored, len)? {
                    return Ok(frame.truncated());
                }
                let bytes = unpack_string(marker[0], stored, &column.name, offset)?;
                let s = String::from_utf8(bytes).map_err(|_| {
                    FlatfileError::decode(
                        offset,
                        format!("column {} holds invalid UTF-8", column.name),
                    )
                })?;
                Value::String(s)
            }
        };
        values.push(value);
    }

    let computed = frame.hasher.clone().finalize();
    let mut checksum = [0u8; CHECKSUM_SIZE];
    if !frame.fill_exact(&mut checksum)? {
        return Ok(frame.truncated());
    }
    if verify_checksum && u32::from_le_bytes(checksum) != computed {
        return Err(FlatfileError::decode(offset, "row checksum mismatch"));
    }

    Ok(RowFrame::Row {
        row: Row::new(values),
        size: frame.read,
    })
}

/// Tracks bytes consumed and the running checksum of one row.
struct FrameReader<'a, R: Read> {
    reader: &'a mut R,
    hasher: crc32fast::Hasher,
    read: u64,
}

impl<R: Read> FrameReader<'_, R> {
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = read_up_to(self.reader, buf)?;
        self.hasher.update(&buf[..n]);
        self.read += n as u64;
        Ok(n)
    }

    fn fill_exact(&mut self, buf: &mut [u8]) -> Result<bool> {
        Ok(self.fill(buf)? == buf.len())
    }

    /// Reads exactly `len` bytes into `out` without trusting `len` for allocation.
    fn fill_vec(&mut self, out: &mut Vec<u8>, len: u64) -> Result<bool> {
        let n = (&mut *self.reader).take(len).read_to_end(out)?;
        self.hasher.update(out);
        self.read += n as u64;
        Ok(n as u64 == len)
    }

    fn truncated(&self) -> RowFrame {
        RowFrame::Truncated {
            bytes_read: self.read,
        }
    }
}

/// Reads until `buf` is full or the reader reaches end of file.
///
/// Returns the number of bytes read.
pub(crate) fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
