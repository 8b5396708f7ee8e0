//! Writer handle for appending rows.

use crate::header::FileHeader;
use crate::row::{RowFrame, encode_row, read_row};
use bytes::BytesMut;
use flatfile_common::{FlatfileError, Result, Schema, StorageConfig, Value};
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive append handle on a single file.
///
/// Rows are buffered and reach the file on `flush`, `close`, or drop.
pub struct Writer {
    /// Path to the file.
    path: PathBuf,
    /// Schema read from or written to the header.
    schema: Schema,
    /// Configuration.
    config: StorageConfig,
    /// Buffered file handle, None once closed.
    file: Option<BufWriter<File>>,
    /// Sequence number of the next appended row.
    next_seq: u64,
    /// End of data in bytes, including buffered rows.
    end_offset: u64,
    /// Reusable encode buffer.
    scratch: BytesMut,
}

impl Writer {
    /// Creates a new file and persists the schema as its header.
    ///
    /// Fails if the path already exists.
    pub fn create(path: impl AsRef<Path>, schema: Schema, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();
        let header = FileHeader::new(schema);
        let header_bytes = header.serialize()?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => FlatfileError::AlreadyExists { path: path.clone() },
                _ => FlatfileError::Io(e),
            })?;

        let mut file = BufWriter::with_capacity(config.write_buffer_size, file);
        file.write_all(&header_bytes)?;
        file.flush()?;
        if config.fsync_on_flush {
            file.get_ref().sync_all()?;
        }

        debug!(
            path = %path.display(),
            columns = header.schema.len(),
            "created flatfile"
        );

        Ok(Self {
            path,
            schema: header.schema,
            config,
            file: Some(file),
            next_seq: 0,
            end_offset: header_bytes.len() as u64,
            scratch: BytesMut::new(),
        })
    }

    /// Reopens an existing file for append.
    ///
    /// The schema is read back from the header. The existing rows are scanned
    /// to find the end of data and the next sequence number; a partially
    /// written last row is trimmed when `truncate_torn_tail` is set.
    pub fn open_for_append(path: impl AsRef<Path>, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => FlatfileError::NotFound { path: path.clone() },
                _ => FlatfileError::Io(e),
            })?;

        let (schema, rows, end_offset, torn) = {
            let mut reader = BufReader::with_capacity(config.read_buffer_size, &file);
            let (header, header_size) = FileHeader::read_from(&mut reader)?;

            let mut offset = header_size;
            let mut rows = 0u64;
            let torn = loop {
                match read_row(&header.schema, &mut reader, offset, true)? {
                    RowFrame::Row { size, .. } => {
                        offset += size;
                        rows += 1;
                    }
                    RowFrame::End => break None,
                    RowFrame::Truncated { bytes_read } => break Some(bytes_read),
                }
            };
            (header.schema, rows, offset, torn)
        };

        if let Some(bytes_read) = torn {
            if !config.truncate_torn_tail {
                return Err(FlatfileError::decode(end_offset, "truncated row"));
            }
            warn!(
                path = %path.display(),
                offset = end_offset,
                bytes = bytes_read,
                "trimming partially written row"
            );
            file.set_len(end_offset)?;
            if config.fsync_on_flush {
                file.sync_all()?;
            }
        }

        let mut file = file;
        file.seek(SeekFrom::Start(end_offset))?;

        debug!(
            path = %path.display(),
            rows,
            offset = end_offset,
            "opened flatfile for append"
        );

        Ok(Self {
            path,
            schema,
            file: Some(BufWriter::with_capacity(config.write_buffer_size, file)),
            config,
            next_seq: rows,
            end_offset,
            scratch: BytesMut::new(),
        })
    }

    /// Reopens for append and checks the stored schema against `expected`.
    pub fn open_for_append_checked(
        path: impl AsRef<Path>,
        expected: &Schema,
        config: StorageConfig,
    ) -> Result<Self> {
        let writer = Self::open_for_append(path, config)?;
        writer.schema.check_matches(expected)?;
        Ok(writer)
    }

    /// Opens the file for append if it exists, otherwise creates it.
    ///
    /// When the file exists, the supplied schema is ignored in favor of the
    /// stored one.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        schema: Schema,
        config: StorageConfig,
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open_for_append(path, config)
        } else {
            Self::create(path, schema, config)
        }
    }

    /// Returns the path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the schema bound to the file.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the sequence number the next appended row will receive.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    /// Returns the end of data in bytes, including buffered rows.
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// Returns true once the handle has been closed.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Validates, encodes and appends a row.
    ///
    /// Returns the row's sequence number. A rejected row leaves the file
    /// untouched.
    pub fn append_row(&mut self, values: &[Value]) -> Result<u64> {
        let file = self.file.as_mut().ok_or(FlatfileError::ClosedHandle)?;

        self.scratch.clear();
        encode_row(
            &self.schema,
            values,
            self.config.compression,
            &mut self.scratch,
        )?;
        if let Err(e) = file.write_all(&self.scratch) {
            self.discard_partial_row();
            return Err(e.into());
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.end_offset += self.scratch.len() as u64;
        Ok(seq)
    }

    /// Cuts the file back to the end of the last complete row after a failed
    /// append. If that fails too, the handle is closed.
    fn discard_partial_row(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        match rollback(file, self.end_offset, self.config.write_buffer_size) {
            Ok(file) => {
                warn!(
                    path = %self.path.display(),
                    offset = self.end_offset,
                    "append failed, partial row removed"
                );
                self.file = Some(file);
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    offset = self.end_offset,
                    error = %e,
                    "append failed and partial row could not be removed, closing writer"
                );
            }
        }
    }

    /// Forces buffered rows to the file.
    pub fn flush(&mut self) -> Result<()> {
        let file = self.file.as_mut().ok_or(FlatfileError::ClosedHandle)?;
        file.flush()?;
        if self.config.fsync_on_flush {
            file.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Flushes and releases the file. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            if self.config.fsync_on_flush {
                file.get_ref().sync_all()?;
            }
            debug!(path = %self.path.display(), rows = self.next_seq, "closed flatfile writer");
        }
        Ok(())
    }
}

/// Output a writer appends rows to.
pub(crate) trait RowSink: Write + Seek {
    /// Cuts the output to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl RowSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Restores `out` to exactly `row_end` bytes of complete rows.
///
/// After a failed write, bytes up to the failure are either in the sink or
/// still buffered, in stream order. Buffered bytes before `row_end` belong to
/// earlier rows and are written out; everything past it is dropped.
pub(crate) fn rollback<W: RowSink>(
    out: BufWriter<W>,
    row_end: u64,
    capacity: usize,
) -> io::Result<BufWriter<W>> {
    let (mut inner, buffered) = out.into_parts();
    let buffered = buffered.unwrap_or_else(|panicked| panicked.into_inner());

    let written = inner.stream_position()?;
    if written < row_end {
        let missing = (row_end - written) as usize;
        let pending = buffered.get(..missing).ok_or_else(|| {
            io::Error::other("buffered data ends before the last complete row")
        })?;
        inner.write_all(pending)?;
    }
    inner.truncate(row_end)?;
    inner.seek(SeekFrom::Start(row_end))?;
    Ok(BufWriter::with_capacity(capacity, inner))
}

impl Drop for Writer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to close flatfile writer");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flatfile_common::ColumnType;
    use std::fs;
    use tempfile::tempdir;

    fn sample_schema() -> Schema {
        let mut schema = Schema::new();
        schema
            .add_column("s", ColumnType::String)
            .unwrap()
            .add_column("i64", ColumnType::U64)
            .unwrap()
            .add_column("i32", ColumnType::U32)
            .unwrap();
        schema
    }

    fn row(i: u32) -> Vec<Value> {
        vec![
            Value::from(i.to_string()),
            Value::U64(i as u64 * i as u64),
            Value::U32(i),
        ]
    }

    #[test]
    fn test_create_writes_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let mut writer = Writer::create(&path, sample_schema(), StorageConfig::default()).unwrap();
        assert_eq!(writer.next_seq(), 0);
        assert_eq!(writer.schema(), &sample_schema());
        writer.close().unwrap();

        let expected = FileHeader::new(sample_schema()).size_on_disk() as u64;
        assert_eq!(fs::metadata(&path).unwrap().len(), expected);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");
        fs::write(&path, b"occupied").unwrap();

        let result = Writer::create(&path, sample_schema(), StorageConfig::default());
        assert!(matches!(result, Err(FlatfileError::AlreadyExists { .. })));
        assert_eq!(fs::read(&path).unwrap(), b"occupied");
    }

    #[test]
    fn test_create_empty_schema_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let result = Writer::create(&path, Schema::new(), StorageConfig::default());
        assert!(matches!(result, Err(FlatfileError::InvalidSchema(_))));
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempdir().unwrap();
        let result = Writer::open_for_append(dir.path().join("nope.dat"), StorageConfig::default());
        assert!(matches!(result, Err(FlatfileError::NotFound { .. })));
    }

    #[test]
    fn test_sequence_numbers_continue_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        {
            let mut writer =
                Writer::create(&path, sample_schema(), StorageConfig::default()).unwrap();
            for i in 0..3 {
                assert_eq!(writer.append_row(&row(i)).unwrap(), i as u64);
            }
        }

        let mut writer = Writer::open_for_append(&path, StorageConfig::default()).unwrap();
        assert_eq!(writer.schema(), &sample_schema());
        assert_eq!(writer.next_seq(), 3);
        assert_eq!(writer.append_row(&row(3)).unwrap(), 3);
        writer.close().unwrap();

        let size = fs::metadata(&path).unwrap().len();
        assert_eq!(size, writer.end_offset());
    }

    #[test]
    fn test_rejected_row_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let mut writer = Writer::create(&path, sample_schema(), StorageConfig::default()).unwrap();
        writer.append_row(&row(1)).unwrap();
        let offset = writer.end_offset();

        let bad = vec![Value::U32(1), Value::U64(1), Value::U32(1)];
        assert!(matches!(
            writer.append_row(&bad),
            Err(FlatfileError::TypeMismatch { .. })
        ));
        assert!(matches!(
            writer.append_row(&row(1)[..2]),
            Err(FlatfileError::ArityMismatch { .. })
        ));
        assert_eq!(writer.end_offset(), offset);
        assert_eq!(writer.next_seq(), 1);
    }

    #[test]
    fn test_closed_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let mut writer = Writer::create(&path, sample_schema(), StorageConfig::default()).unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());
        writer.close().unwrap();

        assert!(matches!(
            writer.append_row(&row(0)),
            Err(FlatfileError::ClosedHandle)
        ));
        assert!(matches!(writer.flush(), Err(FlatfileError::ClosedHandle)));
    }

    #[test]
    fn test_torn_tail_is_trimmed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        let good_len = {
            let mut writer =
                Writer::create(&path, sample_schema(), StorageConfig::default()).unwrap();
            writer.append_row(&row(1)).unwrap();
            writer.append_row(&row(2)).unwrap();
            writer.close().unwrap();
            writer.end_offset()
        };

        // Simulate a crash partway through a third row.
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[0u8, 3, 0]);
        fs::write(&path, &bytes).unwrap();

        let strict = StorageConfig {
            truncate_torn_tail: false,
            ..Default::default()
        };
        assert!(matches!(
            Writer::open_for_append(&path, strict),
            Err(FlatfileError::Decode { .. })
        ));

        let mut writer = Writer::open_for_append(&path, StorageConfig::default()).unwrap();
        assert_eq!(writer.next_seq(), 2);
        assert_eq!(writer.end_offset(), good_len);
        assert_eq!(writer.append_row(&row(3)).unwrap(), 2);
        writer.close().unwrap();
    }

    #[test]
    fn test_open_or_create() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");

        {
            let mut writer =
                Writer::open_or_create(&path, sample_schema(), StorageConfig::default()).unwrap();
            writer.append_row(&row(0)).unwrap();
        }

        let mut other = Schema::new();
        other.add_column("unused", ColumnType::U32).unwrap();
        let writer = Writer::open_or_create(&path, other, StorageConfig::default()).unwrap();
        assert_eq!(writer.schema(), &sample_schema());
        assert_eq!(writer.next_seq(), 1);
    }

    #[test]
    fn test_open_for_append_checked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.dat");
        Writer::create(&path, sample_schema(), StorageConfig::default()).unwrap();

        assert!(
            Writer::open_for_append_checked(&path, &sample_schema(), StorageConfig::default())
                .is_ok()
        );

        let mut other = sample_schema();
        other.add_column("extra", ColumnType::U32).unwrap();
        assert!(matches!(
            Writer::open_for_append_checked(&path, &other, StorageConfig::default()),
            Err(FlatfileError::SchemaMismatch { .. })
        ));
    }

    /// In-memory sink that accepts bytes up to `limit`, then fails one write.
    struct FlakySink {
        inner: io::Cursor<Vec<u8>>,
        limit: Option<u64>,
    }

    impl FlakySink {
        fn new(limit: u64) -> Self {
            Self {
                inner: io::Cursor::new(Vec::new()),
                limit: Some(limit),
            }
        }
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(limit) = self.limit {
                let pos = self.inner.position();
                if pos >= limit {
                    self.limit = None;
                    return Err(io::Error::other("no space left"));
                }
                let room = (limit - pos) as usize;
                return self.inner.write(&buf[..buf.len().min(room)]);
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FlakySink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl RowSink for FlakySink {
        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.inner.get_mut().truncate(len as usize);
            Ok(())
        }
    }

    #[test]
    fn test_rollback_after_short_direct_write() {
        let mut out = BufWriter::with_capacity(8, FlakySink::new(12));
        out.write_all(b"0123456789").unwrap();
        let row_end = 10;

        // Larger than the buffer, so it goes straight to the sink and is cut
        // off after two bytes.
        assert!(out.write_all(&[b'x'; 20]).is_err());

        let mut out = rollback(out, row_end, 8).unwrap();
        out.write_all(b"XYZ").unwrap();
        out.flush().unwrap();
        assert_eq!(out.get_ref().inner.get_ref().as_slice(), b"0123456789XYZ");
    }

    #[test]
    fn test_rollback_keeps_buffered_rows() {
        let mut out = BufWriter::with_capacity(16, FlakySink::new(4));
        out.write_all(b"0123456789").unwrap();
        let row_end = 10;

        // Flushing the earlier row fails after four bytes; the rest of it is
        // still buffered.
        assert!(out.write_all(&[b'x'; 20]).is_err());

        let mut out = rollback(out, row_end, 16).unwrap();
        out.write_all(b"XYZ").unwrap();
        out.flush().unwrap();
        assert_eq!(out.get_ref().inner.get_ref().as_slice(), b"0123456789XYZ");
    }

    #[test]
    fn test_rollback_on_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("raw.dat");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .unwrap();

        let mut out = BufWriter::with_capacity(64, file);
        out.write_all(b"abc").unwrap();
        out.flush().unwrap();
        out.write_all(b"def").unwrap();
        out.write_all(b"partial").unwrap();

        let mut out = rollback(out, 6, 64).unwrap();
        out.write_all(b"g").unwrap();
        out.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"abcdefg");
    }
}
