//! Reader handle for sequential scans.

use crate::header::FileHeader;
use crate::row::{RowFrame, read_row};
use flatfile_common::{FlatfileError, Result, Row, Schema, StorageConfig};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Cursor state of a reader.
enum ReaderState {
    /// The file did not exist when opened; behaves as an exhausted cursor.
    Missing,
    /// Open cursor positioned at `offset`.
    Open {
        file: BufReader<File>,
        offset: u64,
        exhausted: bool,
    },
    /// Released by `close`.
    Closed,
}

/// Forward-only reader over the rows of a file.
pub struct Reader {
    /// Path to the file.
    path: PathBuf,
    /// Schema from the header, empty for a missing file.
    schema: Schema,
    /// Configuration.
    config: StorageConfig,
    /// Cursor state.
    state: ReaderState,
    /// Number of rows returned so far.
    rows_read: u64,
}

impl Reader {
    /// Opens a file for sequential reading.
    ///
    /// A missing file is not an error: the returned reader has an empty
    /// schema and reports end of data on the first read.
    pub fn open(path: impl AsRef<Path>, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "flatfile missing, opening empty reader");
                return Ok(Self {
                    path,
                    schema: Schema::new(),
                    config,
                    state: ReaderState::Missing,
                    rows_read: 0,
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut file = BufReader::with_capacity(config.read_buffer_size, file);
        let (header, offset) = FileHeader::read_from(&mut file)?;

        debug!(
            path = %path.display(),
            columns = header.schema.len(),
            "opened flatfile for read"
        );

        Ok(Self {
            path,
            schema: header.schema,
            config,
            state: ReaderState::Open {
                file,
                offset,
                exhausted: false,
            },
            rows_read: 0,
        })
    }

    /// Opens a file for reading and checks its schema against `expected`.
    ///
    /// A missing file passes the check.
    pub fn open_checked(
        path: impl AsRef<Path>,
        expected: &Schema,
        config: StorageConfig,
    ) -> Result<Self> {
        let reader = Self::open(path, config)?;
        if !reader.is_missing() {
            reader.schema.check_matches(expected)?;
        }
        Ok(reader)
    }

    /// Returns the path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the schema from the header.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns true if the file did not exist when opened.
    pub fn is_missing(&self) -> bool {
        matches!(self.state, ReaderState::Missing)
    }

    /// Returns true once the handle has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ReaderState::Closed)
    }

    /// Returns the number of rows returned so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Returns the byte offset of the next row, or None if there is no file.
    pub fn offset(&self) -> Option<u64> {
        match &self.state {
            ReaderState::Open { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Decodes the next row in write order.
    ///
    /// Returns `Ok(None)` at end of data. A row cut short by the end of the
    /// file is reported as a decode error.
    pub fn read_next_row(&mut self) -> Result<Option<Row>> {
        let (file, offset, exhausted) = match &mut self.state {
            ReaderState::Closed => return Err(FlatfileError::ClosedHandle),
            ReaderState::Missing => return Ok(None),
            ReaderState::Open {
                file,
                offset,
                exhausted,
            } => (file, offset, exhausted),
        };
        if *exhausted {
            return Ok(None);
        }

        match read_row(&self.schema, file, *offset, self.config.verify_checksums)? {
            RowFrame::Row { row, size } => {
                *offset += size;
                self.rows_read += 1;
                Ok(Some(row))
            }
            RowFrame::End => {
                *exhausted = true;
                Ok(None)
            }
            RowFrame::Truncated { bytes_read } => Err(FlatfileError::decode(
                *offset,
                format!("truncated row after {} bytes", bytes_read),
            )),
        }
    }

    /// Releases the file. Closing twice is a no-op.
    pub fn close(&mut self) {
        if !self.is_closed() {
            debug!(path = %self.path.display(), rows = self.rows_read, "closed flatfile reader");
            self.state = ReaderState::Closed;
        }
    }
}

impl Iterator for Reader {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next_row().transpose()
    }
}
