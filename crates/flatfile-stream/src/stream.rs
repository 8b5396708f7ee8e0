//! Cooperative row streaming.
//!
//! A stream is a single forward pass over a reader. Every step yields to the
//! async scheduler before touching the file, so a scan of any length runs
//! with constant stack depth and never starves other tasks on the runtime.
//!
//! Each pass ends in exactly one of three ways: completion, error, or a stop
//! requested by the consumer. All three release the underlying file.

use flatfile_common::{FlatfileError, Result, Row, Schema, StorageConfig};
use flatfile_storage::Reader;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::trace;

/// How a stream pass ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// End of data was reached.
    Completed { emitted: u64 },
    /// The consumer asked to stop.
    Stopped { emitted: u64 },
    /// A read failed and the error was reported.
    Failed { emitted: u64 },
    /// The requested column does not exist. The lookup error was reported
    /// and the pass completed without reading any row.
    Unresolved,
}

impl StreamOutcome {
    /// Returns the number of items handed to the consumer.
    pub fn emitted(&self) -> u64 {
        match *self {
            StreamOutcome::Completed { emitted }
            | StreamOutcome::Stopped { emitted }
            | StreamOutcome::Failed { emitted } => emitted,
            StreamOutcome::Unresolved => 0,
        }
    }

    /// Returns true if end of data was reached.
    pub fn is_completed(&self) -> bool {
        matches!(self, StreamOutcome::Completed { .. })
    }
}

/// Single-consumer pull stream over the rows of a reader.
pub struct RowStream {
    /// Reader, None once released.
    reader: Option<Reader>,
    /// Schema of the underlying file.
    schema: Schema,
    /// Set once end of data or an error has been returned.
    finished: bool,
    /// Rows returned so far.
    rows: u64,
}

impl RowStream {
    /// Wraps a reader positioned at its first row.
    pub fn new(reader: Reader) -> Self {
        let schema = reader.schema().clone();
        Self {
            reader: Some(reader),
            schema,
            finished: false,
            rows: 0,
        }
    }

    /// Returns the schema of the file being streamed.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Returns the number of rows returned so far.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Returns true once the stream has reached end of data or failed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Returns true once the underlying reader has been released.
    pub fn is_released(&self) -> bool {
        self.reader.is_none()
    }

    /// Yields to the scheduler, then reads the next row.
    ///
    /// Returns None after end of data. An error is returned once and ends
    /// the stream. Calling this after `close` returns `ClosedHandle`.
    pub async fn next(&mut self) -> Option<Result<Row>> {
        if self.finished {
            return None;
        }
        tokio::task::yield_now().await;

        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Some(Err(FlatfileError::ClosedHandle)),
        };

        match reader.read_next_row() {
            Ok(Some(row)) => {
                self.rows += 1;
                Some(Ok(row))
            }
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                self.finish();
                Some(Err(e))
            }
        }
    }

    /// Stops the stream and releases the reader.
    pub fn close(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            reader.close();
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.close();
    }
}

/// Opens a file and streams its rows.
///
/// A missing file yields a stream that completes without rows.
pub fn open_stream(path: impl AsRef<Path>, config: StorageConfig) -> Result<RowStream> {
    Reader::open(path, config).map(RowStream::new)
}

/// Receiver of the callbacks of one stream pass.
pub trait RowConsumer {
    /// Called for each row in write order. `Break` stops the stream.
    fn on_row(&mut self, row: Row) -> ControlFlow<()>;

    /// Called at most once, when a read fails.
    fn on_error(&mut self, err: FlatfileError);

    /// Called at most once, at end of data.
    fn on_complete(&mut self);
}

/// Drives a full pass over `reader`, delivering callbacks to `consumer`.
///
/// Exactly one of `on_error` or `on_complete` fires unless the consumer
/// stops the stream, in which case neither does.
pub async fn stream<C>(reader: Reader, consumer: &mut C) -> StreamOutcome
where
    C: RowConsumer + ?Sized,
{
    let mut rows = RowStream::new(reader);
    loop {
        match rows.next().await {
            Some(Ok(row)) => {
                trace!(row = rows.rows(), "stream row");
                if consumer.on_row(row).is_break() {
                    rows.close();
                    return StreamOutcome::Stopped {
                        emitted: rows.rows(),
                    };
                }
            }
            Some(Err(e)) => {
                consumer.on_error(e);
                return StreamOutcome::Failed {
                    emitted: rows.rows(),
                };
            }
            None => {
                consumer.on_complete();
                return StreamOutcome::Completed {
                    emitted: rows.rows(),
                };
            }
        }
    }
}

/// Closure form of [`stream`].
pub async fn stream_with<E, R, C>(
    reader: Reader,
    on_error: E,
    on_row: R,
    on_complete: C,
) -> StreamOutcome
where
    E: FnOnce(FlatfileError),
    R: FnMut(Row) -> ControlFlow<()>,
    C: FnOnce(),
{
    let mut consumer = Callbacks {
        on_error: Some(on_error),
        on_row,
        on_complete: Some(on_complete),
    };
    stream(reader, &mut consumer).await
}

struct Callbacks<E, R, C> {
    on_error: Option<E>,
    on_row: R,
    on_complete: Option<C>,
}

impl<E, R, C> RowConsumer for Callbacks<E, R, C>
where
    E: FnOnce(FlatfileError),
    R: FnMut(Row) -> ControlFlow<()>,
    C: FnOnce(),
{
    fn on_row(&mut self, row: Row) -> ControlFlow<()> {
        (self.on_row)(row)
    }

    fn on_error(&mut self, err: FlatfileError) {
        if let Some(f) = self.on_error.take() {
            f(err);
        }
    }

    fn on_complete(&mut self) {
        if let Some(f) = self.on_complete.take() {
            f();
        }
    }
}
