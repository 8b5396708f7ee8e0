//! Column algorithms built on row streaming.
//!
//! Every algorithm is a forward scan: `get` projects one column, `distinct`
//! filters that projection through a set seen so far, and `difference` builds
//! a set from one file's column and filters another file's column through it.
//! Each call owns its state, so concurrent calls never share anything.
//!
//! An unknown column is not a stream failure: no stream is opened, the lookup
//! error is reported, and the call completes at once with
//! [`StreamOutcome::Unresolved`].

use crate::stream::{RowStream, StreamOutcome};
use flatfile_common::{FlatfileError, Result, StorageConfig, Value};
use flatfile_storage::Reader;
use std::collections::HashSet;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::{debug, warn};

/// Pull stream over the values of one column.
pub struct ColumnStream {
    rows: RowStream,
    index: usize,
}

impl ColumnStream {
    /// Opens `path` and resolves `column` against its schema.
    ///
    /// A missing file has an empty schema, so every column lookup on it fails
    /// with `ColumnNotFound`.
    pub fn open(path: impl AsRef<Path>, column: &str, config: StorageConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = Reader::open(path, config)?;
        match reader.schema().index_of(column) {
            Some(index) => Ok(Self {
                rows: RowStream::new(reader),
                index,
            }),
            None => {
                warn!(path = %path.display(), column, "column not found");
                reader.close();
                Err(FlatfileError::ColumnNotFound(column.to_string()))
            }
        }
    }

    /// Returns the position of the column in the schema.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns the next value of the column, yielding to the scheduler first.
    pub async fn next(&mut self) -> Option<Result<Value>> {
        let row = match self.rows.next().await? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        let actual = row.len();
        Some(row.take(self.index).ok_or(FlatfileError::ArityMismatch {
            expected: self.rows.schema().len(),
            actual,
        }))
    }

    /// Stops the scan and releases the file.
    pub fn close(&mut self) {
        self.rows.close();
    }
}

/// Runs column algorithms with a shared storage configuration.
#[derive(Debug, Clone, Default)]
pub struct ColumnScanner {
    config: StorageConfig,
}

impl ColumnScanner {
    /// Creates a scanner that opens files with `config`.
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Returns the storage configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Opens a pull stream over one column.
    pub fn open(&self, path: impl AsRef<Path>, column: &str) -> Result<ColumnStream> {
        ColumnStream::open(path, column, self.config.clone())
    }

    /// Delivers every value of `column` in write order, nulls included.
    ///
    /// A stream fires exactly one of `on_error` or `on_complete` unless
    /// `on_value` returns `Break`. An unknown column fires `on_error` and then
    /// `on_complete`, without reading any row.
    pub async fn get<E, V, C>(
        &self,
        path: impl AsRef<Path>,
        column: &str,
        on_error: E,
        mut on_value: V,
        on_complete: C,
    ) -> StreamOutcome
    where
        E: FnOnce(FlatfileError),
        V: FnMut(Value) -> ControlFlow<()>,
        C: FnOnce(),
    {
        let mut values = match self.open(path, column) {
            Ok(values) => values,
            Err(e @ FlatfileError::ColumnNotFound(_)) => {
                on_error(e);
                on_complete();
                return StreamOutcome::Unresolved;
            }
            Err(e) => {
                on_error(e);
                return StreamOutcome::Failed { emitted: 0 };
            }
        };

        let mut emitted = 0u64;
        while let Some(item) = values.next().await {
            match item {
                Ok(value) => {
                    emitted += 1;
                    if on_value(value).is_break() {
                        values.close();
                        return StreamOutcome::Stopped { emitted };
                    }
                }
                Err(e) => {
                    values.close();
                    on_error(e);
                    return StreamOutcome::Failed { emitted };
                }
            }
        }
        on_complete();
        StreamOutcome::Completed { emitted }
    }

    /// Delivers each distinct value of `column` once, in first-seen order.
    ///
    /// Null counts as a value. Errors are passed through as `Err` and end the
    /// scan; end of data is the return of `Completed`. An unknown column is
    /// passed through the same way and returns `Unresolved`.
    pub async fn distinct<V>(
        &self,
        path: impl AsRef<Path>,
        column: &str,
        mut on_value: V,
    ) -> StreamOutcome
    where
        V: FnMut(Result<Value>) -> ControlFlow<()>,
    {
        let mut values = match self.open(path, column) {
            Ok(values) => values,
            Err(e) => {
                let outcome = match e {
                    FlatfileError::ColumnNotFound(_) => StreamOutcome::Unresolved,
                    _ => StreamOutcome::Failed { emitted: 0 },
                };
                let _ = on_value(Err(e));
                return outcome;
            }
        };

        let mut seen = HashSet::new();
        let mut emitted = 0u64;
        while let Some(item) = values.next().await {
            match item {
                Ok(value) => {
                    if seen.contains(&value) {
                        continue;
                    }
                    seen.insert(value.clone());
                    emitted += 1;
                    if on_value(Ok(value)).is_break() {
                        values.close();
                        return StreamOutcome::Stopped { emitted };
                    }
                }
                Err(e) => {
                    values.close();
                    let _ = on_value(Err(e));
                    return StreamOutcome::Failed { emitted };
                }
            }
        }
        debug!(distinct = seen.len(), "distinct scan complete");
        StreamOutcome::Completed { emitted }
    }

    /// Delivers the values of `column_a` in `path_a` that do not occur in
    /// `column_b` of `path_b`, in the order and multiplicity of `path_a`.
    ///
    /// The exclusion set is fully built from `path_b` before `path_a` is
    /// opened. A read error in either phase is reported once and ends the
    /// call. An unknown `column_b` is reported and leaves the set empty, so
    /// every value of `column_a` passes; an unknown `column_a` is reported
    /// and completes the call. Numbers compare by magnitude, so a u32 column
    /// can be diffed against a u64 column.
    #[allow(clippy::too_many_arguments)]
    pub async fn difference<E, V, C>(
        &self,
        path_a: impl AsRef<Path>,
        column_a: &str,
        path_b: impl AsRef<Path>,
        column_b: &str,
        mut on_error: E,
        mut on_value: V,
        on_complete: C,
    ) -> StreamOutcome
    where
        E: FnMut(FlatfileError),
        V: FnMut(Value) -> ControlFlow<()>,
        C: FnOnce(),
    {
        let exclude = match self.build_set(path_b, column_b).await {
            Ok(set) => set,
            Err(e @ FlatfileError::ColumnNotFound(_)) => {
                on_error(e);
                HashSet::new()
            }
            Err(e) => {
                on_error(e);
                return StreamOutcome::Failed { emitted: 0 };
            }
        };
        debug!(excluded = exclude.len(), "difference build phase complete");

        let mut scan = match self.open(path_a, column_a) {
            Ok(values) => values,
            Err(e @ FlatfileError::ColumnNotFound(_)) => {
                on_error(e);
                on_complete();
                return StreamOutcome::Unresolved;
            }
            Err(e) => {
                on_error(e);
                return StreamOutcome::Failed { emitted: 0 };
            }
        };

        let mut emitted = 0u64;
        while let Some(item) = scan.next().await {
            match item {
                Ok(value) => {
                    if contains_widened(&exclude, &value) {
                        continue;
                    }
                    emitted += 1;
                    if on_value(value).is_break() {
                        scan.close();
                        return StreamOutcome::Stopped { emitted };
                    }
                }
                Err(e) => {
                    scan.close();
                    on_error(e);
                    return StreamOutcome::Failed { emitted };
                }
            }
        }
        on_complete();
        StreamOutcome::Completed { emitted }
    }

    /// Collects every value of a column.
    pub async fn collect(&self, path: impl AsRef<Path>, column: &str) -> Result<Vec<Value>> {
        let mut values = self.open(path, column)?;
        let mut out = Vec::new();
        while let Some(item) = values.next().await {
            out.push(item?);
        }
        Ok(out)
    }

    /// Collects the distinct values of a column in first-seen order.
    pub async fn collect_distinct(
        &self,
        path: impl AsRef<Path>,
        column: &str,
    ) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        let mut failure = None;
        self.distinct(path, column, |item| {
            match item {
                Ok(value) => out.push(value),
                Err(e) => failure = Some(e),
            }
            ControlFlow::Continue(())
        })
        .await;
        match failure {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    /// Collects the values of `column_a` absent from `column_b`.
    pub async fn collect_difference(
        &self,
        path_a: impl AsRef<Path>,
        column_a: &str,
        path_b: impl AsRef<Path>,
        column_b: &str,
    ) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        let mut failure = None;
        self.difference(
            path_a,
            column_a,
            path_b,
            column_b,
            |e| {
                failure.get_or_insert(e);
            },
            |value| {
                out.push(value);
                ControlFlow::Continue(())
            },
            || {},
        )
        .await;
        match failure {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    async fn build_set(&self, path: impl AsRef<Path>, column: &str) -> Result<HashSet<Value>> {
        let mut values = self.open(path, column)?;
        let mut set = HashSet::new();
        while let Some(item) = values.next().await {
            set.insert(item?.widen());
        }
        Ok(set)
    }
}

/// Looks up `value` in a set of widened values without cloning it.
fn contains_widened(set: &HashSet<Value>, value: &Value) -> bool {
    match value {
        Value::U32(n) => set.contains(&Value::U64(u64::from(*n))),
        other => set.contains(other),
    }
}

/// Delivers every value of `column` using the default configuration.
pub async fn column_get<E, V, C>(
    path: impl AsRef<Path>,
    column: &str,
    on_error: E,
    on_value: V,
    on_complete: C,
) -> StreamOutcome
where
    E: FnOnce(FlatfileError),
    V: FnMut(Value) -> ControlFlow<()>,
    C: FnOnce(),
{
    ColumnScanner::default()
        .get(path, column, on_error, on_value, on_complete)
        .await
}

/// Delivers each distinct value of `column` using the default configuration.
pub async fn column_distinct<V>(
    path: impl AsRef<Path>,
    column: &str,
    on_value: V,
) -> StreamOutcome
where
    V: FnMut(Result<Value>) -> ControlFlow<()>,
{
    ColumnScanner::default().distinct(path, column, on_value).await
}

/// Delivers the set difference of two columns using the default configuration.
pub async fn column_difference<E, V, C>(
    path_a: impl AsRef<Path>,
    column_a: &str,
    path_b: impl AsRef<Path>,
    column_b: &str,
    on_error: E,
    on_value: V,
    on_complete: C,
) -> StreamOutcome
where
    E: FnMut(FlatfileError),
    V: FnMut(Value) -> ControlFlow<()>,
    C: FnOnce(),
{
    ColumnScanner::default()
        .difference(
            path_a,
            column_a,
            path_b,
            column_b,
            on_error,
            on_value,
            on_complete,
        )
        .await
}

/// Collects every value of a column using the default configuration.
pub async fn collect_column(path: impl AsRef<Path>, column: &str) -> Result<Vec<Value>> {
    ColumnScanner::default().collect(path, column).await
}

/// Collects the distinct values of a column using the default configuration.
pub async fn collect_distinct(path: impl AsRef<Path>, column: &str) -> Result<Vec<Value>> {
    ColumnScanner::default().collect_distinct(path, column).await
}

/// Collects a column difference using the default configuration.
pub async fn collect_difference(
    path_a: impl AsRef<Path>,
    column_a: &str,
    path_b: impl AsRef<Path>,
    column_b: &str,
) -> Result<Vec<Value>> {
    ColumnScanner::default()
        .collect_difference(path_a, column_a, path_b, column_b)
        .await
}
