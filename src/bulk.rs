//! Bulk operation batcher.
//!
//! Splits large record sets into fixed-size chunks and issues one array-bound
//! statement per chunk, aggregating partial successes and failures instead of
//! aborting the whole run.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::future::join_all;

use crate::error::SqlBridgeError;
use crate::pool::BridgePool;
use crate::taxonomy::{self, QueryFailure};
use crate::types::{BindMap, valid_sql_identifier};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Chunking and failure-handling knobs for one bulk run.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    /// Rows per array-bound statement.
    pub batch_size: usize,
    /// Record chunk failures and keep going instead of stopping at the first
    /// failed chunk.
    pub continue_on_error: bool,
    /// Run chunks concurrently, each on its own pooled session. Implies
    /// continue-on-error execution: every chunk is attempted.
    pub parallel: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            continue_on_error: false,
            parallel: false,
        }
    }
}

impl BulkOptions {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }

    #[must_use]
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }
}

/// One failed chunk, located by index and row range.
#[derive(Debug, Clone)]
pub struct BulkChunkError {
    pub batch_index: usize,
    pub row_offset: usize,
    pub row_count: usize,
    pub failure: QueryFailure,
}

/// Aggregate outcome of a bulk run, built incrementally as chunks complete.
/// Counts are actuals: `total_processed` accounts for every input row, and
/// `success` is true only when no row failed.
#[derive(Debug, Clone, Default)]
pub struct BulkOperationResult {
    pub total_processed: usize,
    pub successful_rows: usize,
    pub failed_rows: usize,
    pub batch_count: usize,
    pub errors: Vec<BulkChunkError>,
    pub success: bool,
}

impl BulkOperationResult {
    fn record_success(&mut self, rows: usize) {
        self.total_processed += rows;
        self.successful_rows += rows;
        self.batch_count += 1;
    }

    fn record_failure(&mut self, err: BulkChunkError) {
        self.total_processed += err.row_count;
        self.failed_rows += err.row_count;
        self.batch_count += 1;
        self.errors.push(err);
    }

    /// Account for rows in chunks that were never issued after a stop.
    fn record_skipped(&mut self, rows: usize) {
        self.total_processed += rows;
        self.failed_rows += rows;
    }

    fn finalize(mut self) -> Self {
        self.success = self.failed_rows == 0;
        self
    }
}

/// Execute `sql` once per chunk of `rows`, array-binding each chunk.
pub(crate) async fn run_chunks(
    pool: &Arc<BridgePool>,
    sql: &str,
    rows: &[BindMap],
    options: &BulkOptions,
    locale: Option<&str>,
) -> Result<BulkOperationResult, SqlBridgeError> {
    let batch_size = options.batch_size.max(1);
    if rows.is_empty() {
        return Ok(BulkOperationResult::default().finalize());
    }

    if options.parallel {
        run_chunks_parallel(pool, sql, rows, batch_size, locale).await
    } else {
        run_chunks_sequential(pool, sql, rows, batch_size, options.continue_on_error, locale).await
    }
}

async fn run_chunks_sequential(
    pool: &Arc<BridgePool>,
    sql: &str,
    rows: &[BindMap],
    batch_size: usize,
    continue_on_error: bool,
    locale: Option<&str>,
) -> Result<BulkOperationResult, SqlBridgeError> {
    let mut session = pool.acquire().await?;
    let mut result = BulkOperationResult::default();

    let mut offset = 0;
    for (index, chunk) in rows.chunks(batch_size).enumerate() {
        match session.execute_many(sql, chunk).await {
            Ok(_affected) => result.record_success(chunk.len()),
            Err(err) => {
                pool.handle_failure(&err);
                result.record_failure(BulkChunkError {
                    batch_index: index,
                    row_offset: offset,
                    row_count: chunk.len(),
                    failure: taxonomy::map_driver_error(&err, locale),
                });
                if !continue_on_error {
                    result.record_skipped(rows.len() - offset - chunk.len());
                    break;
                }
            }
        }
        offset += chunk.len();
    }

    Ok(result.finalize())
}

async fn run_chunks_parallel(
    pool: &Arc<BridgePool>,
    sql: &str,
    rows: &[BindMap],
    batch_size: usize,
    locale: Option<&str>,
) -> Result<BulkOperationResult, SqlBridgeError> {
    let chunk_runs = rows.chunks(batch_size).enumerate().map(|(index, chunk)| {
        let pool = pool.clone();
        let row_offset = index * batch_size;
        async move {
            let outcome = match pool.acquire().await {
                Ok(mut session) => session.execute_many(sql, chunk).await.map_err(|err| {
                    pool.handle_failure(&err);
                    taxonomy::map_driver_error(&err, locale)
                }),
                Err(acquire_err) => Err(taxonomy::map_driver_error(
                    &crate::driver::DriverError::new(acquire_err.to_string()),
                    locale,
                )),
            };
            (index, row_offset, chunk.len(), outcome)
        }
    });

    let mut outcomes: Vec<_> = join_all(chunk_runs).await;
    outcomes.sort_by_key(|(index, ..)| *index);

    let mut result = BulkOperationResult::default();
    for (batch_index, row_offset, row_count, outcome) in outcomes {
        match outcome {
            Ok(_affected) => result.record_success(row_count),
            Err(failure) => result.record_failure(BulkChunkError {
                batch_index,
                row_offset,
                row_count,
                failure,
            }),
        }
    }
    Ok(result.finalize())
}

fn check_identifier(name: &str) -> Result<(), SqlBridgeError> {
    if valid_sql_identifier(name) {
        Ok(())
    } else {
        Err(SqlBridgeError::ParameterError(format!(
            "invalid identifier: {name:?}"
        )))
    }
}

/// Column names for a bulk run: the sorted union is taken from the first row
/// so every row binds the same placeholders.
pub(crate) fn column_set(rows: &[BindMap]) -> Result<Vec<String>, SqlBridgeError> {
    let first = rows.first().ok_or_else(|| {
        SqlBridgeError::ParameterError("bulk operation requires at least one row".into())
    })?;
    let columns: BTreeSet<&str> = first.keys().map(String::as_str).collect();
    let columns: Vec<String> = columns.into_iter().map(str::to_string).collect();
    for column in &columns {
        check_identifier(column)?;
    }
    Ok(columns)
}

pub(crate) fn build_insert(target: &str, columns: &[String]) -> Result<String, SqlBridgeError> {
    check_identifier(target)?;
    let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
    Ok(format!(
        "INSERT INTO {target} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    ))
}

pub(crate) fn build_update(
    target: &str,
    key_columns: &[String],
    update_columns: &[String],
) -> Result<String, SqlBridgeError> {
    check_identifier(target)?;
    if key_columns.is_empty() || update_columns.is_empty() {
        return Err(SqlBridgeError::ParameterError(
            "bulk update requires key and update columns".into(),
        ));
    }
    let assignments: Vec<String> = update_columns.iter().map(|c| format!("{c} = :{c}")).collect();
    let predicates: Vec<String> = key_columns.iter().map(|c| format!("{c} = :{c}")).collect();
    Ok(format!(
        "UPDATE {target} SET {} WHERE {}",
        assignments.join(", "),
        predicates.join(" AND ")
    ))
}

pub(crate) fn build_merge(
    target: &str,
    key_columns: &[String],
    update_columns: &[String],
    all_columns: &[String],
) -> Result<String, SqlBridgeError> {
    check_identifier(target)?;
    if key_columns.is_empty() {
        return Err(SqlBridgeError::ParameterError(
            "merge requires key columns".into(),
        ));
    }
    let source: Vec<String> = all_columns.iter().map(|c| format!(":{c} AS {c}")).collect();
    let on: Vec<String> = key_columns
        .iter()
        .map(|c| format!("{target}.{c} = src.{c}"))
        .collect();
    let update: Vec<String> = update_columns
        .iter()
        .map(|c| format!("{target}.{c} = src.{c}"))
        .collect();
    let insert_values: Vec<String> = all_columns.iter().map(|c| format!("src.{c}")).collect();

    let mut sql = format!(
        "MERGE INTO {target} USING (SELECT {} FROM DUAL) src ON ({})",
        source.join(", "),
        on.join(" AND ")
    );
    if !update.is_empty() {
        sql.push_str(&format!(" WHEN MATCHED THEN UPDATE SET {}", update.join(", ")));
    }
    sql.push_str(&format!(
        " WHEN NOT MATCHED THEN INSERT ({}) VALUES ({})",
        all_columns.join(", "),
        insert_values.join(", ")
    ));
    Ok(sql)
}
