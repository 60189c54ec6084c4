//! Query executor: the root surface repository code talks to.
//!
//! Composes the translation engine, the statement cache, and the session pool
//! into one facade. Every failure leaving this module has been through the
//! taxonomy mapper or is one of the typed resilience errors (`CircuitOpen`,
//! `PoolExhausted`, `Timeout`).

mod cursor;
mod options;

pub use cursor::CursorResult;
pub use options::{ExecOptions, QueryOutcome};

use std::borrow::Cow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::stream::BoxStream;

use crate::bulk::{self, BulkOperationResult, BulkOptions};
use crate::cache::{CacheStats, EvictionPolicy, StatementCache};
use crate::driver::{DriverOutcome, SessionFactory};
use crate::error::SqlBridgeError;
use crate::pool::{
    BridgePool, CircuitBreakerState, DetailedPoolStatistics, HealthStatus, PoolMetrics,
    PoolSettings, PooledSession, lock_unpoisoned,
};
use crate::taxonomy;
use crate::transaction::{Transaction, TransactionContext};
use crate::translation::{Translator, coerce_binds};
use crate::types::BindMap;

/// Bridge-wide configuration: pool sizing plus executor defaults.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub pool: PoolSettings,
    pub max_cache_size: usize,
    pub cache_eviction_policy: EvictionPolicy,
    /// Default for the per-call `convert_syntax` option.
    pub convert_syntax: bool,
    /// Default for the per-call `convert_binds` option.
    pub convert_binds: bool,
    pub default_timeout: Option<Duration>,
    pub default_locale: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            pool: PoolSettings::default(),
            max_cache_size: 128,
            cache_eviction_policy: EvictionPolicy::default(),
            convert_syntax: true,
            convert_binds: true,
            default_timeout: None,
            default_locale: None,
        }
    }
}

impl BridgeConfig {
    #[must_use]
    pub fn with_pool(mut self, pool: PoolSettings) -> Self {
        self.pool = pool;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, max_size: usize, policy: EvictionPolicy) -> Self {
        self.max_cache_size = max_size;
        self.cache_eviction_policy = policy;
        self
    }

    #[must_use]
    pub fn with_syntax_conversion(mut self, enabled: bool) -> Self {
        self.convert_syntax = enabled;
        self
    }

    #[must_use]
    pub fn with_bind_conversion(mut self, enabled: bool) -> Self {
        self.convert_binds = enabled;
        self
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_default_locale(mut self, locale: impl Into<String>) -> Self {
        self.default_locale = Some(locale.into());
        self
    }
}

/// The query execution and resilience substrate.
pub struct SqlBridge {
    pool: Arc<BridgePool>,
    cache: Mutex<StatementCache>,
    translator: Translator,
    config: BridgeConfig,
}

impl std::fmt::Debug for SqlBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlBridge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqlBridge {
    /// Initialize the pool (prewarming `pool_min` sessions) and the executor
    /// around it.
    ///
    /// # Errors
    /// Returns `ConfigError` or `ConnectionError` when the pool cannot be
    /// brought up.
    pub async fn connect(
        factory: Arc<dyn SessionFactory>,
        config: BridgeConfig,
    ) -> Result<Self, SqlBridgeError> {
        let pool = BridgePool::initialize(factory, config.pool.clone()).await?;
        Ok(Self {
            pool: Arc::new(pool),
            cache: Mutex::new(StatementCache::new(
                config.max_cache_size,
                config.cache_eviction_policy,
            )),
            translator: Translator::new(),
            config,
        })
    }

    fn resolve_locale(&self, options: &ExecOptions) -> Option<String> {
        options
            .locale
            .clone()
            .or_else(|| self.config.default_locale.clone())
    }

    fn translate<'a>(&self, sql: &'a str, convert: bool) -> (Cow<'a, str>, usize) {
        if !convert {
            return (Cow::Borrowed(sql), 0);
        }
        let report = self.translator.translate_with_report(sql);
        if report.total_applied == 0 {
            tracing::debug!("dialect translation was a no-op");
            (Cow::Owned(report.sql), 0)
        } else {
            tracing::debug!(rules = report.total_applied, "dialect rules applied");
            (Cow::Owned(report.sql), report.total_applied)
        }
    }

    fn coerce<'a>(&self, binds: &'a BindMap, convert: bool) -> Cow<'a, BindMap> {
        if convert {
            Cow::Owned(coerce_binds(binds))
        } else {
            Cow::Borrowed(binds)
        }
    }

    fn consult_cache(&self, sql: &str, use_cache: bool) -> bool {
        if !use_cache {
            return false;
        }
        let mut cache = lock_unpoisoned(&self.cache);
        let hit = cache.lookup(sql);
        if !hit {
            cache.insert(sql);
        }
        hit
    }

    async fn run_timed(
        &self,
        session: &mut PooledSession,
        sql: &str,
        binds: &BindMap,
        timeout: Option<Duration>,
        locale: Option<&str>,
    ) -> Result<DriverOutcome, SqlBridgeError> {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, session.execute(sql, binds)).await {
                Ok(result) => result,
                Err(_) => return Err(SqlBridgeError::Timeout { elapsed: limit }),
            },
            None => session.execute(sql, binds).await,
        };
        result.map_err(|err| {
            self.pool.handle_failure(&err);
            SqlBridgeError::Query(taxonomy::map_driver_error(&err, locale))
        })
    }

    /// Execute one statement: translate, coerce binds, consult the cache,
    /// check a session out, run, and normalize any failure.
    ///
    /// # Errors
    /// `CircuitOpen` / `PoolExhausted` / `Timeout` for resilience failures,
    /// `Query` for statement failures.
    pub async fn execute(
        &self,
        sql: &str,
        binds: &BindMap,
        options: &ExecOptions,
    ) -> Result<QueryOutcome, SqlBridgeError> {
        let convert_syntax = options.convert_syntax.unwrap_or(self.config.convert_syntax);
        let convert_binds = options.convert_binds.unwrap_or(self.config.convert_binds);
        let locale = self.resolve_locale(options);

        let (sql_text, rules_applied) = self.translate(sql, convert_syntax);
        let from_cache = self.consult_cache(&sql_text, options.use_cache);
        let bound = self.coerce(binds, convert_binds);

        let mut session = self.pool.acquire().await?;
        let outcome = self
            .run_timed(
                &mut session,
                &sql_text,
                &bound,
                options.timeout.or(self.config.default_timeout),
                locale.as_deref(),
            )
            .await?;

        Ok(QueryOutcome {
            rows: outcome.rows,
            rows_affected: outcome.rows_affected,
            out_binds: outcome.out_binds,
            from_cache,
            rules_applied,
        })
    }

    /// Execute one statement once per bind row, chunked per `bulk`.
    ///
    /// # Errors
    /// Resilience errors only; per-chunk statement failures are recorded in
    /// the result, not thrown.
    pub async fn execute_batch(
        &self,
        sql: &str,
        bind_rows: &[BindMap],
        bulk: &BulkOptions,
        options: &ExecOptions,
    ) -> Result<BulkOperationResult, SqlBridgeError> {
        let convert_syntax = options.convert_syntax.unwrap_or(self.config.convert_syntax);
        let convert_binds = options.convert_binds.unwrap_or(self.config.convert_binds);
        let locale = self.resolve_locale(options);

        let (sql_text, _) = self.translate(sql, convert_syntax);
        let rows: Vec<BindMap> = if convert_binds {
            bind_rows.iter().map(|row| coerce_binds(row)).collect()
        } else {
            bind_rows.to_vec()
        };

        bulk::run_chunks(&self.pool, &sql_text, &rows, bulk, locale.as_deref()).await
    }

    /// Array-bound INSERT of `rows` into `target`.
    ///
    /// # Errors
    /// `ParameterError` for empty input or invalid identifiers; resilience
    /// errors from the pool.
    pub async fn execute_bulk_insert(
        &self,
        target: &str,
        rows: &[BindMap],
        bulk: &BulkOptions,
        options: &ExecOptions,
    ) -> Result<BulkOperationResult, SqlBridgeError> {
        let columns = bulk::column_set(rows)?;
        let sql = bulk::build_insert(target, &columns)?;
        self.execute_batch(&sql, rows, bulk, &batch_options(options))
            .await
    }

    /// Array-bound UPDATE of `rows` against `target`, matching on
    /// `key_columns` and assigning `update_columns` (defaults to every
    /// non-key column).
    ///
    /// # Errors
    /// `ParameterError` for empty input/keys; resilience errors from the pool.
    pub async fn execute_bulk_update(
        &self,
        target: &str,
        rows: &[BindMap],
        key_columns: &[String],
        update_columns: Option<&[String]>,
        bulk: &BulkOptions,
        options: &ExecOptions,
    ) -> Result<BulkOperationResult, SqlBridgeError> {
        let columns = bulk::column_set(rows)?;
        let updates = resolve_update_columns(&columns, key_columns, update_columns);
        let sql = bulk::build_update(target, key_columns, &updates)?;
        self.execute_batch(&sql, rows, bulk, &batch_options(options))
            .await
    }

    /// Array-bound MERGE (upsert by `key_columns`) of `rows` into `target`.
    ///
    /// # Errors
    /// `ParameterError` for empty input/keys; resilience errors from the pool.
    pub async fn execute_merge(
        &self,
        target: &str,
        rows: &[BindMap],
        key_columns: &[String],
        update_columns: Option<&[String]>,
        bulk: &BulkOptions,
        options: &ExecOptions,
    ) -> Result<BulkOperationResult, SqlBridgeError> {
        let columns = bulk::column_set(rows)?;
        let updates = resolve_update_columns(&columns, key_columns, update_columns);
        let sql = bulk::build_merge(target, key_columns, &updates, &columns)?;
        self.execute_batch(&sql, rows, bulk, &batch_options(options))
            .await
    }

    /// Open a transaction on an exclusively owned session. Prefer
    /// [`SqlBridge::execute_transaction`], which guarantees commit/rollback.
    ///
    /// # Errors
    /// Resilience errors from the pool, or `Query` when the opening
    /// `SET TRANSACTION` fails.
    pub async fn begin_transaction(
        &self,
        ctx: TransactionContext,
    ) -> Result<Transaction, SqlBridgeError> {
        Transaction::begin(
            self.pool.clone(),
            ctx,
            self.translator,
            self.config.convert_syntax,
            self.config.convert_binds,
            self.config.default_locale.clone(),
        )
        .await
    }

    /// Run a unit of work in a transaction: commit when the callback
    /// succeeds, roll back when it fails (or when it is dropped mid-flight).
    ///
    /// # Errors
    /// The callback's error after a best-effort rollback, or commit/rollback
    /// failures as `TransactionError`.
    pub async fn execute_transaction<T, F>(
        &self,
        ctx: TransactionContext,
        callback: F,
    ) -> Result<T, SqlBridgeError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Transaction) -> BoxFuture<'t, Result<T, SqlBridgeError>> + Send,
    {
        let mut tx = self.begin_transaction(ctx).await?;
        match callback(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("rollback after failed unit of work: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Fetch one page of `fetch_size` rows starting at `offset`. The
    /// statement must not carry its own pagination; the window is appended
    /// here. `has_more` is exact: one extra row is probed and discarded.
    ///
    /// # Errors
    /// Same as [`SqlBridge::execute`].
    pub async fn execute_query_with_cursor(
        &self,
        sql: &str,
        binds: &BindMap,
        offset: usize,
        fetch_size: usize,
        options: &ExecOptions,
    ) -> Result<CursorResult, SqlBridgeError> {
        let fetch = fetch_size.max(1);
        let convert_syntax = options.convert_syntax.unwrap_or(self.config.convert_syntax);
        let (sql_text, _) = self.translate(sql, convert_syntax);
        let windowed = cursor::windowed_statement(&sql_text, offset, fetch + 1);

        let inner = ExecOptions {
            convert_syntax: Some(false), // already translated
            ..options.clone()
        };
        let mut outcome = self.execute(&windowed, binds, &inner).await?;

        let has_more = outcome.rows.len() > fetch;
        if has_more {
            outcome.rows.rows.truncate(fetch);
            outcome.rows.rows_affected = fetch;
        }
        Ok(CursorResult {
            rows: outcome.rows,
            has_more,
        })
    }

    /// Stream a large result as a lazy, finite, forward-only sequence of row
    /// batches of `batch_size`. Each batch is fetched on demand with its own
    /// pooled session; nothing is read ahead.
    #[must_use]
    pub fn stream_query(
        &self,
        sql: &str,
        binds: &BindMap,
        batch_size: usize,
        options: &ExecOptions,
    ) -> BoxStream<'static, Result<crate::results::ResultSet, SqlBridgeError>> {
        let batch = batch_size.max(1);
        let convert_syntax = options.convert_syntax.unwrap_or(self.config.convert_syntax);
        let convert_binds = options.convert_binds.unwrap_or(self.config.convert_binds);
        let (sql_text, _) = self.translate(sql, convert_syntax);
        let sql_text = sql_text.into_owned();
        let bound = self.coerce(binds, convert_binds).into_owned();
        let locale = self.resolve_locale(options);
        let pool = self.pool.clone();

        Box::pin(futures_util::stream::try_unfold(
            (0usize, false),
            move |(offset, done)| {
                let sql_text = sql_text.clone();
                let bound = bound.clone();
                let locale = locale.clone();
                let pool = pool.clone();
                async move {
                    if done {
                        return Ok(None);
                    }
                    let windowed = cursor::windowed_statement(&sql_text, offset, batch);
                    let mut session = pool.acquire().await?;
                    match session.execute(&windowed, &bound).await {
                        Ok(outcome) => {
                            let fetched = outcome.rows.len();
                            if fetched == 0 {
                                Ok(None)
                            } else {
                                Ok(Some((outcome.rows, (offset + fetched, fetched < batch))))
                            }
                        }
                        Err(err) => {
                            pool.handle_failure(&err);
                            Err(SqlBridgeError::Query(taxonomy::map_driver_error(
                                &err,
                                locale.as_deref(),
                            )))
                        }
                    }
                }
            },
        ))
    }

    /// Trivial round trip through a pooled session.
    pub async fn health_check(&self) -> HealthStatus {
        self.pool.health_check().await
    }

    #[must_use]
    pub fn pool_status(&self) -> PoolMetrics {
        self.pool.status()
    }

    #[must_use]
    pub fn detailed_pool_statistics(&self) -> DetailedPoolStatistics {
        self.pool.detailed_statistics()
    }

    #[must_use]
    pub fn circuit_breaker_state(&self) -> CircuitBreakerState {
        self.pool.breaker_state()
    }

    #[must_use]
    pub fn cache_statistics(&self) -> CacheStats {
        lock_unpoisoned(&self.cache).stats()
    }

    /// Drop one cached statement (by fingerprint of `sql`).
    pub fn invalidate_cached_statement(&self, sql: &str) -> bool {
        lock_unpoisoned(&self.cache).invalidate(sql)
    }

    /// Drop every cached statement.
    pub fn clear_statement_cache(&self) {
        lock_unpoisoned(&self.cache).clear();
    }
}

/// Bulk statements bypass the statement cache.
fn batch_options(options: &ExecOptions) -> ExecOptions {
    ExecOptions {
        convert_syntax: options.convert_syntax,
        convert_binds: options.convert_binds,
        use_cache: false,
        locale: options.locale.clone(),
        timeout: options.timeout,
    }
}

fn resolve_update_columns(
    all_columns: &[String],
    key_columns: &[String],
    update_columns: Option<&[String]>,
) -> Vec<String> {
    match update_columns {
        Some(explicit) => explicit.to_vec(),
        None => all_columns
            .iter()
            .filter(|c| !key_columns.contains(*c))
            .cloned()
            .collect(),
    }
}
