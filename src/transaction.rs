//! Transaction and savepoint manager.
//!
//! A [`Transaction`] owns one checked-out session for the lifetime of a unit
//! of work. Exactly one of commit or rollback runs before the session goes
//! back to the pool; dropping an unfinished transaction rolls it back.

use std::collections::HashMap;
use std::sync::Arc;

use clap::ValueEnum;

use crate::error::SqlBridgeError;
use crate::executor::QueryOutcome;
use crate::pool::{BridgePool, PooledSession};
use crate::taxonomy;
use crate::translation::{Translator, coerce_binds};
use crate::types::{BindMap, valid_sql_identifier};

/// Isolation level requested at transaction start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    Serializable,
}

/// Fixed per-transaction settings, applied once before any statement and
/// immutable afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionContext {
    pub isolation: IsolationLevel,
    pub read_only: bool,
}

impl TransactionContext {
    #[must_use]
    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// The engine accepts one `SET TRANSACTION` per transaction; a read-only
    /// request wins over a non-default isolation level.
    fn opening_statement(&self) -> &'static str {
        if self.read_only {
            "SET TRANSACTION READ ONLY"
        } else {
            match self.isolation {
                IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
                IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
            }
        }
    }
}

/// Advisory marker inside one transaction. Only valid for the transaction
/// that created it, and only until that transaction ends or rolls back past
/// it.
#[derive(Debug, Clone)]
pub struct Savepoint {
    name: String,
    seq: u64,
}

impl Savepoint {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// One unit of work on one exclusively owned session.
pub struct Transaction {
    session: Option<PooledSession>,
    pool: Arc<BridgePool>,
    translator: Translator,
    convert_syntax: bool,
    convert_binds: bool,
    locale: Option<String>,
    savepoints: HashMap<String, u64>,
    next_seq: u64,
}

impl Transaction {
    pub(crate) async fn begin(
        pool: Arc<BridgePool>,
        ctx: TransactionContext,
        translator: Translator,
        convert_syntax: bool,
        convert_binds: bool,
        locale: Option<String>,
    ) -> Result<Self, SqlBridgeError> {
        let session = pool.acquire().await?;
        let mut tx = Self {
            session: Some(session),
            pool,
            translator,
            convert_syntax,
            convert_binds,
            locale,
            savepoints: HashMap::new(),
            next_seq: 0,
        };
        tx.run_raw(ctx.opening_statement(), &BindMap::new()).await?;
        Ok(tx)
    }

    fn session_mut(&mut self) -> Result<&mut PooledSession, SqlBridgeError> {
        self.session.as_mut().ok_or_else(|| {
            SqlBridgeError::TransactionError("transaction already completed".into())
        })
    }

    async fn run_raw(
        &mut self,
        sql: &str,
        binds: &BindMap,
    ) -> Result<QueryOutcome, SqlBridgeError> {
        let pool = self.pool.clone();
        let locale = self.locale.clone();
        let session = self.session_mut()?;
        match session.execute(sql, binds).await {
            Ok(outcome) => Ok(QueryOutcome {
                rows: outcome.rows,
                rows_affected: outcome.rows_affected,
                out_binds: outcome.out_binds,
                from_cache: false,
                rules_applied: 0,
            }),
            Err(err) => {
                pool.handle_failure(&err);
                Err(SqlBridgeError::Query(taxonomy::map_driver_error(
                    &err,
                    locale.as_deref(),
                )))
            }
        }
    }

    /// Execute one statement inside this transaction, with the same dialect
    /// and bind conversion the executor applies outside transactions.
    ///
    /// # Errors
    /// Returns the taxonomy-mapped failure, or `TransactionError` when the
    /// transaction has already completed.
    pub async fn execute(
        &mut self,
        sql: &str,
        binds: &BindMap,
    ) -> Result<QueryOutcome, SqlBridgeError> {
        let (sql_text, rules_applied) = if self.convert_syntax {
            let report = self.translator.translate_with_report(sql);
            (report.sql, report.total_applied)
        } else {
            (sql.to_string(), 0)
        };
        let bound = if self.convert_binds {
            coerce_binds(binds)
        } else {
            binds.clone()
        };
        let mut outcome = self.run_raw(&sql_text, &bound).await?;
        outcome.rules_applied = rules_applied;
        Ok(outcome)
    }

    /// Create a named savepoint.
    ///
    /// # Errors
    /// `TransactionError` for invalid names or duplicate live savepoints.
    pub async fn savepoint(&mut self, name: &str) -> Result<Savepoint, SqlBridgeError> {
        if !valid_sql_identifier(name) {
            return Err(SqlBridgeError::TransactionError(format!(
                "invalid savepoint name: {name:?}"
            )));
        }
        if self.savepoints.contains_key(name) {
            return Err(SqlBridgeError::TransactionError(format!(
                "savepoint {name} already exists"
            )));
        }
        self.run_raw(&format!("SAVEPOINT {name}"), &BindMap::new())
            .await?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.savepoints.insert(name.to_string(), seq);
        Ok(Savepoint {
            name: name.to_string(),
            seq,
        })
    }

    /// Undo every statement issued after the savepoint was created. Statements
    /// before it are untouched; savepoints created after it become invalid.
    ///
    /// # Errors
    /// `TransactionError` when the savepoint is unknown or stale.
    pub async fn rollback_to_savepoint(
        &mut self,
        savepoint: &Savepoint,
    ) -> Result<(), SqlBridgeError> {
        match self.savepoints.get(&savepoint.name) {
            Some(&seq) if seq == savepoint.seq => {}
            _ => {
                return Err(SqlBridgeError::TransactionError(format!(
                    "savepoint {} is not active in this transaction",
                    savepoint.name
                )));
            }
        }
        self.run_raw(
            &format!("ROLLBACK TO SAVEPOINT {}", savepoint.name),
            &BindMap::new(),
        )
        .await?;
        self.savepoints.retain(|_, &mut seq| seq <= savepoint.seq);
        Ok(())
    }

    /// Discard a savepoint handle. The engine drops savepoints implicitly at
    /// transaction end, so this is bookkeeping only; no round trip.
    ///
    /// # Errors
    /// `TransactionError` when the savepoint is unknown or stale.
    pub fn release_savepoint(&mut self, savepoint: &Savepoint) -> Result<(), SqlBridgeError> {
        match self.savepoints.remove(&savepoint.name) {
            Some(seq) if seq == savepoint.seq => Ok(()),
            Some(seq) => {
                // A newer savepoint reused the name; put it back.
                self.savepoints.insert(savepoint.name.clone(), seq);
                Err(SqlBridgeError::TransactionError(format!(
                    "savepoint {} is not active in this transaction",
                    savepoint.name
                )))
            }
            None => Err(SqlBridgeError::TransactionError(format!(
                "savepoint {} is not active in this transaction",
                savepoint.name
            ))),
        }
    }

    /// Commit and release the session.
    ///
    /// # Errors
    /// `TransactionError` when the commit round trip fails.
    pub async fn commit(mut self) -> Result<(), SqlBridgeError> {
        let pool = self.pool.clone();
        let mut session = self.session.take().ok_or_else(|| {
            SqlBridgeError::TransactionError("transaction already completed".into())
        })?;
        session.execute("COMMIT", &BindMap::new()).await.map_err(|err| {
            pool.handle_failure(&err);
            SqlBridgeError::TransactionError(format!("commit failed: {err}"))
        })?;
        Ok(())
    }

    /// Roll back and release the session.
    ///
    /// # Errors
    /// `TransactionError` when the rollback round trip fails.
    pub async fn rollback(mut self) -> Result<(), SqlBridgeError> {
        let pool = self.pool.clone();
        let mut session = self.session.take().ok_or_else(|| {
            SqlBridgeError::TransactionError("transaction already completed".into())
        })?;
        session.execute("ROLLBACK", &BindMap::new()).await.map_err(|err| {
            pool.handle_failure(&err);
            SqlBridgeError::TransactionError(format!("rollback failed: {err}"))
        })?;
        Ok(())
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take()
            && let Ok(handle) = tokio::runtime::Handle::try_current()
        {
            handle.spawn(async move {
                if let Err(err) = session.execute("ROLLBACK", &BindMap::new()).await {
                    tracing::warn!("rollback on drop failed: {err}");
                }
            });
        }
    }
}
