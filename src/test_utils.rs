//! Scriptable stub driver for tests.
//!
//! All sessions opened by one [`StubFactory`] share one script: responses are
//! popped in execution order, connect/ping failures are queued, and every
//! executed statement is recorded for assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::driver::{DriverError, DriverOutcome, DriverSession, SessionFactory};
use crate::results::ResultSet;
use crate::types::{BindMap, SqlValue};

/// One scripted reply for `execute` / `execute_many`.
#[derive(Debug, Clone)]
pub enum StubResponse {
    Rows(ResultSet),
    Affected(u64),
    Fail(DriverError),
}

/// One recorded statement execution.
#[derive(Debug, Clone)]
pub struct ExecutedStatement {
    pub sql: String,
    pub binds: BindMap,
    /// `Some(n)` when the statement was array-bound over n rows.
    pub batch_len: Option<usize>,
}

#[derive(Default)]
struct StubState {
    connect_failures: Mutex<VecDeque<DriverError>>,
    connect_attempts: AtomicUsize,
    ping_failures: Mutex<VecDeque<DriverError>>,
    responses: Mutex<VecDeque<StubResponse>>,
    executed: Mutex<Vec<ExecutedStatement>>,
    execute_delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Factory whose sessions follow a shared script.
#[derive(Clone, Default)]
pub struct StubFactory {
    state: Arc<StubState>,
}

impl StubFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` connect attempts with clones of `err`.
    pub fn fail_next_connects(&self, n: usize, err: DriverError) {
        let mut queue = lock(&self.state.connect_failures);
        for _ in 0..n {
            queue.push_back(err.clone());
        }
    }

    /// Fail the next `n` pings (health probes and pool recycling both ping).
    pub fn fail_next_pings(&self, n: usize, err: DriverError) {
        let mut queue = lock(&self.state.ping_failures);
        for _ in 0..n {
            queue.push_back(err.clone());
        }
    }

    /// Queue a result-set reply.
    pub fn push_rows(&self, columns: &[&str], rows: Vec<Vec<SqlValue>>) {
        lock(&self.state.responses).push_back(StubResponse::Rows(make_rows(columns, rows)));
    }

    /// Queue a rows-affected reply.
    pub fn push_affected(&self, n: u64) {
        lock(&self.state.responses).push_back(StubResponse::Affected(n));
    }

    /// Queue a failure reply.
    pub fn push_failure(&self, err: DriverError) {
        lock(&self.state.responses).push_back(StubResponse::Fail(err));
    }

    /// Sleep this long inside every execute, to exercise timeouts and pool
    /// saturation.
    pub fn set_execute_delay(&self, delay: Option<Duration>) {
        *lock(&self.state.execute_delay) = delay;
    }

    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.state.connect_attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn executed(&self) -> Vec<ExecutedStatement> {
        lock(&self.state.executed).clone()
    }

    /// SQL texts of recorded statements, in execution order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        lock(&self.state.executed)
            .iter()
            .map(|e| e.sql.clone())
            .collect()
    }
}

/// Build a [`ResultSet`] from literal columns and rows.
#[must_use]
pub fn make_rows(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> ResultSet {
    let mut rs = ResultSet::with_capacity(rows.len());
    rs.set_column_names(columns.iter().map(|c| (*c).to_string()).collect());
    for row in rows {
        rs.add_row_values(row);
    }
    rs
}

#[async_trait]
impl SessionFactory for StubFactory {
    async fn connect(&self) -> Result<Box<dyn DriverSession>, DriverError> {
        self.state.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = lock(&self.state.connect_failures).pop_front() {
            return Err(err);
        }
        Ok(Box::new(StubSession {
            state: self.state.clone(),
        }))
    }
}

struct StubSession {
    state: Arc<StubState>,
}

impl StubSession {
    async fn delay(&self) {
        let delay = *lock(&self.state.execute_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn record(&self, sql: &str, binds: &BindMap, batch_len: Option<usize>) {
        lock(&self.state.executed).push(ExecutedStatement {
            sql: sql.to_string(),
            binds: binds.clone(),
            batch_len,
        });
    }
}

#[async_trait]
impl DriverSession for StubSession {
    async fn execute(&mut self, sql: &str, binds: &BindMap) -> Result<DriverOutcome, DriverError> {
        self.delay().await;
        self.record(sql, binds, None);
        match lock(&self.state.responses).pop_front() {
            None => Ok(DriverOutcome::default()),
            Some(StubResponse::Rows(rows)) => Ok(DriverOutcome {
                rows_affected: rows.len() as u64,
                rows,
                out_binds: BindMap::new(),
            }),
            Some(StubResponse::Affected(n)) => Ok(DriverOutcome {
                rows_affected: n,
                ..DriverOutcome::default()
            }),
            Some(StubResponse::Fail(err)) => Err(err),
        }
    }

    async fn execute_many(&mut self, sql: &str, batches: &[BindMap]) -> Result<u64, DriverError> {
        self.delay().await;
        self.record(sql, &BindMap::new(), Some(batches.len()));
        match lock(&self.state.responses).pop_front() {
            None | Some(StubResponse::Rows(_)) => Ok(batches.len() as u64),
            Some(StubResponse::Affected(n)) => Ok(n),
            Some(StubResponse::Fail(err)) => Err(err),
        }
    }

    async fn ping(&mut self) -> Result<(), DriverError> {
        match lock(&self.state.ping_failures).pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
