//! Driver seam for the target engine.
//!
//! The bridge never talks to a wire protocol directly; a host application
//! plugs in a [`SessionFactory`] for its driver of choice and everything above
//! this module works in terms of [`SqlValue`] and [`ResultSet`].

use async_trait::async_trait;
use thiserror::Error;

use crate::results::ResultSet;
use crate::types::BindMap;

/// Raw error surfaced by a physical driver.
///
/// `code` carries the engine error number (e.g. `1017` for ORA-01017) when the
/// driver could extract one; the taxonomy mapper falls back to parsing
/// `message` otherwise.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    pub code: Option<u32>,
    pub message: String,
}

impl DriverError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn with_code(code: u32, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }
}

/// Result of one driver round trip.
#[derive(Debug, Clone, Default)]
pub struct DriverOutcome {
    /// Rows returned by a SELECT (empty for DML).
    pub rows: ResultSet,
    /// Rows affected by a DML statement.
    pub rows_affected: u64,
    /// OUT/RETURNING bind values, keyed by bind name.
    pub out_binds: BindMap,
}

/// One physical session with the target engine.
///
/// A session executes statements in submission order. Exclusive ownership is
/// enforced by `&mut self`: whoever checked the session out of the pool is the
/// only caller that can drive it until release.
#[async_trait]
pub trait DriverSession: Send {
    /// Execute one statement with named binds.
    async fn execute(&mut self, sql: &str, binds: &BindMap) -> Result<DriverOutcome, DriverError>;

    /// Execute one statement once per bind row (array binding). Returns the
    /// total number of rows affected across the batch.
    async fn execute_many(&mut self, sql: &str, batches: &[BindMap]) -> Result<u64, DriverError>;

    /// Trivial round trip used by health probes and pool recycling.
    async fn ping(&mut self) -> Result<(), DriverError>;
}

/// Opens new sessions for the pool.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Establish one new physical session.
    async fn connect(&self) -> Result<Box<dyn DriverSession>, DriverError>;
}
