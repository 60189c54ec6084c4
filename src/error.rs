use std::time::Duration;

use thiserror::Error;

use crate::driver::DriverError;
use crate::taxonomy::QueryFailure;

#[derive(Debug, Error)]
pub enum SqlBridgeError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The circuit breaker is open; no physical work was attempted.
    #[error("Database temporarily unavailable; retry in {retry_in:?}")]
    CircuitOpen { retry_in: Duration },

    /// The pool stayed at capacity for the whole acquire timeout.
    #[error("Connection pool exhausted after waiting {waited:?}")]
    PoolExhausted { waited: Duration },

    /// The statement ran longer than the caller's timeout.
    #[error("Statement timed out after {elapsed:?}")]
    Timeout { elapsed: Duration },

    /// A statement failed and was normalized by the taxonomy mapper.
    #[error("{0}")]
    Query(QueryFailure),

    /// Raw driver failure on a path that bypasses the taxonomy (health
    /// probes, pool recycling).
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Transaction error: {0}")]
    TransactionError(String),

    #[error("Parameter conversion error: {0}")]
    ParameterError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),
}

impl SqlBridgeError {
    /// The normalized failure, when this error went through the taxonomy.
    #[must_use]
    pub fn query_failure(&self) -> Option<&QueryFailure> {
        if let SqlBridgeError::Query(failure) = self {
            Some(failure)
        } else {
            None
        }
    }
}
