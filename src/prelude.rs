//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::bulk::{BulkChunkError, BulkOperationResult, BulkOptions};
pub use crate::cache::{CacheStats, EvictionPolicy};
pub use crate::driver::{DriverError, DriverOutcome, DriverSession, SessionFactory};
pub use crate::error::SqlBridgeError;
pub use crate::executor::{BridgeConfig, CursorResult, ExecOptions, QueryOutcome, SqlBridge};
pub use crate::pool::{
    CircuitBreakerState, DetailedPoolStatistics, FailureDisposition, HealthStatus, PoolMetrics,
    PoolSettings,
};
pub use crate::results::{DbRow, ResultSet};
pub use crate::taxonomy::{
    ConstraintInfo, ConstraintKind, QueryErrorKind, QueryFailure, Severity,
};
pub use crate::transaction::{IsolationLevel, Savepoint, Transaction, TransactionContext};
pub use crate::translation::{
    RuleCategory, TranslationReport, Translator, coerce_binds, coerce_value,
};
pub use crate::types::{BindMap, SqlValue};
