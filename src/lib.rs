//! Execute Postgres-dialect SQL against Oracle-style engines.
//!
//! `sql_bridge` is a compatibility and resilience layer: statements written
//! in PostgreSQL conventions (LIMIT/OFFSET pagination, `->>`/`?` JSON
//! operators, `NOW()`, `ILIKE`, native booleans) are rewritten losslessly
//! into the target dialect and executed through a bounded pool of driver
//! sessions, with circuit breaking over transient connection failures,
//! statement-fingerprint caching, transactions with savepoints, and bulk
//! array-bound operations. Failures come back normalized into a stable
//! taxonomy instead of raw engine error text.
//!
//! The physical driver is pluggable: implement
//! [`driver::SessionFactory`] / [`driver::DriverSession`] for your driver and
//! hand the factory to [`SqlBridge::connect`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sql_bridge::prelude::*;
//!
//! # async fn demo(factory: Arc<dyn sql_bridge::driver::SessionFactory>) -> Result<(), SqlBridgeError> {
//! let bridge = SqlBridge::connect(factory, BridgeConfig::default()).await?;
//!
//! let mut binds = BindMap::new();
//! binds.insert("id".into(), SqlValue::Int(42));
//! let outcome = bridge
//!     .execute(
//!         "SELECT * FROM photos WHERE owner_id = :id LIMIT 10",
//!         &binds,
//!         &ExecOptions::default().with_cache(true),
//!     )
//!     .await?;
//! # let _ = outcome;
//! # Ok(()) }
//! ```

pub mod bulk;
pub mod cache;
pub mod driver;
pub mod error;
pub mod executor;
pub mod pool;
pub mod results;
pub mod taxonomy;
pub mod transaction;
pub mod translation;
pub mod types;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub mod prelude;

pub use error::SqlBridgeError;
pub use executor::{BridgeConfig, ExecOptions, QueryOutcome, SqlBridge};
