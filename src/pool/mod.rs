//! Connection pool and resilience manager.
//!
//! A bounded deadpool of driver sessions with a circuit breaker, health
//! probing, and rolling usage telemetry layered on top. All resilience state
//! is owned by the [`BridgePool`] instance; nothing here is process-global.

pub mod breaker;
pub mod config;
mod manager;
pub mod telemetry;

pub use breaker::{CircuitBreaker, CircuitBreakerState};
pub use config::PoolSettings;
pub use telemetry::{PoolTelemetry, UsageReport};

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use deadpool::Runtime;
use deadpool::managed::{Object, Pool, PoolError};

use crate::driver::{DriverError, DriverOutcome, SessionFactory};
use crate::error::SqlBridgeError;
use crate::taxonomy;
use crate::types::BindMap;
use manager::SessionManager;

/// Sizes reported by [`BridgePool::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetrics {
    pub max_connections: usize,
    pub min_connections: usize,
    pub total_connections: usize,
    pub active_connections: usize,
    pub available_connections: usize,
    pub waiting_requests: usize,
}

/// Everything [`BridgePool::detailed_statistics`] knows.
#[derive(Debug, Clone)]
pub struct DetailedPoolStatistics {
    pub metrics: PoolMetrics,
    pub usage: UsageReport,
    pub breaker: CircuitBreakerState,
}

/// Result of a health probe round trip.
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub is_healthy: bool,
    pub database_status: String,
    pub error_details: Option<String>,
}

/// Classification of one raw failure, for callers deciding whether to retry.
#[derive(Debug, Clone)]
pub struct FailureDisposition {
    pub error_code: Option<u32>,
    pub is_retryable: bool,
    pub suggested_action: String,
}

/// Lock helper that survives poisoning; telemetry and breaker state stay
/// usable even if a panicking thread held the guard.
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Bounded pool of driver sessions with failure isolation.
pub struct BridgePool {
    pool: Pool<SessionManager>,
    settings: PoolSettings,
    breaker: Mutex<CircuitBreaker>,
    telemetry: Arc<Mutex<PoolTelemetry>>,
}

impl std::fmt::Debug for BridgePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgePool")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BridgePool {
    /// Build the pool and prewarm `pool_min` sessions, growing by
    /// `pool_increment` per step.
    ///
    /// # Errors
    /// Returns `ConfigError` for invalid sizings and `ConnectionError` when
    /// prewarm sessions cannot be established.
    pub async fn initialize(
        factory: Arc<dyn SessionFactory>,
        settings: PoolSettings,
    ) -> Result<Self, SqlBridgeError> {
        settings.validate().map_err(SqlBridgeError::ConfigError)?;

        let pool = Pool::builder(SessionManager::new(factory))
            .max_size(settings.pool_max)
            .wait_timeout(Some(settings.acquire_timeout))
            .create_timeout(Some(settings.acquire_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| SqlBridgeError::ConfigError(format!("pool construction failed: {e}")))?;

        let this = Self {
            pool,
            telemetry: Arc::new(Mutex::new(PoolTelemetry::new(
                settings.enable_statistics,
                settings.pool_max,
            ))),
            breaker: Mutex::new(CircuitBreaker::new(
                settings.breaker_threshold,
                settings.breaker_cooldown,
            )),
            settings,
        };
        this.prewarm().await?;
        tracing::info!(
            min = this.settings.pool_min,
            max = this.settings.pool_max,
            "session pool initialized"
        );
        Ok(this)
    }

    /// Open `pool_min` sessions in `pool_increment`-sized steps and park them
    /// in the idle set.
    async fn prewarm(&self) -> Result<(), SqlBridgeError> {
        let target = self.settings.pool_min.min(self.settings.pool_max);
        let mut warm = Vec::with_capacity(target);
        while warm.len() < target {
            let step = self
                .settings
                .pool_increment
                .max(1)
                .min(target - warm.len());
            for _ in 0..step {
                let obj = self.pool.get().await.map_err(|e| {
                    SqlBridgeError::ConnectionError(format!("pool prewarm failed: {e}"))
                })?;
                warm.push(obj);
            }
        }
        Ok(())
    }

    /// Check a session out of the pool.
    ///
    /// Fails fast with `CircuitOpen` while the breaker is open, and with
    /// `PoolExhausted` when the pool stays at capacity for the whole acquire
    /// timeout. A successful checkout counts as a breaker probe success.
    ///
    /// # Errors
    /// `CircuitOpen`, `PoolExhausted`, or `ConnectionError`.
    pub async fn acquire(&self) -> Result<PooledSession, SqlBridgeError> {
        if let Err(retry_in) = lock_unpoisoned(&self.breaker).check() {
            return Err(SqlBridgeError::CircuitOpen { retry_in });
        }

        let wait_started = Instant::now();
        match self.pool.get().await {
            Ok(obj) => {
                lock_unpoisoned(&self.breaker).record_success();
                lock_unpoisoned(&self.telemetry).note_acquire();
                Ok(PooledSession {
                    obj,
                    telemetry: self.telemetry.clone(),
                })
            }
            Err(PoolError::Timeout(_)) => Err(SqlBridgeError::PoolExhausted {
                waited: wait_started.elapsed(),
            }),
            Err(PoolError::Backend(err)) => {
                let disposition = self.handle_failure(&err);
                tracing::error!(
                    code = ?disposition.error_code,
                    retryable = disposition.is_retryable,
                    "failed to establish session: {err}"
                );
                Err(SqlBridgeError::ConnectionError(err.to_string()))
            }
            Err(other) => Err(SqlBridgeError::ConnectionError(other.to_string())),
        }
    }

    /// Classify a raw driver failure and feed the breaker when it is a
    /// transient connectivity condition. Non-retryable failures
    /// (authentication, constraints) never touch the breaker.
    pub fn handle_failure(&self, err: &DriverError) -> FailureDisposition {
        let code = taxonomy::extract_code(err);
        let is_retryable = taxonomy::is_retryable(err);
        if is_retryable {
            lock_unpoisoned(&self.breaker).record_retryable_failure();
        }
        let (kind, _severity) = taxonomy::classify(code);
        FailureDisposition {
            error_code: code,
            is_retryable,
            suggested_action: taxonomy::suggested_action(kind, None),
        }
    }

    /// Issue a trivial round trip on a pooled session.
    pub async fn health_check(&self) -> HealthStatus {
        match self.acquire().await {
            Ok(mut session) => match session.ping().await {
                Ok(()) => HealthStatus {
                    is_healthy: true,
                    database_status: "available".into(),
                    error_details: None,
                },
                Err(err) => {
                    self.handle_failure(&err);
                    HealthStatus {
                        is_healthy: false,
                        database_status: "unreachable".into(),
                        error_details: Some(err.to_string()),
                    }
                }
            },
            Err(err) => HealthStatus {
                is_healthy: false,
                database_status: "unavailable".into(),
                error_details: Some(err.to_string()),
            },
        }
    }

    #[must_use]
    pub fn status(&self) -> PoolMetrics {
        let status = self.pool.status();
        PoolMetrics {
            max_connections: status.max_size,
            min_connections: self.settings.pool_min,
            total_connections: status.size,
            active_connections: status.size.saturating_sub(status.available),
            available_connections: status.available,
            waiting_requests: status.waiting,
        }
    }

    #[must_use]
    pub fn detailed_statistics(&self) -> DetailedPoolStatistics {
        DetailedPoolStatistics {
            metrics: self.status(),
            usage: lock_unpoisoned(&self.telemetry).report(),
            breaker: self.breaker_state(),
        }
    }

    #[must_use]
    pub fn breaker_state(&self) -> CircuitBreakerState {
        lock_unpoisoned(&self.breaker).state()
    }

    #[must_use]
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }
}

/// One checked-out session. Exclusively owned until dropped; dropping returns
/// the session to the pool on every exit path.
pub struct PooledSession {
    obj: Object<SessionManager>,
    telemetry: Arc<Mutex<PoolTelemetry>>,
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession").finish_non_exhaustive()
    }
}

impl PooledSession {
    /// Execute one statement, recording its latency in pool telemetry.
    ///
    /// # Errors
    /// Propagates the raw driver error; classification happens upstream.
    pub async fn execute(
        &mut self,
        sql: &str,
        binds: &BindMap,
    ) -> Result<DriverOutcome, DriverError> {
        let started = Instant::now();
        let result = self.obj.execute(sql, binds).await;
        lock_unpoisoned(&self.telemetry).note_latency(started.elapsed());
        result
    }

    /// Execute one statement once per bind row.
    ///
    /// # Errors
    /// Propagates the raw driver error.
    pub async fn execute_many(
        &mut self,
        sql: &str,
        batches: &[BindMap],
    ) -> Result<u64, DriverError> {
        let started = Instant::now();
        let result = self.obj.execute_many(sql, batches).await;
        lock_unpoisoned(&self.telemetry).note_latency(started.elapsed());
        result
    }

    /// Trivial round trip.
    ///
    /// # Errors
    /// Propagates the raw driver error.
    pub async fn ping(&mut self) -> Result<(), DriverError> {
        self.obj.ping().await
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        lock_unpoisoned(&self.telemetry).note_release();
    }
}
