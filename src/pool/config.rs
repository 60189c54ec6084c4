use std::time::Duration;

/// Sizing and resilience settings for the session pool.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Sessions opened at initialization and kept alive.
    pub pool_min: usize,
    /// Hard upper bound on concurrently open sessions.
    pub pool_max: usize,
    /// Sessions opened per growth step while prewarming.
    pub pool_increment: usize,
    /// How long an acquire may queue before failing with exhaustion.
    pub acquire_timeout: Duration,
    /// Collect rolling usage/latency telemetry.
    pub enable_statistics: bool,
    /// Consecutive retryable failures before the breaker opens.
    pub breaker_threshold: u32,
    /// Cool-down before the open breaker admits a probe.
    pub breaker_cooldown: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            pool_min: 2,
            pool_max: 10,
            pool_increment: 1,
            acquire_timeout: Duration::from_secs(30),
            enable_statistics: true,
            breaker_threshold: 5,
            breaker_cooldown: Duration::from_secs(60),
        }
    }
}

impl PoolSettings {
    #[must_use]
    pub fn with_min(mut self, pool_min: usize) -> Self {
        self.pool_min = pool_min;
        self
    }

    #[must_use]
    pub fn with_max(mut self, pool_max: usize) -> Self {
        self.pool_max = pool_max;
        self
    }

    #[must_use]
    pub fn with_increment(mut self, pool_increment: usize) -> Self {
        self.pool_increment = pool_increment;
        self
    }

    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_statistics(mut self, enabled: bool) -> Self {
        self.enable_statistics = enabled;
        self
    }

    #[must_use]
    pub fn with_breaker(mut self, threshold: u32, cooldown: Duration) -> Self {
        self.breaker_threshold = threshold;
        self.breaker_cooldown = cooldown;
        self
    }

    /// Reject impossible sizings before any session is opened.
    ///
    /// # Errors
    /// Returns a message describing the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.pool_max == 0 {
            return Err("pool_max must be at least 1".into());
        }
        if self.pool_min > self.pool_max {
            return Err(format!(
                "pool_min ({}) exceeds pool_max ({})",
                self.pool_min, self.pool_max
            ));
        }
        if self.breaker_threshold == 0 {
            return Err("breaker_threshold must be at least 1".into());
        }
        Ok(())
    }
}
