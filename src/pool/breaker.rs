use std::time::{Duration, Instant};

/// Failure isolation over repeated retryable connection failures.
///
/// Owned by one pool instance and shared behind its lock; there is no
/// process-wide breaker state. Opens after `threshold` consecutive retryable
/// failures, admits a single probe once the cool-down elapses, and closes on
/// the first successful probe.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    failure_count: u32,
    is_open: bool,
    last_failure_at: Option<Instant>,
    next_retry_at: Option<Instant>,
}

/// Read-only snapshot for telemetry surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerState {
    pub is_open: bool,
    pub failure_count: u32,
    /// Remaining cool-down, `None` when closed or already probeable.
    pub retry_in: Option<Duration>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            failure_count: 0,
            is_open: false,
            last_failure_at: None,
            next_retry_at: None,
        }
    }

    /// Gate an acquire. `Err(remaining)` means fail fast without touching the
    /// database; `Ok` either means closed, or open-but-probeable.
    pub fn check(&self) -> Result<(), Duration> {
        if !self.is_open {
            return Ok(());
        }
        match self.next_retry_at {
            Some(at) => {
                let now = Instant::now();
                if now >= at {
                    Ok(())
                } else {
                    Err(at - now)
                }
            }
            None => Ok(()),
        }
    }

    /// Record one retryable connection failure. Non-retryable failures must
    /// never reach this method.
    pub fn record_retryable_failure(&mut self) {
        self.failure_count += 1;
        self.last_failure_at = Some(Instant::now());
        if self.failure_count >= self.threshold {
            if !self.is_open {
                tracing::warn!(
                    failures = self.failure_count,
                    cooldown_secs = self.cooldown.as_secs(),
                    "circuit breaker opened"
                );
            }
            self.is_open = true;
            self.next_retry_at = Some(Instant::now() + self.cooldown);
        }
    }

    /// Record a successful acquire/probe: closes the breaker and resets the
    /// consecutive-failure count.
    pub fn record_success(&mut self) {
        if self.is_open {
            tracing::info!("circuit breaker closed after successful probe");
        }
        self.failure_count = 0;
        self.is_open = false;
        self.next_retry_at = None;
    }

    #[must_use]
    pub fn state(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            is_open: self.is_open,
            failure_count: self.failure_count,
            retry_in: self
                .next_retry_at
                .filter(|_| self.is_open)
                .and_then(|at| at.checked_duration_since(Instant::now())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let mut breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            breaker.record_retryable_failure();
            assert!(!breaker.state().is_open);
        }
        breaker.record_retryable_failure();
        assert!(breaker.state().is_open);
        assert!(breaker.check().is_err());
    }

    #[test]
    fn success_resets_failure_count() {
        let mut breaker = CircuitBreaker::new(5, Duration::from_secs(60));
        for _ in 0..4 {
            breaker.record_retryable_failure();
        }
        breaker.record_success();
        assert_eq!(breaker.state().failure_count, 0);
        breaker.record_retryable_failure();
        assert!(!breaker.state().is_open);
    }

    #[test]
    fn admits_probe_after_cooldown_and_closes_on_success() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_retryable_failure();
        assert!(breaker.state().is_open);
        // Zero cool-down: probe is admitted immediately.
        assert!(breaker.check().is_ok());
        breaker.record_success();
        assert!(!breaker.state().is_open);
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn failed_probe_restarts_cooldown() {
        let mut breaker = CircuitBreaker::new(1, Duration::from_secs(60));
        breaker.record_retryable_failure();
        breaker.record_retryable_failure();
        let state = breaker.state();
        assert!(state.is_open);
        assert_eq!(state.failure_count, 2);
        assert!(state.retry_in.is_some());
    }
}
