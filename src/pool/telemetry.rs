use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling window of pool usage. Samples older than the window are pruned on
/// every write, so memory stays bounded by traffic in the last hour.
const SAMPLE_WINDOW: Duration = Duration::from_secs(3600);

const USAGE_ALERT_RATIO: f64 = 0.9;
const LATENCY_ALERT: Duration = Duration::from_millis(1000);

/// Aggregates reported by [`PoolTelemetry::report`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageReport {
    /// Highest concurrent active count seen in the window.
    pub peak_active: usize,
    /// Mean of active-count samples in the window.
    pub average_active: f64,
    /// Checkouts completed in the window.
    pub turnover: u64,
    /// Mean statement latency in the window, in milliseconds.
    pub average_latency_ms: f64,
    pub sample_count: usize,
}

/// Usage and latency telemetry for one pool.
///
/// Alerts are emitted through `tracing::warn!`, never thrown: crossing the
/// usage or latency threshold logs once per excursion.
#[derive(Debug)]
pub struct PoolTelemetry {
    enabled: bool,
    max_size: usize,
    active: usize,
    active_samples: VecDeque<(Instant, usize)>,
    latencies: VecDeque<(Instant, Duration)>,
    acquires: VecDeque<Instant>,
    usage_alerted: bool,
    latency_alerted: bool,
}

impl PoolTelemetry {
    #[must_use]
    pub fn new(enabled: bool, max_size: usize) -> Self {
        Self {
            enabled,
            max_size: max_size.max(1),
            active: 0,
            active_samples: VecDeque::new(),
            latencies: VecDeque::new(),
            acquires: VecDeque::new(),
            usage_alerted: false,
            latency_alerted: false,
        }
    }

    pub fn note_acquire(&mut self) {
        self.active += 1;
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        self.acquires.push_back(now);
        self.push_sample(now);
        self.check_usage();
    }

    pub fn note_release(&mut self) {
        self.active = self.active.saturating_sub(1);
        if !self.enabled {
            return;
        }
        self.push_sample(Instant::now());
        self.check_usage();
    }

    pub fn note_latency(&mut self, latency: Duration) {
        if !self.enabled {
            return;
        }
        let now = Instant::now();
        self.latencies.push_back((now, latency));
        self.prune(now);
        self.check_latency();
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.active
    }

    #[must_use]
    pub fn report(&self) -> UsageReport {
        let cutoff = Instant::now().checked_sub(SAMPLE_WINDOW);
        let in_window = |at: &Instant| cutoff.is_none_or(|c| *at >= c);

        let samples: Vec<usize> = self
            .active_samples
            .iter()
            .filter(|(at, _)| in_window(at))
            .map(|(_, active)| *active)
            .collect();
        let peak_active = samples.iter().copied().max().unwrap_or(0);
        let average_active = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<usize>() as f64 / samples.len() as f64
        };

        let latencies: Vec<Duration> = self
            .latencies
            .iter()
            .filter(|(at, _)| in_window(at))
            .map(|(_, d)| *d)
            .collect();
        let average_latency_ms = if latencies.is_empty() {
            0.0
        } else {
            latencies.iter().map(Duration::as_secs_f64).sum::<f64>() * 1000.0
                / latencies.len() as f64
        };

        UsageReport {
            peak_active,
            average_active,
            turnover: self.acquires.iter().filter(|at| in_window(at)).count() as u64,
            average_latency_ms,
            sample_count: samples.len(),
        }
    }

    fn push_sample(&mut self, now: Instant) {
        self.active_samples.push_back((now, self.active));
        self.prune(now);
    }

    fn prune(&mut self, now: Instant) {
        let Some(cutoff) = now.checked_sub(SAMPLE_WINDOW) else {
            return;
        };
        while self
            .active_samples
            .front()
            .is_some_and(|(at, _)| *at < cutoff)
        {
            self.active_samples.pop_front();
        }
        while self.latencies.front().is_some_and(|(at, _)| *at < cutoff) {
            self.latencies.pop_front();
        }
        while self.acquires.front().is_some_and(|at| *at < cutoff) {
            self.acquires.pop_front();
        }
    }

    fn check_usage(&mut self) {
        let ratio = self.active as f64 / self.max_size as f64;
        if ratio > USAGE_ALERT_RATIO {
            if !self.usage_alerted {
                tracing::warn!(
                    active = self.active,
                    max = self.max_size,
                    "pool usage above {:.0}%",
                    USAGE_ALERT_RATIO * 100.0
                );
                self.usage_alerted = true;
            }
        } else {
            self.usage_alerted = false;
        }
    }

    fn check_latency(&mut self) {
        let report = self.report();
        if report.average_latency_ms > LATENCY_ALERT.as_millis() as f64 {
            if !self.latency_alerted {
                tracing::warn!(
                    average_ms = report.average_latency_ms,
                    "average statement latency above {}ms",
                    LATENCY_ALERT.as_millis()
                );
                self.latency_alerted = true;
            }
        } else {
            self.latency_alerted = false;
        }
    }
}
