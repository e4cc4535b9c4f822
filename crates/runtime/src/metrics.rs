use std::{collections::VecDeque, time::Duration};

use serde::Serialize;

/// Number of most recent successful poll cycles kept for percentiles.
pub const LATENCY_WINDOW: usize = 1_024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyPercentiles {
    pub count: usize,
    pub p50_micros: u64,
    pub p90_micros: u64,
    pub p95_micros: u64,
    pub p99_micros: u64,
    pub max_micros: u64,
}

/// Rolling round-trip latency of successful poll cycles.
#[derive(Debug, Clone)]
pub struct PollLatencyMetrics {
    latencies_micros: VecDeque<u64>,
    capacity: usize,
}

impl Default for PollLatencyMetrics {
    fn default() -> Self {
        Self::with_capacity(LATENCY_WINDOW)
    }
}

impl PollLatencyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            latencies_micros: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.record_latency_micros(micros);
    }

    pub fn record_latency_micros(&mut self, latency_micros: u64) {
        if self.latencies_micros.len() == self.capacity {
            self.latencies_micros.pop_front();
        }
        self.latencies_micros.push_back(latency_micros);
    }

    pub fn percentiles(&self) -> Option<LatencyPercentiles> {
        if self.latencies_micros.is_empty() {
            return None;
        }

        let mut sorted: Vec<u64> = self.latencies_micros.iter().copied().collect();
        sorted.sort_unstable();
        let count = sorted.len();

        Some(LatencyPercentiles {
            count,
            p50_micros: percentile_nearest_rank(&sorted, 50),
            p90_micros: percentile_nearest_rank(&sorted, 90),
            p95_micros: percentile_nearest_rank(&sorted, 95),
            p99_micros: percentile_nearest_rank(&sorted, 99),
            max_micros: sorted[count - 1],
        })
    }
}

fn percentile_nearest_rank(sorted: &[u64], percentile: usize) -> u64 {
    let count = sorted.len();
    let rank = (percentile * count).div_ceil(100);
    sorted[rank.saturating_sub(1)]
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::PollLatencyMetrics;

    #[test]
    fn empty_window_has_no_percentiles() {
        assert!(PollLatencyMetrics::new().percentiles().is_none());
    }

    #[test]
    fn percentiles_use_nearest_rank() {
        let mut metrics = PollLatencyMetrics::new();

        for micros in [1, 2, 3, 4, 100] {
            metrics.record_latency_micros(micros);
        }

        let report = metrics.percentiles().expect("percentiles should exist");

        assert_eq!(report.count, 5);
        assert_eq!(report.p50_micros, 3);
        assert_eq!(report.p95_micros, 100);
        assert_eq!(report.max_micros, 100);
    }

    #[test]
    fn window_forgets_oldest_samples() {
        let mut metrics = PollLatencyMetrics::with_capacity(3);

        metrics.record(Duration::from_millis(900));
        metrics.record(Duration::from_millis(10));
        metrics.record(Duration::from_millis(20));
        metrics.record(Duration::from_millis(30));

        let report = metrics.percentiles().expect("percentiles should exist");

        assert_eq!(report.count, 3);
        assert_eq!(report.max_micros, 30_000);
        assert_eq!(report.p50_micros, 20_000);
    }
}
