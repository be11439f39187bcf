//! Simulation metrics.

use std::collections::VecDeque;

/// Counters and latency samples collected over a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    /// Total payments attempted.
    pub total_payments: u64,
    /// Payments that reserved and committed.
    pub successful_payments: u64,
    /// Payments rejected or failed at resolution.
    pub failed_payments: u64,
    /// Latency samples (ms).
    latency_samples: VecDeque<u64>,
    /// Maximum samples to keep.
    max_samples: usize,
}

impl SimulationMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            total_payments: 0,
            successful_payments: 0,
            failed_payments: 0,
            latency_samples: VecDeque::with_capacity(10000),
            max_samples: 10000,
        }
    }

    /// Record a committed payment and its end-to-end latency.
    pub fn record_success(&mut self, latency_ms: u64) {
        self.total_payments += 1;
        self.successful_payments += 1;

        if self.latency_samples.len() >= self.max_samples {
            self.latency_samples.pop_front();
        }
        self.latency_samples.push_back(latency_ms);
    }

    /// Record a failed payment.
    pub fn record_failure(&mut self) {
        self.total_payments += 1;
        self.failed_payments += 1;
    }

    /// Get average latency in ms.
    pub fn average_latency_ms(&self) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let sum: u64 = self.latency_samples.iter().sum();
        sum / self.latency_samples.len() as u64
    }

    /// Get p50 latency.
    pub fn p50_latency_ms(&self) -> u64 {
        self.percentile_latency(50)
    }

    /// Get p99 latency.
    pub fn p99_latency_ms(&self) -> u64 {
        self.percentile_latency(99)
    }

    /// Get percentile latency.
    fn percentile_latency(&self, percentile: usize) -> u64 {
        if self.latency_samples.is_empty() {
            return 0;
        }

        let mut sorted: Vec<_> = self.latency_samples.iter().copied().collect();
        sorted.sort_unstable();

        let idx = (sorted.len() * percentile / 100).min(sorted.len() - 1);
        sorted[idx]
    }

    /// Get success rate.
    pub fn success_rate(&self) -> f64 {
        if self.total_payments == 0 {
            return 0.0;
        }

        self.successful_payments as f64 / self.total_payments as f64
    }

    /// Get throughput (payments per second).
    pub fn throughput(&self, duration_secs: u64) -> f64 {
        if duration_secs == 0 {
            return 0.0;
        }

        self.total_payments as f64 / duration_secs as f64
    }
}

impl Default for SimulationMetrics {
    fn default() -> Self {
        Self::new()
    }
}
