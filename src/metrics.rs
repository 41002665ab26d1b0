//! Refresh outcome statistics
//!
//! Each cache keeps one collector. The tracker's health check reads them
//! to decide whether the cached data can be trusted.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::RwLock;

/// Number of recent refresh durations kept for the latency median
const MAX_SAMPLES: usize = 50;

/// Snapshot of a cache's refresh history
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshStats {
    pub total_refreshes: u64,
    pub failed_refreshes: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Median duration of recent successful refreshes
    pub latency_p50_ms: f64,
}

impl RefreshStats {
    pub fn success_rate(&self) -> f64 {
        if self.total_refreshes == 0 {
            return 1.0;
        }
        (self.total_refreshes - self.failed_refreshes) as f64 / self.total_refreshes as f64
    }
}

#[derive(Debug, Default)]
struct Inner {
    total: u64,
    failed: u64,
    consecutive_failures: u32,
    last_success: Option<DateTime<Utc>>,
    last_failure: Option<DateTime<Utc>>,
    last_error: Option<String>,
    latencies_ms: VecDeque<f64>,
}

#[derive(Debug, Default)]
pub struct RefreshMetrics {
    inner: RwLock<Inner>,
}

impl RefreshMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_success(&self, duration: Duration) {
        let mut inner = self.inner.write().await;
        inner.total += 1;
        inner.consecutive_failures = 0;
        inner.last_success = Some(Utc::now());

        if inner.latencies_ms.len() >= MAX_SAMPLES {
            inner.latencies_ms.pop_front();
        }
        inner.latencies_ms.push_back(duration.as_secs_f64() * 1000.0);
    }

    pub async fn record_failure(&self, error: &str) {
        let mut inner = self.inner.write().await;
        inner.total += 1;
        inner.failed += 1;
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Utc::now());
        inner.last_error = Some(error.to_string());
    }

    pub async fn snapshot(&self) -> RefreshStats {
        let inner = self.inner.read().await;

        let mut latencies: Vec<f64> = inner.latencies_ms.iter().copied().collect();
        latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        RefreshStats {
            total_refreshes: inner.total,
            failed_refreshes: inner.failed,
            consecutive_failures: inner.consecutive_failures,
            last_success: inner.last_success,
            last_failure: inner.last_failure,
            last_error: inner.last_error.clone(),
            latency_p50_ms: median(&latencies),
        }
    }
}

fn median(sorted: &[f64]) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    sorted[(sorted.len() - 1) / 2]
}
