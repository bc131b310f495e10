//! Request counters and latency statistics for the churn risk service.

use crate::types::prediction::RiskTier;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

const LATENCY_WINDOW: usize = 10_000;

/// Metrics collector shared by all request handlers
pub struct ServiceMetrics {
    /// Records scored successfully
    pub predictions_served: AtomicU64,
    /// Requests rejected by the API key check
    pub auth_failures: AtomicU64,
    /// Malformed bodies and schema mismatches
    pub invalid_requests: AtomicU64,
    /// Pipeline or model errors
    pub processing_failures: AtomicU64,
    /// Feedback rows appended
    pub feedback_recorded: AtomicU64,
    /// Feedback appends that failed
    pub feedback_failures: AtomicU64,
    predictions_by_tier: RwLock<BTreeMap<RiskTier, u64>>,
    /// Request latencies (in microseconds)
    latencies: RwLock<Vec<u64>>,
    probability_buckets: RwLock<[u64; 10]>,
    start_time: Instant,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            predictions_served: AtomicU64::new(0),
            auth_failures: AtomicU64::new(0),
            invalid_requests: AtomicU64::new(0),
            processing_failures: AtomicU64::new(0),
            feedback_recorded: AtomicU64::new(0),
            feedback_failures: AtomicU64::new(0),
            predictions_by_tier: RwLock::new(BTreeMap::new()),
            latencies: RwLock::new(Vec::with_capacity(1000)),
            probability_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one scored record
    pub fn record_prediction(&self, probability: f64, tier: RiskTier) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut by_tier) = self.predictions_by_tier.write() {
            *by_tier.entry(tier).or_insert(0) += 1;
        }

        let bucket = ((probability * 10.0) as usize).min(9);
        if let Ok(mut buckets) = self.probability_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Record end-to-end handler latency for a prediction request
    pub fn record_latency(&self, latency: Duration) {
        if let Ok(mut times) = self.latencies.write() {
            times.push(latency.as_micros() as u64);
            if times.len() > LATENCY_WINDOW {
                times.drain(0..LATENCY_WINDOW / 2);
            }
        }
    }

    pub fn record_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_request(&self) {
        self.invalid_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_processing_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_feedback(&self, ok: bool) {
        if ok {
            self.feedback_recorded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.feedback_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Latency statistics over the retained window
    pub fn latency_stats(&self) -> LatencyStats {
        let mut sorted = match self.latencies.read() {
            Ok(times) => times.clone(),
            Err(_) => return LatencyStats::default(),
        };
        if sorted.is_empty() {
            return LatencyStats::default();
        }
        sorted.sort_unstable();

        let count = sorted.len();
        let at = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: at(0.50),
            p95_us: at(0.95),
            p99_us: at(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Predictions per second since startup
    pub fn throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.predictions_served.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn probability_distribution(&self) -> [u64; 10] {
        self.probability_buckets
            .read()
            .map(|b| *b)
            .unwrap_or_default()
    }

    pub fn predictions_by_tier(&self) -> BTreeMap<RiskTier, u64> {
        self.predictions_by_tier
            .read()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    /// Point-in-time copy of every counter, as served by `GET /metrics`
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
            processing_failures: self.processing_failures.load(Ordering::Relaxed),
            feedback_recorded: self.feedback_recorded.load(Ordering::Relaxed),
            feedback_failures: self.feedback_failures.load(Ordering::Relaxed),
            throughput_per_sec: self.throughput(),
            predictions_by_tier: self
                .predictions_by_tier()
                .into_iter()
                .map(|(tier, n)| (tier.as_str().to_string(), n))
                .collect(),
            probability_distribution: self.probability_distribution(),
            latency: self.latency_stats(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let s = self.snapshot();

        info!("==================== CHURN RISK SERVICE ====================");
        info!(
            "Predictions: {:>8}  |  Throughput: {:>6.1}/s  |  Uptime: {}s",
            s.predictions_served, s.throughput_per_sec, s.uptime_secs
        );
        info!(
            "Rejected: auth={} invalid={}  |  Failed: processing={} feedback={}",
            s.auth_failures, s.invalid_requests, s.processing_failures, s.feedback_failures
        );
        info!("Feedback rows: {}", s.feedback_recorded);
        info!(
            "Latency (us): mean={} p50={} p95={} p99={} max={}",
            s.latency.mean_us, s.latency.p50_us, s.latency.p95_us, s.latency.p99_us, s.latency.max_us
        );
        for (tier, count) in &s.predictions_by_tier {
            let pct = if s.predictions_served > 0 {
                (*count as f64 / s.predictions_served as f64) * 100.0
            } else {
                0.0
            };
            info!("  {:6}: {:>6} ({:>5.1}%)", tier, count, pct);
        }

        let total: u64 = s.probability_distribution.iter().sum();
        for (i, &count) in s.probability_distribution.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar = "#".repeat(((pct / 2.0) as usize).min(20));
            info!(
                "  {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("============================================================");
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Latency statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Serializable view of [`ServiceMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub predictions_served: u64,
    pub auth_failures: u64,
    pub invalid_requests: u64,
    pub processing_failures: u64,
    pub feedback_recorded: u64,
    pub feedback_failures: u64,
    pub throughput_per_sec: f64,
    pub predictions_by_tier: BTreeMap<String, u64>,
    pub probability_distribution: [u64; 10],
    pub latency: LatencyStats,
}

/// Logs a metrics summary at a fixed interval
pub struct MetricsReporter {
    metrics: Arc<ServiceMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<ServiceMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs,
        }
    }

    /// Start the periodic reporting task
    pub async fn start(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs.max(1)));
        // First tick completes immediately; skip the empty report.
        interval.tick().await;
        loop {
            interval.tick().await;
            self.metrics.print_summary();
        }
    }
}
