//! Prometheus metrics for the Gavel server.
//!
//! This module provides:
//! - HTTP request metrics (count, latency)
//! - Cache metrics (hits, misses, failures, writes, invalidations, circuit state)
//! - Lock and bid metrics per strategy

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global Prometheus handle for rendering metrics.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";

    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_FAILURES_TOTAL: &str = "cache_failures_total";
    pub const CACHE_WRITES_TOTAL: &str = "cache_writes_total";
    pub const CACHE_INVALIDATIONS_TOTAL: &str = "cache_invalidations_total";
    pub const CACHE_CIRCUIT_OPEN: &str = "cache_circuit_open";

    // Lock metrics
    pub const LOCK_ACQUISITIONS_TOTAL: &str = "lock_acquisitions_total";
    pub const LOCK_FAILURES_TOTAL: &str = "lock_failures_total";

    // Auction metrics
    pub const BIDS_TOTAL: &str = "bids_total";
}

/// Initialize the Prometheus metrics exporter.
///
/// This should be called once at server startup.
/// Returns `true` if initialization succeeded, `false` if already initialized.
pub fn init_metrics() -> bool {
    if PROMETHEUS_HANDLE.get().is_some() {
        tracing::debug!("Prometheus metrics already initialized");
        return false;
    }

    // Pull-based: /metrics renders from the handle
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROMETHEUS_HANDLE.set(handle).is_err() {
                tracing::warn!("Failed to store Prometheus handle (already set)");
                return false;
            }

            tracing::info!("Prometheus metrics initialized");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus recorder");
            false
        }
    }
}

/// Render all metrics in Prometheus text format.
///
/// Returns `None` if metrics were not initialized.
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// =============================================================================
// HTTP Metrics
// =============================================================================

/// Record an HTTP request. `route` must be the matched route template so the
/// label stays low-cardinality.
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    let status_class = match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };

    counter!(
        names::HTTP_REQUESTS_TOTAL,
        "method" => method.to_string(),
        "route" => route.to_string(),
        "status_class" => status_class
    )
    .increment(1);

    histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method.to_string(),
        "route" => route.to_string()
    )
    .record(duration.as_secs_f64());
}

// =============================================================================
// Cache Metrics
// =============================================================================

pub fn record_cache_hit() {
    counter!(names::CACHE_HITS_TOTAL).increment(1);
}

pub fn record_cache_miss() {
    counter!(names::CACHE_MISSES_TOTAL).increment(1);
}

/// Record a failed cache read. `reason` is one of `timeout`, `store`,
/// `circuit_open`.
pub fn record_cache_failure(reason: &'static str) {
    counter!(names::CACHE_FAILURES_TOTAL, "reason" => reason).increment(1);
}

/// Record a cache write. `mode` is `json` or `buffers`.
pub fn record_cache_write(mode: &'static str) {
    counter!(names::CACHE_WRITES_TOTAL, "mode" => mode).increment(1);
}

pub fn record_cache_invalidation(buckets: usize) {
    counter!(names::CACHE_INVALIDATIONS_TOTAL).increment(buckets as u64);
}

pub fn set_circuit_open(open: bool) {
    gauge!(names::CACHE_CIRCUIT_OPEN).set(if open { 1.0 } else { 0.0 });
}

// =============================================================================
// Lock / Auction Metrics
// =============================================================================

pub fn record_lock_acquired(strategy: &'static str) {
    counter!(names::LOCK_ACQUISITIONS_TOTAL, "strategy" => strategy).increment(1);
}

pub fn record_lock_failure(strategy: &'static str) {
    counter!(names::LOCK_FAILURES_TOTAL, "strategy" => strategy).increment(1);
}

/// Record a bid attempt. `outcome` is `accepted`, `rejected` or `error`.
pub fn record_bid(strategy: &'static str, outcome: &'static str) {
    counter!(names::BIDS_TOTAL, "strategy" => strategy, "outcome" => outcome).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_recorder() {
        // Recording without an installed recorder is a no-op.
        record_cache_hit();
        record_bid("spin", "accepted");
        if PROMETHEUS_HANDLE.get().is_none() {
            assert!(render_metrics().is_none());
        }
    }
}
