//! # Metrics
//!
//! Prometheus counters, histograms, and gauges for the proxy, the scanner, and the
//! stats flusher. Recording never blocks: the `metrics` facade is lock-free and the
//! per-collector summary uses plain atomics.
//!
//! | Metric | Kind | Labels |
//! |--------|------|--------|
//! | `gateway_requests_total` | counter | `method`, `outcome` |
//! | `gateway_user_errors_total` | counter | `code` |
//! | `gateway_node_errors_total` | counter | `target` |
//! | `gateway_no_target_total` | counter | |
//! | `gateway_request_duration_seconds` | histogram | `method` |
//! | `gateway_request_attempts` | histogram | |
//! | `gateway_targets` | gauge | `pool` |
//! | `scanner_probes_total` | counter | `method`, `valid` |
//! | `scanner_peers_scanned_total` | counter | `state` |
//! | `scanner_discovered_peers_total` | counter | |
//! | `stats_flush_total` | counter | `result` |
//!
//! Target URLs appear as label values. Keep `/metrics` on an internal network if
//! backend addresses are sensitive.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicU64, Ordering},
        OnceLock,
    },
    time::Duration,
};

use crate::types::SCANNED_METHODS;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Avoids an allocation per request for the common method names.
#[inline]
fn method_to_static(method: &str) -> Cow<'static, str> {
    SCANNED_METHODS
        .iter()
        .find(|m| **m == method)
        .map_or_else(|| Cow::Owned(method.to_string()), |m| Cow::Borrowed(*m))
}

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "using fallback prometheus recorder, metrics may not be globally visible"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Totals since this collector was created.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub user_errors: u64,
    pub node_errors: u64,
    pub no_target: u64,
    pub probes: u64,
    pub peers_scanned: u64,
    pub discovered_peers: u64,
    pub flush_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    total_requests: AtomicU64,
    user_errors: AtomicU64,
    node_errors: AtomicU64,
    no_target: AtomicU64,
    probes: AtomicU64,
    peers_scanned: AtomicU64,
    discovered_peers: AtomicU64,
    flush_failures: AtomicU64,
}

pub struct MetricsCollector {
    counters: Counters,
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    /// Creates a collector, installing the global Prometheus recorder on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the Prometheus recorder cannot be initialized.
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let prometheus_handle = init_prometheus_recorder();
        Ok(Self { counters: Counters::default(), prometheus_handle })
    }

    /// Records one finished proxy request.
    pub fn record_request(&self, method: &str, outcome: &'static str, duration: Duration, attempts: u32) {
        let method_cow = method_to_static(method);
        counter!("gateway_requests_total", "method" => method_cow.clone(), "outcome" => outcome)
            .increment(1);
        histogram!("gateway_request_duration_seconds", "method" => method_cow)
            .record(duration.as_secs_f64());
        histogram!("gateway_request_attempts").record(f64::from(attempts));
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Counted apart from node errors.
    pub fn record_user_error(&self, code: i32) {
        counter!("gateway_user_errors_total", "code" => code.to_string()).increment(1);
        self.counters.user_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_node_error(&self, target: &str) {
        counter!("gateway_node_errors_total", "target" => target.to_string()).increment(1);
        self.counters.node_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_target(&self) {
        counter!("gateway_no_target_total").increment(1);
        self.counters.no_target.fetch_add(1, Ordering::Relaxed);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_target_count(&self, pool: &'static str, count: usize) {
        gauge!("gateway_targets", "pool" => pool).set(count as f64);
    }

    pub fn record_probe(&self, method: &str, valid: bool) {
        let valid_label = if valid { "true" } else { "false" };
        counter!("scanner_probes_total", "method" => method_to_static(method), "valid" => valid_label)
            .increment(1);
        self.counters.probes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_scanned(&self, state: &'static str) {
        counter!("scanner_peers_scanned_total", "state" => state).increment(1);
        self.counters.peers_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discovered_peers(&self, count: u64) {
        counter!("scanner_discovered_peers_total").increment(count);
        self.counters.discovered_peers.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_stats_flush(&self, success: bool) {
        let result = if success { "success" } else { "failure" };
        counter!("stats_flush_total", "result" => result).increment(1);
        if !success {
            self.counters.flush_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }

    #[must_use]
    pub fn get_metrics_summary(&self) -> MetricsSummary {
        let c = &self.counters;
        MetricsSummary {
            total_requests: c.total_requests.load(Ordering::Relaxed),
            user_errors: c.user_errors.load(Ordering::Relaxed),
            node_errors: c.node_errors.load(Ordering::Relaxed),
            no_target: c.no_target.load(Ordering::Relaxed),
            probes: c.probes.load(Ordering::Relaxed),
            peers_scanned: c.peers_scanned.load(Ordering::Relaxed),
            discovered_peers: c.discovered_peers.load(Ordering::Relaxed),
            flush_failures: c.flush_failures.load(Ordering::Relaxed),
        }
    }
}
