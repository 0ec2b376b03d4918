//! Phase-organized metrics for the import pipeline
//!
//! Each phase defines its metrics in a dedicated submodule so names stay owned and
//! conflict-free. Recording is a no-op until [`init_metrics`] installs a recorder.

pub mod apply;
pub mod registry;
pub mod review;

pub use apply::ApplyMetrics;
pub use review::ReviewMetrics;

use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the in-process Prometheus recorder and register every phase's metrics.
///
/// Idempotent. Returns `None` when another recorder already owns the global slot.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    if let Some(handle) = HANDLE.get() {
        return Some(handle);
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if HANDLE.set(handle).is_err() {
                warn!("Metrics handle was already set");
            }
            registry::register_all_metrics();
            info!("Prometheus recorder installed");
            HANDLE.get()
        }
        Err(e) => {
            warn!("Failed to install Prometheus recorder: {}", e);
            None
        }
    }
}

/// Render the current snapshot in Prometheus text format, if a recorder is installed.
pub fn render() -> Option<String> {
    HANDLE.get().map(PrometheusHandle::render)
}

/// Trait for phase-specific metrics collections
pub trait PhaseMetrics {
    /// Register all metrics for this phase so they appear in snapshots before first use.
    fn register_metrics();

    fn phase_name() -> &'static str;

    /// Documentation for every metric in this phase
    fn metrics_documentation() -> Vec<MetricDoc>;
}

/// Documentation for a single metric
#[derive(Debug, Clone)]
pub struct MetricDoc {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub help: &'static str,
    pub labels: Vec<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Histogram,
}

/// Metric names follow school_import_{phase}_{metric_name}[_total]
macro_rules! phase_metric {
    (counter, $phase:literal, $name:literal) => {
        concat!("school_import_", $phase, "_", $name, "_total")
    };
    (histogram, $phase:literal, $name:literal) => {
        concat!("school_import_", $phase, "_", $name)
    };
}

pub(crate) use phase_metric;
