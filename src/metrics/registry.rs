//! Registration of every phase's metrics, with early detection of name conflicts.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::metrics::{ApplyMetrics, MetricDoc, PhaseMetrics, ReviewMetrics};

/// Register all metrics from all phases
pub fn register_all_metrics() {
    let mut all_metrics = HashMap::new();

    register_phase_metrics::<ReviewMetrics>(&mut all_metrics);
    register_phase_metrics::<ApplyMetrics>(&mut all_metrics);

    info!(
        "Registered {} total metrics across all phases",
        all_metrics.len()
    );
    for doc in all_metrics.values() {
        debug!(
            "  - {} ({:?}, phase {}): {}",
            doc.name,
            doc.metric_type,
            extract_phase_from_metric_name(doc.name),
            doc.help
        );
    }
}

/// Register metrics for a specific phase and detect conflicts
fn register_phase_metrics<T: PhaseMetrics>(all_metrics: &mut HashMap<&'static str, MetricDoc>) {
    T::register_metrics();
    let phase_docs = T::metrics_documentation();
    let phase_name = T::phase_name();

    info!(
        "Registering {} metrics for phase '{}'",
        phase_docs.len(),
        phase_name
    );

    for doc in phase_docs {
        if all_metrics.contains_key(doc.name) {
            warn!(
                "Metric name conflict detected: '{}' is defined twice (phase '{}')",
                doc.name, phase_name
            );
        } else {
            all_metrics.insert(doc.name, doc);
        }
    }
}

/// "school_import_review_batches_submitted_total" -> "review"
fn extract_phase_from_metric_name(metric_name: &str) -> &str {
    metric_name
        .strip_prefix("school_import_")
        .and_then(|rest| rest.split('_').next())
        .unwrap_or("unknown")
}
