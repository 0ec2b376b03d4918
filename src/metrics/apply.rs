//! Apply Phase Metrics
//!
//! Decoding and merging of approved batches.

use crate::domain::DataType;
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};
use crate::pipeline::appliers::ApplyStats;

pub struct ApplyMetrics;

impl ApplyMetrics {
    /// Record a decode + apply pass that completed.
    pub fn record_apply_success(
        data_type: DataType,
        rows_decoded: usize,
        rows_skipped: usize,
        stats: ApplyStats,
        duration_secs: f64,
    ) {
        let dt = data_type.as_str();
        ::metrics::counter!(phase_metric!(counter, "apply", "rows_decoded"), "data_type" => dt)
            .increment(rows_decoded as u64);
        ::metrics::counter!(phase_metric!(counter, "apply", "rows_skipped"), "data_type" => dt)
            .increment(rows_skipped as u64);
        ::metrics::counter!(phase_metric!(counter, "apply", "entities_created"), "data_type" => dt)
            .increment(stats.created as u64);
        ::metrics::counter!(phase_metric!(counter, "apply", "entities_updated"), "data_type" => dt)
            .increment(stats.updated as u64);
        ::metrics::histogram!(phase_metric!(histogram, "apply", "duration_seconds"), "data_type" => dt)
            .record(duration_secs);
    }

    pub fn record_apply_error(data_type: DataType, duration_secs: f64) {
        let dt = data_type.as_str();
        ::metrics::counter!(phase_metric!(counter, "apply", "errors"), "data_type" => dt)
            .increment(1);
        ::metrics::histogram!(phase_metric!(histogram, "apply", "duration_seconds"), "data_type" => dt)
            .record(duration_secs);
    }

    pub fn record_unregistered_dispatch(data_type: DataType) {
        ::metrics::counter!(
            phase_metric!(counter, "apply", "unregistered_dispatches"),
            "data_type" => data_type.as_str()
        )
        .increment(1);
    }
}

impl PhaseMetrics for ApplyMetrics {
    fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(phase_metric!(counter, "apply", "rows_decoded"));
        let _ = counter!(phase_metric!(counter, "apply", "rows_skipped"));
        let _ = counter!(phase_metric!(counter, "apply", "entities_created"));
        let _ = counter!(phase_metric!(counter, "apply", "entities_updated"));
        let _ = counter!(phase_metric!(counter, "apply", "errors"));
        let _ = counter!(phase_metric!(counter, "apply", "unregistered_dispatches"));

        let _ = histogram!(phase_metric!(histogram, "apply", "duration_seconds"));
    }

    fn phase_name() -> &'static str {
        "apply"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "apply", "rows_decoded"),
                metric_type: MetricType::Counter,
                help: "Rows decoded from approved batches",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "apply", "rows_skipped"),
                metric_type: MetricType::Counter,
                help: "Rows dropped because their column count did not match the header",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "apply", "entities_created"),
                metric_type: MetricType::Counter,
                help: "Target entities created by imports",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "apply", "entities_updated"),
                metric_type: MetricType::Counter,
                help: "Existing target entities merged by imports",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "apply", "errors"),
                metric_type: MetricType::Counter,
                help: "Decode or apply passes that failed",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "apply", "unregistered_dispatches"),
                metric_type: MetricType::Counter,
                help: "Approvals for a data type with no registered applier",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(histogram, "apply", "duration_seconds"),
                metric_type: MetricType::Histogram,
                help: "Time spent decoding and applying one batch",
                labels: vec!["data_type"],
            },
        ]
    }
}
