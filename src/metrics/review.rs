//! Review Phase Metrics
//!
//! Batch lifecycle: submissions, approvals, and how each batch ended.

use crate::domain::DataType;
use crate::metrics::{phase_metric, MetricDoc, MetricType, PhaseMetrics};

pub struct ReviewMetrics;

/// Why a batch ended in `rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionCause {
    Reviewer,
    ApplyFailed,
}

impl RejectionCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionCause::Reviewer => "reviewer",
            RejectionCause::ApplyFailed => "apply_failed",
        }
    }
}

impl ReviewMetrics {
    pub fn record_submitted(data_type: DataType) {
        ::metrics::counter!(
            phase_metric!(counter, "review", "batches_submitted"),
            "data_type" => data_type.as_str()
        )
        .increment(1);
    }

    pub fn record_duplicate_submission(data_type: DataType) {
        ::metrics::counter!(
            phase_metric!(counter, "review", "duplicate_submissions"),
            "data_type" => data_type.as_str()
        )
        .increment(1);
    }

    pub fn record_approved(data_type: DataType) {
        ::metrics::counter!(
            phase_metric!(counter, "review", "batches_approved"),
            "data_type" => data_type.as_str()
        )
        .increment(1);
    }

    pub fn record_applied(data_type: DataType) {
        ::metrics::counter!(
            phase_metric!(counter, "review", "batches_applied"),
            "data_type" => data_type.as_str()
        )
        .increment(1);
    }

    pub fn record_rejected(data_type: DataType, cause: RejectionCause) {
        ::metrics::counter!(
            phase_metric!(counter, "review", "batches_rejected"),
            "data_type" => data_type.as_str(),
            "cause" => cause.as_str()
        )
        .increment(1);
    }

    /// Approve/reject on a missing or non-pending batch, including lost approval races.
    pub fn record_state_conflict() {
        ::metrics::counter!(phase_metric!(counter, "review", "state_conflicts")).increment(1);
    }
}

impl PhaseMetrics for ReviewMetrics {
    fn register_metrics() {
        use metrics::counter;

        let _ = counter!(phase_metric!(counter, "review", "batches_submitted"));
        let _ = counter!(phase_metric!(counter, "review", "duplicate_submissions"));
        let _ = counter!(phase_metric!(counter, "review", "batches_approved"));
        let _ = counter!(phase_metric!(counter, "review", "batches_applied"));
        let _ = counter!(phase_metric!(counter, "review", "batches_rejected"));
        let _ = counter!(phase_metric!(counter, "review", "state_conflicts"));
    }

    fn phase_name() -> &'static str {
        "review"
    }

    fn metrics_documentation() -> Vec<MetricDoc> {
        vec![
            MetricDoc {
                name: phase_metric!(counter, "review", "batches_submitted"),
                metric_type: MetricType::Counter,
                help: "Total number of import batches submitted for review",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "review", "duplicate_submissions"),
                metric_type: MetricType::Counter,
                help: "Submissions whose content matches a batch still pending",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "review", "batches_approved"),
                metric_type: MetricType::Counter,
                help: "Total number of batches claimed for processing by a reviewer",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "review", "batches_applied"),
                metric_type: MetricType::Counter,
                help: "Total number of batches applied to their target collection",
                labels: vec!["data_type"],
            },
            MetricDoc {
                name: phase_metric!(counter, "review", "batches_rejected"),
                metric_type: MetricType::Counter,
                help: "Total number of batches rejected, by reviewer decision or apply failure",
                labels: vec!["data_type", "cause"],
            },
            MetricDoc {
                name: phase_metric!(counter, "review", "state_conflicts"),
                metric_type: MetricType::Counter,
                help: "Review actions refused because the batch was missing or not pending",
                labels: vec![],
            },
        ]
    }
}
