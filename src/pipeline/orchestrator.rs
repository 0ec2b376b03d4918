//! Review orchestrator: the batch state machine.
//!
//! ```text
//! pending ──approve──▶ approved ──apply ok──▶ applied
//!    │                    │
//!    └──reject──▶ rejected ◀──apply error──┘
//! ```
//!
//! Every status write goes through [`BatchStore::compare_and_replace`]. `pending → approved`
//! expects `pending`, so of two racing approvals (or an approval racing a rejection) exactly
//! one proceeds. The winner stamps an apply claim on the batch, and the terminal write expects
//! that claim: a run whose claim was taken over by [`ReviewOrchestrator::resume_interrupted`]
//! can no longer finish the batch.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::{timestamp, BatchStatus, DataType, ImportBatch};
use crate::error::{ImportError, Result};
use crate::idempotency::{compute_apply_key, content_sha256};
use crate::metrics::review::RejectionCause;
use crate::metrics::{ApplyMetrics, ReviewMetrics};
use crate::pipeline::appliers::{ApplierRegistry, ApplyStats};
use crate::pipeline::decoder::{decode, DecodeOutcome, DecoderOptions, SkippedLine};
use crate::storage::BatchStore;

pub const DEFAULT_APPLY_LEASE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone)]
pub struct ReviewOptions {
    pub decoder: DecoderOptions,
    /// Fail approval of a data type with no registered applier instead of treating the
    /// dispatch as a successful no-op.
    pub strict_dispatch: bool,
    /// How long an apply claim holds before `resume_interrupted` may take the batch over.
    pub apply_lease: Duration,
}

impl Default for ReviewOptions {
    fn default() -> Self {
        Self {
            decoder: DecoderOptions::default(),
            strict_dispatch: false,
            apply_lease: DEFAULT_APPLY_LEASE,
        }
    }
}

/// Result of a successful approval.
#[derive(Debug, Clone)]
pub struct ApprovalOutcome {
    pub batch: ImportBatch,
    pub stats: ApplyStats,
    pub rows_decoded: usize,
    pub skipped: Vec<SkippedLine>,
    /// False when no applier was registered for the batch's data type.
    pub dispatched: bool,
}

struct AppliedContent {
    decoded: DecodeOutcome,
    stats: ApplyStats,
    dispatched: bool,
}

pub struct ReviewOrchestrator {
    batches: Arc<dyn BatchStore>,
    registry: Arc<ApplierRegistry>,
    options: ReviewOptions,
}

impl ReviewOrchestrator {
    pub fn new(
        batches: Arc<dyn BatchStore>,
        registry: Arc<ApplierRegistry>,
        options: ReviewOptions,
    ) -> Self {
        Self {
            batches,
            registry,
            options,
        }
    }

    /// Create a new `pending` batch. Content is not validated until approval.
    pub async fn submit(
        &self,
        data_type: DataType,
        file_name: impl Into<String>,
        raw_content: impl Into<String>,
        submitted_by: impl Into<String>,
    ) -> Result<ImportBatch> {
        let batch = ImportBatch::new(data_type, file_name, raw_content, submitted_by);

        let duplicate_of = self
            .batches
            .find_pending_by_hash(data_type, &batch.content_sha256)
            .await?;
        if let Some(other) = duplicate_of {
            warn!(
                "Batch {} has the same {} content as pending batch {}",
                batch.id, data_type, other
            );
            ReviewMetrics::record_duplicate_submission(data_type);
        }

        self.batches.insert(&batch).await?;
        ReviewMetrics::record_submitted(data_type);
        info!(
            batch_id = %batch.id,
            data_type = %data_type,
            file_name = %batch.file_name,
            submitted_by = %batch.submitted_by,
            "Submitted import batch ({} bytes)",
            batch.raw_content.len()
        );
        Ok(batch)
    }

    pub async fn get(&self, batch_id: &str) -> Result<Option<ImportBatch>> {
        self.batches.get(batch_id).await
    }

    /// All batches, most recently submitted first.
    pub async fn list(&self) -> Result<Vec<ImportBatch>> {
        self.batches.list().await
    }

    /// pending → rejected. Target collections are not touched.
    pub async fn reject(&self, batch_id: &str, reviewed_by: &str) -> Result<ImportBatch> {
        let mut batch = self.load(batch_id).await?;
        let expected = batch.revision();
        if batch.mark_rejected(reviewed_by, timestamp()).is_err() {
            return Err(self.state_conflict(batch_id).await);
        }
        if !self
            .batches
            .compare_and_replace(&expected, &batch)
            .await?
        {
            return Err(self.state_conflict(batch_id).await);
        }

        ReviewMetrics::record_rejected(batch.data_type, RejectionCause::Reviewer);
        info!("Batch {} rejected by {}", batch.id, reviewed_by);
        Ok(batch)
    }

    /// pending → approved → applied, or → rejected when decoding or applying fails.
    ///
    /// On failure the batch is persisted as `rejected` with its failure reason and the
    /// original error is returned.
    pub async fn approve(&self, batch_id: &str, reviewed_by: &str) -> Result<ApprovalOutcome> {
        let mut batch = self.load(batch_id).await?;
        let expected = batch.revision();
        let now = timestamp();
        if batch.begin_review(reviewed_by, now).is_err() {
            return Err(self.state_conflict(batch_id).await);
        }
        batch.claim_apply(now)?;
        if !self
            .batches
            .compare_and_replace(&expected, &batch)
            .await?
        {
            return Err(self.state_conflict(batch_id).await);
        }

        ReviewMetrics::record_approved(batch.data_type);
        info!("Batch {} approved by {}; applying", batch.id, reviewed_by);
        self.process(batch).await
    }

    /// Decode a batch's retained content without applying it. Works in any status.
    pub async fn preview(&self, batch_id: &str) -> Result<DecodeOutcome> {
        let batch = self.load(batch_id).await?;
        decode(&batch.raw_content, &self.options.decoder)
    }

    /// Finish batches left `approved` by an interrupted process.
    ///
    /// Only batches whose apply claim is older than the configured lease are taken; each is
    /// claimed afresh before it is replayed, so a run still applying within its lease is left
    /// alone and a run whose claim was taken over cannot overwrite the outcome. Upserts of the
    /// same rows converge, so rows already merged before the interruption are safe to write
    /// again. Batches that fail are persisted as `rejected` and left out of the result.
    pub async fn resume_interrupted(&self) -> Result<Vec<ApprovalOutcome>> {
        let now = timestamp();
        let stranded: Vec<ImportBatch> = self
            .batches
            .list()
            .await?
            .into_iter()
            .filter(|b| b.status == BatchStatus::Approved)
            .filter(|b| {
                let expired = b.claim_expired(now, self.options.apply_lease);
                if !expired {
                    debug!("Batch {} is still held by a running apply", b.id);
                }
                expired
            })
            .collect();

        if stranded.is_empty() {
            return Ok(Vec::new());
        }
        info!("Resuming {} interrupted batches", stranded.len());

        let mut resumed = Vec::new();
        for mut batch in stranded {
            let id = batch.id.clone();
            let expected = batch.revision();
            batch.claim_apply(timestamp())?;
            if !self.batches.compare_and_replace(&expected, &batch).await? {
                info!("Batch {} was claimed by another run; skipping", id);
                continue;
            }

            let attempt = if batch.content_intact() {
                self.process(batch).await
            } else {
                warn!(
                    "Batch {} content hash {} no longer matches {}",
                    id,
                    batch.content_sha256,
                    content_sha256(&batch.raw_content)
                );
                let err = ImportError::ContentMismatch(id.clone());
                Err(self.fail(batch, err, Instant::now()).await)
            };
            match attempt {
                Ok(outcome) => resumed.push(outcome),
                Err(e) => warn!("Resume of batch {} failed: {}", id, e),
            }
        }
        Ok(resumed)
    }

    async fn load(&self, batch_id: &str) -> Result<ImportBatch> {
        match self.batches.get(batch_id).await? {
            Some(batch) => Ok(batch),
            None => {
                ReviewMetrics::record_state_conflict();
                Err(ImportError::BatchNotFound(batch_id.to_string()))
            }
        }
    }

    async fn state_conflict(&self, batch_id: &str) -> ImportError {
        ReviewMetrics::record_state_conflict();
        match self.batches.get(batch_id).await {
            Ok(Some(current)) => {
                warn!(
                    "Batch {} is {}; review action refused",
                    batch_id, current.status
                );
                ImportError::InvalidTransition {
                    id: batch_id.to_string(),
                    status: current.status,
                }
            }
            Ok(None) => ImportError::BatchNotFound(batch_id.to_string()),
            Err(e) => e,
        }
    }

    /// Decode and apply a batch this run has claimed, then persist its terminal state.
    async fn process(&self, mut batch: ImportBatch) -> Result<ApprovalOutcome> {
        let started = Instant::now();
        let claimed = batch.revision();
        let apply_key = compute_apply_key(
            &batch.id,
            batch.data_type.as_str(),
            &batch.content_sha256,
        );
        let span = info_span!(
            "apply_batch",
            batch_id = %batch.id,
            data_type = %batch.data_type,
            apply_key = %apply_key
        );

        let applied = match self.decode_and_apply(&batch).instrument(span).await {
            Ok(applied) => applied,
            Err(e) => return Err(self.fail(batch, e, started).await),
        };

        batch.mark_applied(applied.decoded.skipped_lines())?;
        if !self.batches.compare_and_replace(&claimed, &batch).await? {
            warn!(
                "Batch {} was taken over by another run; discarding this apply's outcome",
                batch.id
            );
            return Err(self.state_conflict(&batch.id).await);
        }

        let rows_decoded = applied.decoded.records.len();
        ApplyMetrics::record_apply_success(
            batch.data_type,
            rows_decoded,
            applied.decoded.skipped.len(),
            applied.stats,
            started.elapsed().as_secs_f64(),
        );
        ReviewMetrics::record_applied(batch.data_type);
        info!(
            "Batch {} applied: {} rows, {} created, {} updated, {} skipped",
            batch.id,
            rows_decoded,
            applied.stats.created,
            applied.stats.updated,
            applied.decoded.skipped.len()
        );

        Ok(ApprovalOutcome {
            batch,
            stats: applied.stats,
            rows_decoded,
            skipped: applied.decoded.skipped,
            dispatched: applied.dispatched,
        })
    }

    async fn decode_and_apply(&self, batch: &ImportBatch) -> Result<AppliedContent> {
        let decoded = decode(&batch.raw_content, &self.options.decoder)?;

        let (stats, dispatched) = match self
            .registry
            .apply(batch.data_type, &decoded.records)
            .await?
        {
            Some(stats) => (stats, true),
            None if self.options.strict_dispatch => {
                return Err(ImportError::NoApplier(batch.data_type));
            }
            None => {
                warn!(
                    "No applier registered for {}; batch {} completes without changes",
                    batch.data_type, batch.id
                );
                ApplyMetrics::record_unregistered_dispatch(batch.data_type);
                (ApplyStats::default(), false)
            }
        };

        Ok(AppliedContent {
            decoded,
            stats,
            dispatched,
        })
    }

    /// approved → rejected after an apply error. Returns `err` for the caller to surface.
    async fn fail(&self, mut batch: ImportBatch, err: ImportError, started: Instant) -> ImportError {
        error!("Batch {} failed to apply: {}", batch.id, err);
        ApplyMetrics::record_apply_error(batch.data_type, started.elapsed().as_secs_f64());

        let claimed = batch.revision();
        if let Err(e) = batch.mark_failed(err.to_string()) {
            error!("Could not mark batch {} as failed: {}", batch.id, e);
            return err;
        }
        match self.batches.compare_and_replace(&claimed, &batch).await {
            Ok(true) => ReviewMetrics::record_rejected(batch.data_type, RejectionCause::ApplyFailed),
            Ok(false) => warn!(
                "Batch {} was taken over by another run; failure not recorded",
                batch.id
            ),
            Err(e) => error!("Could not persist failure of batch {}: {}", batch.id, e),
        }
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryBatchStore, InMemoryCollections};

    fn orchestrator(collections: &InMemoryCollections) -> ReviewOrchestrator {
        ReviewOrchestrator::new(
            Arc::new(InMemoryBatchStore::new()),
            Arc::new(ApplierRegistry::with_collections(&collections.collections())),
            ReviewOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_submit_creates_pending_batch() {
        let collections = InMemoryCollections::default();
        let review = orchestrator(&collections);

        let batch = review
            .submit(DataType::ClassList, "classes.csv", "id,name\nc1,6A", "secretariat")
            .await
            .unwrap();

        assert_eq!(batch.status, BatchStatus::Pending);
        let stored = review.get(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored, batch);
    }

    #[tokio::test]
    async fn test_submit_accepts_empty_content() {
        let collections = InMemoryCollections::default();
        let review = orchestrator(&collections);

        let batch = review
            .submit(DataType::UserList, "vide.csv", "", "admin")
            .await
            .unwrap();
        assert_eq!(batch.status, BatchStatus::Pending);
    }

    #[tokio::test]
    async fn test_approve_applies_and_reports_skipped_lines() {
        let collections = InMemoryCollections::default();
        let review = orchestrator(&collections);
        let batch = review
            .submit(
                DataType::InventoryState,
                "stock.csv",
                "id,name,quantity\ni1,Craies,10\ni2,Cahiers\ni3,Stylos,25",
                "intendant",
            )
            .await
            .unwrap();

        let outcome = review.approve(&batch.id, "econome").await.unwrap();

        assert_eq!(outcome.batch.status, BatchStatus::Applied);
        assert_eq!(outcome.batch.reviewed_by.as_deref(), Some("econome"));
        assert_eq!(outcome.rows_decoded, 2);
        assert_eq!(outcome.stats.created, 2);
        assert_eq!(outcome.batch.skipped_lines, vec![3]);
        assert!(outcome.dispatched);
        assert_eq!(collections.inventory.len(), 2);

        let stored = review.get(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Applied);
        assert_eq!(stored.skipped_lines, vec![3]);
    }

    #[tokio::test]
    async fn test_decode_failure_rejects_batch_with_reason() {
        let collections = InMemoryCollections::default();
        let review = orchestrator(&collections);
        let batch = review
            .submit(DataType::TeacherList, "profs.csv", "id,lastName", "rh")
            .await
            .unwrap();

        let err = review.approve(&batch.id, "directeur").await.unwrap_err();
        assert!(matches!(err, ImportError::EmptyInput));

        let stored = review.get(&batch.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BatchStatus::Rejected);
        assert_eq!(stored.reviewed_by.as_deref(), Some("directeur"));
        assert_eq!(stored.failure_reason, Some(ImportError::EmptyInput.to_string()));
        assert!(collections.teachers.is_empty());
    }

    #[tokio::test]
    async fn test_reject_leaves_collections_untouched() {
        let collections = InMemoryCollections::default();
        let review = orchestrator(&collections);
        let batch = review
            .submit(DataType::ClassList, "classes.csv", "id,name\nc1,6A", "secretariat")
            .await
            .unwrap();

        let rejected = review.reject(&batch.id, "directrice").await.unwrap();
        assert_eq!(rejected.status, BatchStatus::Rejected);
        assert!(rejected.failure_reason.is_none());
        assert!(rejected.reviewed_at.is_some());
        assert!(collections.classes.is_empty());

        assert!(matches!(
            review.approve(&batch.id, "directrice").await,
            Err(ImportError::InvalidTransition {
                status: BatchStatus::Rejected,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_batch_is_not_found() {
        let collections = InMemoryCollections::default();
        let review = orchestrator(&collections);
        assert!(matches!(
            review.approve("batch-missing", "x").await,
            Err(ImportError::BatchNotFound(_))
        ));
        assert!(matches!(
            review.reject("batch-missing", "x").await,
            Err(ImportError::BatchNotFound(_))
        ));
        assert!(matches!(
            review.preview("batch-missing").await,
            Err(ImportError::BatchNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_preview_does_not_apply() {
        let collections = InMemoryCollections::default();
        let review = orchestrator(&collections);
        let batch = review
            .submit(DataType::UserList, "users.csv", "id,email\nu1,a@b.sn\nu2", "admin")
            .await
            .unwrap();

        let preview = review.preview(&batch.id).await.unwrap();
        assert_eq!(preview.records.len(), 1);
        assert_eq!(preview.skipped_lines(), vec![3]);
        assert!(collections.users.is_empty());
        assert_eq!(
            review.get(&batch.id).await.unwrap().unwrap().status,
            BatchStatus::Pending
        );
    }
}
