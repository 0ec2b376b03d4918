//! Import batch lifecycle types and the target entity records they write.

pub mod entities;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ImportError;
use crate::idempotency::content_sha256;

pub use entities::{
    FinancialTransaction, Grade, GradeKey, InventoryItem, SchoolClass, Student, StudentDocument,
    Teacher, User,
};

/// Current time at the microsecond precision every store can round-trip.
pub fn timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// The closed set of file kinds a batch can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    ClassList,
    StudentList,
    TeacherList,
    GradeEntries,
    FinancialTransactions,
    InventoryState,
    UserList,
}

impl DataType {
    pub const ALL: [DataType; 7] = [
        DataType::ClassList,
        DataType::StudentList,
        DataType::TeacherList,
        DataType::GradeEntries,
        DataType::FinancialTransactions,
        DataType::InventoryState,
        DataType::UserList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::ClassList => "ClassList",
            DataType::StudentList => "StudentList",
            DataType::TeacherList => "TeacherList",
            DataType::GradeEntries => "GradeEntries",
            DataType::FinancialTransactions => "FinancialTransactions",
            DataType::InventoryState => "InventoryState",
            DataType::UserList => "UserList",
        }
    }

    fn kebab(&self) -> &'static str {
        match self {
            DataType::ClassList => "class-list",
            DataType::StudentList => "student-list",
            DataType::TeacherList => "teacher-list",
            DataType::GradeEntries => "grade-entries",
            DataType::FinancialTransactions => "financial-transactions",
            DataType::InventoryState => "inventory-state",
            DataType::UserList => "user-list",
        }
    }

    /// Label shown by the school application's upload form.
    pub fn display_label(&self) -> &'static str {
        match self {
            DataType::ClassList => "Liste des Classes",
            DataType::StudentList => "Liste des Élèves",
            DataType::TeacherList => "Liste des Professeurs",
            DataType::GradeEntries => "Saisie des Notes",
            DataType::FinancialTransactions => "Transactions Financières",
            DataType::InventoryState => "État de l'Inventaire",
            DataType::UserList => "Liste des Utilisateurs",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        DataType::ALL
            .into_iter()
            .find(|dt| {
                dt.as_str().eq_ignore_ascii_case(wanted)
                    || dt.kebab().eq_ignore_ascii_case(wanted)
                    || dt.display_label() == wanted
            })
            .ok_or_else(|| ImportError::UnknownDataType(wanted.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    /// Claimed by a reviewer; decode and apply are running.
    Approved,
    Applied,
    Rejected,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Approved => "approved",
            BatchStatus::Applied => "applied",
            BatchStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Applied | BatchStatus::Rejected)
    }

    /// Legal edges: pending → approved | rejected, approved → applied | rejected.
    pub fn can_transition_to(&self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Pending, BatchStatus::Approved)
                | (BatchStatus::Pending, BatchStatus::Rejected)
                | (BatchStatus::Approved, BatchStatus::Applied)
                | (BatchStatus::Approved, BatchStatus::Rejected)
        )
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for BatchStatus {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BatchStatus::Pending),
            "approved" => Ok(BatchStatus::Approved),
            "applied" => Ok(BatchStatus::Applied),
            "rejected" => Ok(BatchStatus::Rejected),
            other => Err(ImportError::Storage {
                message: format!("unknown batch status '{}'", other),
            }),
        }
    }
}

/// One submitted file plus its review/apply lifecycle record.
///
/// `reviewed_by` and `reviewed_at` are only written by the transition methods, which keeps
/// them present exactly when `status` is not `Pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBatch {
    pub id: String,
    pub data_type: DataType,
    pub file_name: String,
    pub raw_content: String,
    pub content_sha256: String,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub status: BatchStatus,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    /// Set when the rejection came from a failed apply rather than a reviewer.
    pub failure_reason: Option<String>,
    /// Source lines the decoder dropped during the last apply.
    #[serde(default)]
    pub skipped_lines: Vec<usize>,
    /// Token of the run that owns applying this batch. Only that run may finish it.
    #[serde(default)]
    pub apply_claim: Option<String>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
}

/// The stored state a conditional batch write expects to overwrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRevision {
    pub status: BatchStatus,
    pub apply_claim: Option<String>,
}

impl ImportBatch {
    pub fn new(
        data_type: DataType,
        file_name: impl Into<String>,
        raw_content: impl Into<String>,
        submitted_by: impl Into<String>,
    ) -> Self {
        let raw_content = raw_content.into();
        Self {
            id: format!("batch-{}", Uuid::new_v4()),
            data_type,
            file_name: file_name.into(),
            content_sha256: content_sha256(&raw_content),
            raw_content,
            submitted_by: submitted_by.into(),
            submitted_at: timestamp(),
            status: BatchStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            failure_reason: None,
            skipped_lines: Vec::new(),
            apply_claim: None,
            claimed_at: None,
        }
    }

    pub fn revision(&self) -> BatchRevision {
        BatchRevision {
            status: self.status,
            apply_claim: self.apply_claim.clone(),
        }
    }

    /// Take over applying an `approved` batch with a fresh token, replacing any earlier claim.
    pub fn claim_apply(&mut self, at: DateTime<Utc>) -> Result<(), ImportError> {
        if self.status != BatchStatus::Approved {
            return Err(ImportError::InvalidTransition {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.apply_claim = Some(Uuid::new_v4().to_string());
        self.claimed_at = Some(at);
        Ok(())
    }

    /// True when no run holds the batch, or the holder's claim is older than `lease`.
    pub fn claim_expired(&self, now: DateTime<Utc>, lease: Duration) -> bool {
        match (self.claimed_at, chrono::Duration::from_std(lease)) {
            (None, _) => true,
            (Some(at), Ok(lease)) => at + lease <= now,
            (Some(_), Err(_)) => false,
        }
    }

    /// Whether the retained content still hashes to the value recorded at submission.
    pub fn content_intact(&self) -> bool {
        content_sha256(&self.raw_content) == self.content_sha256
    }

    fn stamp(&mut self, next: BatchStatus, reviewer: &str, at: DateTime<Utc>) -> Result<(), ImportError> {
        if !self.status.can_transition_to(next) {
            return Err(ImportError::InvalidTransition {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = next;
        self.reviewed_by = Some(reviewer.to_string());
        self.reviewed_at = Some(at);
        Ok(())
    }

    /// pending → approved
    pub fn begin_review(&mut self, reviewer: &str, at: DateTime<Utc>) -> Result<(), ImportError> {
        self.stamp(BatchStatus::Approved, reviewer, at)
    }

    /// pending → rejected, by a reviewer's decision.
    pub fn mark_rejected(&mut self, reviewer: &str, at: DateTime<Utc>) -> Result<(), ImportError> {
        if self.status != BatchStatus::Pending {
            return Err(ImportError::InvalidTransition {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.stamp(BatchStatus::Rejected, reviewer, at)
    }

    /// approved → applied; keeps the reviewer stamp from `begin_review`.
    pub fn mark_applied(&mut self, skipped_lines: Vec<usize>) -> Result<(), ImportError> {
        if !self.status.can_transition_to(BatchStatus::Applied) {
            return Err(ImportError::InvalidTransition {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = BatchStatus::Applied;
        self.skipped_lines = skipped_lines;
        Ok(())
    }

    /// approved → rejected, because decoding or applying raised an error.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), ImportError> {
        if self.status != BatchStatus::Approved {
            return Err(ImportError::InvalidTransition {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = BatchStatus::Rejected;
        self.failure_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parses_all_label_forms() {
        assert_eq!("ClassList".parse::<DataType>().unwrap(), DataType::ClassList);
        assert_eq!("grade-entries".parse::<DataType>().unwrap(), DataType::GradeEntries);
        assert_eq!(
            "État de l'Inventaire".parse::<DataType>().unwrap(),
            DataType::InventoryState
        );
        assert!(matches!(
            "Timetable".parse::<DataType>(),
            Err(ImportError::UnknownDataType(_))
        ));
    }

    #[test]
    fn test_new_batch_is_pending_and_unreviewed() {
        let batch = ImportBatch::new(DataType::ClassList, "classes.csv", "id,name\n1,6A", "secretariat");
        assert!(batch.id.starts_with("batch-"));
        assert_eq!(batch.status, BatchStatus::Pending);
        assert!(batch.reviewed_by.is_none());
        assert!(batch.reviewed_at.is_none());
        assert!(batch.content_intact());
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for next in [
            BatchStatus::Pending,
            BatchStatus::Approved,
            BatchStatus::Applied,
            BatchStatus::Rejected,
        ] {
            assert!(!BatchStatus::Applied.can_transition_to(next));
            assert!(!BatchStatus::Rejected.can_transition_to(next));
            assert!(!next.can_transition_to(BatchStatus::Pending));
        }
    }

    #[test]
    fn test_reviewer_stamp_follows_status() {
        let mut batch = ImportBatch::new(DataType::UserList, "users.csv", "id\n1", "admin");
        batch.begin_review("directrice", Utc::now()).unwrap();
        assert_eq!(batch.reviewed_by.as_deref(), Some("directrice"));
        batch.mark_applied(vec![4]).unwrap();
        assert_eq!(batch.status, BatchStatus::Applied);
        assert_eq!(batch.skipped_lines, vec![4]);
        assert!(batch.mark_failed("late failure").is_err());
    }

    #[test]
    fn test_reviewer_rejection_leaves_failure_reason_empty() {
        let mut batch = ImportBatch::new(DataType::UserList, "users.csv", "id\n1", "admin");
        batch.mark_rejected("directrice", Utc::now()).unwrap();
        assert_eq!(batch.status, BatchStatus::Rejected);
        assert!(batch.failure_reason.is_none());
        assert!(batch.mark_rejected("directrice", Utc::now()).is_err());
    }

    #[test]
    fn test_apply_claim_requires_approval_and_expires() {
        let mut batch = ImportBatch::new(DataType::ClassList, "classes.csv", "id\nc1", "x");
        assert!(batch.claim_apply(Utc::now()).is_err());
        assert!(batch.claim_expired(Utc::now(), Duration::from_secs(600)));

        let at = Utc::now();
        batch.begin_review("directrice", at).unwrap();
        batch.claim_apply(at).unwrap();
        let first = batch.revision();
        assert_eq!(first.status, BatchStatus::Approved);
        assert!(first.apply_claim.is_some());
        assert!(!batch.claim_expired(at + chrono::Duration::seconds(30), Duration::from_secs(600)));
        assert!(batch.claim_expired(at + chrono::Duration::seconds(601), Duration::from_secs(600)));

        batch.claim_apply(at).unwrap();
        assert_ne!(batch.revision(), first);
    }
}
