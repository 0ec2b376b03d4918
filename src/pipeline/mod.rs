//! Import pipeline: decode, apply, and the review state machine that drives them.

pub mod appliers;
pub mod decoder;
pub mod orchestrator;

pub use appliers::{Applier, ApplierRegistry, ApplyStats, ImportTarget, UpsertApplier};
pub use decoder::{decode, DecodeOutcome, DecodedRecord, DecoderOptions, SkippedLine};
pub use orchestrator::{ApprovalOutcome, ReviewOptions, ReviewOrchestrator};
