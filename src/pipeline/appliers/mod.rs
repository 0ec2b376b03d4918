//! Per-data-type merge of decoded records into the application's collections.
//!
//! Every family uses the same upsert: find by key, overwrite the fields the row carries,
//! keep the rest. Families differ only in key, cell typing, and preserved fields, which
//! live in [`targets`].

pub mod applier;
pub mod coerce;
pub mod registry;
pub mod targets;

pub use applier::{Applier, ApplyStats, ImportTarget, UpsertApplier};
pub use registry::ApplierRegistry;

#[cfg(test)]
pub(crate) fn records(raw: &str) -> Vec<crate::pipeline::decoder::DecodedRecord> {
    crate::pipeline::decoder::decode(raw, &Default::default())
        .unwrap()
        .records
}
