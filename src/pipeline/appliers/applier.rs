use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, error};

use crate::domain::DataType;
use crate::error::{ImportError, Result};
use crate::pipeline::decoder::DecodedRecord;
use crate::storage::{Entity, Repository};

/// Counts of what an apply did to its target collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub created: usize,
    pub updated: usize,
}

impl ApplyStats {
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

/// Merge strategy for one data type.
///
/// Implementations must return an error on any structural or storage failure rather than
/// reporting success; the orchestrator attributes that error to the batch.
#[async_trait]
pub trait Applier: Send + Sync {
    fn data_type(&self) -> DataType;

    /// Upsert `records` in order. Entities merged before a failing row stay merged.
    async fn apply(&self, records: &[DecodedRecord]) -> Result<ApplyStats>;
}

/// How a target entity family reads a decoded row.
pub trait ImportTarget: Entity + Default {
    const DATA_TYPE: DataType;

    /// Fields the import format cannot express. An import never writes them: existing values
    /// are kept and new entities get the field's empty value.
    const PRESERVED_FIELDS: &'static [&'static str] = &[];

    /// Key used to find the entity this row updates.
    fn record_key(record: &DecodedRecord) -> Self::Key;

    /// Typed JSON value for one cell. Never fails: unparseable input takes the field default.
    fn coerce(_field: &str, raw: &str) -> Value {
        Value::String(raw.to_string())
    }
}

/// Key for families addressed by their `id` column; a missing column reads as `""`.
pub(crate) fn id_key(record: &DecodedRecord) -> String {
    record.get_or_empty("id").to_string()
}

/// Coerced cells of `record`, minus preserved fields.
pub(crate) fn incoming_fields<E: ImportTarget>(record: &DecodedRecord) -> Map<String, Value> {
    record
        .fields()
        .filter(|(name, _)| !E::PRESERVED_FIELDS.iter().any(|p| p == name))
        .map(|(name, raw)| (name.to_string(), E::coerce(name, raw)))
        .collect()
}

/// Shallow merge: every incoming field overwrites the same-named field of `base`; everything
/// else on `base` is left as it was.
pub(crate) fn merge_fields<E: ImportTarget>(base: E, incoming: Map<String, Value>) -> Result<E> {
    let mut doc = match serde_json::to_value(base)? {
        Value::Object(map) => map,
        other => {
            return Err(ImportError::Storage {
                message: format!(
                    "{} entity did not serialize to an object: {}",
                    E::COLLECTION,
                    other
                ),
            })
        }
    };
    doc.extend(incoming);
    Ok(serde_json::from_value(Value::Object(doc))?)
}

/// The upsert engine shared by every data type.
pub struct UpsertApplier<E: ImportTarget> {
    repo: Arc<dyn Repository<E>>,
}

impl<E: ImportTarget> UpsertApplier<E> {
    pub fn new(repo: Arc<dyn Repository<E>>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl<E: ImportTarget> Applier for UpsertApplier<E> {
    fn data_type(&self) -> DataType {
        E::DATA_TYPE
    }

    async fn apply(&self, records: &[DecodedRecord]) -> Result<ApplyStats> {
        let mut stats = ApplyStats::default();

        for record in records {
            let key = E::record_key(record);
            let incoming = incoming_fields::<E>(record);

            let (base, existed) = match self.repo.find_by_key(&key).await? {
                Some(existing) => (existing, true),
                None => (E::default(), false),
            };
            let entity = merge_fields(base, incoming)?;

            if let Err(e) = self.repo.upsert(entity).await {
                error!(
                    collection = E::COLLECTION,
                    key = %key,
                    line = record.line,
                    "Upsert failed: {}",
                    e
                );
                return Err(e);
            }

            if existed {
                stats.updated += 1;
                debug!("Updated {} {} from line {}", E::COLLECTION, key, record.line);
            } else {
                stats.created += 1;
                debug!("Created {} {} from line {}", E::COLLECTION, key, record.line);
            }
        }

        Ok(stats)
    }
}
