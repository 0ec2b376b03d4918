use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{
    DataType, FinancialTransaction, Grade, InventoryItem, SchoolClass, Student, Teacher, User,
};
use crate::error::Result;
use crate::pipeline::decoder::DecodedRecord;
use crate::storage::Collections;

use super::applier::{Applier, ApplyStats, UpsertApplier};

/// Registry that maps each data type to the applier that merges it.
#[derive(Default)]
pub struct ApplierRegistry {
    appliers: HashMap<DataType, Arc<dyn Applier>>,
}

impl ApplierRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the standard applier for every data type, writing into `collections`.
    pub fn with_collections(collections: &Collections) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(UpsertApplier::<SchoolClass>::new(
            collections.classes.clone(),
        )));
        registry.register(Arc::new(UpsertApplier::<Student>::new(
            collections.students.clone(),
        )));
        registry.register(Arc::new(UpsertApplier::<Teacher>::new(
            collections.teachers.clone(),
        )));
        registry.register(Arc::new(UpsertApplier::<Grade>::new(
            collections.grades.clone(),
        )));
        registry.register(Arc::new(UpsertApplier::<FinancialTransaction>::new(
            collections.transactions.clone(),
        )));
        registry.register(Arc::new(UpsertApplier::<InventoryItem>::new(
            collections.inventory.clone(),
        )));
        registry.register(Arc::new(UpsertApplier::<User>::new(
            collections.users.clone(),
        )));
        registry
    }

    /// Register an applier, replacing any earlier one for the same data type.
    pub fn register(&mut self, applier: Arc<dyn Applier>) {
        let data_type = applier.data_type();
        info!("Registering applier for data type: {}", data_type);
        if self.appliers.insert(data_type, applier).is_some() {
            warn!("Replaced existing applier for {}", data_type);
        }
    }

    pub fn get(&self, data_type: DataType) -> Option<Arc<dyn Applier>> {
        self.appliers.get(&data_type).cloned()
    }

    /// Apply `records` with the applier for `data_type`; `None` when none is registered.
    pub async fn apply(
        &self,
        data_type: DataType,
        records: &[DecodedRecord],
    ) -> Result<Option<ApplyStats>> {
        match self.appliers.get(&data_type) {
            Some(applier) => {
                debug!(
                    "Applier {} processing {} records",
                    data_type,
                    records.len()
                );
                applier.apply(records).await.map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.appliers.len()
    }

    pub fn registered_types(&self) -> Vec<DataType> {
        let mut types: Vec<DataType> = self.appliers.keys().copied().collect();
        types.sort();
        types
    }
}

impl fmt::Debug for ApplierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplierRegistry")
            .field("registered", &self.registered_types())
            .finish()
    }
}
