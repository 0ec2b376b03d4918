use serde_json::Value;

use crate::domain::{DataType, User};
use crate::pipeline::appliers::applier::{id_key, ImportTarget};
use crate::pipeline::appliers::coerce;
use crate::pipeline::decoder::DecodedRecord;

impl ImportTarget for User {
    const DATA_TYPE: DataType = DataType::UserList;
    // Permission grants are managed in the application, never from a file.
    const PRESERVED_FIELDS: &'static [&'static str] = &["custom_permissions"];

    fn record_key(record: &DecodedRecord) -> String {
        id_key(record)
    }

    fn coerce(field: &str, raw: &str) -> Value {
        match field {
            "is_active" => coerce::boolean(raw),
            _ => coerce::text(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::appliers::{records, Applier, UpsertApplier};
    use crate::storage::InMemoryRepository;

    #[tokio::test]
    async fn test_user_import_keeps_permissions() {
        let repo = Arc::new(InMemoryRepository::with_entities([User {
            id: "u1".into(),
            email: "comptable@ecole.sn".into(),
            role: "accountant".into(),
            is_active: true,
            custom_permissions: BTreeMap::from([("finance.export".to_string(), true)]),
            ..Default::default()
        }]));
        let applier = UpsertApplier::<User>::new(repo.clone());

        let stats = applier
            .apply(&records(
                "id,email,role,is_active,custom_permissions\n\
                 u1,comptable@ecole.sn,accountant,non,{}\n\
                 u2,prof@ecole.sn,teacher,oui,{}",
            ))
            .await
            .unwrap();

        assert_eq!(stats.updated, 1);
        assert_eq!(stats.created, 1);

        let existing = repo.get(&"u1".to_string()).unwrap();
        assert!(!existing.is_active);
        assert_eq!(existing.custom_permissions.get("finance.export"), Some(&true));

        let created = repo.get(&"u2".to_string()).unwrap();
        assert!(created.is_active);
        assert!(created.custom_permissions.is_empty());
    }
}
