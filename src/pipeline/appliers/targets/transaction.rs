use serde_json::Value;

use crate::domain::{DataType, FinancialTransaction};
use crate::pipeline::appliers::applier::{id_key, ImportTarget};
use crate::pipeline::appliers::coerce;
use crate::pipeline::decoder::DecodedRecord;

impl ImportTarget for FinancialTransaction {
    const DATA_TYPE: DataType = DataType::FinancialTransactions;

    fn record_key(record: &DecodedRecord) -> String {
        id_key(record)
    }

    fn coerce(field: &str, raw: &str) -> Value {
        match field {
            "amount" => coerce::number_or_zero(raw),
            _ => coerce::text(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::appliers::{records, Applier, UpsertApplier};
    use crate::storage::InMemoryRepository;

    #[tokio::test]
    async fn test_amount_is_numeric() {
        let repo = Arc::new(InMemoryRepository::<FinancialTransaction>::new());
        let applier = UpsertApplier::<FinancialTransaction>::new(repo.clone());

        let stats = applier
            .apply(&records(
                "id,date,description,type,amount,status\n\
                 tx1,2024-09-02,Frais de scolarité,income,\"150000,50\",paid\n\
                 tx2,2024-09-03,Cantine,income,gratuit,pending",
            ))
            .await
            .unwrap();

        assert_eq!(stats.created, 2);
        let paid = repo.get(&"tx1".to_string()).unwrap();
        assert_eq!(paid.amount, 150000.5);
        assert_eq!(paid.kind, "income");
        assert_eq!(repo.get(&"tx2".to_string()).unwrap().amount, 0.0);
    }
}
