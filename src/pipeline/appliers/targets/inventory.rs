use serde_json::Value;

use crate::domain::{DataType, InventoryItem};
use crate::pipeline::appliers::applier::{id_key, ImportTarget};
use crate::pipeline::appliers::coerce;
use crate::pipeline::decoder::DecodedRecord;

impl ImportTarget for InventoryItem {
    const DATA_TYPE: DataType = DataType::InventoryState;

    fn record_key(record: &DecodedRecord) -> String {
        id_key(record)
    }

    fn coerce(field: &str, raw: &str) -> Value {
        match field {
            "quantity" => coerce::integer_or_zero(raw),
            _ => coerce::text(raw),
        }
    }
}
