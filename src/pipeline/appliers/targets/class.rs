use serde_json::Value;

use crate::domain::{DataType, SchoolClass};
use crate::pipeline::appliers::applier::{id_key, ImportTarget};
use crate::pipeline::appliers::coerce;
use crate::pipeline::decoder::DecodedRecord;

impl ImportTarget for SchoolClass {
    const DATA_TYPE: DataType = DataType::ClassList;

    fn record_key(record: &DecodedRecord) -> String {
        id_key(record)
    }

    fn coerce(field: &str, raw: &str) -> Value {
        match field {
            "capacity" | "currentOccupancy" => coerce::optional_count(raw),
            _ => coerce::text(raw),
        }
    }
}
