use serde_json::Value;

use crate::domain::{DataType, Grade, GradeKey};
use crate::pipeline::appliers::applier::ImportTarget;
use crate::pipeline::appliers::coerce;
use crate::pipeline::decoder::DecodedRecord;

impl ImportTarget for Grade {
    const DATA_TYPE: DataType = DataType::GradeEntries;

    fn record_key(record: &DecodedRecord) -> GradeKey {
        GradeKey::new(
            record.get_or_empty("studentId"),
            record.get_or_empty("evaluationId"),
        )
    }

    fn coerce(field: &str, raw: &str) -> Value {
        match field {
            "score" | "maxGrade" => coerce::optional_number(raw),
            _ => coerce::text(raw),
        }
    }
}
