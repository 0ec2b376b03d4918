use crate::domain::{DataType, Teacher};
use crate::pipeline::appliers::applier::{id_key, ImportTarget};
use crate::pipeline::decoder::DecodedRecord;

impl ImportTarget for Teacher {
    const DATA_TYPE: DataType = DataType::TeacherList;
    // One cell cannot carry the list; `subject` holds the primary one.
    const PRESERVED_FIELDS: &'static [&'static str] = &["subjects"];

    fn record_key(record: &DecodedRecord) -> String {
        id_key(record)
    }
}
