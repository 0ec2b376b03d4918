use crate::domain::{DataType, Student};
use crate::pipeline::appliers::applier::{id_key, ImportTarget};
use crate::pipeline::decoder::DecodedRecord;

impl ImportTarget for Student {
    const DATA_TYPE: DataType = DataType::StudentList;
    const PRESERVED_FIELDS: &'static [&'static str] = &["documents"];

    fn record_key(record: &DecodedRecord) -> String {
        id_key(record)
    }
}
