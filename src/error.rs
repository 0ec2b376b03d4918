use thiserror::Error;

use crate::domain::{BatchStatus, DataType};

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("CSV file is empty or contains only the header row")]
    EmptyInput,

    #[error("CSV decoding failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import batch not found: {0}")]
    BatchNotFound(String),

    #[error("Import batch {id} is {status}; only pending batches can be reviewed")]
    InvalidTransition { id: String, status: BatchStatus },

    #[error("Import batch already exists: {0}")]
    DuplicateBatch(String),

    #[error("No applier registered for data type {0}")]
    NoApplier(DataType),

    #[error("Unknown data type: {0}")]
    UnknownDataType(String),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Retained content of batch {0} no longer matches its recorded hash")]
    ContentMismatch(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;
