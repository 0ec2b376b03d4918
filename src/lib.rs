pub mod config;
pub mod domain;
pub mod error;
pub mod idempotency;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod storage;

pub use error::{ImportError, Result};
