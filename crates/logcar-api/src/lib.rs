#![warn(missing_docs)]

//! LogCar record API: configuration, the record facade and the HTTP surface

pub mod config;
pub mod error;
pub mod files;
pub mod http;
pub mod record;

pub use config::StoreConfig;
pub use error::{ApiError, Result};
pub use files::FilePayload;
pub use record::{RecordOptions, RecordStore, StoredRecord};
