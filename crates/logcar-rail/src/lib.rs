#![warn(missing_docs)]

//! LogCar rail: the emit and search protocols around the platform log stream
//!
//! Write path: WriteGroup → LogLine per fragment → emit sink (stdout)
//! Read path:  filter → backboard GraphQL fetch → repair short groups → records

pub mod backboard;
pub mod deadline;
pub mod emit;
pub mod error;
pub mod line;
pub mod query;
pub mod search;

pub use backboard::{
    BackboardClient, BackboardConfig, LogEntry, LogQuery, LogSearch, SearchScope,
    DEFAULT_BACKBOARD_URL,
};
pub use deadline::Deadline;
pub use emit::{EmitSink, Emitter, StdoutSink, DEFAULT_MAX_FRAGMENTS_PER_RECORD};
pub use error::{RailError, Result};
pub use line::{LogLine, ORIGIN};
pub use query::{ExcludeSpec, SearchSpec};
pub use search::{ParsedFragment, RecordHit, SearchEngine, DEFAULT_MAX_LOG_REQUEST_SIZE};
