//! The log-line wire format: one fragment per single-line JSON object

use chrono::{DateTime, Utc};
use logcar_chunk::{Operation, StructKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The `origin` tag stamped on every emitted line
pub const ORIGIN: &str = "LogRail";

/// One emitted log line carrying one fragment.
///
/// Marker lines (`read` audits, `delete` tombstones) omit `data` entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLine {
    /// Emission time, RFC 3339; the platform's own receipt timestamp is the
    /// durable ordering axis, this one is informational
    pub timestamp: DateTime<Utc>,
    /// Log severity, `info` for storage lines
    pub level: String,
    /// Constant origin tag, see [`ORIGIN`]
    pub origin: String,
    /// The operation name, duplicated for human-readable log views
    pub message: String,
    /// Record identifier
    #[serde(rename = "__id")]
    pub rid: Uuid,
    /// Operation this fragment belongs to
    pub operation: Operation,
    /// Structural chunk id
    #[serde(rename = "chunkId")]
    pub chunk_id: String,
    /// Global ordinal within the write group
    pub index: usize,
    /// Fragment count of the write group
    pub total: usize,
    /// Whether `data` is ciphertext
    pub encrypted: bool,
    /// Structural kind of `data`
    pub kind: StructKind,
    /// Per-process monotonic sequence, tie-breaker for coarse timestamps
    pub seq: u64,
    /// Fragment payload; absent on marker lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LogLine {
    /// Serializes to the single-line JSON wire form (no trailing newline).
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
