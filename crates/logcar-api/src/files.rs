//! File payloads stored as base64 envelopes inside ordinary records

use base64::Engine;
use serde_json::{json, Value};

use crate::error::{ApiError, Result};

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// A file body plus the metadata needed to serve it back.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePayload {
    /// Original file name
    pub name: String,
    /// MIME type to serve the download with
    pub content_type: String,
    /// Raw file bytes
    pub data: Vec<u8>,
}

impl FilePayload {
    /// Wraps the file as the JSON envelope stored in the record.
    pub fn to_envelope(&self) -> Value {
        json!({
            "file": {
                "name": self.name,
                "contentType": self.content_type,
                "encoding": "base64",
                "data": B64.encode(&self.data),
            }
        })
    }

    /// Parses a record payload back into a file.
    pub fn from_envelope(value: &Value) -> Result<Self> {
        let file = value
            .get("file")
            .and_then(Value::as_object)
            .ok_or_else(|| ApiError::InvalidFile("missing file envelope".to_string()))?;
        let name = file
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("download.bin")
            .to_string();
        let content_type = file
            .get("contentType")
            .and_then(Value::as_str)
            .unwrap_or("application/octet-stream")
            .to_string();
        let encoded = file
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::InvalidFile("missing file data".to_string()))?;
        let data = B64
            .decode(encoded)
            .map_err(|e| ApiError::InvalidFile(format!("file data is not valid base64: {e}")))?;
        Ok(Self {
            name,
            content_type,
            data,
        })
    }
}
