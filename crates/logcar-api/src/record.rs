//! The record facade: create, read, update and delete over the log stream

use std::sync::Arc;

use logcar_chunk::{chunk_value, encrypt_value, ChunkError, Operation, WriteGroup};
use logcar_rail::{EmitSink, Emitter, LogSearch, SearchEngine};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{ApiError, Result};

/// Per-call options for record operations.
#[derive(Debug, Clone, Default)]
pub struct RecordOptions {
    /// Cipher input for this call, overriding the process-wide key
    pub key: Option<String>,
}

/// A record as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    /// Record identifier
    pub rid: Uuid,
    /// The record payload
    pub value: Value,
}

/// Ties the chunk engine, emitter and search protocol together behind the
/// public create/read/update/delete operations.
pub struct RecordStore {
    config: StoreConfig,
    emitter: Emitter,
    search: Option<SearchEngine>,
}

impl RecordStore {
    /// Creates a write-capable store over `sink`. Without a search backend
    /// attached, reads fail with [`ApiError::MissingDeploymentId`].
    pub fn new(config: StoreConfig, sink: Arc<dyn EmitSink>) -> Result<Self> {
        config.validate()?;
        let emitter = Emitter::new(sink, config.max_fragments_per_record);
        Ok(Self {
            config,
            emitter,
            search: None,
        })
    }

    /// Attaches the log-search backend that serves reads.
    pub fn with_search(mut self, backend: Arc<dyn LogSearch>) -> Self {
        self.search = Some(SearchEngine::new(
            backend,
            self.config.max_log_request_size,
        ));
        self
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn effective_key<'a>(&'a self, opts: &'a RecordOptions) -> Option<&'a str> {
        opts.key
            .as_deref()
            .or(self.config.encryption_key.as_deref())
    }

    fn search_engine(&self) -> Result<&SearchEngine> {
        self.search.as_ref().ok_or(ApiError::MissingDeploymentId)
    }

    /// Mints a fresh rid and emits the value as a `create` write group.
    pub async fn create(&self, value: Value, opts: &RecordOptions) -> Result<StoredRecord> {
        let rid = Uuid::new_v4();
        self.write(rid, Operation::Create, value, opts).await
    }

    /// Emits a new write group replacing the state of an existing rid.
    ///
    /// The rid is always passed explicitly; a rid-like field inside the
    /// value is ordinary data.
    pub async fn update(
        &self,
        rid: Uuid,
        value: Value,
        opts: &RecordOptions,
    ) -> Result<StoredRecord> {
        self.write(rid, Operation::Update, value, opts).await
    }

    #[instrument(skip_all, fields(rid = %rid, op = %op))]
    async fn write(
        &self,
        rid: Uuid,
        op: Operation,
        value: Value,
        opts: &RecordOptions,
    ) -> Result<StoredRecord> {
        let encrypt = self.config.encryption_enabled || opts.key.is_some();
        let (payload, encrypted) = if encrypt {
            let key = self.effective_key(opts).ok_or(ChunkError::MissingKey)?;
            (Value::String(encrypt_value(&value, key)?), true)
        } else {
            (value.clone(), false)
        };
        let trees = chunk_value(&payload, self.config.max_chunk_length);
        let group = WriteGroup::from_trees(rid, op, trees);
        self.emitter.emit_group(&group, encrypted).await?;
        Ok(StoredRecord { rid, value })
    }

    /// Recovers the latest state of `rid` and emits a `read` audit line.
    pub async fn read(&self, rid: Uuid, opts: &RecordOptions) -> Result<StoredRecord> {
        let engine = self.search_engine()?;
        let hit = engine
            .data_from_id(rid, self.effective_key(opts))
            .await?
            .ok_or(ApiError::NotFound(rid))?;
        self.emitter
            .emit_group(&WriteGroup::marker(rid, Operation::Read), false)
            .await?;
        debug!(%rid, incomplete = hit.incomplete, "record read");
        Ok(StoredRecord {
            rid,
            value: hit.value,
        })
    }

    /// Emits the tombstone that hides `rid` from subsequent reads.
    pub async fn delete(&self, rid: Uuid) -> Result<()> {
        self.emitter
            .emit_group(&WriteGroup::marker(rid, Operation::Delete), false)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use logcar_rail::{LogLine, RailError};
    use serde_json::json;

    #[derive(Default)]
    struct VecSink {
        lines: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EmitSink for VecSink {
        async fn emit_line(&self, line: &str) -> logcar_rail::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn store_with(config: StoreConfig) -> (RecordStore, Arc<VecSink>) {
        let sink = Arc::new(VecSink::default());
        let store = RecordStore::new(config, sink.clone()).unwrap();
        (store, sink)
    }

    fn parsed(sink: &VecSink) -> Vec<LogLine> {
        sink.lines
            .lock()
            .unwrap()
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn create_emits_a_tagged_write_group() {
        let (store, sink) = store_with(StoreConfig::default());
        let record = store
            .create(json!({"hello": "world"}), &RecordOptions::default())
            .await
            .unwrap();

        let lines = parsed(&sink);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].rid, record.rid);
        assert_eq!(lines[0].operation, Operation::Create);
        assert_eq!(lines[0].data, Some(json!({"hello": "world"})));
        assert!(!lines[0].encrypted);
    }

    #[tokio::test]
    async fn per_call_key_forces_encryption() {
        let (store, sink) = store_with(StoreConfig::default());
        let opts = RecordOptions {
            key: Some("00".repeat(32)),
        };
        store.create(json!([1, 2, 3]), &opts).await.unwrap();

        let lines = parsed(&sink);
        assert!(lines[0].encrypted);
        let blob = lines[0].data.as_ref().unwrap().as_str().unwrap();
        let parts: Vec<&str> = blob.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts
            .iter()
            .all(|p| p.chars().all(|c| c.is_ascii_hexdigit())));
    }

    #[tokio::test]
    async fn delete_emits_a_tombstone() {
        let (store, sink) = store_with(StoreConfig::default());
        let rid = Uuid::new_v4();
        store.delete(rid).await.unwrap();

        let lines = parsed(&sink);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].operation, Operation::Delete);
        assert!(lines[0].data.is_none());
    }

    #[tokio::test]
    async fn read_without_search_backend_is_rejected() {
        let (store, _sink) = store_with(StoreConfig::default());
        assert!(matches!(
            store.read(Uuid::new_v4(), &RecordOptions::default()).await,
            Err(ApiError::MissingDeploymentId)
        ));
    }

    #[tokio::test]
    async fn fan_out_cap_fails_the_write_cleanly() {
        let config = StoreConfig {
            max_chunk_length: 1,
            max_fragments_per_record: 4,
            ..StoreConfig::default()
        };
        let (store, sink) = store_with(config);
        let err = store
            .create(json!("abcdefghij"), &RecordOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Rail(RailError::FanOutExceeded { .. })
        ));
        assert!(sink.lines.lock().unwrap().is_empty());
    }
}
