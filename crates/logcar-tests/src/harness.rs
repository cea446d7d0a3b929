//! In-process platform stand-in: capture sink plus filter-evaluating log index

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use logcar_api::{RecordStore, StoreConfig};
use logcar_rail::{EmitSink, LogEntry, LogQuery, LogSearch};
use serde_json::Value;

/// One captured log line with the receipt timestamp the platform would have
/// stamped on it.
#[derive(Debug, Clone)]
pub struct IndexedLine {
    /// Receipt time, strictly increasing per captured line
    pub timestamp: DateTime<Utc>,
    /// The parsed line object
    pub line: Value,
}

/// Shared in-memory log index. The sink appends, the backboard stand-in
/// queries, tests inspect.
pub struct LogIndex {
    entries: Mutex<Vec<IndexedLine>>,
    queries: Mutex<Vec<(String, usize)>>,
    truncate_next: Mutex<Option<usize>>,
}

impl LogIndex {
    /// A fresh empty index.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            truncate_next: Mutex::new(None),
        })
    }

    /// Makes the next fetch return at most `n` entries, simulating an
    /// eventually-consistent index that has not seen a full write group yet.
    pub fn truncate_next_fetch(&self, n: usize) {
        *self.truncate_next.lock().unwrap() = Some(n);
    }

    /// Every (filter, limit) pair the backboard stand-in has served.
    pub fn queries(&self) -> Vec<(String, usize)> {
        self.queries.lock().unwrap().clone()
    }

    /// All captured lines, oldest first.
    pub fn lines(&self) -> Vec<IndexedLine> {
        self.entries.lock().unwrap().clone()
    }

    /// Number of captured lines.
    pub fn line_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn append(&self, line: Value) {
        let mut entries = self.entries.lock().unwrap();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let timestamp = base + Duration::milliseconds(10 * entries.len() as i64);
        entries.push(IndexedLine { timestamp, line });
    }
}

/// Emit sink appending parsed lines to the shared index, the way the
/// platform's log collector tails stdout.
pub struct MemorySink {
    index: Arc<LogIndex>,
}

#[async_trait]
impl EmitSink for MemorySink {
    async fn emit_line(&self, line: &str) -> logcar_rail::Result<()> {
        let parsed: Value = serde_json::from_str(line)?;
        self.index.append(parsed);
        Ok(())
    }
}

/// Log-search stand-in evaluating the platform filter language
/// (`@key:"value"`, ` AND `, leading `-`) over the shared index.
pub struct MemoryBackboard {
    index: Arc<LogIndex>,
}

#[async_trait]
impl LogSearch for MemoryBackboard {
    async fn fetch(&self, query: &LogQuery) -> logcar_rail::Result<Vec<LogEntry>> {
        self.index
            .queries
            .lock()
            .unwrap()
            .push((query.filter.clone(), query.limit));

        let mut matching: Vec<IndexedLine> = self
            .index
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| matches_filter(&query.filter, &entry.line))
            .cloned()
            .collect();
        // the platform serves the newest lines first under a limit
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        let cap = self.index.truncate_next.lock().unwrap().take();
        matching.truncate(cap.unwrap_or(query.limit).min(query.limit));

        Ok(matching.into_iter().map(to_entry).collect())
    }
}

fn matches_filter(filter: &str, line: &Value) -> bool {
    for term in filter.split(" AND ") {
        let term = term.trim();
        if term.is_empty() {
            continue;
        }
        let (negated, body) = match term.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, term),
        };
        let Some(body) = body.strip_prefix('@') else {
            continue;
        };
        let Some((key, quoted)) = body.split_once(':') else {
            continue;
        };
        let wanted = quoted.trim_matches('"');
        let actual = line.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });
        let hit = actual.as_deref() == Some(wanted);
        if hit == negated {
            return false;
        }
    }
    true
}

fn to_entry(indexed: IndexedLine) -> LogEntry {
    let attributes = indexed
        .line
        .as_object()
        .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();
    LogEntry {
        timestamp: indexed.timestamp,
        severity: indexed
            .line
            .get("level")
            .and_then(Value::as_str)
            .unwrap_or("info")
            .to_string(),
        message: indexed
            .line
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        attributes,
    }
}

/// A record store wired to the in-memory platform.
pub struct TestStore {
    /// The store under test
    pub store: RecordStore,
    /// The shared index behind it
    pub index: Arc<LogIndex>,
}

/// Builds a store whose sink and search backend share one in-memory index.
pub fn test_store(config: StoreConfig) -> TestStore {
    let index = LogIndex::new();
    let sink = Arc::new(MemorySink {
        index: index.clone(),
    });
    let backboard = Arc::new(MemoryBackboard {
        index: index.clone(),
    });
    let store = RecordStore::new(config, sink)
        .expect("test config is valid")
        .with_search(backboard);
    TestStore { store, index }
}

/// A config scoped to a test deployment with an aggressive chunk size so
/// small values still fan out into several fragments.
pub fn small_chunk_config() -> StoreConfig {
    StoreConfig {
        max_chunk_length: 8,
        deployment_id: Some("dep-test".to_string()),
        ..StoreConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_terms_and_negation() {
        let line = json!({"__id": "abc", "operation": "create", "index": 3});
        assert!(matches_filter("@__id:\"abc\"", &line));
        assert!(matches_filter("@__id:\"abc\" AND @operation:\"create\"", &line));
        assert!(matches_filter("@index:\"3\"", &line));
        assert!(!matches_filter("@__id:\"other\"", &line));
        assert!(!matches_filter("@__id:\"abc\" AND -@operation:\"create\"", &line));
        assert!(matches_filter("-@operation:\"read\"", &line));
        assert!(matches_filter("", &line));
    }
}
