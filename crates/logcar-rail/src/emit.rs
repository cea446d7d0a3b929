//! Emit sink abstraction and the write-group emitter

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use logcar_chunk::{Operation, WriteGroup};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RailError, Result};
use crate::line::{LogLine, ORIGIN};

/// Default cap on fragments per write group
pub const DEFAULT_MAX_FRAGMENTS_PER_RECORD: usize = 10_000;

/// Destination for emitted log lines.
///
/// The platform's deployment log collector tails whatever the process writes
/// to standard output; tests capture lines in memory instead.
#[async_trait]
pub trait EmitSink: Send + Sync {
    /// Writes one line (without trailing newline) to the sink.
    async fn emit_line(&self, line: &str) -> Result<()>;
}

/// Emit sink writing newline-terminated lines to standard output.
pub struct StdoutSink {
    out: Mutex<tokio::io::Stdout>,
}

impl StdoutSink {
    /// Creates a sink over this process's stdout.
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmitSink for StdoutSink {
    async fn emit_line(&self, line: &str) -> Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        out.flush().await?;
        Ok(())
    }
}

/// Serializes write groups onto an emit sink.
///
/// Fragments of one group are written in strictly increasing `index`, and a
/// group-level lock keeps concurrent groups from interleaving in the output
/// stream. The per-process `seq` counter gives every line a monotonic
/// tie-breaker for platforms with coarse log timestamps.
pub struct Emitter {
    sink: Arc<dyn EmitSink>,
    seq: AtomicU64,
    group_lock: Mutex<()>,
    max_fragments: usize,
}

impl Emitter {
    /// Creates an emitter over `sink` with the given per-record fragment cap.
    pub fn new(sink: Arc<dyn EmitSink>, max_fragments: usize) -> Self {
        Self {
            sink,
            seq: AtomicU64::new(0),
            group_lock: Mutex::new(()),
            max_fragments,
        }
    }

    /// Emits every fragment of `group`, marker groups included.
    ///
    /// Fails with [`RailError::FanOutExceeded`] before anything is written
    /// when the group is larger than the configured cap, so a rejected write
    /// never leaves a partial group in the log.
    pub async fn emit_group(&self, group: &WriteGroup, encrypted: bool) -> Result<()> {
        if group.len() > self.max_fragments {
            return Err(RailError::FanOutExceeded {
                fragments: group.len(),
                max: self.max_fragments,
            });
        }
        let _guard = self.group_lock.lock().await;
        for sealed in &group.fragments {
            let data = match group.op {
                Operation::Read | Operation::Delete => None,
                _ => Some(sealed.fragment.data.clone()),
            };
            let line = LogLine {
                timestamp: Utc::now(),
                level: "info".to_string(),
                origin: ORIGIN.to_string(),
                message: group.op.to_string(),
                rid: group.rid,
                operation: group.op,
                chunk_id: sealed.fragment.chunk_id.to_string(),
                index: sealed.index,
                total: sealed.total,
                encrypted,
                kind: sealed.fragment.kind,
                seq: self.seq.fetch_add(1, Ordering::Relaxed),
                data,
            };
            self.sink.emit_line(&line.to_json()?).await?;
        }
        debug!(
            rid = %group.rid,
            op = %group.op,
            fragments = group.len(),
            "write group emitted"
        );
        Ok(())
    }
}
