//! Append-only audit trail of signature decisions.
//!
//! Every decision the enforcement engine reaches produces exactly one
//! [`AuditEntry`]. Sinks are best-effort: a sink that cannot write logs a
//! warning and returns, it never fails or panics into the caller.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enforcement::{Decision, Operation};
use crate::error::{SigError, SigResult};
use crate::policy::Mode;

/// Returned verdict, as recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Allowed,
    Denied,
}

/// One decision record (one NDJSON line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub operation: Operation,
    pub resource: String,
    pub result: AuditResult,
    /// Reason code; identical across modes for the same input.
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    pub mode: Mode,
    /// Codec error codes, when cryptographic verification ran and failed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl AuditEntry {
    pub fn from_decision(
        timestamp: DateTime<Utc>,
        operation: Operation,
        resource: &str,
        decision: &Decision,
    ) -> Self {
        Self {
            timestamp,
            operation,
            resource: resource.to_string(),
            result: if decision.allowed {
                AuditResult::Allowed
            } else {
                AuditResult::Denied
            },
            reason: decision.reason.as_str().to_string(),
            key_id: decision.key_id.clone(),
            algorithm: decision.algorithm.clone(),
            mode: decision.mode,
            errors: decision
                .errors
                .iter()
                .map(|e| e.as_str().to_string())
                .collect(),
        }
    }
}

/// Destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Record an entry. Must not panic or block indefinitely.
    fn record(&self, entry: &AuditEntry);
}

/// Appends entries as JSON lines to a file.
///
/// The file is opened in append mode per entry and each line goes out in a
/// single `write_all` under a mutex, so concurrent callers in this process
/// never interleave partial lines and external rotation is picked up on the
/// next write. Parent directories are created on demand.
#[derive(Debug)]
pub struct FileAuditSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, line: &[u8]) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line)
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, entry: &AuditEntry) {
        let mut line = match serde_json::to_vec(entry) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize audit entry");
                return;
            }
        };
        line.push(b'\n');

        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = self.append(&line) {
            tracing::warn!(
                path = %self.path.display(),
                error = %e,
                resource = %entry.resource,
                reason = %entry.reason,
                "failed to write audit entry"
            );
        }
    }
}

/// Discards entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _entry: &AuditEntry) {}
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: &AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry.clone());
    }
}

/// Parse an NDJSON audit log. Blank lines are skipped.
pub fn read_audit_log(path: &Path) -> SigResult<Vec<AuditEntry>> {
    let content = fs::read_to_string(path).map_err(|e| SigError::io(path, e))?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| SigError::Config {
                message: format!("{}:{}: invalid audit entry: {e}", path.display(), idx + 1),
            })
        })
        .collect()
}
