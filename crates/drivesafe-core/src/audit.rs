//! Append-only audit trail.
//!
//! Every transition and every auto-reply outcome produces one
//! [`AuditRecord`]. Records are written as JSON Lines; a failed write is
//! reported to the caller, which logs it and moves on.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::detection::TransitionKind;
use crate::types::StateSnapshot;

/// Errors raised while appending audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Failed to create the audit directory.
    #[error("Failed to create audit directory {path}: {source}")]
    CreateDirError {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to open or append to the audit file.
    #[error("Failed to write audit file {path}: {source}")]
    WriteError {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialise a record.
    #[error("Failed to serialize audit record: {0}")]
    SerializeError(#[from] serde_json::Error),
}

/// What an audit record is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    /// Phone-in-hand confirmed.
    PhoneAlert,
    /// Block switched on.
    BlockActivated,
    /// Phone moved away after an alert.
    PhoneUsageEnded,
    /// Block switched off.
    BlockCleared,
    /// Auto-reply accepted by the gateway.
    AutoReplySent,
    /// Auto-reply rejected or the gateway was unreachable.
    AutoReplyFailed,
    /// No recipient known, auto-reply not attempted.
    AutoReplySkipped,
}

impl From<TransitionKind> for AuditEvent {
    fn from(kind: TransitionKind) -> Self {
        match kind {
            TransitionKind::Alerted => Self::PhoneAlert,
            TransitionKind::BlockActivated => Self::BlockActivated,
            TransitionKind::PhoneUsageEnded => Self::PhoneUsageEnded,
            TransitionKind::BlockCleared => Self::BlockCleared,
        }
    }
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Time-ordered record identifier.
    pub id: Uuid,
    /// Event name.
    pub event: AuditEvent,
    /// When the record was produced (UTC).
    pub timestamp: DateTime<Utc>,
    /// Distance in centimeters at the time of the event.
    pub distance_cm: Option<u16>,
    /// Motion flag at the time of the event.
    pub motion: bool,
    /// Override flag at the time of the event.
    #[serde(rename = "override")]
    pub override_active: bool,
    /// Correspondent the event concerns, if any.
    pub correspondent: Option<String>,
    /// Free-text detail.
    pub detail: String,
}

impl AuditRecord {
    /// Build a record stamped now from a state snapshot.
    #[must_use]
    pub fn new(
        event: AuditEvent,
        snapshot: &StateSnapshot,
        correspondent: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            event,
            timestamp: Utc::now(),
            distance_cm: snapshot.last_distance_cm,
            motion: snapshot.motion,
            override_active: snapshot.override_active,
            correspondent,
            detail: detail.into(),
        }
    }
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync + 'static {
    /// Append one record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record could not be persisted.
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Audit sink writing one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlAuditLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlAuditLog {
    /// Create a sink appending to `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the audit file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back. Lines that fail to parse are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, AuditError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content =
            std::fs::read_to_string(&self.path).map_err(|source| AuditError::WriteError {
                path: self.path.clone(),
                source,
            })?;
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

impl AuditSink for JsonlAuditLog {
    fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        // Serialise writers so concurrent lines never interleave.
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|source| AuditError::CreateDirError {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| AuditError::WriteError {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .map_err(|source| AuditError::WriteError {
                path: self.path.clone(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot() -> StateSnapshot {
        StateSnapshot {
            motion: true,
            last_distance_cm: Some(12),
            ..StateSnapshot::default()
        }
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("nested").join("audit.jsonl"));

        let first = AuditRecord::new(AuditEvent::PhoneAlert, &snapshot(), None, "confirmed");
        let second = AuditRecord::new(
            AuditEvent::AutoReplySent,
            &snapshot(),
            Some("+15550001111".into()),
            "SM123",
        );
        log.append(&first).unwrap();
        log.append(&second).unwrap();

        let records = log.read_all().unwrap();
        assert_eq!(records, vec![first, second]);
    }

    #[test]
    fn test_record_json_shape() {
        let record = AuditRecord::new(AuditEvent::BlockCleared, &snapshot(), None, "");
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"event\":\"block_cleared\""));
        assert!(json.contains("\"override\":false"));
        assert!(json.contains("\"distance_cm\":12"));
    }

    #[test]
    fn test_unwritable_path_reports_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be opened for appending.
        let log = JsonlAuditLog::new(dir.path());
        let record = AuditRecord::new(AuditEvent::PhoneAlert, &snapshot(), None, "x");

        assert!(matches!(
            log.append(&record),
            Err(AuditError::WriteError { .. })
        ));
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        let log = JsonlAuditLog::new(dir.path().join("none.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }
}
