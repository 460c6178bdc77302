//! Persistence for the error resolution log.
//!
//! The whole log lives in one pretty-printed JSON document keyed by error
//! signature. Writes rewrite the document through a temp file rename so a
//! crash never leaves a half-written log behind.

use std::collections::HashMap;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{error::Error, fmt};

use tokio::sync::Mutex;
use tracing::warn;

use crate::models::{ErrorKind, ErrorRecord, Resolution};
use crate::signature::error_signature;

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
    InvalidInput(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "Error log I/O error: {err}"),
            Self::Serialize(err) => write!(f, "Error log serialization error: {err}"),
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
        }
    }
}

impl Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialize(err)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One observation to record against an error message.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub error_message: String,
    pub resolution: String,
    pub success: bool,
    pub note: Option<String>,
    pub error_type: ErrorKind,
    pub query: Option<String>,
}

pub struct ErrorLogStore {
    inner: Arc<StoreInner>,
}

impl Clone for ErrorLogStore {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl fmt::Debug for ErrorLogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorLogStore")
            .field("path", &self.inner.path)
            .finish_non_exhaustive()
    }
}

struct StoreInner {
    path: PathBuf,
    records: Mutex<HashMap<String, ErrorRecord>>,
}

impl ErrorLogStore {
    /// Opens the log at `path`, creating parent directories as needed.
    ///
    /// A missing file yields an empty log. A corrupt file also yields an
    /// empty log and is replaced on the next write instead of aborting
    /// startup.
    ///
    /// # Errors
    /// Returns an error when the parent directory cannot be created or the
    /// file exists but cannot be read.
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(records) => records,
                Err(err) => {
                    warn!(
                        "Error log {} is corrupt, starting empty: {err}",
                        path.display()
                    );
                    HashMap::new()
                }
            },
            Err(err) if err.kind() == IoErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(StoreError::Io(err)),
        };
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                records: Mutex::new(records),
            }),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Records one attempt at resolving `entry.error_message`.
    ///
    /// A successful attempt bumps the matching resolution's success count; a
    /// failed one attaches the caller's note. Resolutions are kept sorted so
    /// the most proven fix is always first. The record's classification
    /// follows the latest entry.
    ///
    /// # Errors
    /// Returns an error when the message or resolution is empty, or when the
    /// log cannot be written back to disk.
    pub async fn log_error(&self, entry: LogEntry) -> StoreResult<ErrorRecord> {
        let message = entry.error_message.trim();
        if message.is_empty() {
            return Err(StoreError::InvalidInput(
                "error_message must not be empty".to_string(),
            ));
        }
        let resolution = entry.resolution.trim();
        if resolution.is_empty() {
            return Err(StoreError::InvalidInput(
                "resolution must not be empty".to_string(),
            ));
        }
        let note = entry
            .note
            .filter(|note| !note.is_empty())
            .unwrap_or_else(|| "No note provided.".to_string());

        let now = chrono::Utc::now().to_rfc3339();
        let mut records = self.inner.records.lock().await;
        let record = records
            .entry(error_signature(message))
            .or_insert_with(|| ErrorRecord::new(message, entry.error_type, now.clone()));
        record.error_type = entry.error_type;
        record.last_seen = now;
        if record.query.is_none() {
            record.query = entry.query;
        }

        match record
            .resolutions
            .iter_mut()
            .find(|known| known.text == resolution)
        {
            Some(known) => {
                if entry.success {
                    known.success_count += 1;
                } else {
                    known.failure_notes.push(note);
                }
            }
            None => record.resolutions.push(Resolution {
                text: resolution.to_string(),
                success_count: u64::from(entry.success),
                failure_notes: if entry.success { Vec::new() } else { vec![note] },
            }),
        }
        record
            .resolutions
            .sort_by(|a, b| b.success_count.cmp(&a.success_count));

        let snapshot = record.clone();
        self.persist(&records).await?;
        Ok(snapshot)
    }

    /// Notes that `message` was produced, optionally while running `query`,
    /// and returns the most proven resolution recorded for it.
    ///
    /// Blank messages are ignored rather than rejected so callers can pass
    /// failures through unconditionally.
    ///
    /// # Errors
    /// Returns an error when the log cannot be written back to disk.
    pub async fn note_failure(
        &self,
        query: Option<&str>,
        message: &str,
    ) -> StoreResult<Option<Resolution>> {
        let message = message.trim();
        if message.is_empty() {
            return Ok(None);
        }
        let now = chrono::Utc::now().to_rfc3339();
        let mut records = self.inner.records.lock().await;
        let record = records
            .entry(error_signature(message))
            .or_insert_with(|| ErrorRecord::new(message, ErrorKind::Error, now.clone()));
        record.last_seen = now;
        if record.query.is_none() {
            record.query = query.map(ToString::to_string);
        }
        let best = record.resolutions.first().cloned();
        self.persist(&records).await?;
        Ok(best)
    }

    /// Returns every resolution recorded for `message`, best first.
    pub async fn resolutions_for(&self, message: &str) -> Vec<Resolution> {
        let records = self.inner.records.lock().await;
        records
            .get(&error_signature(message))
            .map(|record| record.resolutions.clone())
            .unwrap_or_default()
    }

    /// Returns the resolution with the highest success count for `message`.
    pub async fn best_resolution_for(&self, message: &str) -> Option<Resolution> {
        let records = self.inner.records.lock().await;
        records
            .get(&error_signature(message))
            .and_then(|record| record.resolutions.first().cloned())
    }

    /// Returns the classification recorded for `message`.
    pub async fn error_type_for(&self, message: &str) -> Option<ErrorKind> {
        let records = self.inner.records.lock().await;
        records
            .get(&error_signature(message))
            .map(|record| record.error_type)
    }

    /// Returns the whole log keyed by error signature.
    pub async fn all_errors(&self) -> HashMap<String, ErrorRecord> {
        let records = self.inner.records.lock().await;
        records.clone()
    }

    async fn persist(&self, records: &HashMap<String, ErrorRecord>) -> StoreResult<()> {
        let raw = serde_json::to_string_pretty(records)?;
        let tmp = self.inner.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.inner.path).await?;
        Ok(())
    }
}
