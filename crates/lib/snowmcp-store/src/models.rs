//! Data model for the error resolution log.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of a logged error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    Error,
    Warning,
    Info,
    Logical,
    Other,
    Failure,
}

impl ErrorKind {
    /// Parses a free-form label, mapping anything unrecognized to
    /// [`ErrorKind::Other`].
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warning" => Self::Warning,
            "info" => Self::Info,
            "logical" => Self::Logical,
            "failure" => Self::Failure,
            _ => Self::Other,
        }
    }

    /// Canonical lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
            Self::Logical => "logical",
            Self::Other => "other",
            Self::Failure => "failure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remembered fix for an error, ranked by how often it worked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(rename = "resolution")]
    pub text: String,
    pub success_count: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failure_notes: Vec<String>,
}

/// Everything known about one distinct error message.
///
/// Records are keyed by the normalized signature of `error_message`, so the
/// stored message is the first concrete wording that was observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error_message: String,
    #[serde(default)]
    pub error_type: ErrorKind,
    pub first_seen: String,
    pub last_seen: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resolutions: Vec<Resolution>,
}

impl ErrorRecord {
    /// Creates a record for a message first observed at `seen_at`.
    #[must_use]
    pub fn new(error_message: impl Into<String>, error_type: ErrorKind, seen_at: String) -> Self {
        Self {
            error_message: error_message.into(),
            error_type,
            first_seen: seen_at.clone(),
            last_seen: seen_at,
            query: None,
            resolutions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorKind;

    #[test]
    fn labels_round_trip() {
        for kind in [
            ErrorKind::Error,
            ErrorKind::Warning,
            ErrorKind::Info,
            ErrorKind::Logical,
            ErrorKind::Other,
            ErrorKind::Failure,
        ] {
            assert_eq!(ErrorKind::from_label(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_labels_become_other() {
        assert_eq!(ErrorKind::from_label("catastrophe"), ErrorKind::Other);
        assert_eq!(ErrorKind::from_label("  WARNING "), ErrorKind::Warning);
        assert_eq!(ErrorKind::from_label(""), ErrorKind::Other);
    }
}
