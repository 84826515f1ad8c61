use thiserror::Error;
use vitalgate_storage::StorageError;

/// Errors raised while delivering measurements upstream.
///
/// The API client decides between [`SyncError::Transient`] and
/// [`SyncError::Permanent`]; the worker only reads that classification.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Worth retrying later: timeouts, connection failures, 408, 429, 5xx
    #[error("Transient sync failure{}: {message}", status_suffix(.status))]
    Transient { message: String, status: Option<u16> },

    /// Retrying cannot help: validation rejections and other 4xx
    #[error("Permanent sync failure{}: {message}", status_suffix(.status))]
    Permanent { message: String, status: Option<u16> },

    /// The local queue could not be read or updated
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The client could not be built from its configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl SyncError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            status: None,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::Permanent {
            message: message.into(),
            status: None,
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = if body.is_empty() {
            "empty response body".to_string()
        } else {
            body.chars().take(512).collect()
        };
        match status {
            408 | 429 | 500..=599 => Self::Transient {
                message,
                status: Some(status),
            },
            _ => Self::Permanent {
                message,
                status: Some(status),
            },
        }
    }

    /// Whether the worker should schedule another attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Transient { status, .. } | SyncError::Permanent { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            SyncError::Configuration(e.to_string())
        } else if e.is_decode() {
            SyncError::permanent(format!("unreadable response: {e}"))
        } else {
            // Timeouts, refused connections, resets: the request may not
            // have reached the server, and the idempotency key makes a
            // repeat safe.
            SyncError::Transient {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
