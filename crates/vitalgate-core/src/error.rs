use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Decode errors
    #[error("Malformed packet: {reason}")]
    MalformedPacket { reason: String },

    #[error("Incomplete frame: {0}")]
    IncompleteFrame(String),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // Identifier errors
    #[error("Invalid device ID: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid measurement ID: {0}")]
    InvalidMeasurementId(String),

    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedPacket {
            reason: reason.into(),
        }
    }

    pub fn incomplete(detail: impl Into<String>) -> Self {
        Self::IncompleteFrame(detail.into())
    }

    /// Decode-local errors: the frame is discarded, the connection stays up.
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedPacket { .. } | Error::IncompleteFrame(_) | Error::ChecksumMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
