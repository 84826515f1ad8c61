use thiserror::Error;

/// Storage-specific error types for the vitalgate gateway.
///
/// These errors represent failures in database operations and in mapping
/// rows back into domain types.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database connection or query execution failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration execution failed
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Entity not found in database
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// JSON columns could not be written or read back
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value does not map back onto a domain type
    #[error("Invalid data in column {column}: {message}")]
    InvalidData { column: String, message: String },

    /// A sync job was asked to move in a direction it cannot
    #[error("Invalid transition for {measurement_id}: {from} -> {to}")]
    InvalidTransition {
        measurement_id: String,
        from: String,
        to: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn not_found(
        entity_type: impl Into<String>,
        field: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            field: field.into(),
            value: value.to_string(),
        }
    }

    pub fn invalid_data(column: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidData {
            column: column.into(),
            message: message.to_string(),
        }
    }

    /// The row exists but cannot be turned back into a domain value.
    /// Reading it again will fail the same way.
    pub fn is_corrupt_row(&self) -> bool {
        matches!(self, Self::Serialization(_) | Self::InvalidData { .. })
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = StorageError::not_found("sync_job", "measurement_id", "abc");
        assert_eq!(
            err.to_string(),
            "Entity not found: sync_job with measurement_id=abc"
        );
    }

    #[test]
    fn test_serialization_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: StorageError = json_err.into();
        assert!(matches!(err, StorageError::Serialization(_)));
        assert!(err.is_corrupt_row());
    }

    #[test]
    fn test_corrupt_row_classification() {
        assert!(StorageError::invalid_data("quality", "unknown quality 'meh'").is_corrupt_row());
        assert!(!StorageError::not_found("sync_job", "measurement_id", "abc").is_corrupt_row());
        assert!(!StorageError::Database(sqlx::Error::PoolTimedOut).is_corrupt_row());
    }
}
