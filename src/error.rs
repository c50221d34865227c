//! Error types for Timechain

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("Invalid parent: {0}")]
    InvalidParent(String),
    #[error("Non-monotonic timestamp: {timestamp} is before parent timestamp {parent}")]
    NonMonotonicTimestamp { timestamp: i64, parent: i64 },
    #[error("Integrity error: hash mismatch: have {have} want {want}")]
    IntegrityError { have: String, want: String },
    #[error("Block not found: {0}")]
    BlockNotFound(String),
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl ChainError {
    /// True for lookups of keys that simply do not exist in the store.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainError::BlockNotFound(_))
    }
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<rusqlite::Error> for ChainError {
    fn from(err: rusqlite::Error) -> Self {
        ChainError::DatabaseError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ChainError::NonMonotonicTimestamp { timestamp: 3, parent: 5 };
        assert_eq!(
            err.to_string(),
            "Non-monotonic timestamp: 3 is before parent timestamp 5"
        );

        let err = ChainError::IntegrityError { have: "0xaa".into(), want: "0xbb".into() };
        assert_eq!(err.to_string(), "Integrity error: hash mismatch: have 0xaa want 0xbb");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: ChainError = io.into();
        assert!(matches!(err, ChainError::IoError(_)));
        assert!(!err.is_not_found());
        assert!(ChainError::BlockNotFound("x".into()).is_not_found());
    }
}
