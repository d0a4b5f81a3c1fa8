//! Error taxonomy for input mapping
//!
//! Every failure surfaced by the reader falls into one of these categories.
//! Only adaptive state lookups recover from [`InputMappingError::NotFound`];
//! everything else aborts the current download call.

/// Boxed underlying cause of a remote operation failure
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync>;

/// Error type for input mapping operations
#[derive(Debug, thiserror::Error)]
pub enum InputMappingError {
    /// Malformed or contradictory input options
    #[error("{0}")]
    Configuration(String),

    /// A referenced table, file or state entry does not exist
    #[error("{0}")]
    NotFound(String),

    /// A metadata search matched more than one table
    #[error("{0}")]
    AmbiguousResult(String),

    /// The staging backend is unknown or unavailable for the project
    #[error("{0}")]
    UnsupportedBackend(String),

    /// The storage service failed while listing, exporting, loading or downloading
    #[error("{message}")]
    RemoteOperation {
        message: String,
        #[source]
        source: BoxedCause,
    },

    /// Table is larger than the export ceiling
    #[error(
        "Table \"{table_id}\" with size {size_bytes} bytes exceeds the input mapping limit of {limit_bytes} bytes. Please contact support to raise this limit"
    )]
    CapacityExceeded {
        table_id: String,
        size_bytes: u64,
        limit_bytes: u64,
    },

    /// Local filesystem error while staging data or manifests
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest or state encoding error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl InputMappingError {
    pub fn configuration(message: impl Into<String>) -> Self {
        InputMappingError::Configuration(message.into())
    }

    /// Wrap a storage service failure with the operation it interrupted
    pub fn remote(message: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        InputMappingError::RemoteOperation {
            message: message.into(),
            source: source.into(),
        }
    }

    /// True when the error is a missing table or state entry
    pub fn is_not_found(&self) -> bool {
        matches!(self, InputMappingError::NotFound(_))
    }
}

impl From<serde_json::Error> for InputMappingError {
    fn from(err: serde_json::Error) -> Self {
        InputMappingError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for InputMappingError {
    fn from(err: serde_yaml::Error) -> Self {
        InputMappingError::Serialization(err.to_string())
    }
}

/// Result type for input mapping operations
pub type InputMappingResult<T> = Result<T, InputMappingError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;

    #[test]
    fn test_capacity_message_names_size_and_limit() {
        let err = InputMappingError::CapacityExceeded {
            table_id: "in.c-main.big".to_string(),
            size_bytes: 200,
            limit_bytes: 100,
        };
        assert_eq!(
            err.to_string(),
            "Table \"in.c-main.big\" with size 200 bytes exceeds the input mapping limit of 100 bytes. Please contact support to raise this limit"
        );
    }

    #[test]
    fn test_remote_error_keeps_cause() {
        let err = InputMappingError::remote(
            "Failed to download file data.csv (12): boom",
            ClientError::Api {
                code: "storage.error".to_string(),
                message: "boom".to_string(),
            },
        );
        assert_eq!(err.to_string(), "Failed to download file data.csv (12): boom");
        let source = std::error::Error::source(&err).unwrap();
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(InputMappingError::NotFound("x".into()).is_not_found());
        assert!(!InputMappingError::configuration("x").is_not_found());
    }
}
