use std::path::{Path, PathBuf};
use thiserror::Error;

/// Unified error type for the queue, its record store and the dispatcher
#[derive(Debug, Error)]
pub enum QueueError {
    /// Filesystem errors against the record store
    #[error("IO operation failed: {operation} ({})", .path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Structured record could not be encoded or decoded
    #[error("Serialization failed: {format} ({})", .path.display())]
    Serialization {
        format: String,
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Pool size was never stored for this queue
    #[error("Pool size is not configured: {} does not exist", .path.display())]
    ConfigMissing { path: PathBuf },

    /// Invalid configuration value
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// The shell could not be started for a command
    #[error("Failed to launch command: {command}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl QueueError {
    /// Create an IO error bound to the path it happened on
    pub fn io<S: Into<String>>(operation: S, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a JSON serialization error
    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        Self::Serialization {
            format: "json".to_string(),
            path: path.as_ref().to_path_buf(),
            source: Box::new(source),
        }
    }

    /// Create a YAML serialization error
    pub fn yaml(path: impl AsRef<Path>, source: serde_yaml::Error) -> Self {
        Self::Serialization {
            format: "yaml".to_string(),
            path: path.as_ref().to_path_buf(),
            source: Box::new(source),
        }
    }

    pub fn config_missing(path: impl AsRef<Path>) -> Self {
        Self::ConfigMissing {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error naming the offending field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn launch<S: Into<String>>(command: S, source: std::io::Error) -> Self {
        Self::Launch {
            command: command.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error stops the dispatcher loop.
    ///
    /// Per-command failures never reach the dispatcher as errors, so anything
    /// surfacing there except a launch failure ends the loop.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Launch { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::ConfigMissing { .. } => "config_missing",
            Self::Configuration { .. } => "configuration",
            Self::Launch { .. } => "launch",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = QueueError::config_missing("/tmp/q/pool_size.json");
        assert!(matches!(err, QueueError::ConfigMissing { .. }));
        assert_eq!(err.category(), "config_missing");
        assert!(err.to_string().contains("pool_size.json"));
    }

    #[test]
    fn test_configuration_field() {
        let err = QueueError::configuration_field("pool size must be at least 1", "size");
        if let QueueError::Configuration { field, .. } = err {
            assert_eq!(field.as_deref(), Some("size"));
        } else {
            panic!("Expected configuration error");
        }
    }

    #[test]
    fn test_fatality() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "sh");
        assert!(!QueueError::launch("ls", io).is_fatal());
        assert!(QueueError::config_missing("pool_size.json").is_fatal());
        assert!(QueueError::internal("boom").is_fatal());
    }
}
