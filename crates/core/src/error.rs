//! Error types for testtrace
//!
//! This module defines the error hierarchy shared by every crate in the
//! workspace. We use `thiserror` for automatic `Display` and `Error` trait
//! implementations.
//!
//! Every variant belongs to one [`ErrorCategory`] so a host process can map
//! a failure to an exit code without matching on individual variants:
//!
//! | Category | Variants | Typical cause |
//! |----------|----------|---------------|
//! | Configuration | `Config` | Bad filter, inconsistent shard environment |
//! | Io | `Io`, `IoError` | Unreadable cache directory, failed write |
//! | DataIntegrity | `Serialization`, `DataIntegrity`, `DuplicateExamples`, `UnknownExample` | Corrupt artifacts, colliding example ids |

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for testtrace operations
pub type Result<T> = std::result::Result<T, TracerError>;

/// Coarse classification of a [`TracerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The process was started with invalid settings
    Configuration,
    /// A filesystem or transport operation failed
    Io,
    /// Persisted or observed data violates an invariant
    DataIntegrity,
}

impl ErrorCategory {
    /// Process exit code for this category
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCategory::Configuration => 2,
            ErrorCategory::Io => 3,
            ErrorCategory::DataIntegrity => 4,
        }
    }

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Io => "io",
            ErrorCategory::DataIntegrity => "data-integrity",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error types for testtrace
#[derive(Debug, Error)]
pub enum TracerError {
    /// Invalid configuration (filters, environment, codec selection)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error on a known path
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path being read or written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// I/O error without path context
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Persisted or observed data violates an invariant
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// Distinct examples hashed to the same id
    #[error("{count} examples could not be identified uniquely")]
    DuplicateExamples {
        /// Number of colliding examples (all members of every collision group)
        count: usize,
    },

    /// An event referenced an example that was never registered
    #[error("Unknown example: {0}")]
    UnknownExample(String),
}

impl TracerError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an I/O error carrying the offending path
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a data integrity error
    pub fn data_integrity(msg: impl Into<String>) -> Self {
        Self::DataIntegrity(msg.into())
    }

    /// Category of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            TracerError::Config(_) => ErrorCategory::Configuration,
            TracerError::Io { .. } | TracerError::IoError(_) => ErrorCategory::Io,
            TracerError::Serialization(_)
            | TracerError::DataIntegrity(_)
            | TracerError::DuplicateExamples { .. }
            | TracerError::UnknownExample(_) => ErrorCategory::DataIntegrity,
        }
    }

    /// Exit code a host process should terminate with
    pub fn exit_code(&self) -> i32 {
        self.category().exit_code()
    }
}

impl From<serde_json::Error> for TracerError {
    fn from(e: serde_json::Error) -> Self {
        TracerError::Serialization(e.to_string())
    }
}
