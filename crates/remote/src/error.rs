//! Remote cache errors
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | `Config` | Missing branch name, half-set suite variables |
//! | `Vcs` | A git command fails or prints something unexpected |
//! | `Store` | The object store cannot read or write a key |
//! | `Validation` | No usable cache ref, or no local cache to upload |
//! | `Tracer` | Local cache I/O or decoding |

use testtrace_core::TracerError;
use thiserror::Error;

/// Result type alias for remote cache operations
pub type Result<T> = std::result::Result<T, RemoteCacheError>;

/// Remote cache failures
#[derive(Debug, Error)]
pub enum RemoteCacheError {
    /// Invalid or incomplete environment
    #[error("Remote cache configuration error: {0}")]
    Config(String),

    /// Version control query failed
    #[error("Git error: {0}")]
    Vcs(String),

    /// Object store operation failed
    #[error("Object store error on '{key}': {detail}")]
    Store {
        /// Key being accessed
        key: String,
        /// What went wrong
        detail: String,
    },

    /// Remote or local cache contents are unusable
    #[error("Remote cache validation failed: {0}")]
    Validation(String),

    /// Local cache failure
    #[error(transparent)]
    Tracer(#[from] TracerError),
}

impl RemoteCacheError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a VCS error
    pub fn vcs(msg: impl Into<String>) -> Self {
        Self::Vcs(msg.into())
    }

    /// Create a store error for `key`
    pub fn store(key: impl Into<String>, detail: impl ToString) -> Self {
        Self::Store {
            key: key.into(),
            detail: detail.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
