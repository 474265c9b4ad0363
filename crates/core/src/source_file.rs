//! Source file identity
//!
//! A [`SourceFile`] is the identity record of one file at one point in time:
//! its absolute path, its root-relative name and a digest of its content.
//! Records are recomputed on every run; a digest mismatch against the cache
//! means the file was modified, and a failed resolution means it was deleted.
//!
//! Modification times are never consulted. The digest is recomputed from the
//! full file bytes on every call.

use crate::hash::hex_digest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Identity record of a source file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceFile {
    /// Absolute path on disk
    pub file_path: String,
    /// Path relative to the project root (keeps the leading `/`)
    pub file_name: String,
    /// Hex digest of the file content
    pub digest: String,
}

/// Maps paths and root-relative names to [`SourceFile`] records
#[derive(Debug, Clone)]
pub struct SourceResolver {
    root: PathBuf,
    root_str: String,
}

impl SourceResolver {
    /// Create a resolver for the given project root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root_str = root
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        SourceResolver { root, root_str }
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `file_path` lives under the project root
    pub fn is_under_root(&self, file_path: &str) -> bool {
        file_path == self.root_str
            || file_path
                .strip_prefix(self.root_str.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Resolve an absolute path; `None` when the file does not exist
    pub fn identify(&self, file_path: &str) -> Option<SourceFile> {
        let path = Path::new(file_path);
        if !path.is_file() {
            return None;
        }

        match std::fs::read(path) {
            Ok(bytes) => Some(SourceFile {
                file_path: file_path.to_string(),
                file_name: self.file_name(file_path),
                digest: hex_digest(&bytes),
            }),
            Err(e) => {
                debug!(target: "testtrace::source", file_path, error = %e, "Unreadable source file treated as deleted");
                None
            }
        }
    }

    /// Resolve a root-relative name; `None` when the file does not exist
    pub fn identify_by_name(&self, file_name: &str) -> Option<SourceFile> {
        self.identify(&self.file_path(file_name))
    }

    /// Root-relative name of an absolute path
    ///
    /// Paths outside the root are returned unchanged.
    pub fn file_name(&self, file_path: &str) -> String {
        if self.is_under_root(file_path) {
            file_path[self.root_str.len()..].to_string()
        } else {
            file_path.to_string()
        }
    }

    /// Absolute path of a root-relative name
    ///
    /// Names that already denote an existing absolute file outside the root
    /// (dependencies installed elsewhere) pass through unchanged.
    pub fn file_path(&self, file_name: &str) -> String {
        let joined = self.root.join(file_name.trim_start_matches('/'));
        if joined.is_file() {
            return joined.to_string_lossy().into_owned();
        }

        if Path::new(file_name).is_absolute() && Path::new(file_name).is_file() {
            return file_name.to_string();
        }

        joined.to_string_lossy().into_owned()
    }
}
