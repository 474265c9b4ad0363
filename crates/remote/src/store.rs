//! Object store abstraction
//!
//! The remote cache only needs four operations on `/`-separated keys. The
//! filesystem store maps keys below a root directory and serves as the
//! reference implementation; network transports implement the same trait
//! outside this crate.

use crate::error::{RemoteCacheError, Result};
use std::path::{Component, Path, PathBuf};
use testtrace_durability::write_atomic;

/// Key/value blob storage
pub trait ObjectStore {
    /// Whether an object exists under `key`
    fn exists(&self, key: &str) -> Result<bool>;

    /// Read the object under `key`
    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Write `bytes` under `key`, replacing any existing object
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Keys starting with `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Object store backed by a local directory
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsObjectStore { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        let valid = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !valid {
            return Err(RemoteCacheError::store(key, "invalid key"));
        }
        Ok(self.root.join(relative))
    }

    fn collect(&self, dir: &Path, keys: &mut Vec<String>) -> Result<()> {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(RemoteCacheError::store(dir.display().to_string(), e)),
        };

        for entry in entries {
            let path = entry
                .map_err(|e| RemoteCacheError::store(dir.display().to_string(), e))?
                .path();
            if path.is_dir() {
                self.collect(&path, keys)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                let key: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                keys.push(key.join("/"));
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsObjectStore {
    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.path(key)?.is_file())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path(key)?;
        std::fs::read(&path).map_err(|e| RemoteCacheError::store(key, e))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key)?;
        write_atomic(&path, bytes).map_err(|e| RemoteCacheError::store(key, e))
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let prefix = prefix.trim_start_matches('/');
        // Walk the deepest directory fully named by the prefix.
        let dir = match prefix.rfind('/') {
            Some(idx) => self.path(&prefix[..idx])?,
            None => self.root.clone(),
        };

        let mut keys = Vec::new();
        self.collect(&dir, &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}
