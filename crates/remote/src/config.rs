//! Remote cache settings from the environment
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `GIT_BRANCH` | `branch_name` (required) |
//! | `TESTTRACE_REMOTE_PREFIX` | `prefix` |
//! | `TEST_SUITE_ID` | `test_suite_id` |
//! | `TEST_SUITES` | `test_suites` |
//! | `USE_TEST_SUITE_ID_CACHE` | `use_test_suite_id_cache` |

use crate::error::{RemoteCacheError, Result};

/// Branch the cache is uploaded for.
pub const GIT_BRANCH: &str = "GIT_BRANCH";
/// Key prefix inside the object store.
pub const ENV_REMOTE_PREFIX: &str = "TESTTRACE_REMOTE_PREFIX";
/// Suite this process belongs to.
pub const TEST_SUITE_ID: &str = "TEST_SUITE_ID";
/// Number of suites uploading under one ref.
pub const TEST_SUITES: &str = "TEST_SUITES";
/// Only require this suite's artifacts when validating a ref.
pub const USE_TEST_SUITE_ID_CACHE: &str = "USE_TEST_SUITE_ID_CACHE";

/// Remote cache settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Key prefix inside the store, without surrounding slashes
    pub prefix: String,
    /// Branch the uploaded cache is recorded for
    pub branch_name: String,
    /// Suite this process uploads and downloads
    pub test_suite_id: Option<String>,
    /// Number of suites sharing a ref
    pub test_suites: Option<usize>,
    /// Validate only this suite's artifacts
    pub use_test_suite_id_cache: bool,
}

impl RemoteConfig {
    /// Settings for a branch with no suites
    pub fn new(branch_name: impl Into<String>) -> Self {
        RemoteConfig {
            prefix: String::new(),
            branch_name: branch_name.into(),
            test_suite_id: None,
            test_suites: None,
            use_test_suite_id_cache: false,
        }
    }

    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`
    ///
    /// # Errors
    ///
    /// Fails when `GIT_BRANCH` is missing, when only one of `TEST_SUITE_ID`
    /// and `TEST_SUITES` is set, or when `TEST_SUITES` is not a positive
    /// number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let branch_name = lookup(GIT_BRANCH)
            .map(|b| b.trim().to_string())
            .filter(|b| !b.is_empty())
            .ok_or_else(|| RemoteCacheError::config(format!("{} environment variable is not set", GIT_BRANCH)))?;

        let prefix = lookup(ENV_REMOTE_PREFIX)
            .map(|p| p.trim_matches('/').to_string())
            .unwrap_or_default();

        let test_suite_id = lookup(TEST_SUITE_ID);
        let test_suites = lookup(TEST_SUITES);
        if test_suite_id.is_some() != test_suites.is_some() {
            return Err(RemoteCacheError::config(format!(
                "{} and {} must be set together",
                TEST_SUITE_ID, TEST_SUITES
            )));
        }

        let test_suites = match test_suites {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(RemoteCacheError::config(format!(
                        "{} must be a positive number, got '{}'",
                        TEST_SUITES, value
                    )))
                }
            },
            None => None,
        };

        let use_test_suite_id_cache = lookup(USE_TEST_SUITE_ID_CACHE).as_deref() == Some("true");

        Ok(RemoteConfig {
            prefix,
            branch_name,
            test_suite_id,
            test_suites,
            use_test_suite_id_cache,
        })
    }

    /// Set the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Set the suite id and suite count
    pub fn with_suite(mut self, test_suite_id: impl Into<String>, test_suites: usize) -> Self {
        self.test_suite_id = Some(test_suite_id.into());
        self.test_suites = Some(test_suites);
        self
    }

    /// Validate only this suite's artifacts
    pub fn with_test_suite_id_cache(mut self, enabled: bool) -> Self {
        self.use_test_suite_id_cache = enabled;
        self
    }

    /// Key of the directory holding a ref's cache for this suite
    pub fn ref_dir(&self, reference: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if !self.prefix.is_empty() {
            parts.push(&self.prefix);
        }
        parts.push(reference);
        if let Some(suite) = &self.test_suite_id {
            parts.push(suite);
        }
        parts.join("/")
    }

    /// Key prefix listing every object of a ref
    pub fn ref_prefix(&self, reference: &str) -> String {
        if self.prefix.is_empty() {
            format!("{}/", reference)
        } else {
            format!("{}/{}/", self.prefix, reference)
        }
    }

    /// Key of the branch refs object
    pub fn branch_refs_key(&self) -> String {
        let key = format!("branch-refs/{}/branch_refs.json", self.branch_name);
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_branch_is_required() {
        let err = RemoteConfig::from_lookup(vars(&[])).unwrap_err();
        assert!(matches!(err, RemoteCacheError::Config(_)));
    }

    #[test]
    fn test_half_set_suites_is_config_error() {
        let err = RemoteConfig::from_lookup(vars(&[(GIT_BRANCH, "main"), (TEST_SUITE_ID, "1")])).unwrap_err();
        assert!(matches!(err, RemoteCacheError::Config(_)));

        let err = RemoteConfig::from_lookup(vars(&[(GIT_BRANCH, "main"), (TEST_SUITES, "2")])).unwrap_err();
        assert!(matches!(err, RemoteCacheError::Config(_)));
    }

    #[test]
    fn test_from_lookup() {
        let config = RemoteConfig::from_lookup(vars(&[
            (GIT_BRANCH, "feature/x\n"),
            (ENV_REMOTE_PREFIX, "/ci/cache/"),
            (TEST_SUITE_ID, "2"),
            (TEST_SUITES, "3"),
            (USE_TEST_SUITE_ID_CACHE, "true"),
        ]))
        .unwrap();

        assert_eq!(config.branch_name, "feature/x");
        assert_eq!(config.prefix, "ci/cache");
        assert_eq!(config.test_suite_id.as_deref(), Some("2"));
        assert_eq!(config.test_suites, Some(3));
        assert!(config.use_test_suite_id_cache);
    }

    #[test]
    fn test_bad_suite_count() {
        let err = RemoteConfig::from_lookup(vars(&[
            (GIT_BRANCH, "main"),
            (TEST_SUITE_ID, "1"),
            (TEST_SUITES, "zero"),
        ]))
        .unwrap_err();
        assert!(matches!(err, RemoteCacheError::Config(_)));
    }

    #[test]
    fn test_keys() {
        let config = RemoteConfig::new("main");
        assert_eq!(config.ref_dir("abc"), "abc");
        assert_eq!(config.ref_prefix("abc"), "abc/");
        assert_eq!(config.branch_refs_key(), "branch-refs/main/branch_refs.json");

        let config = config.with_prefix("ci").with_suite("2", 3);
        assert_eq!(config.ref_dir("abc"), "ci/abc/2");
        assert_eq!(config.ref_prefix("abc"), "ci/abc/");
        assert_eq!(config.branch_refs_key(), "ci/branch-refs/main/branch_refs.json");
    }
}
