//! Tracer configuration via `testtrace.toml`
//!
//! Settings are read from an optional `testtrace.toml` in the project root
//! and then overridden by environment variables:
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `TESTTRACE_CACHE_DIR` | `cache_dir` |
//! | `TESTTRACE_COVERAGE_DIR` | `coverage_dir` |
//! | `TESTTRACE_CODEC` | `codec` |
//! | `TESTTRACE_NO_SKIP` | `no_skip` |
//! | `TESTTRACE_VERBOSE` | `verbose` |
//! | `TESTTRACE_FAIL_ON_DUPLICATES` | `fail_on_duplicates` |
//! | `TEST_SUITE_ID` | `test_suite_id` |
//! | `TEST_ENV_NUMBER` + `PARALLEL_TEST_GROUPS` | shard partition |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use testtrace_core::{Filter, FilterSpec, Result, TracerError};
use testtrace_durability::{get_codec, shard_dir_name, Codec, ShardEnv, PARALLEL_TEST_GROUPS, TEST_ENV_NUMBER};

/// Config file name placed in the project root.
pub const CONFIG_FILE_NAME: &str = "testtrace.toml";

/// Cache directory override.
pub const ENV_CACHE_DIR: &str = "TESTTRACE_CACHE_DIR";
/// Coverage directory override.
pub const ENV_COVERAGE_DIR: &str = "TESTTRACE_COVERAGE_DIR";
/// Codec override.
pub const ENV_CODEC: &str = "TESTTRACE_CODEC";
/// Run-everything override.
pub const ENV_NO_SKIP: &str = "TESTTRACE_NO_SKIP";
/// Verbose logging.
pub const ENV_VERBOSE: &str = "TESTTRACE_VERBOSE";
/// Duplicate-example exit policy.
pub const ENV_FAIL_ON_DUPLICATES: &str = "TESTTRACE_FAIL_ON_DUPLICATES";
/// Test suite partition of the cache.
pub const ENV_TEST_SUITE_ID: &str = "TEST_SUITE_ID";

/// Tracer configuration loaded from `testtrace.toml`.
///
/// # Example
///
/// ```toml
/// cache_dir = "testtrace_cache"
/// codec = "msgpack"
/// filters = ["/vendor/bundle/", { pattern = "^/db/" }]
/// coverage_track_files = "lib/**/*.rb"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Project root; the working directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Cache directory, relative to the root.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Coverage directory, relative to the root.
    #[serde(default = "default_coverage_dir")]
    pub coverage_dir: String,
    /// Report codec: `"json"` or `"msgpack"`.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Run every example regardless of the cache.
    #[serde(default)]
    pub no_skip: bool,
    /// Debug-level logging.
    #[serde(default)]
    pub verbose: bool,
    /// Exit non-zero when duplicate examples are found.
    #[serde(default = "default_true")]
    pub fail_on_duplicates: bool,
    /// Glob (relative to the root) of files that must appear in coverage
    /// even when never loaded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage_track_files: Option<String>,
    /// Suite partition of the cache directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_suite_id: Option<String>,
    /// Lock file shared by shard processes.
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,
    /// How long the last shard waits for the others, in seconds.
    #[serde(default = "default_shard_timeout_secs")]
    pub shard_timeout_secs: u64,
    /// Files excluded from dependency tracking.
    #[serde(default = "default_filters")]
    pub filters: Vec<FilterSpec>,
    /// Files excluded from coverage totals.
    #[serde(default = "default_coverage_filters")]
    pub coverage_filters: Vec<FilterSpec>,
    /// Shard partition, from the environment only.
    #[serde(skip)]
    pub shard: Option<ShardEnv>,
}

fn default_cache_dir() -> String {
    "testtrace_cache".to_string()
}

fn default_coverage_dir() -> String {
    "testtrace_coverage".to_string()
}

fn default_codec() -> String {
    "json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("testtrace_parallel_tests.lock")
}

fn default_shard_timeout_secs() -> u64 {
    600
}

fn default_filters() -> Vec<FilterSpec> {
    vec![FilterSpec::Literal("/vendor/bundle/".to_string())]
}

fn default_coverage_filters() -> Vec<FilterSpec> {
    vec![FilterSpec::Composite(
        ["/autotest/", "/features/", "/spec/", "/test/", "/vendor/bundle/"]
            .iter()
            .map(|s| FilterSpec::Literal(s.to_string()))
            .collect(),
    )]
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            root: None,
            cache_dir: default_cache_dir(),
            coverage_dir: default_coverage_dir(),
            codec: default_codec(),
            no_skip: false,
            verbose: false,
            fail_on_duplicates: true,
            coverage_track_files: None,
            test_suite_id: None,
            lock_file: default_lock_file(),
            shard_timeout_secs: default_shard_timeout_secs(),
            filters: default_filters(),
            coverage_filters: default_coverage_filters(),
            shard: None,
        }
    }
}

impl TracerConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# testtrace configuration
#
# Cache and coverage directories, relative to the project root
cache_dir = "testtrace_cache"
coverage_dir = "testtrace_coverage"

# Report codec: "json" (default) or "msgpack"
codec = "json"

# Exit non-zero when examples cannot be identified uniquely (default: true)
fail_on_duplicates = true

# Files excluded from dependency tracking (substring, { pattern = "regex" } or a list)
filters = ["/vendor/bundle/"]

# Files excluded from coverage totals
coverage_filters = [["/autotest/", "/features/", "/spec/", "/test/", "/vendor/bundle/"]]

# Files that must appear in coverage even when never loaded
# coverage_track_files = "lib/**/*.rb"
"#
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TracerError::io(path, e))?;
        let config: TracerConfig = toml::from_str(&content).map_err(|e| {
            TracerError::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        // Validate the codec eagerly
        config.report_codec()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| TracerError::io(path, e))?;
        }
        Ok(())
    }

    /// Load `testtrace.toml` from `root` (defaults when absent), then apply
    /// the process environment.
    pub fn load(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        let mut config = if path.is_file() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        if config.root.is_none() {
            config.root = Some(root.to_path_buf());
        }
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Fails on malformed flags, an unknown codec, or a half-set shard
    /// environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CACHE_DIR) {
            self.cache_dir = dir;
        }
        if let Some(dir) = lookup(ENV_COVERAGE_DIR) {
            self.coverage_dir = dir;
        }
        if let Some(codec) = lookup(ENV_CODEC) {
            self.codec = codec;
        }
        if let Some(flag) = lookup(ENV_NO_SKIP) {
            self.no_skip = parse_flag(ENV_NO_SKIP, &flag)?;
        }
        if let Some(flag) = lookup(ENV_VERBOSE) {
            self.verbose = parse_flag(ENV_VERBOSE, &flag)?;
        }
        if let Some(flag) = lookup(ENV_FAIL_ON_DUPLICATES) {
            self.fail_on_duplicates = parse_flag(ENV_FAIL_ON_DUPLICATES, &flag)?;
        }
        if let Some(suite) = lookup(ENV_TEST_SUITE_ID) {
            self.test_suite_id = Some(suite).filter(|s| !s.is_empty());
        }

        let number = lookup(TEST_ENV_NUMBER);
        let groups = lookup(PARALLEL_TEST_GROUPS);
        self.shard = ShardEnv::from_vars(number.as_deref(), groups.as_deref())?;

        self.report_codec()?;
        Ok(())
    }

    /// Set the project root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Set the cache directory.
    pub fn with_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the coverage directory.
    pub fn with_coverage_dir(mut self, dir: impl Into<String>) -> Self {
        self.coverage_dir = dir.into();
        self
    }

    /// Set the codec.
    pub fn with_codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    /// Run every example regardless of the cache.
    pub fn with_no_skip(mut self, no_skip: bool) -> Self {
        self.no_skip = no_skip;
        self
    }

    /// Set the duplicate-example exit policy.
    pub fn with_fail_on_duplicates(mut self, fail: bool) -> Self {
        self.fail_on_duplicates = fail;
        self
    }

    /// Set the tracked-files glob.
    pub fn with_coverage_track_files(mut self, glob: impl Into<String>) -> Self {
        self.coverage_track_files = Some(glob.into());
        self
    }

    /// Set the shard partition.
    pub fn with_shard(mut self, shard: Option<ShardEnv>) -> Self {
        self.shard = shard;
        self
    }

    /// Set the shard lock file.
    pub fn with_lock_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.lock_file = path.into();
        self
    }

    /// Resolve the configured codec.
    pub fn report_codec(&self) -> Result<Codec> {
        get_codec(&self.codec).map_err(TracerError::from)
    }

    /// Classify the general filters.
    pub fn build_filters(&self) -> Result<Vec<Filter>> {
        self.filters.iter().cloned().map(Filter::register).collect()
    }

    /// Classify the coverage filters.
    pub fn build_coverage_filters(&self) -> Result<Vec<Filter>> {
        self.coverage_filters
            .iter()
            .cloned()
            .map(Filter::register)
            .collect()
    }

    /// Project root.
    pub fn root_path(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Suite-level cache directory (`root/<cache_dir>[/<suite>]`).
    pub fn suite_cache_path(&self) -> PathBuf {
        self.suite_path(&self.cache_dir)
    }

    /// Cache directory this process writes to (adds the shard directory).
    pub fn cache_path(&self) -> PathBuf {
        self.shard_path(self.suite_cache_path())
    }

    /// Suite-level coverage directory.
    pub fn suite_coverage_path(&self) -> PathBuf {
        self.suite_path(&self.coverage_dir)
    }

    /// Coverage directory this process writes to.
    pub fn coverage_path(&self) -> PathBuf {
        self.shard_path(self.suite_coverage_path())
    }

    fn suite_path(&self, dir: &str) -> PathBuf {
        let path = self.root_path().join(dir);
        match &self.test_suite_id {
            Some(suite) => path.join(suite),
            None => path,
        }
    }

    fn shard_path(&self, path: PathBuf) -> PathBuf {
        match &self.shard {
            Some(shard) => path.join(shard_dir_name(shard.partition)),
            None => path,
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(TracerError::config(format!(
            "{} must be true or false, got '{}'",
            name, other
        ))),
    }
}
