//! Remote cache validation
//!
//! A ref is usable only when its upload finished for every suite: one
//! last-run pointer and the full artifact set of one run per suite.
//!
//! | Mode | Pointers | Artifacts |
//! |------|----------|-----------|
//! | single suite | `<ref>/last_run.<ext>` exactly once | exactly 11 |
//! | `TEST_SUITES=n` | `<ref>/<1..n>/last_run.<ext>` exactly n | exactly 11 * n |
//! | `USE_TEST_SUITE_ID_CACHE` | `<ref>/<suite>/last_run.<ext>` at least once | at least one |

use crate::config::RemoteConfig;
use crate::error::{RemoteCacheError, Result};
use regex::Regex;
use testtrace_durability::{ReportKind, LAST_RUN};

/// Artifacts written per run
pub const CACHE_FILES_PER_TEST_SUITE: usize = ReportKind::ALL.len();

/// Run directory names are hex content digests
const RUN_ID_PATTERN: &str = "[0-9a-f]{64}";

#[derive(Debug, Clone)]
enum Mode {
    Complete {
        suites: Option<usize>,
    },
    SuiteOnly {
        suite: String,
    },
}

/// Checks a listed ref for a complete cache upload
#[derive(Debug, Clone)]
pub struct CacheValidator {
    mode: Mode,
    extension: String,
}

impl CacheValidator {
    /// Validator for artifacts with the given extension
    ///
    /// # Errors
    ///
    /// Fails when suite-only validation is requested without a suite id.
    pub fn new(config: &RemoteConfig, extension: impl Into<String>) -> Result<Self> {
        let mode = if config.use_test_suite_id_cache {
            let suite = config.test_suite_id.clone().ok_or_else(|| {
                RemoteCacheError::config("USE_TEST_SUITE_ID_CACHE requires TEST_SUITE_ID")
            })?;
            Mode::SuiteOnly { suite }
        } else {
            Mode::Complete {
                suites: config.test_suites,
            }
        };

        Ok(CacheValidator {
            mode,
            extension: extension.into(),
        })
    }

    /// Whether `keys`, the store listing of `reference`, hold a complete cache
    pub fn is_valid(&self, reference: &str, keys: &[String]) -> Result<bool> {
        let reference = regex::escape(reference);
        let extension = regex::escape(&self.extension);

        match &self.mode {
            Mode::Complete { suites } => {
                let (suite_dir, expected) = match suites {
                    None => (String::new(), 1),
                    Some(n) => {
                        let alternatives: Vec<String> = (1..=*n).map(|i| i.to_string()).collect();
                        (format!("({})/", alternatives.join("|")), *n)
                    }
                };

                let last_run = compile(&format!(
                    r"(^|/){}/{}{}\.{}$",
                    reference, suite_dir, LAST_RUN, extension
                ))?;
                if count(&last_run, keys) != expected {
                    return Ok(false);
                }

                let artifacts = compile(&format!(
                    r"(^|/){}/{}{}/[^/]+\.{}$",
                    reference, suite_dir, RUN_ID_PATTERN, extension
                ))?;
                Ok(count(&artifacts, keys) == CACHE_FILES_PER_TEST_SUITE * expected)
            }
            Mode::SuiteOnly { suite } => {
                let suite = regex::escape(suite);
                let last_run = compile(&format!(
                    r"(^|/){}/{}/{}\.{}$",
                    reference, suite, LAST_RUN, extension
                ))?;
                let artifacts = compile(&format!(
                    r"(^|/){}/{}/{}/[^/]+\.{}$",
                    reference, suite, RUN_ID_PATTERN, extension
                ))?;
                Ok(count(&last_run, keys) > 0 && count(&artifacts, keys) > 0)
            }
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| RemoteCacheError::validation(format!("invalid pattern '{}': {}", pattern, e)))
}

fn count(regex: &Regex, keys: &[String]) -> usize {
    keys.iter().filter(|key| regex.is_match(key)).count()
}
