//! File filters
//!
//! Filters decide whether a file is excluded from dependency tracking
//! (general filters) or from coverage totals (coverage filters). Matching is
//! always done against the root-relative `file_name`, never the absolute
//! path, so the same configuration works on every checkout location.
//!
//! Filters form a closed set of variants. Configuration input is described
//! by [`FilterSpec`] and classified by [`Filter::register`]; shapes that do
//! not fit any variant are rejected as configuration errors.

use crate::error::{Result, TracerError};
use crate::source_file::SourceFile;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The part of a file record a filter may inspect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterTarget<'a> {
    /// Root-relative file name
    pub file_name: &'a str,
    /// Absolute path, when known
    pub file_path: Option<&'a str>,
}

impl<'a> FilterTarget<'a> {
    /// Target carrying only a file name
    pub fn name(file_name: &'a str) -> Self {
        FilterTarget {
            file_name,
            file_path: None,
        }
    }
}

impl<'a> From<&'a SourceFile> for FilterTarget<'a> {
    fn from(file: &'a SourceFile) -> Self {
        FilterTarget {
            file_name: &file.file_name,
            file_path: Some(&file.file_path),
        }
    }
}

/// Predicate signature for [`Filter::Predicate`]
pub type FilterFn = dyn Fn(&FilterTarget<'_>) -> bool + Send + Sync;

/// A file filter
#[derive(Clone)]
pub enum Filter {
    /// Substring match on the file name
    Literal(String),
    /// Regular expression match on the file name
    Pattern(Regex),
    /// Arbitrary predicate
    Predicate(Arc<FilterFn>),
    /// Matches when any child matches
    Composite(Vec<Filter>),
}

impl Filter {
    /// Substring filter
    pub fn literal(s: impl Into<String>) -> Self {
        Filter::Literal(s.into())
    }

    /// Regular expression filter
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Filter::Pattern)
            .map_err(|e| TracerError::config(format!("invalid filter pattern '{}': {}", pattern, e)))
    }

    /// Predicate filter
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&FilterTarget<'_>) -> bool + Send + Sync + 'static,
    {
        Filter::Predicate(Arc::new(f))
    }

    /// Composite filter
    pub fn composite(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Composite(filters.into_iter().collect())
    }

    /// Classify configuration input into a filter
    pub fn register(spec: FilterSpec) -> Result<Self> {
        match spec {
            FilterSpec::Literal(s) => Ok(Filter::Literal(s)),
            FilterSpec::Pattern { pattern } => Filter::pattern(&pattern),
            FilterSpec::Composite(specs) => specs
                .into_iter()
                .map(Filter::register)
                .collect::<Result<Vec<_>>>()
                .map(Filter::Composite),
        }
    }

    /// Whether this filter matches the target
    pub fn matches(&self, target: &FilterTarget<'_>) -> bool {
        match self {
            Filter::Literal(s) => target.file_name.contains(s.as_str()),
            Filter::Pattern(re) => re.is_match(target.file_name),
            Filter::Predicate(f) => f(target),
            Filter::Composite(filters) => filters.iter().any(|f| f.matches(target)),
        }
    }

    /// Whether this filter matches the source file
    pub fn matches_file(&self, file: &SourceFile) -> bool {
        self.matches(&FilterTarget::from(file))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            Filter::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Filter::Predicate(_) => f.write_str("Predicate(..)"),
            Filter::Composite(filters) => f.debug_tuple("Composite").field(filters).finish(),
        }
    }
}

impl From<&str> for Filter {
    fn from(s: &str) -> Self {
        Filter::literal(s)
    }
}

impl From<Regex> for Filter {
    fn from(re: Regex) -> Self {
        Filter::Pattern(re)
    }
}

impl From<Vec<Filter>> for Filter {
    fn from(filters: Vec<Filter>) -> Self {
        Filter::Composite(filters)
    }
}

/// Whether any filter in the list matches
pub fn any_match(filters: &[Filter], target: &FilterTarget<'_>) -> bool {
    filters.iter().any(|f| f.matches(target))
}

/// Filter shapes accepted from configuration files
///
/// ```toml
/// filters = ["/vendor/bundle/", { pattern = "^/db/" }, ["/tmp/", "/log/"]]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    /// Substring
    Literal(String),
    /// Regular expression
    Pattern {
        /// Expression source
        pattern: String,
    },
    /// Any-of list
    Composite(Vec<FilterSpec>),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> SourceFile {
        SourceFile {
            file_path: format!("/project{}", name),
            file_name: name.to_string(),
            digest: "d".to_string(),
        }
    }

    #[test]
    fn test_literal_matches_substring_of_name() {
        let filter = Filter::literal("/vendor/bundle/");
        assert!(filter.matches_file(&file("/vendor/bundle/gems/rack.rb")));
        assert!(!filter.matches_file(&file("/lib/vendor.rb")));
    }

    #[test]
    fn test_literal_ignores_absolute_path() {
        let filter = Filter::literal("/project");
        assert!(!filter.matches_file(&file("/lib/app.rb")));
    }

    #[test]
    fn test_pattern_matches_name() {
        let filter = Filter::pattern(r"_spec\.rb$").unwrap();
        assert!(filter.matches_file(&file("/spec/app_spec.rb")));
        assert!(!filter.matches_file(&file("/lib/app.rb")));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = Filter::pattern("(unclosed").unwrap_err();
        assert!(matches!(err, TracerError::Config(_)));
    }

    #[test]
    fn test_predicate_sees_path() {
        let filter = Filter::predicate(|t| t.file_path.is_some_and(|p| p.ends_with("generated.rb")));
        assert!(filter.matches_file(&file("/lib/generated.rb")));
        assert!(!filter.matches(&FilterTarget::name("/lib/generated.rb")));
    }

    #[test]
    fn test_composite_is_logical_or() {
        let filter = Filter::composite(vec![Filter::literal("/spec/"), Filter::literal("/test/")]);
        assert!(filter.matches_file(&file("/spec/a_spec.rb")));
        assert!(filter.matches_file(&file("/test/a_test.rb")));
        assert!(!filter.matches_file(&file("/lib/a.rb")));
        assert!(!Filter::composite(Vec::new()).matches_file(&file("/lib/a.rb")));
    }

    #[test]
    fn test_register_nested_specs() {
        let spec = FilterSpec::Composite(vec![
            FilterSpec::Literal("/tmp/".to_string()),
            FilterSpec::Pattern {
                pattern: "^/db/".to_string(),
            },
        ]);
        let filter = Filter::register(spec).unwrap();
        assert!(filter.matches_file(&file("/db/schema.rb")));
        assert!(filter.matches_file(&file("/app/tmp/x.rb")));
        assert!(!filter.matches_file(&file("/app/db.rb")));
    }

    #[test]
    fn test_register_rejects_bad_nested_pattern() {
        let spec = FilterSpec::Composite(vec![FilterSpec::Pattern {
            pattern: "[".to_string(),
        }]);
        assert!(matches!(Filter::register(spec), Err(TracerError::Config(_))));
    }

    #[test]
    fn test_spec_rejects_unknown_shapes() {
        let parsed: std::result::Result<FilterSpec, _> = serde_json::from_str("42");
        assert!(parsed.is_err());
        let parsed: std::result::Result<FilterSpec, _> = serde_json::from_str(r#"{"glob": "*.rb"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_any_match() {
        let filters = vec![Filter::literal("/spec/"), Filter::literal("/features/")];
        assert!(any_match(&filters, &FilterTarget::name("/features/steps.rb")));
        assert!(!any_match(&filters, &FilterTarget::name("/lib/a.rb")));
    }
}
