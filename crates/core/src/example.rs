//! Example types
//!
//! An example is one test case. Its identity is a content hash of how it is
//! declared (group, descriptions, shared-group inclusion trace and source
//! locations) rather than a sequence number, so the same test keeps the same
//! id across runs and across reorderings.
//!
//! ## Identity
//!
//! | Changes | Same id? |
//! |---------|----------|
//! | Test reordered within its file | yes |
//! | Test body edited | yes (the dependency digests catch it) |
//! | Lines added above the test | no (line number is hashed) |
//! | File renamed or moved | no (file name is hashed) |
//!
//! Two distinct declarations hashing to the same id are duplicates; the
//! engine refuses to track either of them.

use crate::hash::hex_digest;
use crate::source_file::SourceResolver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

// ============================================================================
// Example Id
// ============================================================================

/// Stable content-derived example identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExampleId(String);

impl ExampleId {
    /// Wrap an existing id
    pub fn new(id: impl Into<String>) -> Self {
        ExampleId(id.into())
    }

    /// Id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ExampleId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExampleId {
    fn from(s: &str) -> Self {
        ExampleId(s.to_string())
    }
}

// ============================================================================
// Execution Result
// ============================================================================

/// Final status of an executed example
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExampleStatus {
    /// Example passed
    Passed,
    /// Example failed
    Failed,
    /// Example is pending
    Pending,
}

impl ExampleStatus {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ExampleStatus::Passed => "passed",
            ExampleStatus::Failed => "failed",
            ExampleStatus::Pending => "pending",
        }
    }
}

impl fmt::Display for ExampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one example execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// When the example started
    pub started_at: DateTime<Utc>,
    /// When the example finished
    pub finished_at: DateTime<Utc>,
    /// Run time in seconds
    pub run_time: f64,
    /// Final status
    pub status: ExampleStatus,
}

impl ExecutionResult {
    /// Build a result, deriving run time from the timestamps
    pub fn new(started_at: DateTime<Utc>, finished_at: DateTime<Utc>, status: ExampleStatus) -> Self {
        let micros = (finished_at - started_at).num_microseconds().unwrap_or(0).max(0);
        ExecutionResult {
            started_at,
            finished_at,
            run_time: micros as f64 / 1_000_000.0,
            status,
        }
    }
}

// ============================================================================
// Run Reason
// ============================================================================

/// Why an example was selected to run
///
/// Variants are listed in classification priority order after the two
/// overrides (`ExplicitRun`, `NoCache`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunReason {
    /// Skipping is disabled for this run
    #[serde(rename = "Explicit run")]
    ExplicitRun,
    /// The example is unknown to the cache
    #[serde(rename = "No cache")]
    NoCache,
    /// The previous run stopped before the example finished
    #[serde(rename = "Interrupted previously")]
    InterruptedPreviously,
    /// The example was flagged flaky
    #[serde(rename = "Flaky example")]
    FlakyExample,
    /// The example failed last time
    #[serde(rename = "Failed previously")]
    FailedPreviously,
    /// The example was pending last time
    #[serde(rename = "Pending previously")]
    PendingPreviously,
    /// A file the example depends on changed
    #[serde(rename = "Files changed")]
    FilesChanged,
}

impl RunReason {
    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            RunReason::ExplicitRun => "Explicit run",
            RunReason::NoCache => "No cache",
            RunReason::InterruptedPreviously => "Interrupted previously",
            RunReason::FlakyExample => "Flaky example",
            RunReason::FailedPreviously => "Failed previously",
            RunReason::PendingPreviously => "Pending previously",
            RunReason::FilesChanged => "Files changed",
        }
    }
}

impl fmt::Display for RunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Descriptor (host input)
// ============================================================================

/// An example as declared by the host test framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExampleDescriptor {
    /// Name of the innermost group
    pub example_group: String,
    /// Example description
    pub description: String,
    /// Description including every enclosing group
    pub full_description: String,
    /// Formatted inclusion locations of shared groups, outermost first
    pub shared_group_trace: Vec<String>,
    /// Declaration file, absolute or root-relative
    pub file_path: String,
    /// Declaration line
    pub line_number: u32,
    /// File to pass back to the host when re-running
    pub rerun_file_path: String,
    /// Line to pass back to the host when re-running
    pub rerun_line_number: u32,
}

impl ExampleDescriptor {
    /// Descriptor declared and re-run from the same location
    pub fn new(
        example_group: impl Into<String>,
        description: impl Into<String>,
        file_path: impl Into<String>,
        line_number: u32,
    ) -> Self {
        let example_group = example_group.into();
        let description = description.into();
        let file_path = file_path.into();
        ExampleDescriptor {
            full_description: format!("{} {}", example_group, description),
            example_group,
            description,
            shared_group_trace: Vec::new(),
            rerun_file_path: file_path.clone(),
            file_path,
            line_number,
            rerun_line_number: line_number,
        }
    }

    /// Override the full description
    pub fn with_full_description(mut self, full_description: impl Into<String>) -> Self {
        self.full_description = full_description.into();
        self
    }

    /// Record the shared-group inclusion trace
    pub fn with_shared_group_trace(mut self, trace: Vec<String>) -> Self {
        self.shared_group_trace = trace;
        self
    }

    /// Set the re-run location (examples included from shared groups)
    pub fn with_rerun_location(mut self, file_path: impl Into<String>, line_number: u32) -> Self {
        self.rerun_file_path = file_path.into();
        self.rerun_line_number = line_number;
        self
    }
}

// ============================================================================
// Example
// ============================================================================

/// A tracked example
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// Name of the innermost group
    pub example_group: String,
    /// Example description
    pub description: String,
    /// Description including every enclosing group
    pub full_description: String,
    /// Shared-group inclusion trace
    pub shared_group: Vec<String>,
    /// Root-relative declaration file
    pub file_name: String,
    /// Declaration line
    pub line_number: u32,
    /// Root-relative re-run file
    pub rerun_file_name: String,
    /// Re-run line
    pub rerun_line_number: u32,
    /// Content-derived identity
    pub example_id: ExampleId,
    /// Why the example ran this run (`None` when skipped or loaded from cache)
    #[serde(default)]
    pub run_reason: Option<RunReason>,
    /// Absent when the example never finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_result: Option<ExecutionResult>,
}

/// Hashed part of an example; field order is part of the id format
#[derive(Serialize)]
struct IdentityPayload<'a> {
    example_group: &'a str,
    description: &'a str,
    full_description: &'a str,
    shared_group: &'a [String],
    file_name: &'a str,
    line_number: u32,
    rerun_file_name: &'a str,
    rerun_line_number: u32,
}

impl Example {
    /// Build an example from a host descriptor, normalizing its locations
    pub fn from_descriptor(descriptor: &ExampleDescriptor, resolver: &SourceResolver) -> Self {
        let file_name = location_file_name(resolver, &descriptor.file_path);
        let rerun_file_name = if descriptor.rerun_file_path == descriptor.file_path {
            file_name.clone()
        } else {
            location_file_name(resolver, &descriptor.rerun_file_path)
        };

        let payload = IdentityPayload {
            example_group: &descriptor.example_group,
            description: &descriptor.description,
            full_description: &descriptor.full_description,
            shared_group: &descriptor.shared_group_trace,
            file_name: &file_name,
            line_number: descriptor.line_number,
            rerun_file_name: &rerun_file_name,
            rerun_line_number: descriptor.rerun_line_number,
        };
        let example_id = ExampleId(hex_digest(
            &serde_json::to_vec(&payload).unwrap_or_default(),
        ));

        Example {
            example_group: descriptor.example_group.clone(),
            description: descriptor.description.clone(),
            full_description: descriptor.full_description.clone(),
            shared_group: descriptor.shared_group_trace.clone(),
            file_name,
            line_number: descriptor.line_number,
            rerun_file_name,
            rerun_line_number: descriptor.rerun_line_number,
            example_id,
            run_reason: None,
            execution_result: None,
        }
    }

    /// Final status, if the example finished
    pub fn status(&self) -> Option<ExampleStatus> {
        self.execution_result.as_ref().map(|r| r.status)
    }

    /// Whether the example started but never finished
    pub fn is_interrupted(&self) -> bool {
        self.execution_result.is_none()
    }

    /// Re-run location as `file:line` without the leading slash
    pub fn rerun_location(&self) -> String {
        format!(
            "{}:{}",
            self.rerun_file_name.trim_start_matches('/'),
            self.rerun_line_number
        )
    }
}

fn location_file_name(resolver: &SourceResolver, path: &str) -> String {
    if resolver.is_under_root(path) {
        resolver.file_name(path)
    } else {
        resolver.file_name(&resolver.file_path(path))
    }
}
