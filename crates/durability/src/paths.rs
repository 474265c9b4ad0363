//! Cache directory structure
//!
//! A cache directory holds one immutable directory per run plus a mutable
//! pointer to the latest run:
//!
//! ```text
//! testtrace_cache/
//! ├── last_run.json            # Pointer: run id, pid, counts
//! ├── <run_id>/
//! │   ├── all_examples.json
//! │   ├── duplicate_examples.json
//! │   ├── ...
//! │   └── examples_coverage.json
//! └── parallel_tests_<n>/      # Shard caches, same layout, merged then purged
//! ```
//!
//! The extension follows the configured codec.

use std::fmt;
use std::path::{Path, PathBuf};

/// Name of the pointer artifact (without extension)
pub const LAST_RUN: &str = "last_run";

/// Per-run artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportKind {
    /// `example_id -> Example`
    AllExamples,
    /// `example_id -> [Example]`
    DuplicateExamples,
    /// Sorted example ids
    InterruptedExamples,
    /// Sorted example ids
    FlakyExamples,
    /// Sorted example ids
    FailedExamples,
    /// Sorted example ids
    PendingExamples,
    /// Sorted example ids
    SkippedExamples,
    /// `file_name -> SourceFile`
    AllFiles,
    /// `example_id -> [file_name]`
    Dependency,
    /// `file_name -> {example_count, examples}`
    ReverseDependency,
    /// `example_id -> file_path -> line -> strength`
    ExamplesCoverage,
}

impl ReportKind {
    /// Every per-run artifact, in write order
    pub const ALL: [ReportKind; 11] = [
        ReportKind::AllExamples,
        ReportKind::DuplicateExamples,
        ReportKind::InterruptedExamples,
        ReportKind::FlakyExamples,
        ReportKind::FailedExamples,
        ReportKind::PendingExamples,
        ReportKind::SkippedExamples,
        ReportKind::AllFiles,
        ReportKind::Dependency,
        ReportKind::ReverseDependency,
        ReportKind::ExamplesCoverage,
    ];

    /// File stem of the artifact
    pub fn stem(&self) -> &'static str {
        match self {
            ReportKind::AllExamples => "all_examples",
            ReportKind::DuplicateExamples => "duplicate_examples",
            ReportKind::InterruptedExamples => "interrupted_examples",
            ReportKind::FlakyExamples => "flaky_examples",
            ReportKind::FailedExamples => "failed_examples",
            ReportKind::PendingExamples => "pending_examples",
            ReportKind::SkippedExamples => "skipped_examples",
            ReportKind::AllFiles => "all_files",
            ReportKind::Dependency => "dependency",
            ReportKind::ReverseDependency => "reverse_dependency",
            ReportKind::ExamplesCoverage => "examples_coverage",
        }
    }

    /// File name with the given extension
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.stem(), extension)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stem().replace('_', " "))
    }
}

/// Directory name of a shard partition
pub fn shard_dir_name(partition: usize) -> String {
    format!("parallel_tests_{}", partition)
}

/// Cache directory paths
#[derive(Debug, Clone)]
pub struct CachePaths {
    root: PathBuf,
    extension: &'static str,
}

impl CachePaths {
    /// Create paths from a cache directory and artifact extension
    pub fn new(root: impl AsRef<Path>, extension: &'static str) -> Self {
        CachePaths {
            root: root.as_ref().to_path_buf(),
            extension,
        }
    }

    /// Get the cache directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Artifact extension
    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Get the last-run pointer path
    pub fn last_run(&self) -> PathBuf {
        self.root.join(format!("{}.{}", LAST_RUN, self.extension))
    }

    /// Get the directory of one run
    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    /// Get an artifact path inside a run directory
    pub fn artifact(&self, run_dir: &Path, kind: ReportKind) -> PathBuf {
        run_dir.join(kind.file_name(self.extension))
    }

    /// Paths of one shard cache below this directory
    pub fn shard(&self, partition: usize) -> CachePaths {
        CachePaths::new(self.root.join(shard_dir_name(partition)), self.extension)
    }

    /// Check if a completed run exists
    ///
    /// A run exists if the last-run pointer is present.
    pub fn exists(&self) -> bool {
        self.last_run().is_file()
    }
}
