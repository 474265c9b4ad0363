//! Core types for testtrace
//!
//! This crate defines the foundational types used throughout the system:
//! - ExampleId / Example / ExampleDescriptor: test identity and results
//! - SourceFile / SourceResolver: file identity by content digest
//! - Filter: closed set of file matchers
//! - Coverage types: per-line strengths, incremental coverage, dependencies
//! - LastRun: run summary pointer
//! - Error: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coverage;
pub mod error;
pub mod example;
pub mod filter;
pub mod hash;
pub mod run_types;
pub mod source_file;
pub mod time_format;

pub use coverage::{
    Coverage, CoverageStat, Dependency, ExampleCoverage, ExamplesCoverage, LineCoverage,
    LineHits, ReverseDependency, ReverseDependencyEntry, Strength,
};
pub use error::{ErrorCategory, Result, TracerError};
pub use example::{
    Example, ExampleDescriptor, ExampleId, ExampleStatus, ExecutionResult, RunReason,
};
pub use filter::{any_match, Filter, FilterFn, FilterSpec, FilterTarget};
pub use hash::{hex_digest, population_digest};
pub use run_types::{LastRun, RunCounts};
pub use source_file::{SourceFile, SourceResolver};
pub use time_format::format_time;
