//! Tracing engine for testtrace
//!
//! This crate orchestrates the lower layers for one host process:
//! - TracerConfig / TracerContext: configuration and per-process state
//! - CoverageReporter: per-example incremental coverage
//! - Reporter: current-run registry
//! - Runner: example selection and post-run reconciliation
//! - ReportGenerator: current run merged with the cached run
//! - TracerSession: start / select / observe / finish
//!
//! The engine is the only component that knows about:
//! - Which examples run and why
//! - Cross-layer coordination (cache + coverage + shards)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod coverage_reporter;
pub mod listener;
pub mod logging;
pub mod report_generator;
pub mod reporter;
pub mod runner;
pub mod session;

pub use config::{TracerConfig, CONFIG_FILE_NAME};
pub use context::TracerContext;
pub use coverage_reporter::{
    CoverageMode, CoverageReporter, CoverageSource, FileCounters, HeuristicLineClassifier,
    LineClassifier, RawCoverage,
};
pub use listener::ExampleListener;
pub use logging::init_logging;
pub use report_generator::ReportGenerator;
pub use reporter::Reporter;
pub use runner::Runner;
pub use session::{RunOutcome, TracerSession};
