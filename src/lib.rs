//! testtrace - selective test re-execution
//!
//! testtrace records which source files every example touches and, on the
//! next run, re-runs only the examples whose dependencies changed, together
//! with examples that failed, were pending, flaky or interrupted.
//!
//! # Quick Start
//!
//! ```ignore
//! use testtrace::{ExampleListener, TracerConfig, TracerContext, TracerSession};
//!
//! let config = TracerConfig::load(&root)?;
//! let ctx = TracerContext::new(config)?;
//! let mut session = TracerSession::start(ctx, coverage_source)?;
//!
//! for example in session.select_examples(&descriptors) {
//!     session.on_example_started(&example.example_id);
//!     // run it, then report passed / failed / pending
//!     session.on_example_finished(&example.example_id);
//! }
//!
//! let outcome = session.finish()?;
//! std::process::exit(outcome.exit_code());
//! ```
//!
//! # Crates
//!
//! | Crate | Contents |
//! |-------|----------|
//! | `testtrace-core` | Identity types, filters, source files, errors |
//! | `testtrace-durability` | Codecs, cache store, report writer and merger, shards |
//! | `testtrace-engine` | Configuration, runner, reporters, session |
//! | `testtrace-remote` | Remote cache over an object store |

pub use testtrace_core::*;
pub use testtrace_durability::{
    get_codec, Cache, CachePaths, Codec, CodecError, CoverageMerger, CoverageWriter, ReportCodec,
    ReportKind, ReportMerger, ReportWriter, RunReports, ShardCoordinator, ShardEnv,
};
pub use testtrace_engine::*;

/// Remote cache
pub mod remote {
    pub use testtrace_remote::*;
}
