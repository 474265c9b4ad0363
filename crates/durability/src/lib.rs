//! Durability layer for testtrace
//!
//! This crate persists and reloads run state:
//! - Codecs: JSON and MessagePack report encodings
//! - Paths: cache directory layout and artifact names
//! - Cache: read-only snapshot of the previous run
//! - ReportWriter: atomic artifact writes plus the last-run pointer
//! - ReportMerger: combination of shard report sets
//! - CoverageWriter / CoverageMerger: the `coverage.json` artifact
//! - ShardCoordinator: lock-file coordination of parallel shards

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod cache;
pub mod codec;
pub mod coverage_artifact;
pub mod merger;
pub mod paths;
pub mod reports;
pub mod shard;
pub mod writer;

pub use artifact::{read_artifact, write_artifact, write_atomic};
pub use cache::Cache;
pub use codec::{get_codec, Codec, CodecError, JsonCodec, MessagePackCodec, ReportCodec};
pub use coverage_artifact::{CoverageMerger, CoverageWriter, COVERAGE_FILE};
pub use merger::ReportMerger;
pub use paths::{shard_dir_name, CachePaths, ReportKind, LAST_RUN};
pub use reports::RunReports;
pub use shard::{ShardCoordinator, ShardEnv, PARALLEL_TEST_GROUPS, TEST_ENV_NUMBER};
pub use writer::ReportWriter;
