//! Per-process tracer context
//!
//! Built once at process start from a [`TracerConfig`] and passed to every
//! component. Holds everything that would otherwise be process-global: the
//! pid, the project root resolver, the classified filters, the codec and
//! the shard partition.

use crate::config::TracerConfig;
use std::path::PathBuf;
use std::time::Duration;
use testtrace_core::{any_match, Filter, FilterTarget, Result, SourceResolver};
use testtrace_durability::{CachePaths, Codec, ReportCodec, ShardCoordinator, ShardEnv};

/// Explicit replacement for global tracer state
#[derive(Debug, Clone)]
pub struct TracerContext {
    config: TracerConfig,
    pid: u32,
    resolver: SourceResolver,
    codec: Codec,
    filters: Vec<Filter>,
    coverage_filters: Vec<Filter>,
}

impl TracerContext {
    /// Build the context, classifying filters and resolving the codec
    ///
    /// # Errors
    ///
    /// Configuration errors for invalid filters or an unknown codec.
    pub fn new(config: TracerConfig) -> Result<Self> {
        let codec = config.report_codec()?;
        let filters = config.build_filters()?;
        let coverage_filters = config.build_coverage_filters()?;
        let resolver = SourceResolver::new(config.root_path());

        Ok(TracerContext {
            config,
            pid: std::process::id(),
            resolver,
            codec,
            filters,
            coverage_filters,
        })
    }

    /// Add a general filter (files excluded from dependency tracking)
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Add a coverage filter (files excluded from coverage totals)
    pub fn with_coverage_filter(mut self, filter: Filter) -> Self {
        self.coverage_filters.push(filter);
        self
    }

    /// Configuration
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Process id
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Root-relative path resolver
    pub fn resolver(&self) -> &SourceResolver {
        &self.resolver
    }

    /// Report codec
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Whether a file is excluded from dependency tracking
    pub fn is_filtered(&self, target: &FilterTarget<'_>) -> bool {
        any_match(&self.filters, target)
    }

    /// Whether a file is excluded from coverage totals
    pub fn is_coverage_filtered(&self, file_name: &str) -> bool {
        any_match(&self.coverage_filters, &FilterTarget::name(file_name))
    }

    /// Run-everything override
    pub fn no_skip(&self) -> bool {
        self.config.no_skip
    }

    /// Shard partition of this process
    pub fn shard(&self) -> Option<ShardEnv> {
        self.config.shard
    }

    /// Cache this process writes to
    pub fn cache_paths(&self) -> CachePaths {
        CachePaths::new(self.config.cache_path(), self.codec.extension())
    }

    /// Cache this process loads the previous run from
    ///
    /// Shards read the merged suite-level cache.
    pub fn load_paths(&self) -> CachePaths {
        CachePaths::new(self.config.suite_cache_path(), self.codec.extension())
    }

    /// Suite-level cache (merge target of shards)
    pub fn suite_cache_paths(&self) -> CachePaths {
        self.load_paths()
    }

    /// Coverage directory this process writes to
    pub fn coverage_path(&self) -> PathBuf {
        self.config.coverage_path()
    }

    /// Suite-level coverage directory
    pub fn suite_coverage_path(&self) -> PathBuf {
        self.config.suite_coverage_path()
    }

    /// Shard coordinator, when sharded
    pub fn shard_coordinator(&self) -> Option<ShardCoordinator> {
        self.config.shard.map(|env| {
            ShardCoordinator::new(env, self.config.lock_file.clone(), self.config.suite_cache_path())
        })
    }

    /// How long the last shard waits for the others
    pub fn shard_timeout(&self) -> Duration {
        Duration::from_secs(self.config.shard_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testtrace_durability::ShardEnv;

    #[test]
    fn test_context_paths() {
        let config = TracerConfig::default()
            .with_root("/work/app")
            .with_codec("msgpack")
            .with_shard(Some(ShardEnv { partition: 2, groups: 2 }));
        let ctx = TracerContext::new(config).unwrap();

        assert_eq!(
            ctx.cache_paths().last_run(),
            PathBuf::from("/work/app/testtrace_cache/parallel_tests_2/last_run.msgpack")
        );
        assert_eq!(
            ctx.load_paths().last_run(),
            PathBuf::from("/work/app/testtrace_cache/last_run.msgpack")
        );
        assert!(ctx.shard_coordinator().is_some());
    }

    #[test]
    fn test_filters() {
        let ctx = TracerContext::new(TracerConfig::default().with_root("/work/app"))
            .unwrap()
            .with_filter(Filter::literal("/tmp/"));

        assert!(ctx.is_filtered(&FilterTarget::name("/vendor/bundle/x.rb")));
        assert!(ctx.is_filtered(&FilterTarget::name("/tmp/x.rb")));
        assert!(!ctx.is_filtered(&FilterTarget::name("/lib/x.rb")));
        assert!(ctx.is_coverage_filtered("/spec/x_spec.rb"));
        assert!(!ctx.is_coverage_filtered("/lib/x.rb"));
    }
}
