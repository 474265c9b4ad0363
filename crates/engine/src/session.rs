//! Tracer session
//!
//! Ties the components together for one host process:
//!
//! 1. [`TracerSession::start`] registers the shard, loads the previous run
//!    and starts coverage collection.
//! 2. [`TracerSession::select_examples`] decides which declared examples
//!    run; duplicates are removed.
//! 3. The host drives the [`ExampleListener`] callbacks.
//! 4. [`TracerSession::finish`] reconciles, writes the reports and the
//!    coverage artifact, and merges shards when this is the last partition.
//!
//! Cache loading never fails the session: an unreadable cache is logged and
//! the run proceeds as a first run.

use crate::context::TracerContext;
use crate::coverage_reporter::{CoverageReporter, CoverageSource};
use crate::listener::ExampleListener;
use crate::report_generator::ReportGenerator;
use crate::runner::Runner;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use testtrace_core::{
    format_time, CoverageStat, Example, ExampleDescriptor, ExampleId, ExecutionResult, LastRun,
    Result, TracerError,
};
use testtrace_durability::{
    Cache, CachePaths, CoverageMerger, CoverageWriter, ReportMerger, ReportWriter, RunReports,
    ShardCoordinator,
};
use tracing::{debug, info, warn};

/// Result of a finished session
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Pointer written for this process; `None` when reports were skipped
    pub last_run: Option<LastRun>,
    /// Pointer of the merged shard reports, written by the last shard
    pub merged_run: Option<LastRun>,
    /// Final coverage statistics
    pub coverage_stat: CoverageStat,
    /// Colliding examples found while selecting
    pub duplicate_examples: usize,
    /// Whether duplicates fail the process
    pub fail_on_duplicates: bool,
}

impl RunOutcome {
    /// Process exit code the host should use
    pub fn exit_code(&self) -> i32 {
        if self.duplicate_examples > 0 && self.fail_on_duplicates {
            1
        } else {
            0
        }
    }

    /// Duplicate examples as an error when the policy makes them fatal
    pub fn check(&self) -> Result<()> {
        if self.exit_code() != 0 {
            return Err(TracerError::DuplicateExamples {
                count: self.duplicate_examples,
            });
        }
        Ok(())
    }
}

/// One process worth of tracing
pub struct TracerSession {
    ctx: TracerContext,
    runner: Runner,
    coverage: CoverageReporter,
    coordinator: Option<ShardCoordinator>,
    current: Option<ExampleId>,
    traced_files: BTreeSet<String>,
    examples_traced_files: BTreeMap<ExampleId, BTreeSet<String>>,
    setup_files: BTreeSet<String>,
    no_examples: bool,
}

impl TracerSession {
    /// Register the shard, load the previous run and start coverage
    ///
    /// # Errors
    ///
    /// Fails only when the shard lock file cannot be updated.
    pub fn start(ctx: TracerContext, source: Box<dyn CoverageSource>) -> Result<Self> {
        let coordinator = ctx.shard_coordinator();
        if let Some(coordinator) = &coordinator {
            coordinator.register()?;
        }

        let started = Instant::now();
        let paths = ctx.load_paths();
        let cache = match Cache::load(&paths, ctx.codec()) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(
                    target: "testtrace::cache",
                    cache_dir = %paths.root().display(),
                    error = %e,
                    "Failed to load cache, running every example"
                );
                Cache::empty()
            }
        };
        debug!(
            target: "testtrace::cache",
            run_id = ?cache.run_id,
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Cache ready"
        );

        let runner = Runner::new(&ctx, cache);
        let mut coverage = CoverageReporter::new(source, ctx.resolver().clone());
        coverage.start();
        coverage.record_coverage();

        Ok(TracerSession {
            ctx,
            runner,
            coverage,
            coordinator,
            current: None,
            traced_files: BTreeSet::new(),
            examples_traced_files: BTreeMap::new(),
            setup_files: BTreeSet::new(),
            no_examples: true,
        })
    }

    /// Context of this session
    pub fn context(&self) -> &TracerContext {
        &self.ctx
    }

    /// Runner of this session
    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Files the host loaded before any example ran
    pub fn register_setup_files<I, S>(&mut self, files: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.setup_files.extend(files.into_iter().map(Into::into));
    }

    /// Decide which declared examples run
    ///
    /// Returns the selected examples in declaration order with their run
    /// reasons. Examples sharing an id with another declaration are
    /// neither selected nor skipped.
    pub fn select_examples(&mut self, descriptors: &[ExampleDescriptor]) -> Vec<Example> {
        let mut order = Vec::new();

        for descriptor in descriptors {
            let mut example = Example::from_descriptor(descriptor, self.ctx.resolver());
            let example_id = example.example_id.clone();

            if self.runner.run_example(&example_id) {
                example.run_reason = Some(self.runner.run_example_reason(&example_id));
                order.push(example_id);
                self.runner.reporter_mut().register_example(example);
            } else {
                self.runner.reporter_mut().on_example_skipped(&example);
            }
        }

        let duplicates = self.runner.reporter_mut().deregister_duplicate_examples();
        if duplicates > 0 {
            warn!(target: "testtrace::runner", count = duplicates, "Examples could not be identified uniquely");
        }
        self.runner.log_selection();

        let registered = self.runner.reporter().all_examples();
        let mut selected = Vec::new();
        let mut emitted = BTreeSet::new();
        for example_id in order {
            if let Some(example) = registered.get(&example_id) {
                if emitted.insert(example_id) {
                    selected.push(example.clone());
                }
            }
        }

        self.no_examples = selected.is_empty();
        selected
    }

    /// Reconcile, persist and merge
    ///
    /// Reports are still written when duplicates were found; the returned
    /// outcome carries the exit policy.
    pub fn finish(mut self) -> Result<RunOutcome> {
        self.coverage.stop();
        let fail_on_duplicates = self.ctx.config().fail_on_duplicates;
        let duplicate_examples = self.runner.reporter().duplicate_count();

        let last_run = if self.no_examples {
            info!(target: "testtrace::report", "Skipped reports generation since all examples were filtered out");
            if duplicate_examples > 0 {
                ReportWriter::log_duplicate_examples(&RunReports {
                    duplicate_examples: self.runner.reporter().duplicate_examples().clone(),
                    ..Default::default()
                });
            }
            None
        } else {
            Some(self.generate_reports()?)
        };

        let coverage_stat = self.write_coverage()?;
        let merged_run = self.run_shard_tasks()?;

        Ok(RunOutcome {
            last_run,
            merged_run,
            coverage_stat,
            duplicate_examples,
            fail_on_duplicates,
        })
    }

    fn generate_reports(&mut self) -> Result<LastRun> {
        let started = Instant::now();
        debug!(target: "testtrace::report", pid = self.ctx.pid(), "Generating reports");

        self.runner.register_interrupted_examples();
        self.runner.register_deleted_examples();

        // Coverage filtered files are still dependencies
        self.runner
            .register_dependency(&self.ctx, self.coverage.examples_coverage());
        self.runner
            .register_traced_dependency(&self.ctx, &self.examples_traced_files);
        self.runner
            .register_untraced_dependency(&self.ctx, &self.setup_files);

        self.coverage.generate_final_examples_coverage(&self.ctx);
        let examples_coverage = self.coverage.take_examples_coverage();
        let missed = self.runner.generate_missed_coverage(&self.ctx);
        self.coverage.merge_coverage(&missed);
        self.runner.register_examples_coverage(examples_coverage);

        let reporter = self.runner.take_reporter();
        let reports = ReportGenerator::new(&self.ctx, self.runner.cache(), reporter).generate();

        ReportWriter::log_duplicate_examples(&reports);
        let writer = ReportWriter::new(self.ctx.cache_paths(), self.ctx.codec().clone());
        let last_run = writer.write(&reports)?;

        info!(
            target: "testtrace::report",
            cache_dir = %writer.paths().root().display(),
            run_id = %last_run.run_id,
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Reports generated"
        );
        Ok(last_run)
    }

    fn write_coverage(&mut self) -> Result<CoverageStat> {
        let started = Instant::now();
        self.coverage.generate_final_coverage(&self.ctx);

        let writer = CoverageWriter::new(self.ctx.coverage_path());
        let coverage = self.coverage.coverage().cloned().unwrap_or_default();
        writer.write(&coverage)?;
        Ok(writer.log_stats(&coverage, started.elapsed()))
    }

    fn run_shard_tasks(&self) -> Result<Option<LastRun>> {
        let Some(coordinator) = &self.coordinator else {
            return Ok(None);
        };

        coordinator.mark_complete()?;
        if !coordinator.is_last_process()? {
            return Ok(None);
        }

        if !coordinator.wait_for_shards(self.ctx.shard_timeout()) {
            warn!(target: "testtrace::shard", "Merging the shards that finished");
        }

        let started = Instant::now();
        let suite_paths = self.ctx.suite_cache_paths();
        let shards: Vec<CachePaths> = coordinator
            .env()
            .partitions()
            .map(|n| suite_paths.shard(n))
            .collect();

        let reports = ReportMerger::new(self.ctx.pid()).merge(&shards, self.ctx.codec())?;
        let merged_run = if reports.all_examples.is_empty() {
            warn!(target: "testtrace::shard", "No shard reports to merge");
            None
        } else {
            let writer = ReportWriter::new(suite_paths.clone(), self.ctx.codec().clone());
            Some(writer.write(&reports)?)
        };

        let suite_coverage = self.ctx.suite_coverage_path();
        let coverage = CoverageMerger::new().merge(&coordinator.shard_dirs(&suite_coverage))?;
        let coverage_writer = CoverageWriter::new(&suite_coverage);
        coverage_writer.write(&coverage)?;
        coverage_writer.log_stats(&coverage, started.elapsed());

        coordinator.purge(&[suite_paths.root(), suite_coverage.as_path()])?;
        coordinator.release()?;

        info!(
            target: "testtrace::shard",
            shards = coordinator.env().groups,
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Merged shard reports"
        );
        Ok(merged_run)
    }
}

impl ExampleListener for TracerSession {
    fn on_example_started(&mut self, example_id: &ExampleId) {
        self.coverage.record_coverage();
        self.current = Some(example_id.clone());
        self.traced_files.clear();
    }

    fn on_file_traced(&mut self, file_path: &str) {
        if self.current.is_some() && self.ctx.resolver().is_under_root(file_path) {
            self.traced_files.insert(file_path.to_string());
        }
    }

    fn on_example_passed(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()> {
        self.runner.reporter_mut().on_example_passed(example_id, result)
    }

    fn on_example_failed(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()> {
        self.runner.reporter_mut().on_example_failed(example_id, result)
    }

    fn on_example_pending(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()> {
        self.runner.reporter_mut().on_example_pending(example_id, result)
    }

    fn on_example_finished(&mut self, example_id: &ExampleId) {
        if self.current.as_ref() == Some(example_id) {
            let traced = std::mem::take(&mut self.traced_files);
            if !traced.is_empty() {
                self.examples_traced_files.insert(example_id.clone(), traced);
            }
        }
        self.current = None;
        self.coverage.compute_diff(example_id);
    }
}
