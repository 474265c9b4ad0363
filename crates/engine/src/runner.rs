//! Runner (selection engine)
//!
//! Decides which examples must run given the previous run's cache, and
//! reconciles the run's results with the cache once every example finished.
//!
//! ## Selection
//!
//! Every file in the cache's registry is resolved again; a file that no
//! longer resolves is deleted and one whose digest differs is modified.
//! Cached examples are then classified, first match wins:
//!
//! | Reason | Condition |
//! |--------|-----------|
//! | Interrupted previously | cached example never finished |
//! | Flaky example | cached as flaky |
//! | Failed previously | cached as failed |
//! | Pending previously | cached as pending |
//! | Files changed | a dependency was deleted or modified |
//!
//! Flaky and failed examples whose dependencies did not change are tracked
//! as possibly flaky. Whether one of them is confirmed flaky is decided by
//! the report generator after the run; this is a heuristic, not a proof.
//!
//! An example runs when the run-everything override is set, when the cache
//! does not know it, or when it was classified. Everything else is skipped
//! and its cached result stands.

use crate::context::TracerContext;
use crate::reporter::Reporter;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use testtrace_core::{
    format_time, ExampleCoverage, ExampleId, ExamplesCoverage, FilterTarget, RunReason, SourceFile,
};
use testtrace_durability::Cache;
use tracing::{debug, info};

/// Selection and reconciliation over one cache
#[derive(Debug)]
pub struct Runner {
    cache: Cache,
    reporter: Reporter,
    filtered_examples: BTreeMap<ExampleId, RunReason>,
    no_skip: bool,
}

impl Runner {
    /// Detect changed files and classify the cached examples
    pub fn new(ctx: &TracerContext, cache: Cache) -> Self {
        let mut runner = Runner {
            cache,
            reporter: Reporter::new(),
            filtered_examples: BTreeMap::new(),
            no_skip: ctx.no_skip(),
        };

        let started = Instant::now();
        runner.detect_changed_files(ctx);
        runner.filter_examples_to_run();

        debug!(
            target: "testtrace::runner",
            cached_examples = runner.cache.all_examples.len(),
            filtered_examples = runner.filtered_examples.len(),
            changed_files = runner.changed_files().len(),
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Filtered examples to run"
        );
        runner
    }

    fn detect_changed_files(&mut self, ctx: &TracerContext) {
        for (file_name, cached) in &self.cache.all_files {
            match ctx.resolver().identify_by_name(file_name) {
                None => self.reporter.on_file_deleted(file_name.clone()),
                Some(fresh) if fresh.digest != cached.digest => {
                    self.reporter.on_file_modified(file_name.clone())
                }
                Some(_) => {}
            }
        }
    }

    fn filter_examples_to_run(&mut self) {
        let changed = self.changed_files();

        for (example_id, example) in &self.cache.all_examples {
            let files_changed = self.cache.depends_on_any(example_id, &changed);

            let reason = if self.cache.interrupted_examples.contains(example_id) || example.is_interrupted() {
                RunReason::InterruptedPreviously
            } else if self.cache.flaky_examples.contains(example_id) {
                if !files_changed {
                    self.reporter.register_possibly_flaky_example(example_id.clone());
                }
                RunReason::FlakyExample
            } else if self.cache.failed_examples.contains(example_id) {
                if !files_changed {
                    self.reporter.register_possibly_flaky_example(example_id.clone());
                }
                RunReason::FailedPreviously
            } else if self.cache.pending_examples.contains(example_id) {
                RunReason::PendingPreviously
            } else if files_changed {
                RunReason::FilesChanged
            } else {
                continue;
            };

            self.filtered_examples.insert(example_id.clone(), reason);
        }
    }

    /// Files deleted or modified since the cached run
    pub fn changed_files(&self) -> BTreeSet<String> {
        self.reporter
            .deleted_files
            .union(&self.reporter.modified_files)
            .cloned()
            .collect()
    }

    /// Whether the example must run
    pub fn run_example(&self, example_id: &ExampleId) -> bool {
        self.no_skip
            || !self.cache.all_examples.contains_key(example_id)
            || self.filtered_examples.contains_key(example_id)
    }

    /// Why the example runs
    pub fn run_example_reason(&self, example_id: &ExampleId) -> RunReason {
        if self.no_skip {
            return RunReason::ExplicitRun;
        }
        self.filtered_examples
            .get(example_id)
            .copied()
            .unwrap_or(RunReason::NoCache)
    }

    /// Loaded cache
    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Current-run registry
    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Mutable current-run registry
    pub fn reporter_mut(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    /// Hand the registry over to the report generator, leaving it empty
    pub fn take_reporter(&mut self) -> Reporter {
        std::mem::take(&mut self.reporter)
    }

    // ========================================================================
    // Post-run reconciliation
    // ========================================================================

    /// Collect examples that never finished
    pub fn register_interrupted_examples(&mut self) {
        self.reporter.register_interrupted_examples();
    }

    /// Collect cached examples that are gone
    pub fn register_deleted_examples(&mut self) {
        self.reporter.register_deleted_examples(&self.cache.all_examples);
    }

    /// Register dependencies from this run's incremental coverage
    ///
    /// Every executed example also depends on its declaration and re-run
    /// files. Filter outcomes are computed once per file.
    pub fn register_dependency(&mut self, ctx: &TracerContext, examples_coverage: &ExamplesCoverage) {
        let mut resolved = FileMemo::default();

        for (example_id, example_coverage) in examples_coverage {
            if !self.registered(example_id) {
                continue;
            }
            self.register_example_files_dependency(ctx, example_id);

            for file_path in example_coverage.keys() {
                if let Some(source_file) = resolved.resolve(ctx, file_path) {
                    self.reporter.register_dependency(example_id, source_file.file_name.clone());
                    self.reporter.register_source_file(source_file);
                }
            }
        }
    }

    /// Register files entered while each example ran
    pub fn register_traced_dependency(
        &mut self,
        ctx: &TracerContext,
        examples_traced_files: &BTreeMap<ExampleId, BTreeSet<String>>,
    ) {
        let mut resolved = FileMemo::default();

        for (example_id, traced_files) in examples_traced_files {
            if !self.registered(example_id) {
                continue;
            }
            for file_path in traced_files {
                if let Some(source_file) = resolved.resolve(ctx, file_path) {
                    self.reporter.register_dependency(example_id, source_file.file_name.clone());
                    self.reporter.register_source_file(source_file);
                }
            }
        }
    }

    /// Register setup files no example's coverage reached as dependencies
    /// of every example registered this run
    pub fn register_untraced_dependency(&mut self, ctx: &TracerContext, setup_files: &BTreeSet<String>) {
        let known: BTreeSet<&str> = self
            .reporter
            .all_files
            .values()
            .map(|f| f.file_path.as_str())
            .collect();
        let untraced: Vec<String> = setup_files
            .iter()
            .filter(|path| !known.contains(path.as_str()))
            .cloned()
            .collect();

        let example_ids: Vec<ExampleId> = self
            .reporter
            .all_examples
            .keys()
            .filter(|id| !self.reporter.example_interrupted(id))
            .cloned()
            .collect();

        let mut resolved = FileMemo::default();
        for file_path in &untraced {
            let Some(source_file) = resolved.resolve(ctx, file_path) else {
                continue;
            };
            for example_id in &example_ids {
                self.reporter.register_dependency(example_id, source_file.file_name.clone());
            }
            self.reporter.register_source_file(source_file);
        }
    }

    /// Cached coverage of skipped examples, summed per file and line
    ///
    /// Deleted files are left out.
    pub fn generate_missed_coverage(&self, ctx: &TracerContext) -> ExampleCoverage {
        let mut missed = ExampleCoverage::new();

        for (example_id, example_coverage) in &self.cache.examples_coverage {
            if !self.reporter.example_skipped(example_id) {
                continue;
            }
            for (file_path, lines) in example_coverage {
                if self.reporter.file_deleted(&ctx.resolver().file_name(file_path)) {
                    continue;
                }
                let missed_lines = missed.entry(file_path.clone()).or_default();
                for (line, strength) in lines {
                    *missed_lines.entry(*line).or_insert(0) += strength;
                }
            }
        }

        missed
    }

    /// Store the final incremental coverage of this run
    pub fn register_examples_coverage(&mut self, examples_coverage: ExamplesCoverage) {
        self.reporter.register_examples_coverage(examples_coverage);
    }

    /// Log the selection summary
    pub fn log_selection(&self) {
        info!(
            target: "testtrace::runner",
            selected = self.reporter.all_examples.len(),
            skipped = self.reporter.skipped_examples.len(),
            duplicates = self.reporter.duplicate_count(),
            "Selected examples to run"
        );
    }

    fn registered(&self, example_id: &ExampleId) -> bool {
        self.reporter.all_examples.contains_key(example_id)
            && !self.reporter.example_interrupted(example_id)
    }

    fn register_example_files_dependency(&mut self, ctx: &TracerContext, example_id: &ExampleId) {
        let Some(example) = self.reporter.all_examples.get(example_id) else {
            return;
        };
        let file_name = example.file_name.clone();
        let rerun_file_name = example.rerun_file_name.clone();

        self.register_example_file_dependency(ctx, example_id, file_name.clone());
        if rerun_file_name != file_name {
            self.register_example_file_dependency(ctx, example_id, rerun_file_name);
        }
    }

    fn register_example_file_dependency(&mut self, ctx: &TracerContext, example_id: &ExampleId, file_name: String) {
        let source_file = match self.reporter.all_files.get(&file_name) {
            Some(_) => None,
            None => ctx.resolver().identify_by_name(&file_name),
        };
        if let Some(source_file) = source_file {
            self.reporter.register_source_file(source_file);
        }
        self.reporter.register_dependency(example_id, file_name);
    }
}

/// Resolved and filtered files, keyed by absolute path
///
/// A file that is filtered out once is never checked again.
#[derive(Default)]
struct FileMemo {
    files: BTreeMap<String, Option<SourceFile>>,
}

impl FileMemo {
    fn resolve(&mut self, ctx: &TracerContext, file_path: &str) -> Option<SourceFile> {
        self.files
            .entry(file_path.to_string())
            .or_insert_with(|| {
                let source_file = ctx.resolver().identify(file_path)?;
                if ctx.is_filtered(&FilterTarget::from(&source_file)) {
                    None
                } else {
                    Some(source_file)
                }
            })
            .clone()
    }
}
