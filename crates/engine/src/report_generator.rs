//! Report Generator
//!
//! Merges the current run's registry with the cached run into the final
//! [`RunReports`]. Current-run entries always win; cached entries only fill
//! gaps, and never for deleted examples or deleted files. The reverse
//! dependency index is recomputed from the merged forward dependencies.
//!
//! ## Flaky examples
//!
//! Two rules mark an example flaky:
//!
//! - **Confirmation.** It was possibly flaky (cached as flaky, inputs
//!   unchanged) and passed this run.
//! - **First detection.** It re-ran with unchanged inputs, passed in the
//!   cached run and failed in this one. Confirmation alone could never flag
//!   an example that was not already flaky, so this is the only way a new
//!   example enters the flaky set.
//!
//! A previously failed example that passes again is not flaky. Both rules
//! are heuristics: unchanged dependencies make an environmental cause
//! likely, not certain, so a flaky mark is a hint to investigate rather than
//! proof.

use crate::context::TracerContext;
use crate::reporter::Reporter;
use std::time::Instant;
use testtrace_core::{format_time, ExampleId, ExampleStatus, RunCounts};
use testtrace_durability::{Cache, RunReports};
use tracing::debug;

/// Builds the final report set of one process
pub struct ReportGenerator<'a> {
    ctx: &'a TracerContext,
    cache: &'a Cache,
    reporter: Reporter,
}

impl<'a> ReportGenerator<'a> {
    /// Generator over a reconciled registry
    pub fn new(ctx: &'a TracerContext, cache: &'a Cache, reporter: Reporter) -> Self {
        ReportGenerator { ctx, cache, reporter }
    }

    /// Produce the final reports
    pub fn generate(mut self) -> RunReports {
        let started = Instant::now();
        let example_count = self.reporter.all_examples.len();

        self.generate_flaky_examples_report();
        self.generate_failed_examples_report();
        self.generate_pending_examples_report();
        self.generate_all_files_report();
        self.generate_all_examples_report();
        self.generate_dependency_report();
        self.generate_examples_coverage_report();

        let reporter = self.reporter;
        let skipped = reporter.skipped_examples.len();
        let counts = RunCounts {
            actual_count: example_count + skipped,
            example_count,
            duplicate_examples: reporter.duplicate_count(),
            interrupted_examples: reporter.interrupted_examples.len(),
            failed_examples: reporter.failed_examples.len(),
            skipped_examples: skipped,
            pending_examples: reporter.pending_examples.len(),
            flaky_examples: reporter.flaky_examples.len(),
        };

        let mut reports = RunReports {
            pid: self.ctx.pid(),
            merged_pids: Vec::new(),
            counts,
            all_examples: reporter.all_examples,
            duplicate_examples: reporter.duplicate_examples,
            interrupted_examples: reporter.interrupted_examples,
            flaky_examples: reporter.flaky_examples,
            failed_examples: reporter.failed_examples,
            pending_examples: reporter.pending_examples,
            skipped_examples: reporter.skipped_examples,
            all_files: reporter.all_files,
            dependency: reporter.dependency,
            reverse_dependency: Default::default(),
            examples_coverage: reporter.examples_coverage,
        };
        reports.rebuild_reverse_dependency();

        debug!(
            target: "testtrace::report",
            examples = reports.all_examples.len(),
            files = reports.all_files.len(),
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Generated reports"
        );
        reports
    }

    fn generate_flaky_examples_report(&mut self) {
        let reporter = &self.reporter;
        let mut flaky: Vec<ExampleId> = reporter
            .possibly_flaky_examples
            .iter()
            .filter(|id| !reporter.example_deleted(id))
            .filter(|id| self.cache.flaky_examples.contains(*id) && reporter.example_passed(id))
            .cloned()
            .collect();

        let changed: std::collections::BTreeSet<String> = reporter
            .deleted_files
            .union(&reporter.modified_files)
            .cloned()
            .collect();
        flaky.extend(
            reporter
                .all_examples
                .keys()
                .filter(|id| reporter.example_status(id) == Some(ExampleStatus::Failed))
                .filter(|id| {
                    self.cache.all_examples.get(*id).and_then(|e| e.status()) == Some(ExampleStatus::Passed)
                })
                .filter(|id| {
                    self.cache.dependency.contains_key(*id) && !self.cache.depends_on_any(id, &changed)
                })
                .cloned(),
        );

        for example_id in flaky {
            self.reporter.register_flaky_example(example_id);
        }
    }

    fn generate_failed_examples_report(&mut self) {
        let carried: Vec<ExampleId> = self
            .cache
            .failed_examples
            .iter()
            .filter(|id| self.carries_status(id))
            .cloned()
            .collect();
        for example_id in carried {
            self.reporter.register_failed_example(example_id);
        }
    }

    fn generate_pending_examples_report(&mut self) {
        let carried: Vec<ExampleId> = self
            .cache
            .pending_examples
            .iter()
            .filter(|id| self.carries_status(id))
            .cloned()
            .collect();
        for example_id in carried {
            self.reporter.register_pending_example(example_id);
        }
    }

    /// Cached status stands for examples that did not run this run
    fn carries_status(&self, example_id: &ExampleId) -> bool {
        !self.reporter.example_deleted(example_id)
            && !self.reporter.all_examples.contains_key(example_id)
            && !self.reporter.duplicate_examples.contains_key(example_id)
    }

    fn generate_all_files_report(&mut self) {
        for (file_name, source_file) in &self.cache.all_files {
            if self.reporter.all_files.contains_key(file_name) || self.reporter.file_deleted(file_name) {
                continue;
            }
            self.reporter
                .all_files
                .insert(file_name.clone(), source_file.clone());
        }
    }

    fn generate_all_examples_report(&mut self) {
        for (example_id, example) in &self.cache.all_examples {
            if self.reporter.all_examples.contains_key(example_id)
                || self.reporter.example_deleted(example_id)
                || self.reporter.duplicate_examples.contains_key(example_id)
            {
                continue;
            }
            self.reporter
                .all_examples
                .insert(example_id.clone(), example.clone());
        }
    }

    fn generate_dependency_report(&mut self) {
        for (example_id, files) in &self.cache.dependency {
            if self.reporter.dependency.contains_key(example_id)
                || !self.reporter.all_examples.contains_key(example_id)
            {
                continue;
            }
            let kept = files
                .iter()
                .filter(|file_name| !self.reporter.file_deleted(file_name))
                .cloned()
                .collect();
            self.reporter.dependency.insert(example_id.clone(), kept);
        }
    }

    fn generate_examples_coverage_report(&mut self) {
        let resolver = self.ctx.resolver();
        for (example_id, files) in &self.cache.examples_coverage {
            if self.reporter.examples_coverage.contains_key(example_id)
                || !self.reporter.all_examples.contains_key(example_id)
            {
                continue;
            }
            let kept = files
                .iter()
                .filter(|(file_path, _)| !self.reporter.file_deleted(&resolver.file_name(file_path)))
                .map(|(file_path, lines)| (file_path.clone(), lines.clone()))
                .collect();
            self.reporter.examples_coverage.insert(example_id.clone(), kept);
        }
    }
}
