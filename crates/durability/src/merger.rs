//! Report Merger
//!
//! Combines the report sets of N shards of one run into a single logical
//! report set:
//!
//! | Report | Merge |
//! |--------|-------|
//! | all_examples | prefer the shard that executed the example (run reason set) |
//! | duplicate_examples | concatenate per id |
//! | status sets | union |
//! | all_files | union, later shard wins |
//! | dependency | union per example |
//! | examples_coverage | sum per line |
//! | reverse_dependency | recomputed |
//! | counts | summed; pids collected |

use crate::cache::Cache;
use crate::codec::Codec;
use crate::paths::CachePaths;
use crate::reports::RunReports;
use std::time::Instant;
use testtrace_core::{format_time, Result};
use tracing::{debug, warn};

/// Folds shard caches into one [`RunReports`]
#[derive(Debug, Default)]
pub struct ReportMerger {
    reports: RunReports,
    merged: usize,
}

impl ReportMerger {
    /// Merger producing reports attributed to `pid`
    pub fn new(pid: u32) -> Self {
        ReportMerger {
            reports: RunReports {
                pid,
                ..Default::default()
            },
            merged: 0,
        }
    }

    /// Merge the latest run of every shard cache
    ///
    /// Shards without a last-run pointer are skipped with a warning.
    pub fn merge(mut self, shards: &[CachePaths], codec: &Codec) -> Result<RunReports> {
        let started = Instant::now();

        for shard in shards {
            let Some(last_run) = Cache::last_run(shard, codec)? else {
                warn!(target: "testtrace::report", shard = %shard.root().display(), "Shard has no completed run, skipping");
                continue;
            };

            let cache = Cache::load_dir(shard, &shard.run_dir(&last_run.run_id), codec, true)?;
            self.merge_cache(cache);
            self.reports.merged_pids.push(last_run.pid);
            self.reports.counts.absorb(&last_run.counts);
            self.merged += 1;
        }

        self.reports.rebuild_reverse_dependency();

        debug!(
            target: "testtrace::report",
            shards = self.merged,
            examples = self.reports.all_examples.len(),
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Merged shard reports"
        );
        Ok(self.reports)
    }

    /// Fold one shard into the accumulated reports
    pub fn merge_cache(&mut self, cache: Cache) {
        let reports = &mut self.reports;

        for (example_id, example) in cache.all_examples {
            let executed_elsewhere = reports
                .all_examples
                .get(&example_id)
                .is_some_and(|existing| existing.run_reason.is_some());
            if !executed_elsewhere {
                reports.all_examples.insert(example_id, example);
            }
        }

        for (example_id, examples) in cache.duplicate_examples {
            reports
                .duplicate_examples
                .entry(example_id)
                .or_default()
                .extend(examples);
        }

        reports.interrupted_examples.extend(cache.interrupted_examples);
        reports.flaky_examples.extend(cache.flaky_examples);
        reports.failed_examples.extend(cache.failed_examples);
        reports.pending_examples.extend(cache.pending_examples);
        reports.skipped_examples.extend(cache.skipped_examples);
        reports.all_files.extend(cache.all_files);

        for (example_id, files) in cache.dependency {
            reports.dependency.entry(example_id).or_default().extend(files);
        }

        for (example_id, files) in cache.examples_coverage {
            let merged = reports.examples_coverage.entry(example_id).or_default();
            for (file_path, lines) in files {
                let merged_lines = merged.entry(file_path).or_default();
                for (line, strength) in lines {
                    *merged_lines.entry(line).or_insert(0) += strength;
                }
            }
        }
    }
}
