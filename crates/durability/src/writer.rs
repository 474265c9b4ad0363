//! Report Writer
//!
//! Writes the artifacts of a run into `<cache_dir>/<run_id>/` and then moves
//! the last-run pointer in `<cache_dir>` to the new run. The pointer is
//! written last so a crash mid-write leaves the previous run in effect.

use crate::artifact::write_artifact;
use crate::codec::{Codec, ReportCodec};
use crate::paths::{CachePaths, ReportKind};
use crate::reports::RunReports;
use std::time::Instant;
use testtrace_core::{format_time, LastRun, Result};
use tracing::{debug, error};

/// Serializes a [`RunReports`] to a cache directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    paths: CachePaths,
    codec: Codec,
}

impl ReportWriter {
    /// Writer for the given cache directory
    pub fn new(paths: CachePaths, codec: Codec) -> Self {
        ReportWriter { paths, codec }
    }

    /// Cache directory paths
    pub fn paths(&self) -> &CachePaths {
        &self.paths
    }

    /// Write every artifact, then the pointer; returns the pointer written
    pub fn write(&self, reports: &RunReports) -> Result<LastRun> {
        let started = Instant::now();
        let run_id = reports.run_id();
        let run_dir = self.paths.run_dir(&run_id);

        for kind in ReportKind::ALL {
            let path = self.paths.artifact(&run_dir, kind);
            match kind {
                ReportKind::AllExamples => write_artifact(&self.codec, &path, &reports.all_examples)?,
                ReportKind::DuplicateExamples => {
                    write_artifact(&self.codec, &path, &reports.duplicate_examples)?
                }
                ReportKind::InterruptedExamples => {
                    write_artifact(&self.codec, &path, &reports.interrupted_examples)?
                }
                ReportKind::FlakyExamples => write_artifact(&self.codec, &path, &reports.flaky_examples)?,
                ReportKind::FailedExamples => write_artifact(&self.codec, &path, &reports.failed_examples)?,
                ReportKind::PendingExamples => {
                    write_artifact(&self.codec, &path, &reports.pending_examples)?
                }
                ReportKind::SkippedExamples => {
                    write_artifact(&self.codec, &path, &reports.skipped_examples)?
                }
                ReportKind::AllFiles => write_artifact(&self.codec, &path, &reports.all_files)?,
                ReportKind::Dependency => write_artifact(&self.codec, &path, &reports.dependency)?,
                ReportKind::ReverseDependency => {
                    write_artifact(&self.codec, &path, &reports.reverse_dependency)?
                }
                ReportKind::ExamplesCoverage => {
                    write_artifact(&self.codec, &path, &reports.examples_coverage)?
                }
            }
        }

        let mut last_run = LastRun::new(run_id, reports.pid, reports.counts);
        last_run.merged_pids = reports.merged_pids.clone();
        write_artifact(&self.codec, &self.paths.last_run(), &last_run)?;

        debug!(
            target: "testtrace::report",
            run_dir = %run_dir.display(),
            codec = self.codec.codec_id(),
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Reports written"
        );
        Ok(last_run)
    }

    /// Log every collision group with description and location
    pub fn log_duplicate_examples(reports: &RunReports) {
        if reports.duplicate_examples.is_empty() {
            return;
        }

        let banner = "=".repeat(80);
        error!(target: "testtrace::report", "{}", banner);
        error!(target: "testtrace::report", "   IMPORTANT NOTICE -- SOME EXAMPLES COULD NOT BE IDENTIFIED UNIQUELY");
        error!(target: "testtrace::report", "{}", banner);
        error!(
            target: "testtrace::report",
            count = reports.duplicate_count(),
            "Could not uniquely identify the following {} examples:",
            reports.duplicate_count()
        );

        for (example_id, examples) in &reports.duplicate_examples {
            error!(target: "testtrace::report", "  - Example ID: {} ({} examples)", example_id, examples.len());
            for example in examples {
                error!(
                    target: "testtrace::report",
                    "      * {} ({})",
                    example.full_description.trim(),
                    example.rerun_location()
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::codec::get_codec;
    use std::collections::BTreeSet;
    use tempfile::TempDir;
    use testtrace_core::{Example, ExampleDescriptor, SourceResolver};

    fn example(line: u32) -> Example {
        let d = ExampleDescriptor::new("Calc", format!("case {}", line), "/app/spec/calc_spec.rb", line);
        Example::from_descriptor(&d, &SourceResolver::new("/app"))
    }

    fn reports() -> RunReports {
        let a = example(1);
        let b = example(2);
        let mut reports = RunReports {
            pid: 7,
            ..Default::default()
        };
        reports.counts.example_count = 2;
        reports.dependency.insert(
            a.example_id.clone(),
            ["/spec/calc_spec.rb".to_string()].into_iter().collect::<BTreeSet<_>>(),
        );
        reports.failed_examples.insert(b.example_id.clone());
        reports.all_examples.insert(a.example_id.clone(), a);
        reports.all_examples.insert(b.example_id.clone(), b);
        reports.rebuild_reverse_dependency();
        reports
    }

    #[test]
    fn test_write_all_artifacts_and_pointer() {
        let dir = TempDir::new().unwrap();
        let codec = get_codec("json").unwrap();
        let writer = ReportWriter::new(CachePaths::new(dir.path(), "json"), codec);
        let reports = reports();

        let last_run = writer.write(&reports).unwrap();
        assert_eq!(last_run.run_id, reports.run_id());
        assert_eq!(last_run.pid, 7);

        let run_dir = dir.path().join(&last_run.run_id);
        for kind in ReportKind::ALL {
            assert!(run_dir.join(kind.file_name("json")).is_file(), "missing {}", kind);
        }
        assert!(dir.path().join("last_run.json").is_file());
        assert!(!run_dir.join("last_run.json").exists());
    }

    #[test]
    fn test_written_reports_load_back() {
        let dir = TempDir::new().unwrap();
        let codec = get_codec("msgpack").unwrap();
        let paths = CachePaths::new(dir.path(), "msgpack");
        let reports = reports();
        ReportWriter::new(paths.clone(), codec).write(&reports).unwrap();

        let cache = Cache::load(&paths, &codec).unwrap();
        assert_eq!(cache.run_id, Some(reports.run_id()));
        assert_eq!(cache.all_examples, reports.all_examples);
        assert_eq!(cache.failed_examples, reports.failed_examples);
        assert_eq!(cache.dependency, reports.dependency);
    }

    #[test]
    fn test_run_id_tracks_population() {
        let mut reports = reports();
        let before = reports.run_id();
        let c = example(3);
        reports.all_examples.insert(c.example_id.clone(), c);
        assert_ne!(before, reports.run_id());
    }

    #[test]
    fn test_duplicate_count() {
        let mut reports = reports();
        let a = example(9);
        reports
            .duplicate_examples
            .insert(a.example_id.clone(), vec![a.clone(), a.clone(), a]);
        assert_eq!(reports.duplicate_count(), 3);
        ReportWriter::log_duplicate_examples(&reports);
    }
}
