//! Cache Store
//!
//! Read-only snapshot of the most recent completed run. The last-run pointer
//! names the run directory; every artifact below it is optional and a
//! missing one loads as empty. A cache directory without a pointer is a
//! first run and loads as an empty cache.
//!
//! Run reasons are discarded on load: a reason only describes the run that
//! recorded it. The shard merger keeps them (see [`Cache::load_dir`]) to
//! tell which shard actually executed an example.

use crate::artifact::read_artifact;
use crate::codec::Codec;
use crate::paths::{CachePaths, ReportKind};
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;
use testtrace_core::{
    format_time, Dependency, Example, ExampleId, ExamplesCoverage, LastRun, Result, SourceFile,
};
use tracing::{debug, warn};

/// Snapshot of a previous run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cache {
    /// Run the snapshot was loaded from; `None` for an empty cache
    pub run_id: Option<String>,
    /// Every example known to the run
    pub all_examples: BTreeMap<ExampleId, Example>,
    /// Colliding examples by shared id
    pub duplicate_examples: BTreeMap<ExampleId, Vec<Example>>,
    /// Examples that never finished
    pub interrupted_examples: BTreeSet<ExampleId>,
    /// Confirmed flaky examples
    pub flaky_examples: BTreeSet<ExampleId>,
    /// Failed examples
    pub failed_examples: BTreeSet<ExampleId>,
    /// Pending examples
    pub pending_examples: BTreeSet<ExampleId>,
    /// Skipped examples
    pub skipped_examples: BTreeSet<ExampleId>,
    /// File registry keyed by root-relative name
    pub all_files: BTreeMap<String, SourceFile>,
    /// Forward dependencies
    pub dependency: Dependency,
    /// Incremental coverage per example
    pub examples_coverage: ExamplesCoverage,
}

impl Cache {
    /// Empty cache (no previous run)
    pub fn empty() -> Self {
        Cache::default()
    }

    /// Whether a previous run was loaded
    pub fn is_loaded(&self) -> bool {
        self.run_id.is_some()
    }

    /// Read the last-run pointer of a cache directory
    pub fn last_run(paths: &CachePaths, codec: &Codec) -> Result<Option<LastRun>> {
        read_artifact(codec, &paths.last_run())
    }

    /// Load the run the pointer names
    ///
    /// Returns an empty cache when there is no pointer or the run directory
    /// is gone. Corrupt artifacts are errors; callers decide whether to
    /// fall back to an empty cache.
    pub fn load(paths: &CachePaths, codec: &Codec) -> Result<Cache> {
        let Some(last_run) = Cache::last_run(paths, codec)? else {
            debug!(target: "testtrace::cache", cache_dir = %paths.root().display(), "No previous run found");
            return Ok(Cache::empty());
        };

        let run_dir = paths.run_dir(&last_run.run_id);
        if !run_dir.is_dir() {
            warn!(
                target: "testtrace::cache",
                run_id = %last_run.run_id,
                run_dir = %run_dir.display(),
                "Last run pointer refers to a missing run directory, ignoring cache"
            );
            return Ok(Cache::empty());
        }

        let started = Instant::now();
        let mut cache = Cache::load_dir(paths, &run_dir, codec, false)?;
        cache.run_id = Some(last_run.run_id);

        debug!(
            target: "testtrace::cache",
            run_dir = %run_dir.display(),
            examples = cache.all_examples.len(),
            files = cache.all_files.len(),
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Loaded cache"
        );
        Ok(cache)
    }

    /// Load every artifact of one run directory
    ///
    /// `keep_run_reason` preserves the recorded run reasons.
    pub fn load_dir(
        paths: &CachePaths,
        run_dir: &Path,
        codec: &Codec,
        keep_run_reason: bool,
    ) -> Result<Cache> {
        let load = Loader {
            paths,
            run_dir,
            codec,
        };

        let mut all_examples: BTreeMap<ExampleId, Example> = load.artifact(ReportKind::AllExamples)?;
        if !keep_run_reason {
            for example in all_examples.values_mut() {
                example.run_reason = None;
            }
        }

        Ok(Cache {
            run_id: run_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned()),
            all_examples,
            duplicate_examples: load.artifact(ReportKind::DuplicateExamples)?,
            interrupted_examples: load.artifact(ReportKind::InterruptedExamples)?,
            flaky_examples: load.artifact(ReportKind::FlakyExamples)?,
            failed_examples: load.artifact(ReportKind::FailedExamples)?,
            pending_examples: load.artifact(ReportKind::PendingExamples)?,
            skipped_examples: load.artifact(ReportKind::SkippedExamples)?,
            all_files: load.artifact(ReportKind::AllFiles)?,
            dependency: load.artifact(ReportKind::Dependency)?,
            examples_coverage: load.artifact(ReportKind::ExamplesCoverage)?,
        })
    }

    /// Whether any file an example depends on is in `changed`
    pub fn depends_on_any(&self, example_id: &ExampleId, changed: &BTreeSet<String>) -> bool {
        self.dependency
            .get(example_id)
            .is_some_and(|files| files.iter().any(|f| changed.contains(f)))
    }
}

struct Loader<'a> {
    paths: &'a CachePaths,
    run_dir: &'a Path,
    codec: &'a Codec,
}

impl Loader<'_> {
    fn artifact<T: DeserializeOwned + Default>(&self, kind: ReportKind) -> Result<T> {
        let path = self.paths.artifact(self.run_dir, kind);
        match read_artifact(self.codec, &path)? {
            Some(value) => Ok(value),
            None => {
                warn!(target: "testtrace::cache", artifact = %kind, path = %path.display(), "Cache artifact missing, treating as empty");
                Ok(T::default())
            }
        }
    }
}
