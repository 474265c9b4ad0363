//! Coverage Reporter
//!
//! Turns the monotonically accumulating counters of a coverage source into
//! per-example incremental coverage:
//!
//! 1. `record_coverage()` snapshots the counters before an example runs.
//! 2. `compute_diff(id)` attributes to the example every line whose counter
//!    moved since the snapshot; the new observation becomes the baseline.
//! 3. After the run, `generate_final_examples_coverage()` drops coverage
//!    filtered files, `merge_coverage()` folds in what skipped examples
//!    contributed last time, and `generate_final_coverage()` produces the
//!    totals.
//!
//! Counters are only meaningful if examples run one at a time within the
//! recording scope.

use crate::context::TracerContext;
use std::collections::{BTreeMap, BTreeSet};
use testtrace_core::{
    Coverage, CoverageStat, ExampleCoverage, ExampleId, ExamplesCoverage, LineCoverage, LineHits,
    SourceResolver,
};
use tracing::{debug, warn};

// ============================================================================
// Coverage source
// ============================================================================

/// Raw counters of one file as exposed by the instrumentation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileCounters {
    /// Array indexed by line
    Lines(LineCoverage),
    /// Object keyed by counter kind; only line counters are used
    Detailed {
        /// Line counters
        lines: LineCoverage,
    },
}

impl FileCounters {
    /// Line counters
    pub fn lines(&self) -> &LineCoverage {
        match self {
            FileCounters::Lines(lines) => lines,
            FileCounters::Detailed { lines } => lines,
        }
    }

    fn into_lines(self) -> LineCoverage {
        match self {
            FileCounters::Lines(lines) => lines,
            FileCounters::Detailed { lines } => lines,
        }
    }

    fn mode(&self) -> CoverageMode {
        match self {
            FileCounters::Lines(_) => CoverageMode::Array,
            FileCounters::Detailed { .. } => CoverageMode::Hash,
        }
    }
}

/// Raw counters keyed by absolute file path
pub type RawCoverage = BTreeMap<String, FileCounters>;

/// Instrumentation exposing cumulative line counters
pub trait CoverageSource: Send {
    /// Current counters, without resetting them
    fn peek(&self) -> RawCoverage;

    /// Start collecting
    fn start(&mut self) {}

    /// Stop collecting
    fn stop(&mut self) {}
}

/// Counter shape, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverageMode {
    /// Line arrays
    Array,
    /// Objects with a `lines` member
    Hash,
}

// ============================================================================
// Line stubs
// ============================================================================

/// Synthesizes an all-zero coverage line array for a never-loaded file
pub trait LineClassifier: Send + Sync {
    /// One entry per line: `Some(0)` for executable lines, `None` otherwise
    fn line_stub(&self, file_path: &str) -> LineCoverage;
}

/// Text heuristic: blank lines, comments and bare block terminators are not
/// executable; every other line is.
#[derive(Debug, Clone)]
pub struct HeuristicLineClassifier {
    comment_prefixes: Vec<String>,
    terminators: Vec<String>,
}

impl Default for HeuristicLineClassifier {
    fn default() -> Self {
        HeuristicLineClassifier {
            comment_prefixes: vec!["#".to_string(), "//".to_string()],
            terminators: ["end", "}", "]", ")", "else", "ensure", "begin", "});", "};"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl LineClassifier for HeuristicLineClassifier {
    fn line_stub(&self, file_path: &str) -> LineCoverage {
        let content = match std::fs::read_to_string(file_path) {
            Ok(content) => content,
            Err(e) => {
                debug!(target: "testtrace::coverage", file_path, error = %e, "Cannot read file for line stub");
                return Vec::new();
            }
        };

        content
            .lines()
            .map(|line| {
                let line = line.trim();
                let skip = line.is_empty()
                    || self.comment_prefixes.iter().any(|p| line.starts_with(p.as_str()))
                    || self.terminators.iter().any(|t| line == t);
                if skip {
                    None
                } else {
                    Some(0)
                }
            })
            .collect()
    }
}

// ============================================================================
// Reporter
// ============================================================================

/// Per-example coverage attribution and final totals
pub struct CoverageReporter {
    source: Box<dyn CoverageSource>,
    classifier: Box<dyn LineClassifier>,
    resolver: SourceResolver,
    mode: CoverageMode,
    previous: Coverage,
    examples_coverage: ExamplesCoverage,
    coverage: Option<Coverage>,
    coverage_stat: Option<CoverageStat>,
}

impl std::fmt::Debug for CoverageReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageReporter")
            .field("mode", &self.mode)
            .field("examples", &self.examples_coverage.len())
            .field("coverage_stat", &self.coverage_stat)
            .finish()
    }
}

impl CoverageReporter {
    /// Create a reporter, detecting the counter shape from a first peek
    pub fn new(source: Box<dyn CoverageSource>, resolver: SourceResolver) -> Self {
        let mode = source
            .peek()
            .values()
            .next()
            .map(FileCounters::mode)
            .unwrap_or(CoverageMode::Array);
        debug!(target: "testtrace::coverage", mode = ?mode, "Coverage mode detected");

        CoverageReporter {
            source,
            classifier: Box::new(HeuristicLineClassifier::default()),
            resolver,
            mode,
            previous: Coverage::new(),
            examples_coverage: ExamplesCoverage::new(),
            coverage: None,
            coverage_stat: None,
        }
    }

    /// Replace the line-stub classifier
    pub fn with_classifier(mut self, classifier: Box<dyn LineClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Counter shape
    pub fn mode(&self) -> CoverageMode {
        self.mode
    }

    /// Start the coverage source
    pub fn start(&mut self) {
        self.source.start();
    }

    /// Stop the coverage source
    pub fn stop(&mut self) {
        self.source.stop();
    }

    /// Current counters of files under the project root
    fn peek_coverage(&self) -> Coverage {
        let mut coverage = Coverage::new();
        for (file_path, counters) in self.source.peek() {
            if !self.resolver.is_under_root(&file_path) {
                continue;
            }
            if counters.mode() != self.mode {
                warn!(
                    target: "testtrace::coverage",
                    file_path = %file_path,
                    expected = ?self.mode,
                    "Coverage counter shape changed mid-run, using line counters"
                );
            }
            coverage.insert(file_path, counters.into_lines());
        }
        coverage
    }

    /// Snapshot counters as the baseline for the next diff
    pub fn record_coverage(&mut self) {
        self.previous = self.peek_coverage();
    }

    /// Attribute the counter movement since the baseline to `example_id`
    pub fn compute_diff(&mut self, example_id: &ExampleId) {
        let current = self.peek_coverage();
        let example = self.examples_coverage.entry(example_id.clone()).or_default();

        for (file_path, current_stats) in &current {
            match self.previous.get(file_path) {
                None => missing_file_diff(example, file_path, current_stats),
                Some(previous_stats) if previous_stats != current_stats => {
                    existing_file_diff(example, file_path, current_stats, previous_stats)
                }
                Some(_) => {}
            }
        }

        self.previous = current;
    }

    /// Incremental coverage recorded so far
    pub fn examples_coverage(&self) -> &ExamplesCoverage {
        &self.examples_coverage
    }

    /// Take the incremental coverage out of the reporter
    pub fn take_examples_coverage(&mut self) -> ExamplesCoverage {
        std::mem::take(&mut self.examples_coverage)
    }

    /// Drop coverage filtered files from every example
    pub fn generate_final_examples_coverage(&mut self, ctx: &TracerContext) {
        let mut verdicts: BTreeMap<String, bool> = BTreeMap::new();

        for files in self.examples_coverage.values_mut() {
            files.retain(|file_path, _| {
                *verdicts.entry(file_path.clone()).or_insert_with(|| {
                    !ctx.is_coverage_filtered(&ctx.resolver().file_name(file_path))
                })
            });
        }
    }

    /// Fold coverage of examples that did not run into the totals
    ///
    /// Files missing from the current counters start from a line stub.
    pub fn merge_coverage(&mut self, missed: &ExampleCoverage) {
        let mut coverage = self.peek_coverage();

        for (file_path, hits) in missed {
            let mut lines = match coverage.get(file_path) {
                Some(lines) => lines.clone(),
                None => self.classifier.line_stub(file_path),
            };

            for (line, strength) in hits {
                match lines.get_mut(*line) {
                    Some(slot) => *slot = Some(slot.unwrap_or(0) + strength),
                    None => debug!(
                        target: "testtrace::coverage",
                        file_path = %file_path,
                        line = *line,
                        "Missed coverage beyond end of file, ignored"
                    ),
                }
            }
            coverage.insert(file_path.clone(), lines);
        }

        self.coverage = Some(coverage);
        self.coverage_stat = None;
    }

    /// Final coverage and its statistics (computed once)
    ///
    /// The file set is the observed files plus the tracked-files glob,
    /// minus coverage filtered files. Files never loaded get a line stub.
    pub fn generate_final_coverage(&mut self, ctx: &TracerContext) -> CoverageStat {
        if let Some(stat) = self.coverage_stat {
            return stat;
        }

        let mut coverage = match self.coverage.take() {
            Some(coverage) => coverage,
            None => self.peek_coverage(),
        };

        let mut all_files: BTreeSet<String> = coverage.keys().cloned().collect();
        all_files.extend(tracked_files(ctx));
        all_files.retain(|file_path| !ctx.is_coverage_filtered(&ctx.resolver().file_name(file_path)));

        coverage.retain(|file_path, _| all_files.contains(file_path));
        for file_path in &all_files {
            if !coverage.contains_key(file_path) {
                let stub = self.classifier.line_stub(file_path);
                coverage.insert(file_path.clone(), stub);
            }
        }

        let stat = CoverageStat::from_coverage(&coverage);
        self.coverage = Some(coverage);
        self.coverage_stat = Some(stat);
        stat
    }

    /// Final coverage, once generated or merged
    pub fn coverage(&self) -> Option<&Coverage> {
        self.coverage.as_ref()
    }

    /// Final statistics, once generated
    pub fn coverage_stat(&self) -> Option<CoverageStat> {
        self.coverage_stat
    }
}

fn missing_file_diff(example: &mut ExampleCoverage, file_path: &str, current: &LineCoverage) {
    let hits: LineHits = current
        .iter()
        .enumerate()
        .filter_map(|(line, stat)| match stat {
            Some(s) if *s > 0 => Some((line, *s)),
            _ => None,
        })
        .collect();

    if !hits.is_empty() {
        example.entry(file_path.to_string()).or_default().extend(hits);
    }
}

fn existing_file_diff(
    example: &mut ExampleCoverage,
    file_path: &str,
    current: &LineCoverage,
    previous: &LineCoverage,
) {
    let hits: LineHits = current
        .iter()
        .zip(previous)
        .enumerate()
        .filter_map(|(line, pair)| match pair {
            (Some(c), Some(p)) if c > p => Some((line, c - p)),
            _ => None,
        })
        .collect();

    if !hits.is_empty() {
        example.entry(file_path.to_string()).or_default().extend(hits);
    }
}

fn tracked_files(ctx: &TracerContext) -> Vec<String> {
    let Some(pattern) = ctx.config().coverage_track_files.as_deref() else {
        return Vec::new();
    };

    let full = ctx.resolver().root().join(pattern);
    match glob::glob(&full.to_string_lossy()) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .map(|path| path.to_string_lossy().into_owned())
            .collect(),
        Err(e) => {
            warn!(target: "testtrace::coverage", pattern, error = %e, "Invalid coverage_track_files glob, ignored");
            Vec::new()
        }
    }
}
