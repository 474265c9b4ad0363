//! Reporter
//!
//! Mutable registry of the current run. Everything the host reports and
//! everything the runner reconciles after the run lands here, and the
//! report generator turns it into the final [`RunReports`].
//!
//! [`RunReports`]: testtrace_durability::RunReports

use std::collections::{BTreeMap, BTreeSet};
use testtrace_core::{
    Dependency, Example, ExampleId, ExampleStatus, ExamplesCoverage, ExecutionResult, Result,
    SourceFile, TracerError,
};
use tracing::{debug, warn};

/// Current-run registry
#[derive(Debug, Default)]
pub struct Reporter {
    pub(crate) all_examples: BTreeMap<ExampleId, Example>,
    pub(crate) duplicate_examples: BTreeMap<ExampleId, Vec<Example>>,
    pub(crate) interrupted_examples: BTreeSet<ExampleId>,
    pub(crate) flaky_examples: BTreeSet<ExampleId>,
    pub(crate) failed_examples: BTreeSet<ExampleId>,
    pub(crate) pending_examples: BTreeSet<ExampleId>,
    pub(crate) skipped_examples: BTreeSet<ExampleId>,
    pub(crate) possibly_flaky_examples: BTreeSet<ExampleId>,
    pub(crate) deleted_examples: BTreeSet<ExampleId>,
    pub(crate) all_files: BTreeMap<String, SourceFile>,
    pub(crate) modified_files: BTreeSet<String>,
    pub(crate) deleted_files: BTreeSet<String>,
    pub(crate) dependency: Dependency,
    pub(crate) examples_coverage: ExamplesCoverage,
    seen_examples: BTreeMap<ExampleId, Vec<Example>>,
}

impl Reporter {
    /// Empty registry
    pub fn new() -> Self {
        Reporter::default()
    }

    // ========================================================================
    // Examples
    // ========================================================================

    /// Register an example selected to run
    pub fn register_example(&mut self, example: Example) {
        self.seen(&example);
        self.all_examples.insert(example.example_id.clone(), example);
    }

    /// Record an example whose cached result stands
    pub fn on_example_skipped(&mut self, example: &Example) {
        self.seen(example);
        self.skipped_examples.insert(example.example_id.clone());
    }

    fn seen(&mut self, example: &Example) {
        self.seen_examples
            .entry(example.example_id.clone())
            .or_default()
            .push(example.clone());
    }

    /// Move every id declared more than once out of the registry
    ///
    /// Returns the number of colliding examples.
    pub fn deregister_duplicate_examples(&mut self) -> usize {
        let seen = std::mem::take(&mut self.seen_examples);
        for (example_id, examples) in seen {
            if examples.len() < 2 {
                continue;
            }
            self.all_examples.remove(&example_id);
            self.skipped_examples.remove(&example_id);
            self.duplicate_examples.insert(example_id, examples);
        }
        self.duplicate_count()
    }

    /// Number of colliding examples over every collision group
    pub fn duplicate_count(&self) -> usize {
        self.duplicate_examples.values().map(Vec::len).sum()
    }

    /// Record a pass
    pub fn on_example_passed(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()> {
        self.record_result(example_id, result)
    }

    /// Record a failure
    pub fn on_example_failed(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()> {
        self.record_result(example_id, result)?;
        self.failed_examples.insert(example_id.clone());
        Ok(())
    }

    /// Record a pending example
    pub fn on_example_pending(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()> {
        self.record_result(example_id, result)?;
        self.pending_examples.insert(example_id.clone());
        Ok(())
    }

    fn record_result(&mut self, example_id: &ExampleId, result: ExecutionResult) -> Result<()> {
        match self.all_examples.get_mut(example_id) {
            Some(example) => {
                example.execution_result = Some(result);
                Ok(())
            }
            None => Err(TracerError::UnknownExample(example_id.to_string())),
        }
    }

    /// Collect registered examples that never finished
    pub fn register_interrupted_examples(&mut self) {
        self.interrupted_examples = self
            .all_examples
            .values()
            .filter(|example| example.is_interrupted())
            .map(|example| example.example_id.clone())
            .collect();

        if !self.interrupted_examples.is_empty() {
            warn!(
                target: "testtrace::runner",
                count = self.interrupted_examples.len(),
                "Examples were interrupted and will run again next time"
            );
        }
    }

    /// Collect previously known examples that are gone
    ///
    /// An example is deleted when this run neither registered nor skipped it
    /// and one of its locations changed.
    pub fn register_deleted_examples(&mut self, seen_examples: &BTreeMap<ExampleId, Example>) {
        let deleted: BTreeSet<ExampleId> = seen_examples
            .iter()
            .filter(|(example_id, _)| {
                !self.skipped_examples.contains(*example_id)
                    && !self.all_examples.contains_key(*example_id)
                    && !self.duplicate_examples.contains_key(*example_id)
            })
            .filter(|(_, example)| {
                self.file_changed(&example.file_name) || self.file_changed(&example.rerun_file_name)
            })
            .map(|(example_id, _)| example_id.clone())
            .collect();

        if !deleted.is_empty() {
            debug!(target: "testtrace::runner", count = deleted.len(), "Deleted examples detected");
        }
        self.deleted_examples = deleted;
    }

    /// Track an example whose flakiness is decided after the run
    pub fn register_possibly_flaky_example(&mut self, example_id: ExampleId) {
        self.possibly_flaky_examples.insert(example_id);
    }

    /// Confirm an example as flaky
    pub fn register_flaky_example(&mut self, example_id: ExampleId) {
        self.flaky_examples.insert(example_id);
    }

    /// Carry a failure forward
    pub fn register_failed_example(&mut self, example_id: ExampleId) {
        self.failed_examples.insert(example_id);
    }

    /// Carry a pending example forward
    pub fn register_pending_example(&mut self, example_id: ExampleId) {
        self.pending_examples.insert(example_id);
    }

    /// Whether the example executed and passed this run
    pub fn example_passed(&self, example_id: &ExampleId) -> bool {
        self.example_status(example_id) == Some(ExampleStatus::Passed)
    }

    /// Status recorded this run
    pub fn example_status(&self, example_id: &ExampleId) -> Option<ExampleStatus> {
        self.all_examples.get(example_id).and_then(Example::status)
    }

    /// Whether the example was skipped
    pub fn example_skipped(&self, example_id: &ExampleId) -> bool {
        self.skipped_examples.contains(example_id)
    }

    /// Whether the example failed this run or was carried forward as failed
    pub fn example_failed(&self, example_id: &ExampleId) -> bool {
        self.failed_examples.contains(example_id)
    }

    /// Whether the example is pending
    pub fn example_pending(&self, example_id: &ExampleId) -> bool {
        self.pending_examples.contains(example_id)
    }

    /// Whether the example is interrupted
    pub fn example_interrupted(&self, example_id: &ExampleId) -> bool {
        self.interrupted_examples.contains(example_id)
    }

    /// Whether the example was deleted
    pub fn example_deleted(&self, example_id: &ExampleId) -> bool {
        self.deleted_examples.contains(example_id)
    }

    /// Examples registered to run
    pub fn all_examples(&self) -> &BTreeMap<ExampleId, Example> {
        &self.all_examples
    }

    /// Colliding examples by shared id
    pub fn duplicate_examples(&self) -> &BTreeMap<ExampleId, Vec<Example>> {
        &self.duplicate_examples
    }

    /// Skipped examples
    pub fn skipped_examples(&self) -> &BTreeSet<ExampleId> {
        &self.skipped_examples
    }

    /// Examples whose flakiness is decided after the run
    pub fn possibly_flaky_examples(&self) -> &BTreeSet<ExampleId> {
        &self.possibly_flaky_examples
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Register a resolved file
    pub fn register_source_file(&mut self, source_file: SourceFile) {
        self.all_files.insert(source_file.file_name.clone(), source_file);
    }

    /// Mark a previously known file as deleted
    pub fn on_file_deleted(&mut self, file_name: impl Into<String>) {
        self.deleted_files.insert(file_name.into());
    }

    /// Mark a previously known file as modified
    pub fn on_file_modified(&mut self, file_name: impl Into<String>) {
        self.modified_files.insert(file_name.into());
    }

    /// Whether the file is gone
    pub fn file_deleted(&self, file_name: &str) -> bool {
        self.deleted_files.contains(file_name)
    }

    /// Whether the file's digest changed
    pub fn file_modified(&self, file_name: &str) -> bool {
        self.modified_files.contains(file_name)
    }

    /// Whether the file was deleted or modified
    pub fn file_changed(&self, file_name: &str) -> bool {
        self.file_deleted(file_name) || self.file_modified(file_name)
    }

    /// Files registered this run
    pub fn all_files(&self) -> &BTreeMap<String, SourceFile> {
        &self.all_files
    }

    // ========================================================================
    // Dependency and coverage
    // ========================================================================

    /// Record that an example depends on a file
    pub fn register_dependency(&mut self, example_id: &ExampleId, file_name: impl Into<String>) {
        self.dependency
            .entry(example_id.clone())
            .or_default()
            .insert(file_name.into());
    }

    /// Dependencies registered this run
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// Store the final incremental coverage of this run
    pub fn register_examples_coverage(&mut self, examples_coverage: ExamplesCoverage) {
        self.examples_coverage = examples_coverage;
    }

    /// Incremental coverage of this run
    pub fn examples_coverage(&self) -> &ExamplesCoverage {
        &self.examples_coverage
    }
}
