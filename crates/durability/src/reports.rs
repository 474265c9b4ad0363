//! Final report set of one run
//!
//! Produced by the report generator (single process) or the report merger
//! (shards), consumed by the report writer.

use std::collections::{BTreeMap, BTreeSet};
use testtrace_core::{
    population_digest, Dependency, Example, ExampleId, ExamplesCoverage, ReverseDependency,
    RunCounts, SourceFile,
};

/// Every artifact of a run, ready to be written
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReports {
    /// Process that produced the reports
    pub pid: u32,
    /// Shard processes folded into these reports
    pub merged_pids: Vec<u32>,
    /// Summary counts
    pub counts: RunCounts,
    /// Every example
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
    /// File registry
    pub all_files: BTreeMap<String, SourceFile>,
    /// Forward dependencies
    pub dependency: Dependency,
    /// Derived file -> examples index
    pub reverse_dependency: ReverseDependency,
    /// Incremental coverage per example
    pub examples_coverage: ExamplesCoverage,
}

impl RunReports {
    /// Content hash of the example population
    pub fn run_id(&self) -> String {
        population_digest(self.all_examples.keys().map(|id| id.as_str()))
    }

    /// Number of colliding examples over every collision group
    pub fn duplicate_count(&self) -> usize {
        self.duplicate_examples.values().map(Vec::len).sum()
    }

    /// Recompute the reverse index from the forward dependencies
    ///
    /// Interrupted and unregistered examples are dropped from `dependency`
    /// first, so both maps name the same files.
    pub fn rebuild_reverse_dependency(&mut self) {
        let all_examples = &self.all_examples;
        let interrupted = &self.interrupted_examples;
        self.dependency
            .retain(|example_id, _| all_examples.contains_key(example_id) && !interrupted.contains(example_id));

        self.reverse_dependency = ReverseDependency::build(&self.dependency, &self.all_examples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use testtrace_core::{ExampleDescriptor, SourceResolver};

    fn example(line: u32) -> Example {
        let d = ExampleDescriptor::new("Group", format!("case {}", line), "/app/spec/a_spec.rb", line);
        Example::from_descriptor(&d, &SourceResolver::new("/app"))
    }

    fn files(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_rebuild_drops_interrupted_dependency() {
        let done = example(1);
        let interrupted = example(2);

        let mut reports = RunReports::default();
        reports.all_examples.insert(done.example_id.clone(), done.clone());
        reports.all_examples.insert(interrupted.example_id.clone(), interrupted.clone());
        reports.interrupted_examples.insert(interrupted.example_id.clone());
        reports.dependency.insert(done.example_id.clone(), files(&["/lib/a.rb"]));
        reports.dependency.insert(interrupted.example_id.clone(), files(&["/lib/only.rb"]));

        reports.rebuild_reverse_dependency();

        assert!(!reports.dependency.contains_key(&interrupted.example_id));
        assert_eq!(reports.reverse_dependency.files().collect::<Vec<_>>(), vec!["/lib/a.rb"]);
    }

    #[test]
    fn test_rebuild_drops_unregistered_dependency() {
        let known = example(1);
        let unknown = example(2);

        let mut reports = RunReports::default();
        reports.all_examples.insert(known.example_id.clone(), known.clone());
        reports.dependency.insert(known.example_id.clone(), files(&["/lib/a.rb"]));
        reports.dependency.insert(unknown.example_id.clone(), files(&["/lib/b.rb"]));

        reports.rebuild_reverse_dependency();

        assert_eq!(reports.dependency.len(), 1);
        assert_eq!(reports.reverse_dependency.files().collect::<Vec<_>>(), vec!["/lib/a.rb"]);
    }
}
