//! Run summary types
//!
//! [`LastRun`] is the pointer record written next to the per-run directories.
//! It is the only artifact that is overwritten between runs; everything under
//! a run directory is immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Example counts of one run (or the sum over shards)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    /// Examples executed plus examples skipped
    pub actual_count: usize,
    /// Examples selected to run
    pub example_count: usize,
    /// Colliding examples (all members of every collision group)
    pub duplicate_examples: usize,
    /// Examples that never finished
    pub interrupted_examples: usize,
    /// Failed examples, including carried-forward failures
    pub failed_examples: usize,
    /// Examples skipped because their cached result stands
    pub skipped_examples: usize,
    /// Pending examples, including carried-forward pending
    pub pending_examples: usize,
    /// Confirmed flaky examples
    pub flaky_examples: usize,
}

impl RunCounts {
    /// Add another run's counts field by field
    pub fn absorb(&mut self, other: &RunCounts) {
        self.actual_count += other.actual_count;
        self.example_count += other.example_count;
        self.duplicate_examples += other.duplicate_examples;
        self.interrupted_examples += other.interrupted_examples;
        self.failed_examples += other.failed_examples;
        self.skipped_examples += other.skipped_examples;
        self.pending_examples += other.pending_examples;
        self.flaky_examples += other.flaky_examples;
    }
}

/// Pointer to the most recent run directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastRun {
    /// Run directory name
    pub run_id: String,
    /// Process that wrote the run
    pub pid: u32,
    /// Processes whose shards were merged into this run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_pids: Vec<u32>,
    /// Summary counts
    #[serde(flatten)]
    pub counts: RunCounts,
    /// When the pointer was written
    pub timestamp: DateTime<Utc>,
}

impl LastRun {
    /// Pointer for a run written now
    pub fn new(run_id: impl Into<String>, pid: u32, counts: RunCounts) -> Self {
        LastRun {
            run_id: run_id.into(),
            pid,
            merged_pids: Vec::new(),
            counts,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_absorb() {
        let mut total = RunCounts {
            example_count: 3,
            failed_examples: 1,
            ..Default::default()
        };
        total.absorb(&RunCounts {
            example_count: 2,
            skipped_examples: 4,
            ..Default::default()
        });
        assert_eq!(total.example_count, 5);
        assert_eq!(total.failed_examples, 1);
        assert_eq!(total.skipped_examples, 4);
    }

    #[test]
    fn test_last_run_is_flat() {
        let last_run = LastRun::new("abc", 42, RunCounts {
            example_count: 3,
            ..Default::default()
        });
        let json = serde_json::to_value(&last_run).unwrap();
        assert_eq!(json["run_id"], "abc");
        assert_eq!(json["example_count"], 3);
        assert!(json.get("counts").is_none());
        assert!(json.get("merged_pids").is_none());

        let back: LastRun = serde_json::from_value(json).unwrap();
        assert_eq!(back, last_run);
    }
}
