//! Property-based tests for per-example coverage attribution
//!
//! Tests for:
//! - Conservation: the strengths attributed to examples add up to the
//!   final counters
//! - Attribution only names lines whose counters moved

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use testtrace_core::{ExampleId, SourceResolver};
use testtrace_engine::{CoverageReporter, CoverageSource, FileCounters, RawCoverage};

const FILES: [&str; 2] = ["/app/lib/a.rb", "/app/lib/b.rb"];
const LINES: usize = 6;

#[derive(Debug, Clone, Default)]
struct Counters(Arc<Mutex<RawCoverage>>);

impl Counters {
    fn bump(&self, file: usize, line: usize, by: u64) {
        let mut raw = self.0.lock().unwrap();
        let counters = raw
            .entry(FILES[file].to_string())
            .or_insert_with(|| FileCounters::Lines(vec![Some(0); LINES]));
        if let FileCounters::Lines(lines) = counters {
            lines[line] = Some(lines[line].unwrap_or(0) + by);
        }
    }

    fn totals(&self) -> BTreeMap<(String, usize), u64> {
        let raw = self.0.lock().unwrap();
        let mut totals = BTreeMap::new();
        for (file, counters) in raw.iter() {
            for (line, strength) in counters.lines().iter().enumerate() {
                if let Some(s) = (*strength).filter(|s| *s > 0) {
                    totals.insert((file.clone(), line), s);
                }
            }
        }
        totals
    }
}

impl CoverageSource for Counters {
    fn peek(&self) -> RawCoverage {
        self.0.lock().unwrap().clone()
    }
}

/// Examples, each a list of (file, line, hits)
fn run_strategy() -> impl Strategy<Value = Vec<Vec<(usize, usize, u64)>>> {
    prop::collection::vec(
        prop::collection::vec((0..FILES.len(), 0..LINES, 1u64..4), 0..6),
        1..10,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn attributed_strength_matches_final_counters(run in run_strategy()) {
        let source = Counters::default();
        let mut reporter = CoverageReporter::new(Box::new(source.clone()), SourceResolver::new("/app"));
        reporter.record_coverage();

        for (n, hits) in run.iter().enumerate() {
            let id = ExampleId::new(format!("example-{}", n));
            reporter.record_coverage();
            for (file, line, by) in hits {
                source.bump(*file, *line, *by);
            }
            reporter.compute_diff(&id);
        }

        let mut attributed: BTreeMap<(String, usize), u64> = BTreeMap::new();
        for files in reporter.examples_coverage().values() {
            for (file, lines) in files {
                for (line, strength) in lines {
                    *attributed.entry((file.clone(), *line)).or_insert(0) += strength;
                }
            }
        }

        prop_assert_eq!(attributed, source.totals());
        prop_assert_eq!(reporter.examples_coverage().len(), run.len());
    }

    #[test]
    fn untouched_examples_record_nothing(run in run_strategy()) {
        let source = Counters::default();
        let mut reporter = CoverageReporter::new(Box::new(source.clone()), SourceResolver::new("/app"));

        for (n, hits) in run.iter().enumerate() {
            let id = ExampleId::new(format!("example-{}", n));
            reporter.record_coverage();
            for (file, line, by) in hits {
                source.bump(*file, *line, *by);
            }
            reporter.compute_diff(&id);

            let recorded = &reporter.examples_coverage()[&id];
            prop_assert_eq!(recorded.is_empty(), hits.is_empty());
            for (file, lines) in recorded {
                for line in lines.keys() {
                    prop_assert!(hits.iter().any(|(f, l, _)| FILES[*f] == file.as_str() && l == line));
                }
            }
        }
    }
}
