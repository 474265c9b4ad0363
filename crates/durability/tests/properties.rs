//! Property-based tests for report derivation and shard merging
//!
//! Tests for:
//! - Reverse dependency closure: every depended-on file is indexed, with
//!   the number of examples depending on it, also when examples were
//!   interrupted
//! - Merge commutativity: shard order does not change merged status sets,
//!   dependencies or coverage
//! - Coverage conservation: merged strengths are the sum of shard strengths

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tempfile::TempDir;
use testtrace_core::{
    Dependency, Example, ExampleDescriptor, ExamplesCoverage, ReverseDependency, SourceResolver,
};
use testtrace_durability::{get_codec, CachePaths, ReportMerger, ReportWriter, RunReports};

const FILES: [&str; 5] = ["/lib/a.rb", "/lib/b.rb", "/lib/c.rb", "/spec/a_spec.rb", "/spec/b_spec.rb"];

fn example(line: u32) -> Example {
    let path = if line % 2 == 0 {
        "/app/spec/a_spec.rb"
    } else {
        "/app/spec/b_spec.rb"
    };
    let d = ExampleDescriptor::new("Suite", format!("case {}", line), path, line);
    Example::from_descriptor(&d, &SourceResolver::new("/app"))
}

/// Example line -> indices into FILES
fn dependency_strategy() -> impl Strategy<Value = BTreeMap<u32, BTreeSet<usize>>> {
    prop::collection::btree_map(1u32..12, prop::collection::btree_set(0usize..FILES.len(), 0..4), 0..8)
}

#[derive(Debug, Clone)]
struct ShardPlan {
    lines: BTreeSet<u32>,
    failed: BTreeSet<u32>,
    pending: BTreeSet<u32>,
    deps: BTreeMap<u32, BTreeSet<usize>>,
    hits: BTreeMap<u32, BTreeMap<usize, u64>>,
}

fn shard_strategy() -> impl Strategy<Value = ShardPlan> {
    (
        prop::collection::btree_set(1u32..10, 1..6),
        prop::collection::btree_set(1u32..10, 0..3),
        prop::collection::btree_set(1u32..10, 0..3),
        dependency_strategy(),
        prop::collection::btree_map(1u32..10, prop::collection::btree_map(1usize..6, 1u64..5, 1..3), 0..4),
    )
        .prop_map(|(lines, failed, pending, deps, hits)| ShardPlan {
            failed: failed.intersection(&lines).copied().collect(),
            pending: pending.intersection(&lines).copied().collect(),
            deps: deps.into_iter().filter(|(l, _)| lines.contains(l)).collect(),
            hits: hits.into_iter().filter(|(l, _)| lines.contains(l)).collect(),
            lines,
        })
}

fn reports_for(plan: &ShardPlan) -> RunReports {
    let mut reports = RunReports::default();
    for line in &plan.lines {
        let e = example(*line);
        reports.all_examples.insert(e.example_id.clone(), e);
    }
    let id = |line: &u32| example(*line).example_id;
    reports.failed_examples = plan.failed.iter().map(id).collect();
    reports.pending_examples = plan.pending.iter().map(id).collect();
    for (line, files) in &plan.deps {
        reports
            .dependency
            .insert(id(line), files.iter().map(|i| FILES[*i].to_string()).collect());
    }
    for (line, lines) in &plan.hits {
        let coverage = reports.examples_coverage.entry(id(line)).or_default();
        coverage.insert("/app/lib/a.rb".to_string(), lines.clone());
    }
    reports.rebuild_reverse_dependency();
    reports
}

fn merge(order: &[&ShardPlan]) -> RunReports {
    let dir = TempDir::new().unwrap();
    let codec = get_codec("json").unwrap();
    let mut shards = Vec::new();
    for (n, plan) in order.iter().enumerate() {
        let paths = CachePaths::new(dir.path().join(format!("parallel_tests_{}", n + 1)), "json");
        ReportWriter::new(paths.clone(), codec).write(&reports_for(plan)).unwrap();
        shards.push(paths);
    }
    ReportMerger::new(1).merge(&shards, &codec).unwrap()
}

fn total_strength(coverage: &ExamplesCoverage) -> u64 {
    coverage
        .values()
        .flat_map(|files| files.values())
        .flat_map(|lines| lines.values())
        .sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reverse_dependency_indexes_every_dependency(deps in dependency_strategy()) {
        let mut all_examples = BTreeMap::new();
        let mut dependency = Dependency::new();
        for (line, files) in &deps {
            let e = example(*line);
            dependency.insert(e.example_id.clone(), files.iter().map(|i| FILES[*i].to_string()).collect());
            all_examples.insert(e.example_id.clone(), e);
        }

        let reverse = ReverseDependency::build(&dependency, &all_examples);

        let indexed: BTreeSet<&str> = reverse.files().collect();
        let depended: BTreeSet<&str> = dependency.values().flatten().map(String::as_str).collect();
        prop_assert_eq!(indexed, depended);

        for (file, entry) in reverse.iter() {
            let expected = dependency.values().filter(|files| files.contains(file)).count();
            prop_assert_eq!(entry.example_count, expected);
            prop_assert_eq!(entry.examples.iter().map(|(_, n)| n).sum::<usize>(), expected);
        }
    }

    #[test]
    fn reverse_dependency_closure_holds_with_interrupted_examples(
        deps in dependency_strategy(),
        interrupted_lines in prop::collection::btree_set(1u32..12, 0..6),
    ) {
        let mut reports = RunReports::default();
        for (line, files) in &deps {
            let e = example(*line);
            reports.dependency.insert(e.example_id.clone(), files.iter().map(|i| FILES[*i].to_string()).collect());
            reports.all_examples.insert(e.example_id.clone(), e);
        }
        reports.interrupted_examples = interrupted_lines.iter().map(|l| example(*l).example_id).collect();

        reports.rebuild_reverse_dependency();

        let indexed: BTreeSet<&str> = reports.reverse_dependency.files().collect();
        let depended: BTreeSet<&str> = reports.dependency.values().flatten().map(String::as_str).collect();
        prop_assert_eq!(indexed, depended);
        for id in &reports.interrupted_examples {
            prop_assert!(!reports.dependency.contains_key(id));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn shard_merge_is_order_independent(a in shard_strategy(), b in shard_strategy()) {
        let ab = merge(&[&a, &b]);
        let ba = merge(&[&b, &a]);

        prop_assert_eq!(&ab.failed_examples, &ba.failed_examples);
        prop_assert_eq!(&ab.pending_examples, &ba.pending_examples);
        prop_assert_eq!(&ab.dependency, &ba.dependency);
        prop_assert_eq!(&ab.examples_coverage, &ba.examples_coverage);
        prop_assert_eq!(
            ab.all_examples.keys().collect::<Vec<_>>(),
            ba.all_examples.keys().collect::<Vec<_>>()
        );
        prop_assert_eq!(ab.reverse_dependency, ba.reverse_dependency);
    }

    #[test]
    fn shard_merge_conserves_coverage(a in shard_strategy(), b in shard_strategy()) {
        let merged = merge(&[&a, &b]);
        let expected = total_strength(&reports_for(&a).examples_coverage)
            + total_strength(&reports_for(&b).examples_coverage);
        prop_assert_eq!(total_strength(&merged.examples_coverage), expected);
    }
}
