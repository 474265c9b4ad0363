//! Coverage and dependency types
//!
//! ## Shapes
//!
//! | Type | Key | Value |
//! |------|-----|-------|
//! | [`Coverage`] | absolute file path | per-line strengths, index = line - 1 |
//! | [`ExamplesCoverage`] | example id | file path -> line index -> strength |
//! | [`Dependency`] | example id | set of root-relative file names |
//! | [`ReverseDependency`] | file name | example count and declaring files |
//!
//! A `None` line strength marks a non-executable line; `Some(0)` an
//! executable line that was never hit.

use crate::example::{Example, ExampleId};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::marker::PhantomData;

/// Per-line execution count or hit indicator
pub type Strength = u64;

/// Per-line strengths of one file, index = line number - 1
pub type LineCoverage = Vec<Option<Strength>>;

/// Final or raw coverage keyed by absolute file path
pub type Coverage = BTreeMap<String, LineCoverage>;

/// Sparse line hits keyed by 0-based line index
pub type LineHits = BTreeMap<usize, Strength>;

/// Incremental coverage of one example keyed by absolute file path
pub type ExampleCoverage = BTreeMap<String, LineHits>;

/// Incremental coverage of every example
pub type ExamplesCoverage = BTreeMap<ExampleId, ExampleCoverage>;

/// Files each example depends on
pub type Dependency = BTreeMap<ExampleId, BTreeSet<String>>;

// ============================================================================
// Reverse Dependency
// ============================================================================

/// Examples affected by one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseDependencyEntry {
    /// Number of examples depending on the file
    pub example_count: usize,
    /// Declaring (re-run) file -> number of its examples, by count descending
    #[serde(with = "ordered_map")]
    pub examples: Vec<(String, usize)>,
}

/// File -> affected examples index, ordered by example count descending then
/// file name
///
/// Always derived from a [`Dependency`] map; never merged or carried over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReverseDependency {
    entries: Vec<(String, ReverseDependencyEntry)>,
}

impl ReverseDependency {
    /// Derive the index from forward dependencies
    ///
    /// Every file of every example in `dependency` is indexed, so the index
    /// covers exactly the files of the forward map. Examples missing from
    /// `all_examples` have no rerun file and are ignored; callers prune them
    /// from `dependency` first.
    pub fn build(dependency: &Dependency, all_examples: &BTreeMap<ExampleId, Example>) -> Self {
        let mut counts: BTreeMap<&str, (usize, BTreeMap<&str, usize>)> = BTreeMap::new();

        for (example_id, files) in dependency {
            let Some(example) = all_examples.get(example_id) else {
                continue;
            };

            for file_name in files {
                let entry = counts.entry(file_name.as_str()).or_default();
                entry.0 += 1;
                *entry.1.entry(example.rerun_file_name.as_str()).or_insert(0) += 1;
            }
        }

        let mut entries: Vec<(String, ReverseDependencyEntry)> = counts
            .into_iter()
            .map(|(file_name, (example_count, examples))| {
                let mut examples: Vec<(String, usize)> = examples
                    .into_iter()
                    .map(|(name, count)| (name.to_string(), count))
                    .collect();
                examples.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                (
                    file_name.to_string(),
                    ReverseDependencyEntry {
                        example_count,
                        examples,
                    },
                )
            })
            .collect();
        entries.sort_by(|a, b| {
            b.1.example_count
                .cmp(&a.1.example_count)
                .then_with(|| a.0.cmp(&b.0))
        });

        ReverseDependency { entries }
    }

    /// Entry for one file
    pub fn get(&self, file_name: &str) -> Option<&ReverseDependencyEntry> {
        self.entries
            .iter()
            .find(|(name, _)| name == file_name)
            .map(|(_, entry)| entry)
    }

    /// Entries in report order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ReverseDependencyEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Indexed file names in report order
    pub fn files(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Number of indexed files
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file is indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for ReverseDependency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ordered_map::serialize(&self.entries, serializer)
    }
}

impl<'de> Deserialize<'de> for ReverseDependency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        ordered_map::deserialize(deserializer).map(|entries| ReverseDependency { entries })
    }
}

/// Serialize `Vec<(String, V)>` as a map, keeping entry order
mod ordered_map {
    use super::*;

    pub fn serialize<S, V>(entries: &[(String, V)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        V: Serialize,
    {
        serializer.collect_map(entries.iter().map(|(k, v)| (k, v)))
    }

    pub fn deserialize<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
    where
        D: Deserializer<'de>,
        V: Deserialize<'de>,
    {
        struct OrderedVisitor<V>(PhantomData<V>);

        impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedVisitor<V> {
            type Value = Vec<(String, V)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, V>()? {
                    entries.push((key, value));
                }
                Ok(entries)
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

// ============================================================================
// Coverage Stat
// ============================================================================

/// Aggregate line statistics of a coverage map
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageStat {
    /// Executable lines
    pub total_lines: usize,
    /// Executable lines hit at least once
    pub covered_lines: usize,
    /// Executable lines never hit
    pub missed_lines: usize,
    /// Covered share, rounded to 2 decimals (0.0 when nothing is executable)
    pub covered_percent: f64,
}

impl CoverageStat {
    /// Compute statistics over every file
    pub fn from_coverage(coverage: &Coverage) -> Self {
        let mut total_lines = 0;
        let mut covered_lines = 0;

        for strength in coverage.values().flatten().flatten() {
            total_lines += 1;
            if *strength > 0 {
                covered_lines += 1;
            }
        }

        let covered_percent = if total_lines == 0 {
            0.0
        } else {
            (10_000.0 * covered_lines as f64 / total_lines as f64).round() / 100.0
        };

        CoverageStat {
            total_lines,
            covered_lines,
            missed_lines: total_lines - covered_lines,
            covered_percent,
        }
    }
}
