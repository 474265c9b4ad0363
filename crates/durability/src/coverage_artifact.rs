//! Coverage artifact
//!
//! The final line coverage is written as `coverage.json` under the coverage
//! directory, always in JSON:
//!
//! ```json
//! {"testtrace": {"coverage": {"/app/lib/a.rb": [null, 1, 0]}, "timestamp": 1700000000}}
//! ```

use crate::artifact::write_atomic;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use testtrace_core::{format_time, Coverage, CoverageStat, Result, TracerError};
use tracing::{debug, info};

/// File name of the coverage artifact
pub const COVERAGE_FILE: &str = "coverage.json";

#[derive(Debug, Serialize, Deserialize)]
struct CoverageArtifact {
    testtrace: CoverageReport,
}

#[derive(Debug, Serialize, Deserialize)]
struct CoverageReport {
    coverage: Coverage,
    timestamp: i64,
}

/// Writes the final coverage map
#[derive(Debug, Clone)]
pub struct CoverageWriter {
    path: PathBuf,
}

impl CoverageWriter {
    /// Writer targeting `<coverage_dir>/coverage.json`
    pub fn new(coverage_dir: impl AsRef<Path>) -> Self {
        CoverageWriter {
            path: coverage_dir.as_ref().join(COVERAGE_FILE),
        }
    }

    /// Artifact path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the coverage map atomically
    pub fn write(&self, coverage: &Coverage) -> Result<()> {
        let artifact = CoverageArtifact {
            testtrace: CoverageReport {
                coverage: coverage.clone(),
                timestamp: chrono::Utc::now().timestamp(),
            },
        };
        let bytes = serde_json::to_vec_pretty(&artifact)?;
        write_atomic(&self.path, &bytes)
    }

    /// Log the covered/total summary line
    pub fn log_stats(&self, coverage: &Coverage, elapsed: Duration) -> CoverageStat {
        let stat = CoverageStat::from_coverage(coverage);
        info!(
            target: "testtrace::coverage",
            path = %self.path.display(),
            "Coverage report generated to {}. {} / {} LOC ({}%) covered (took {})",
            self.path.display(),
            stat.covered_lines,
            stat.total_lines,
            stat.covered_percent,
            format_time(elapsed.as_secs_f64())
        );
        stat
    }

    /// Read a coverage artifact; `None` when missing
    pub fn read(path: &Path) -> Result<Option<Coverage>> {
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = std::fs::read(path).map_err(|e| TracerError::io(path, e))?;
        let artifact: CoverageArtifact = serde_json::from_slice(&bytes)?;
        Ok(Some(artifact.testtrace.coverage))
    }
}

/// Sums shard coverage artifacts line by line
#[derive(Debug, Default)]
pub struct CoverageMerger {
    coverage: Coverage,
}

impl CoverageMerger {
    /// Empty merger
    pub fn new() -> Self {
        CoverageMerger::default()
    }

    /// Merge `coverage.json` of every directory; missing artifacts are skipped
    pub fn merge(mut self, coverage_dirs: &[PathBuf]) -> Result<Coverage> {
        for dir in coverage_dirs {
            let path = dir.join(COVERAGE_FILE);
            match CoverageWriter::read(&path)? {
                Some(coverage) => self.add(coverage),
                None => debug!(target: "testtrace::coverage", path = %path.display(), "No shard coverage to merge"),
            }
        }
        Ok(self.coverage)
    }

    /// Add one coverage map
    ///
    /// A line only accumulates when both sides mark it executable; lines
    /// beyond the first-seen length are ignored.
    pub fn add(&mut self, coverage: Coverage) {
        for (file_path, lines) in coverage {
            match self.coverage.get_mut(&file_path) {
                None => {
                    self.coverage.insert(file_path, lines);
                }
                Some(merged) => {
                    for (slot, strength) in merged.iter_mut().zip(lines) {
                        if let (Some(total), Some(s)) = (slot.as_mut(), strength) {
                            *total += s;
                        }
                    }
                }
            }
        }
    }
}
