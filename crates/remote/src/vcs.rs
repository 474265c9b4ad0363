//! Version control queries
//!
//! [`Vcs`] exposes the three git queries the cache ref resolution needs.
//! [`GitCli`] runs the `git` binary in a working directory.

use crate::error::{RemoteCacheError, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Commit id -> committer timestamp (unix seconds)
pub type RefTimestamps = BTreeMap<String, i64>;

/// Git queries used to locate cache refs
pub trait Vcs {
    /// Resolve a revision to a commit id; `None` when it does not exist
    fn rev_parse(&self, rev: &str) -> Result<Option<String>>;

    /// Commit ids of a revision or range, newest first
    fn rev_list(&self, range: &str, max_count: Option<usize>) -> Result<Vec<String>>;

    /// Committer timestamps of the given commits
    fn commit_timestamps(&self, refs: &[String]) -> Result<RefTimestamps>;
}

/// `git` command line client
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    /// Client running in `workdir`
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        GitCli {
            workdir: workdir.into(),
        }
    }

    /// Working directory
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|e| RemoteCacheError::vcs(format!("failed to run git {}: {}", args.join(" "), e)))
    }

    fn git_stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.git(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RemoteCacheError::vcs(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Vcs for GitCli {
    fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        let output = self.git(&["rev-parse", "--verify", "--quiet", rev])?;
        if !output.status.success() {
            return Ok(None);
        }
        let sha = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Some(sha).filter(|s| !s.is_empty()))
    }

    fn rev_list(&self, range: &str, max_count: Option<usize>) -> Result<Vec<String>> {
        let max = max_count.map(|n| format!("--max-count={}", n));
        let mut args = vec!["rev-list"];
        if let Some(max) = &max {
            args.push(max.as_str());
        }
        args.push(range);

        let stdout = self.git_stdout(&args)?;
        Ok(stdout.split_whitespace().map(str::to_string).collect())
    }

    fn commit_timestamps(&self, refs: &[String]) -> Result<RefTimestamps> {
        if refs.is_empty() {
            return Ok(RefTimestamps::new());
        }

        let mut args = vec!["show", "--no-patch", "--format=%H %ct"];
        args.extend(refs.iter().map(String::as_str));
        let stdout = self.git_stdout(&args)?;
        parse_timestamps(&stdout)
    }
}

/// Parse `<sha> <unix seconds>` lines
pub fn parse_timestamps(output: &str) -> Result<RefTimestamps> {
    let mut timestamps = RefTimestamps::new();
    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let mut parts = line.split_whitespace();
        let (Some(sha), Some(ts), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RemoteCacheError::vcs(format!("unexpected commit line '{}'", line)));
        };
        let ts = ts
            .parse::<i64>()
            .map_err(|_| RemoteCacheError::vcs(format!("invalid commit timestamp in '{}'", line)))?;
        timestamps.insert(sha.to_string(), ts);
    }
    Ok(timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamps() {
        let parsed = parse_timestamps("aaa 100\n\nbbb 200\n").unwrap();
        assert_eq!(parsed.get("aaa"), Some(&100));
        assert_eq!(parsed.get("bbb"), Some(&200));
    }

    #[test]
    fn test_parse_timestamps_rejects_garbage() {
        assert!(parse_timestamps("aaa").is_err());
        assert!(parse_timestamps("aaa later").is_err());
        assert!(parse_timestamps("aaa 1 extra").is_err());
    }
}
