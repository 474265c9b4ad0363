//! Shard coordination
//!
//! Parallel runs are N independent processes, each writing to its own
//! `parallel_tests_<n>` cache. A shared lock file records the highest
//! partition index seen; the process owning that index is the last process
//! and is the only one that merges shard reports. It waits for every other
//! shard's completion marker before merging.
//!
//! ## Environment
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `TEST_ENV_NUMBER` | partition index; empty means partition 1 |
//! | `PARALLEL_TEST_GROUPS` | number of partitions |
//!
//! Both must be set or both unset.

use crate::paths::shard_dir_name;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use testtrace_core::{Result, TracerError};
use tracing::{debug, info, warn};

/// Partition environment variable
pub const TEST_ENV_NUMBER: &str = "TEST_ENV_NUMBER";
/// Partition count environment variable
pub const PARALLEL_TEST_GROUPS: &str = "PARALLEL_TEST_GROUPS";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// This process's place in a sharded run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardEnv {
    /// 1-based partition index
    pub partition: usize,
    /// Number of partitions
    pub groups: usize,
}

impl ShardEnv {
    /// Parse the partition variables
    ///
    /// Returns `Ok(None)` when neither is set.
    pub fn from_vars(test_env_number: Option<&str>, groups: Option<&str>) -> Result<Option<ShardEnv>> {
        let (number, groups) = match (test_env_number, groups) {
            (None, None) => return Ok(None),
            (Some(_), None) => {
                return Err(TracerError::config(format!(
                    "{} is set but {} is not",
                    TEST_ENV_NUMBER, PARALLEL_TEST_GROUPS
                )))
            }
            (None, Some(_)) => {
                return Err(TracerError::config(format!(
                    "{} is set but {} is not",
                    PARALLEL_TEST_GROUPS, TEST_ENV_NUMBER
                )))
            }
            (Some(n), Some(g)) => (n.trim(), g.trim()),
        };

        let partition = if number.is_empty() {
            1
        } else {
            parse_index(TEST_ENV_NUMBER, number)?
        };
        let groups = parse_index(PARALLEL_TEST_GROUPS, groups)?;

        if partition > groups {
            return Err(TracerError::config(format!(
                "{}={} exceeds {}={}",
                TEST_ENV_NUMBER, partition, PARALLEL_TEST_GROUPS, groups
            )));
        }

        Ok(Some(ShardEnv { partition, groups }))
    }

    /// Parse the partition variables from the process environment
    pub fn from_env() -> Result<Option<ShardEnv>> {
        let number = std::env::var(TEST_ENV_NUMBER).ok();
        let groups = std::env::var(PARALLEL_TEST_GROUPS).ok();
        ShardEnv::from_vars(number.as_deref(), groups.as_deref())
    }

    /// Cache subdirectory of this partition
    pub fn dir_name(&self) -> String {
        shard_dir_name(self.partition)
    }

    /// Every partition index of the run
    pub fn partitions(&self) -> impl Iterator<Item = usize> {
        1..=self.groups
    }
}

fn parse_index(name: &str, value: &str) -> Result<usize> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(TracerError::config(format!(
            "{} must be a positive integer, got '{}'",
            name, value
        ))),
    }
}

/// Lock-file based coordination between shard processes
#[derive(Debug, Clone)]
pub struct ShardCoordinator {
    env: ShardEnv,
    lock_file: PathBuf,
    markers_dir: PathBuf,
}

impl ShardCoordinator {
    /// Coordinator for one partition
    ///
    /// `markers_dir` is shared by every shard (the suite-level cache
    /// directory).
    pub fn new(env: ShardEnv, lock_file: impl Into<PathBuf>, markers_dir: impl Into<PathBuf>) -> Self {
        ShardCoordinator {
            env,
            lock_file: lock_file.into(),
            markers_dir: markers_dir.into(),
        }
    }

    /// Partition environment
    pub fn env(&self) -> ShardEnv {
        self.env
    }

    /// Record this partition in the lock file; returns the max seen so far
    pub fn register(&self) -> Result<usize> {
        if let Some(parent) = self.lock_file.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TracerError::io(parent, e))?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_file)
            .map_err(|e| self.lock_error(e))?;

        file.lock_exclusive().map_err(|e| self.lock_error(e))?;
        let result = self.bump_max(&mut file);
        let _ = file.unlock();

        let max = result?;
        debug!(target: "testtrace::shard", partition = self.env.partition, max_partition = max, "Registered shard");
        Ok(max)
    }

    fn bump_max(&self, file: &mut File) -> Result<usize> {
        let max = read_counter(file).map_err(|e| self.lock_error(e))?.max(self.env.partition);
        file.seek(SeekFrom::Start(0)).map_err(|e| self.lock_error(e))?;
        file.set_len(0).map_err(|e| self.lock_error(e))?;
        writeln!(file, "{}", max).map_err(|e| self.lock_error(e))?;
        file.flush().map_err(|e| self.lock_error(e))?;
        Ok(max)
    }

    /// Highest partition index registered so far
    pub fn max_partition(&self) -> Result<usize> {
        let mut file = File::open(&self.lock_file).map_err(|e| self.lock_error(e))?;
        file.lock_shared().map_err(|e| self.lock_error(e))?;
        let result = read_counter(&mut file);
        let _ = file.unlock();
        result.map_err(|e| self.lock_error(e))
    }

    /// Whether this process owns the highest partition index
    pub fn is_last_process(&self) -> Result<bool> {
        Ok(self.env.partition == self.max_partition()?)
    }

    /// Signal that this partition finished writing its reports
    pub fn mark_complete(&self) -> Result<()> {
        let marker = self.marker(self.env.partition);
        std::fs::create_dir_all(&self.markers_dir).map_err(|e| TracerError::io(&self.markers_dir, e))?;
        std::fs::write(&marker, format!("{}\n", std::process::id())).map_err(|e| TracerError::io(&marker, e))
    }

    /// Block until every partition is marked complete
    ///
    /// Returns `false` when `timeout` elapses first.
    pub fn wait_for_shards(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        loop {
            let pending: Vec<usize> = self
                .env
                .partitions()
                .filter(|n| !self.marker(*n).is_file())
                .collect();

            if pending.is_empty() {
                info!(target: "testtrace::shard", groups = self.env.groups, "All shards finished");
                return true;
            }
            if started.elapsed() >= timeout {
                warn!(target: "testtrace::shard", pending = ?pending, "Timed out waiting for shards");
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Directories of every partition below `root`
    pub fn shard_dirs(&self, root: &Path) -> Vec<PathBuf> {
        self.env
            .partitions()
            .map(|n| root.join(shard_dir_name(n)))
            .collect()
    }

    /// Remove every partition directory below each root, plus the markers
    pub fn purge(&self, roots: &[&Path]) -> Result<()> {
        for root in roots {
            for dir in self.shard_dirs(root) {
                if dir.exists() {
                    std::fs::remove_dir_all(&dir).map_err(|e| TracerError::io(&dir, e))?;
                }
            }
        }
        for n in self.env.partitions() {
            let marker = self.marker(n);
            if marker.exists() {
                std::fs::remove_file(&marker).map_err(|e| TracerError::io(&marker, e))?;
            }
        }
        debug!(target: "testtrace::shard", groups = self.env.groups, "Purged shard reports");
        Ok(())
    }

    /// Remove the lock file (last process, at exit)
    pub fn release(&self) -> Result<()> {
        match std::fs::remove_file(&self.lock_file) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.lock_error(e)),
        }
    }

    fn marker(&self, partition: usize) -> PathBuf {
        self.markers_dir.join(format!(".{}.done", shard_dir_name(partition)))
    }

    fn lock_error(&self, e: std::io::Error) -> TracerError {
        TracerError::io(&self.lock_file, e)
    }
}

fn read_counter(file: &mut File) -> std::io::Result<usize> {
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents.trim().parse().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_env_both_unset() {
        assert_eq!(ShardEnv::from_vars(None, None).unwrap(), None);
    }

    #[test]
    fn test_env_half_set_is_config_error() {
        let err = ShardEnv::from_vars(Some("2"), None).unwrap_err();
        assert!(matches!(err, TracerError::Config(_)));
        let err = ShardEnv::from_vars(None, Some("4")).unwrap_err();
        assert!(matches!(err, TracerError::Config(_)));
    }

    #[test]
    fn test_env_empty_number_is_first_partition() {
        let env = ShardEnv::from_vars(Some(""), Some("3")).unwrap().unwrap();
        assert_eq!(env.partition, 1);
        assert_eq!(env.dir_name(), "parallel_tests_1");
    }

    #[test]
    fn test_env_rejects_garbage() {
        assert!(ShardEnv::from_vars(Some("x"), Some("3")).is_err());
        assert!(ShardEnv::from_vars(Some("4"), Some("3")).is_err());
        assert!(ShardEnv::from_vars(Some("1"), Some("0")).is_err());
    }

    fn coordinator(dir: &TempDir, partition: usize) -> ShardCoordinator {
        ShardCoordinator::new(
            ShardEnv { partition, groups: 3 },
            dir.path().join("shards.lock"),
            dir.path().join("cache"),
        )
    }

    #[test]
    fn test_last_process_is_max_partition() {
        let dir = TempDir::new().unwrap();
        let first = coordinator(&dir, 1);
        let third = coordinator(&dir, 3);
        let second = coordinator(&dir, 2);

        assert_eq!(first.register().unwrap(), 1);
        assert_eq!(third.register().unwrap(), 3);
        assert_eq!(second.register().unwrap(), 3);

        assert!(third.is_last_process().unwrap());
        assert!(!second.is_last_process().unwrap());
        assert_eq!(std::fs::read_to_string(dir.path().join("shards.lock")).unwrap(), "3\n");
    }

    #[test]
    fn test_wait_for_shards() {
        let dir = TempDir::new().unwrap();
        let shards: Vec<ShardCoordinator> = (1..=3).map(|n| coordinator(&dir, n)).collect();

        shards[0].mark_complete().unwrap();
        shards[2].mark_complete().unwrap();
        assert!(!shards[2].wait_for_shards(Duration::from_millis(0)));

        shards[1].mark_complete().unwrap();
        assert!(shards[2].wait_for_shards(Duration::from_secs(1)));
    }

    #[test]
    fn test_purge_removes_shard_dirs_and_markers() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir, 3);
        let root = dir.path().join("cache");
        for d in c.shard_dirs(&root) {
            std::fs::create_dir_all(d.join("run")).unwrap();
        }
        c.mark_complete().unwrap();

        c.purge(&[root.as_path()]).unwrap();
        assert!(c.shard_dirs(&root).iter().all(|d| !d.exists()));
        assert!(!c.wait_for_shards(Duration::from_millis(0)));

        c.register().unwrap();
        c.release().unwrap();
        assert!(!dir.path().join("shards.lock").exists());
        c.release().unwrap();
    }
}
