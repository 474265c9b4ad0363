//! Integration tests for the remote cache
//!
//! Tests for:
//! - Upload followed by download on another checkout
//! - Ref selection through ancestry and recorded branch refs
//! - Merge commit handling
//! - Validation of incomplete uploads and suites
//! - Cleanup of partial downloads

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tempfile::TempDir;
use testtrace_core::{Example, ExampleDescriptor, SourceResolver};
use testtrace_durability::{get_codec, Cache, CachePaths, Codec, ReportWriter, RunReports};
use testtrace_remote::{
    FsObjectStore, ObjectStore, RefTimestamps, RemoteCache, RemoteCacheError, RemoteConfig, Result, Vcs,
};

// ============================================================================
// Harness
// ============================================================================

#[derive(Debug, Clone, Default)]
struct FakeVcs {
    revs: BTreeMap<String, String>,
    lists: BTreeMap<String, Vec<String>>,
    timestamps: RefTimestamps,
}

impl FakeVcs {
    /// Linear history, newest first; HEAD is the first commit
    fn linear(history: &[(&str, i64)]) -> Self {
        let mut vcs = FakeVcs::default();
        let head = history[0].0.to_string();
        vcs.revs.insert("HEAD".to_string(), head.clone());
        vcs.lists
            .insert(head, history.iter().map(|(r, _)| r.to_string()).collect());
        vcs.timestamps = history.iter().map(|(r, t)| (r.to_string(), *t)).collect();
        vcs
    }
}

impl Vcs for FakeVcs {
    fn rev_parse(&self, rev: &str) -> Result<Option<String>> {
        Ok(self.revs.get(rev).cloned())
    }

    fn rev_list(&self, range: &str, max_count: Option<usize>) -> Result<Vec<String>> {
        let mut refs = self.lists.get(range).cloned().unwrap_or_default();
        if let Some(max) = max_count {
            refs.truncate(max);
        }
        Ok(refs)
    }

    fn commit_timestamps(&self, refs: &[String]) -> Result<RefTimestamps> {
        Ok(refs
            .iter()
            .filter_map(|r| self.timestamps.get(r).map(|t| (r.clone(), *t)))
            .collect())
    }
}

/// Store whose reads fail for keys ending with `fail_suffix`
struct FlakyStore {
    inner: FsObjectStore,
    fail_suffix: &'static str,
}

impl ObjectStore for FlakyStore {
    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        if key.ends_with(self.fail_suffix) {
            return Err(RemoteCacheError::store(key, "connection reset"));
        }
        self.inner.get(key)
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.inner.put(key, bytes)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix)
    }
}

struct Workspace {
    _dir: TempDir,
    store_dir: std::path::PathBuf,
    codec: Codec,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store_dir = dir.path().join("store");
        std::fs::create_dir_all(&store_dir).unwrap();
        Workspace {
            _dir: dir,
            store_dir,
            codec: get_codec("json").unwrap(),
        }
    }

    fn store(&self) -> FsObjectStore {
        FsObjectStore::new(&self.store_dir)
    }

    fn local(&self, name: &str) -> CachePaths {
        CachePaths::new(self.store_dir.parent().unwrap().join(name), "json")
    }

    fn remote(&self, vcs: FakeVcs, config: RemoteConfig, paths: CachePaths) -> RemoteCache {
        RemoteCache::new(Box::new(self.store()), Box::new(vcs), config, paths, self.codec)
    }

    /// Write a finished run into a local cache directory
    fn seed(&self, paths: &CachePaths) -> RunReports {
        let resolver = SourceResolver::new("/app");
        let mut reports = RunReports {
            pid: 11,
            ..Default::default()
        };
        for line in [3, 9] {
            let d = ExampleDescriptor::new("Calc", format!("adds {}", line), "/app/spec/calc_spec.rb", line);
            let example = Example::from_descriptor(&d, &resolver);
            reports.dependency.insert(
                example.example_id.clone(),
                ["/lib/calc.rb".to_string()].into_iter().collect::<BTreeSet<_>>(),
            );
            reports.all_examples.insert(example.example_id.clone(), example);
        }
        reports.counts.example_count = 2;
        reports.rebuild_reverse_dependency();
        ReportWriter::new(paths.clone(), self.codec).write(&reports).unwrap();
        reports
    }
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_upload_then_download_on_descendant() {
    let ws = Workspace::new();
    let uploader = ws.local("uploader");
    let reports = ws.seed(&uploader);

    let last_run = ws
        .remote(FakeVcs::linear(&[("c2", 200), ("c1", 100)]), RemoteConfig::new("main"), uploader)
        .upload()
        .unwrap();
    assert_eq!(last_run.run_id, reports.run_id());
    assert_eq!(ws.store().list("c2/").unwrap().len(), 12);

    let branch_refs: RefTimestamps =
        serde_json::from_slice(&ws.store().get("branch-refs/main/branch_refs.json").unwrap()).unwrap();
    assert_eq!(branch_refs.get("c2"), Some(&200));

    let downloader = ws.local("downloader");
    let fetched = ws
        .remote(
            FakeVcs::linear(&[("c3", 300), ("c2", 200), ("c1", 100)]),
            RemoteConfig::new("main"),
            downloader.clone(),
        )
        .download()
        .unwrap()
        .expect("c2 holds a complete upload");
    assert_eq!(fetched.run_id, reports.run_id());

    let cache = Cache::load(&downloader, &ws.codec).unwrap();
    assert_eq!(cache.run_id, Some(reports.run_id()));
    assert_eq!(cache.all_examples, reports.all_examples);
    assert_eq!(cache.dependency, reports.dependency);
}

#[test]
fn test_download_without_uploads_is_none() {
    let ws = Workspace::new();
    let local = ws.local("local");

    let fetched = ws
        .remote(FakeVcs::linear(&[("c1", 100)]), RemoteConfig::new("main"), local.clone())
        .download()
        .unwrap();
    assert!(fetched.is_none());
    assert!(!local.exists());
}

#[test]
fn test_incomplete_upload_falls_back_to_older_ref() {
    let ws = Workspace::new();
    let uploader = ws.local("uploader");
    let reports = ws.seed(&uploader);

    ws.remote(FakeVcs::linear(&[("c1", 100)]), RemoteConfig::new("main"), uploader.clone())
        .upload()
        .unwrap();
    ws.remote(FakeVcs::linear(&[("c2", 200), ("c1", 100)]), RemoteConfig::new("main"), uploader)
        .upload()
        .unwrap();

    let artifact = ws
        .store_dir
        .join("c2")
        .join(reports.run_id())
        .join("dependency.json");
    std::fs::remove_file(artifact).unwrap();

    let cache = ws.remote(
        FakeVcs::linear(&[("c3", 300), ("c2", 200), ("c1", 100)]),
        RemoteConfig::new("main"),
        ws.local("downloader"),
    );
    let repo = cache.repo().unwrap();
    assert_eq!(repo.cache_refs[0].0, "c3");
    assert!(cache.download().unwrap().is_some());

    // c1 is the only complete candidate left
    std::fs::remove_dir_all(ws.store_dir.join("c1")).unwrap();
    let again = ws.remote(
        FakeVcs::linear(&[("c3", 300), ("c2", 200), ("c1", 100)]),
        RemoteConfig::new("main"),
        ws.local("second"),
    );
    assert!(again.download().unwrap().is_none());
}

#[test]
fn test_branch_refs_find_rebased_upload() {
    let ws = Workspace::new();
    let uploader = ws.local("uploader");
    let reports = ws.seed(&uploader);

    ws.remote(FakeVcs::linear(&[("c2", 200), ("c1", 100)]), RemoteConfig::new("feature"), uploader)
        .upload()
        .unwrap();

    // After a rebase c2 is no longer an ancestor of HEAD
    let rebased = FakeVcs::linear(&[("r3", 300), ("r1", 100)]);
    let cache = ws.remote(rebased, RemoteConfig::new("feature"), ws.local("downloader"));

    let repo = cache.repo().unwrap();
    assert_eq!(repo.branch_refs.get("c2"), Some(&200));
    let order: Vec<&str> = repo.cache_refs.iter().map(|(r, _)| r.as_str()).collect();
    assert_eq!(order, vec!["r3", "c2", "r1"]);

    let fetched = cache.download().unwrap().unwrap();
    assert_eq!(fetched.run_id, reports.run_id());

    // Another branch does not see those refs
    let other = ws.remote(
        FakeVcs::linear(&[("r3", 300), ("r1", 100)]),
        RemoteConfig::new("main"),
        ws.local("other"),
    );
    assert!(other.download().unwrap().is_none());
}

#[test]
fn test_merge_into_origin_uses_second_parent() {
    let ws = Workspace::new();
    let mut vcs = FakeVcs::default();
    for (rev, sha) in [("HEAD", "m"), ("HEAD^1", "o"), ("HEAD^2", "f"), ("origin/HEAD", "o")] {
        vcs.revs.insert(rev.to_string(), sha.to_string());
    }
    vcs.lists
        .insert("f..origin/HEAD".to_string(), vec!["o".to_string()]);
    vcs.lists
        .insert("f".to_string(), vec!["f".to_string(), "base".to_string()]);
    vcs.timestamps = [("m", 400), ("o", 300), ("f", 200), ("base", 100)]
        .iter()
        .map(|(r, t)| (r.to_string(), *t))
        .collect();

    let repo = ws
        .remote(vcs.clone(), RemoteConfig::new("feature"), ws.local("local"))
        .repo()
        .unwrap();
    assert_eq!(repo.branch_ref, "f");
    assert_eq!(repo.ancestry_refs.keys().collect::<Vec<_>>(), vec!["base", "f"]);

    // A merge into something other than origin/HEAD keeps HEAD
    vcs.revs.insert("origin/HEAD".to_string(), "elsewhere".to_string());
    vcs.lists
        .insert("m".to_string(), vec!["m".to_string(), "o".to_string(), "f".to_string()]);
    let repo = ws
        .remote(vcs, RemoteConfig::new("feature"), ws.local("local"))
        .repo()
        .unwrap();
    assert_eq!(repo.branch_ref, "m");
    assert_eq!(repo.ancestry_refs.len(), 3);
}

#[test]
fn test_every_suite_must_upload() {
    let ws = Workspace::new();
    let history = [("c2", 200), ("c1", 100)];
    let suite = |id: &str| RemoteConfig::new("main").with_suite(id, 2);

    let first = ws.local("suite1");
    ws.seed(&first);
    ws.remote(FakeVcs::linear(&history), suite("1"), first).upload().unwrap();

    let fetched = ws
        .remote(FakeVcs::linear(&history), suite("1"), ws.local("down1"))
        .download()
        .unwrap();
    assert!(fetched.is_none());

    let relaxed = suite("1").with_test_suite_id_cache(true);
    assert!(ws
        .remote(FakeVcs::linear(&history), relaxed, ws.local("relaxed"))
        .download()
        .unwrap()
        .is_some());

    let second = ws.local("suite2");
    ws.seed(&second);
    ws.remote(FakeVcs::linear(&history), suite("2"), second).upload().unwrap();

    assert!(ws
        .remote(FakeVcs::linear(&history), suite("1"), ws.local("down2"))
        .download()
        .unwrap()
        .is_some());
}

#[test]
fn test_upload_without_local_cache_fails() {
    let ws = Workspace::new();
    let err = ws
        .remote(FakeVcs::linear(&[("c1", 100)]), RemoteConfig::new("main"), ws.local("empty"))
        .upload()
        .unwrap_err();
    assert!(matches!(err, RemoteCacheError::Validation(_)));
}

#[test]
fn test_failed_download_removes_partial_run() {
    let ws = Workspace::new();
    let uploader = ws.local("uploader");
    let reports = ws.seed(&uploader);
    ws.remote(FakeVcs::linear(&[("c1", 100)]), RemoteConfig::new("main"), uploader)
        .upload()
        .unwrap();

    let local = ws.local("downloader");
    let cache = RemoteCache::new(
        Box::new(FlakyStore {
            inner: ws.store(),
            fail_suffix: "reverse_dependency.json",
        }),
        Box::new(FakeVcs::linear(&[("c1", 100)])),
        RemoteConfig::new("main"),
        local.clone(),
        ws.codec,
    );

    let err = cache.download().unwrap_err();
    assert!(matches!(err, RemoteCacheError::Store { .. }));
    assert!(!local.run_dir(&reports.run_id()).exists());
    assert!(!local.exists());
    assert_eq!(files_in(local.root()), 0);
}
