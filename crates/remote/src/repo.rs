//! Cache ref resolution
//!
//! The cache of a run is uploaded under the commit it ran on (the branch
//! ref). To download, candidate refs are collected from two sources and
//! tried newest first:
//!
//! - **Ancestry refs**: up to 25 commits reachable from the branch ref.
//! - **Branch refs**: refs previously uploaded for the same branch,
//!   recorded in the store's `branch_refs.json`. This finds caches of
//!   rebased or amended commits that are no longer in the ancestry.
//!
//! When HEAD is a merge commit whose first parent is `origin/HEAD` (the
//! usual CI checkout of a pull request), the branch ref is the second
//! parent and commits that only exist on `origin/HEAD` are ignored.

use crate::config::RemoteConfig;
use crate::error::{RemoteCacheError, Result};
use crate::store::ObjectStore;
use crate::vcs::{RefTimestamps, Vcs};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Maximum number of ancestry refs and branch refs considered
pub const MAX_REFS: usize = 25;

/// Resolved refs of the current checkout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    /// Branch being built
    pub branch_name: String,
    /// Commit the cache of this run is uploaded under
    pub branch_ref: String,
    /// Ancestry refs with committer timestamps
    pub ancestry_refs: RefTimestamps,
    /// Previously uploaded refs of this branch, filtered
    pub branch_refs: RefTimestamps,
    /// Download candidates, newest first
    pub cache_refs: Vec<(String, i64)>,
}

impl Repo {
    /// Resolve refs from the working copy and the store
    ///
    /// # Errors
    ///
    /// Fails when git cannot resolve HEAD, the parents of a merge commit or
    /// the ancestry. A missing or unreadable branch refs object is not an
    /// error.
    pub fn resolve(vcs: &dyn Vcs, store: &dyn ObjectStore, config: &RemoteConfig) -> Result<Self> {
        let head_ref = vcs
            .rev_parse("HEAD")?
            .ok_or_else(|| RemoteCacheError::vcs("Could not find HEAD commit sha"))?;
        let (branch_ref, ignored_refs) = branch_ref(vcs, head_ref)?;

        let ancestry: Vec<String> = vcs
            .rev_list(&branch_ref, Some(MAX_REFS))?
            .into_iter()
            .filter(|r| !ignored_refs.contains(r))
            .collect();
        let ancestry_refs = vcs.commit_timestamps(&ancestry)?;
        log_refs(&config.branch_name, "ancestry", ancestry_refs.iter().map(|(r, t)| (r, *t)));

        let fetched = fetch_branch_refs(store, config);
        let branch_refs = filter_branch_refs(fetched, &ancestry_refs);
        log_refs(&config.branch_name, "branch", branch_refs.iter().map(|(r, t)| (r, *t)));

        let cache_refs = order_cache_refs(&ancestry_refs, &branch_refs);
        log_refs(&config.branch_name, "cache", cache_refs.iter().map(|(r, t)| (r, *t)));

        Ok(Repo {
            branch_name: config.branch_name.clone(),
            branch_ref,
            ancestry_refs,
            branch_refs,
            cache_refs,
        })
    }
}

fn branch_ref(vcs: &dyn Vcs, head_ref: String) -> Result<(String, BTreeSet<String>)> {
    if vcs.rev_parse("HEAD^2")?.is_none() {
        return Ok((head_ref, BTreeSet::new()));
    }

    let (Some(first_parent), Some(second_parent)) = (vcs.rev_parse("HEAD^1")?, vcs.rev_parse("HEAD^2")?) else {
        return Err(RemoteCacheError::vcs("Could not find merged commit parents"));
    };

    if vcs.rev_parse("origin/HEAD")?.as_deref() != Some(first_parent.as_str()) {
        return Ok((head_ref, BTreeSet::new()));
    }

    let mut ignored: BTreeSet<String> = vcs
        .rev_list(&format!("{}..origin/HEAD", second_parent), None)?
        .into_iter()
        .collect();
    ignored.insert(head_ref);

    debug!(
        target: "testtrace::remote",
        branch_ref = %second_parent,
        ignored = ignored.len(),
        "HEAD is a merge into origin/HEAD, using its second parent"
    );
    Ok((second_parent, ignored))
}

fn fetch_branch_refs(store: &dyn ObjectStore, config: &RemoteConfig) -> RefTimestamps {
    let key = config.branch_refs_key();
    match store.exists(&key) {
        Ok(true) => {}
        Ok(false) => {
            info!(target: "testtrace::remote", branch = %config.branch_name, "No branch refs found in the store");
            return RefTimestamps::new();
        }
        Err(e) => {
            warn!(target: "testtrace::remote", branch = %config.branch_name, error = %e, "Failed to look up branch refs");
            return RefTimestamps::new();
        }
    }

    let parsed = store.get(&key).and_then(|bytes| {
        serde_json::from_slice::<RefTimestamps>(&bytes).map_err(|e| RemoteCacheError::store(&key, e))
    });
    match parsed {
        Ok(refs) => refs,
        Err(e) => {
            warn!(target: "testtrace::remote", branch = %config.branch_name, error = %e, "Failed to fetch branch refs");
            RefTimestamps::new()
        }
    }
}

/// Keep branch refs no older than the oldest ancestry ref, newest 25
///
/// Without ancestry the newest 25 are kept.
pub fn filter_branch_refs(branch_refs: RefTimestamps, ancestry_refs: &RefTimestamps) -> RefTimestamps {
    let oldest = ancestry_refs.values().min().copied();

    let mut refs: Vec<(String, i64)> = branch_refs
        .into_iter()
        .filter(|(_, ts)| oldest.map_or(true, |oldest| *ts >= oldest))
        .collect();
    sort_newest_first(&mut refs);
    refs.truncate(MAX_REFS);
    refs.into_iter().collect()
}

/// Union of ancestry and branch refs, newest first
///
/// A ref present in both keeps the branch refs timestamp.
pub fn order_cache_refs(ancestry_refs: &RefTimestamps, branch_refs: &RefTimestamps) -> Vec<(String, i64)> {
    let mut merged = ancestry_refs.clone();
    merged.extend(branch_refs.iter().map(|(r, t)| (r.clone(), *t)));

    let mut refs: Vec<(String, i64)> = merged.into_iter().collect();
    sort_newest_first(&mut refs);
    refs
}

fn sort_newest_first(refs: &mut [(String, i64)]) {
    refs.sort_by(|(ra, ta), (rb, tb)| tb.cmp(ta).then_with(|| ra.cmp(rb)));
}

fn log_refs<'a>(branch: &str, kind: &str, refs: impl Iterator<Item = (&'a String, i64)>) {
    for (reference, timestamp) in refs {
        debug!(target: "testtrace::remote", branch, kind, reference = %reference, timestamp, "Candidate ref");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(pairs: &[(&str, i64)]) -> RefTimestamps {
        pairs.iter().map(|(r, t)| (r.to_string(), *t)).collect()
    }

    #[test]
    fn test_filter_keeps_refs_newer_than_oldest_ancestry() {
        let ancestry = refs(&[("a", 100), ("b", 200)]);
        let branch = refs(&[("old", 50), ("same", 100), ("new", 300)]);

        let filtered = filter_branch_refs(branch, &ancestry);
        assert_eq!(filtered, refs(&[("same", 100), ("new", 300)]));
    }

    #[test]
    fn test_filter_without_ancestry_keeps_newest() {
        let branch: RefTimestamps = (0..40).map(|i| (format!("r{:02}", i), i as i64)).collect();
        let filtered = filter_branch_refs(branch, &RefTimestamps::new());

        assert_eq!(filtered.len(), MAX_REFS);
        assert!(filtered.contains_key("r39"));
        assert!(!filtered.contains_key("r14"));
        assert!(filtered.contains_key("r15"));
    }

    #[test]
    fn test_order_cache_refs_newest_first() {
        let ancestry = refs(&[("a", 100), ("b", 300)]);
        let branch = refs(&[("c", 200), ("a", 150)]);

        let ordered = order_cache_refs(&ancestry, &branch);
        assert_eq!(
            ordered,
            vec![("b".to_string(), 300), ("c".to_string(), 200), ("a".to_string(), 150)]
        );
    }
}
