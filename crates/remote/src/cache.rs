//! Remote cache transfer
//!
//! Store layout, relative to the configured prefix:
//!
//! ```text
//! <ref>[/<suite>]/last_run.<ext>
//! <ref>[/<suite>]/<run_id>/<artifact>.<ext>
//! branch-refs/<branch>/branch_refs.json
//! ```
//!
//! Downloads never leave a partial run behind: the run directory is
//! fetched first and removed on failure, and the local pointer is only
//! written once every artifact arrived. Callers treat a failed download as
//! "no cache" and a failed upload as an error.

use crate::config::RemoteConfig;
use crate::error::{RemoteCacheError, Result};
use crate::repo::Repo;
use crate::store::ObjectStore;
use crate::validator::CacheValidator;
use crate::vcs::Vcs;
use std::path::Path;
use std::time::Instant;
use testtrace_core::{format_time, LastRun, TracerError};
use testtrace_durability::{write_atomic, Cache, CachePaths, Codec, ReportCodec};
use tracing::{debug, info, warn};

/// Moves a local cache directory to and from an object store
pub struct RemoteCache {
    store: Box<dyn ObjectStore>,
    vcs: Box<dyn Vcs>,
    config: RemoteConfig,
    paths: CachePaths,
    codec: Codec,
}

impl RemoteCache {
    /// Remote cache for the local cache directory `paths`
    pub fn new(
        store: Box<dyn ObjectStore>,
        vcs: Box<dyn Vcs>,
        config: RemoteConfig,
        paths: CachePaths,
        codec: Codec,
    ) -> Self {
        RemoteCache {
            store,
            vcs,
            config,
            paths,
            codec,
        }
    }

    /// Settings in use
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Resolve the refs of the current checkout
    pub fn repo(&self) -> Result<Repo> {
        Repo::resolve(self.vcs.as_ref(), self.store.as_ref(), &self.config)
    }

    /// Fetch the newest complete cache into the local cache directory
    ///
    /// Returns `Ok(None)` when no candidate ref holds a complete upload.
    pub fn download(&self) -> Result<Option<LastRun>> {
        let started = Instant::now();
        let repo = self.repo()?;
        let Some(reference) = self.find_cache_ref(&repo)? else {
            warn!(target: "testtrace::remote", branch = %repo.branch_name, "Could not find a suitable cache ref to download");
            return Ok(None);
        };

        let ref_dir = self.config.ref_dir(&reference);
        let pointer_key = format!("{}/{}", ref_dir, self.pointer_name());
        let pointer_bytes = self.store.get(&pointer_key)?;
        let last_run: LastRun = self
            .codec
            .decode(&pointer_bytes)
            .map_err(TracerError::from)?;

        let run_dir = self.paths.run_dir(&last_run.run_id);
        if let Err(e) = self.download_run(&ref_dir, &last_run.run_id, &run_dir) {
            if let Err(cleanup) = std::fs::remove_dir_all(&run_dir) {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!(target: "testtrace::remote", run_dir = %run_dir.display(), error = %cleanup, "Failed to remove partial download");
                }
            }
            return Err(e);
        }
        write_atomic(&self.paths.last_run(), &pointer_bytes)?;

        info!(
            target: "testtrace::remote",
            reference = %reference,
            run_id = %last_run.run_id,
            cache_dir = %self.paths.root().display(),
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Downloaded remote cache"
        );
        Ok(Some(last_run))
    }

    /// Push the local cache under the branch ref and record the ref
    ///
    /// # Errors
    ///
    /// Fails when there is no local run to upload or any store write
    /// fails.
    pub fn upload(&self) -> Result<LastRun> {
        let started = Instant::now();
        let repo = self.repo()?;

        let last_run = Cache::last_run(&self.paths, &self.codec)?
            .ok_or_else(|| RemoteCacheError::validation("Could not find any local cache to upload"))?;
        let run_dir = self.paths.run_dir(&last_run.run_id);
        if !run_dir.is_dir() {
            return Err(RemoteCacheError::validation(format!(
                "Local run directory {} is missing",
                run_dir.display()
            )));
        }

        let ref_dir = self.config.ref_dir(&repo.branch_ref);
        let run_prefix = format!("{}/{}", ref_dir, last_run.run_id);
        let uploaded = self.upload_dir(&run_dir, &run_prefix)?;

        let pointer = std::fs::read(self.paths.last_run()).map_err(|e| TracerError::io(self.paths.last_run(), e))?;
        self.store
            .put(&format!("{}/{}", ref_dir, self.pointer_name()), &pointer)?;

        self.upload_branch_refs(&repo)?;

        info!(
            target: "testtrace::remote",
            reference = %repo.branch_ref,
            run_id = %last_run.run_id,
            files = uploaded,
            elapsed = %format_time(started.elapsed().as_secs_f64()),
            "Uploaded cache"
        );
        Ok(last_run)
    }

    fn pointer_name(&self) -> String {
        self.paths
            .last_run()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    fn find_cache_ref(&self, repo: &Repo) -> Result<Option<String>> {
        let validator = CacheValidator::new(&self.config, self.paths.extension())?;

        for (reference, _) in &repo.cache_refs {
            debug!(target: "testtrace::remote", reference = %reference, "Validating ref");
            let keys = match self.store.list(&self.config.ref_prefix(reference)) {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(target: "testtrace::remote", reference = %reference, error = %e, "Failed to list ref");
                    continue;
                }
            };
            if validator.is_valid(reference, &keys)? {
                return Ok(Some(reference.clone()));
            }
        }
        Ok(None)
    }

    fn download_run(&self, ref_dir: &str, run_id: &str, run_dir: &Path) -> Result<()> {
        let run_prefix = format!("{}/{}/", ref_dir, run_id);
        let keys = self.store.list(&run_prefix)?;
        if keys.is_empty() {
            return Err(RemoteCacheError::validation(format!("No files under {}", run_prefix)));
        }

        for key in &keys {
            let Some(relative) = key.strip_prefix(&run_prefix).filter(|r| !r.is_empty()) else {
                continue;
            };
            let bytes = self.store.get(key)?;
            write_atomic(&run_dir.join(relative), &bytes)?;
        }
        debug!(target: "testtrace::remote", run_dir = %run_dir.display(), files = keys.len(), "Downloaded run files");
        Ok(())
    }

    fn upload_dir(&self, dir: &Path, prefix: &str) -> Result<usize> {
        let entries = std::fs::read_dir(dir).map_err(|e| TracerError::io(dir, e))?;
        let mut uploaded = 0;

        for entry in entries {
            let path = entry.map_err(|e| TracerError::io(dir, e))?.path();
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            let key = format!("{}/{}", prefix, name);
            if path.is_dir() {
                uploaded += self.upload_dir(&path, &key)?;
            } else {
                let bytes = std::fs::read(&path).map_err(|e| TracerError::io(&path, e))?;
                self.store.put(&key, &bytes)?;
                uploaded += 1;
            }
        }
        Ok(uploaded)
    }

    fn upload_branch_refs(&self, repo: &Repo) -> Result<()> {
        let mut refs = repo.branch_refs.clone();
        let timestamps = self.vcs.commit_timestamps(std::slice::from_ref(&repo.branch_ref))?;
        match timestamps.get(&repo.branch_ref) {
            Some(ts) => {
                refs.insert(repo.branch_ref.clone(), *ts);
            }
            None => {
                warn!(target: "testtrace::remote", reference = %repo.branch_ref, "Failed to find commit timestamp, ref not recorded");
            }
        }

        let key = self.config.branch_refs_key();
        let bytes = serde_json::to_vec_pretty(&refs).map_err(|e| RemoteCacheError::store(&key, e))?;
        self.store.put(&key, &bytes)?;
        debug!(target: "testtrace::remote", branch = %repo.branch_name, refs = refs.len(), "Uploaded branch refs");
        Ok(())
    }
}
