//! Remote cache for testtrace
//!
//! Shares cache directories between CI runs through an object store:
//! - ObjectStore: key/value blob transport, with a filesystem implementation
//! - Vcs: git queries locating candidate refs
//! - Repo: branch ref, ancestry refs and recorded branch refs
//! - CacheValidator: completeness check of an uploaded ref
//! - RemoteCache: download of the newest complete cache, upload of this run
//!
//! Download failures should be logged and the run continued without a
//! cache; upload failures are errors.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod config;
pub mod error;
pub mod repo;
pub mod store;
pub mod validator;
pub mod vcs;

pub use cache::RemoteCache;
pub use config::RemoteConfig;
pub use error::{RemoteCacheError, Result};
pub use repo::{Repo, MAX_REFS};
pub use store::{FsObjectStore, ObjectStore};
pub use validator::{CacheValidator, CACHE_FILES_PER_TEST_SUITE};
pub use vcs::{GitCli, RefTimestamps, Vcs};
