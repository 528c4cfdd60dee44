//! Blacklist set synchronization.
//!
//! Updates are staged: everything is fetched into a scratch directory next to
//! the store and only renamed into place once every fetch has succeeded, with
//! the version marker installed last. An aborted update leaves the installed
//! store byte-identical to its pre-update state.

use std::path::Path;
use std::sync::Arc;

use futures::{stream, StreamExt};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::engine::{split_lines, strip_line};
use crate::remote::{FetchError, RemoteSource};
use crate::store::{BlacklistStore, ResolutionError, VERSION_FILENAME};

const STAGING_DIRNAME: &str = ".staging";
const CONCURRENT_FETCHES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Index,
    RuleFile,
    Version,
}

impl std::fmt::Display for FetchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index => write!(f, "index"),
            Self::RuleFile => write!(f, "rule file"),
            Self::Version => write!(f, "version"),
        }
    }
}

#[derive(Debug, Error)]
pub enum UpdateError {
    /// The store has no version concept (explicit file-list form) and cannot
    /// be meaningfully updated.
    #[error("blacklist store has no version marker and cannot be updated")]
    Unversioned,
    #[error("update aborted: failed to fetch {stage} `{name}`: {source}")]
    FetchFailed {
        stage: FetchStage,
        name: String,
        #[source]
        source: FetchError,
    },
    #[error("update I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
}

/// Old-vs-new index diff. `wanted` is fetched into staging in index order;
/// `stale` is deleted (best effort) only after a successful install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdatePlan {
    pub wanted: Vec<String>,
    pub stale: Vec<String>,
}

impl UpdatePlan {
    pub fn compute(old: &[String], new: &[String]) -> Self {
        let stale = old
            .iter()
            .filter(|name| !new.contains(name))
            .cloned()
            .collect();
        Self {
            wanted: new.to_vec(),
            stale,
        }
    }
}

/// Sole writer of a store's on-disk representation. Concurrent `update`
/// calls against the same updater serialize on an internal lock.
pub struct Updater {
    store: BlacklistStore,
    source: Arc<dyn RemoteSource>,
    lock: Mutex<()>,
}

impl Updater {
    pub fn new(store: BlacklistStore, source: Arc<dyn RemoteSource>) -> Self {
        Self {
            store,
            source,
            lock: Mutex::new(()),
        }
    }

    /// Compares the local version marker byte-for-byte with the remote one.
    pub async fn is_update_available(&self) -> Result<bool, UpdateError> {
        if self.store.directory().is_none() {
            return Err(UpdateError::Unversioned);
        }
        let remote = self
            .source
            .fetch(VERSION_FILENAME)
            .await
            .map_err(|e| UpdateError::FetchFailed {
                stage: FetchStage::Version,
                name: VERSION_FILENAME.to_string(),
                source: e,
            })?;
        Ok(self.store.version_bytes().as_deref() != Some(remote.as_slice()))
    }

    /// Replaces the local blacklist set with the remote one. Returns the new
    /// version string, or the current one when nothing needed updating.
    pub async fn update(&self, force: bool) -> Result<String, UpdateError> {
        let _guard = self.lock.lock().await;

        let dir = self
            .store
            .directory()
            .ok_or(UpdateError::Unversioned)?
            .to_path_buf();

        if !force && !self.is_update_available().await? {
            let current = self.store.version().unwrap_or_default();
            info!(version = %current, "blacklists already up to date");
            return Ok(current);
        }

        // Snapshot the old index before anything else; used only for
        // post-install cleanup, so a missing index just means nothing stale.
        let old_entries = match self.store.index_entries() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "no readable old index, skipping stale cleanup");
                vec![]
            }
        };

        let staging = dir.join(STAGING_DIRNAME);
        let _ = fs::remove_dir_all(&staging).await;
        fs::create_dir_all(&staging).await?;

        let result = self.stage_all(&staging).await;
        let (plan, version) = match result {
            Ok((new_entries, version)) => {
                let old: Vec<String> = old_entries
                    .iter()
                    .filter_map(|n| sanitize_name(n))
                    .collect();
                (UpdatePlan::compute(&old, &new_entries), version)
            }
            Err(e) => {
                // Installed store untouched; just drop the scratch space.
                let _ = fs::remove_dir_all(&staging).await;
                return Err(e);
            }
        };

        self.install(&staging, &dir, &plan).await?;
        let _ = fs::remove_dir_all(&staging).await;

        info!(
            version = %version,
            lists = plan.wanted.len(),
            removed = plan.stale.len(),
            "blacklists updated"
        );
        Ok(version)
    }

    /// Fetches index, rule files and version marker into the staging
    /// directory. Returns the sanitized new index entries and the new
    /// version string. Any fetch failure aborts the whole update.
    async fn stage_all(&self, staging: &Path) -> Result<(Vec<String>, String), UpdateError> {
        let index_bytes = self
            .source
            .fetch(self.store_index_name())
            .await
            .map_err(|e| UpdateError::FetchFailed {
                stage: FetchStage::Index,
                name: self.store_index_name().to_string(),
                source: e,
            })?;

        let index_text = String::from_utf8_lossy(&index_bytes);
        let mut entries: Vec<String> = Vec::new();
        for raw in split_lines(&index_text).into_iter().map(strip_line) {
            if raw.is_empty() {
                continue;
            }
            match sanitize_name(raw) {
                Some(name)
                    if name != self.store_index_name()
                        && name != VERSION_FILENAME
                        && !entries.contains(&name) =>
                {
                    entries.push(name);
                }
                Some(name) => warn!(entry = raw, %name, "dropping duplicate or reserved index entry"),
                None => warn!(entry = raw, "dropping unusable remote index entry"),
            }
        }

        // The installed index must reference exactly the files installed
        // under their sanitized names, so the sanitized entries are written
        // rather than the raw remote bytes.
        let mut index_out = entries.join("\n");
        index_out.push('\n');
        fs::write(staging.join(self.store_index_name()), index_out).await?;

        let fetches = entries.iter().cloned().map(|name| {
            let source = self.source.clone();
            let staging = staging.to_path_buf();
            async move {
                let bytes =
                    source
                        .fetch(&name)
                        .await
                        .map_err(|e| UpdateError::FetchFailed {
                            stage: FetchStage::RuleFile,
                            name: name.clone(),
                            source: e,
                        })?;
                fs::write(staging.join(&name), &bytes).await?;
                Ok::<(), UpdateError>(())
            }
        });
        let results: Vec<Result<(), UpdateError>> = stream::iter(fetches)
            .buffer_unordered(CONCURRENT_FETCHES)
            .collect()
            .await;
        for result in results {
            result?;
        }

        // Version marker comes last: it is the commit marker for the set.
        let version_bytes = self
            .source
            .fetch(VERSION_FILENAME)
            .await
            .map_err(|e| UpdateError::FetchFailed {
                stage: FetchStage::Version,
                name: VERSION_FILENAME.to_string(),
                source: e,
            })?;
        fs::write(staging.join(VERSION_FILENAME), &version_bytes).await?;

        let version = String::from_utf8_lossy(&version_bytes).trim().to_string();
        Ok((entries, version))
    }

    /// Moves staged files over the live store: rule files first, then the
    /// index, then the version marker. Stale file deletion happens only
    /// after install and never fails the update.
    async fn install(&self, staging: &Path, dir: &Path, plan: &UpdatePlan) -> Result<(), UpdateError> {
        for name in &plan.wanted {
            fs::rename(staging.join(name), dir.join(name)).await?;
        }
        fs::rename(
            staging.join(self.store_index_name()),
            dir.join(self.store_index_name()),
        )
        .await?;
        fs::rename(staging.join(VERSION_FILENAME), dir.join(VERSION_FILENAME)).await?;

        for name in &plan.stale {
            if name == self.store_index_name() || name == VERSION_FILENAME {
                continue;
            }
            if let Err(e) = fs::remove_file(dir.join(name)).await {
                warn!(file = %name, error = %e, "failed to remove stale rule file");
            }
        }
        Ok(())
    }

    fn store_index_name(&self) -> &str {
        self.store.index_filename()
    }
}

/// Reduces a remote index entry to a plain base name so a malicious or
/// corrupted index can never write outside the store directory.
pub fn sanitize_name(name: &str) -> Option<String> {
    let base = Path::new(name).file_name()?.to_str()?;
    if base.is_empty() || base == "." || base == ".." || base == STAGING_DIRNAME {
        return None;
    }
    Some(base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_traversal() {
        assert_eq!(
            sanitize_name("../../etc/passwd"),
            Some("passwd".to_string())
        );
        assert_eq!(
            sanitize_name("/abs/path/rules.txt"),
            Some("rules.txt".to_string())
        );
        assert_eq!(sanitize_name("plain.txt"), Some("plain.txt".to_string()));
    }

    #[test]
    fn sanitize_rejects_unusable_names() {
        assert_eq!(sanitize_name(""), None);
        assert_eq!(sanitize_name(".."), None);
        assert_eq!(sanitize_name("a/.."), None);
        assert_eq!(sanitize_name(STAGING_DIRNAME), None);
    }

    #[test]
    fn plan_diffs_old_against_new() {
        let old = vec!["a.txt".to_string(), "b.txt".to_string()];
        let new = vec!["b.txt".to_string(), "c.txt".to_string()];
        let plan = UpdatePlan::compute(&old, &new);
        assert_eq!(plan.wanted, vec!["b.txt", "c.txt"]);
        assert_eq!(plan.stale, vec!["a.txt"]);
    }

    #[test]
    fn plan_with_identical_indexes_has_no_stale() {
        let names = vec!["a.txt".to_string()];
        let plan = UpdatePlan::compute(&names, &names);
        assert!(plan.stale.is_empty());
    }

    #[test]
    fn fetch_stage_display() {
        assert_eq!(FetchStage::Index.to_string(), "index");
        assert_eq!(FetchStage::RuleFile.to_string(), "rule file");
        assert_eq!(FetchStage::Version.to_string(), "version");
    }
}
