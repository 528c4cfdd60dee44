//! Caller-facing composition of store, matcher and updater.

use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::config::Config;
use crate::engine::{MatchResult, SpamMatcher};
use crate::remote::RemoteSource;
use crate::store::{BlacklistSet, BlacklistStore, ResolutionError};
use crate::updater::{UpdateError, Updater};

/// A spam filter over an on-disk blacklist store, with remote sync.
///
/// Checks run against an immutable in-memory snapshot of the store and are
/// safe from any number of concurrent callers; `update` swaps in a freshly
/// loaded snapshot once the on-disk store has been replaced.
pub struct SpamFilter {
    store: BlacklistStore,
    updater: Updater,
    set: RwLock<Arc<BlacklistSet>>,
}

impl SpamFilter {
    /// Builds a filter with an empty in-memory set. Call [`reload`] to load
    /// the on-disk store, or [`update`] to sync it first.
    ///
    /// [`reload`]: Self::reload
    /// [`update`]: Self::update
    pub fn new(config: &Config, source: Arc<dyn RemoteSource>) -> Self {
        let store = BlacklistStore::from_config(&config.blacklist);
        let updater = Updater::new(store.clone(), source);
        Self {
            store,
            updater,
            set: RwLock::new(Arc::new(BlacklistSet::default())),
        }
    }

    /// Re-resolves the on-disk store and swaps the live set.
    pub fn reload(&self) -> Result<(), ResolutionError> {
        let set = Arc::new(self.store.resolve()?);
        info!(
            lists = set.lists.len(),
            rules = set.rule_count(),
            problems = set.diagnostics.len(),
            "blacklists loaded"
        );
        *self.set.write().unwrap() = set;
        Ok(())
    }

    /// The live in-memory snapshot.
    pub fn set(&self) -> Arc<BlacklistSet> {
        self.set.read().unwrap().clone()
    }

    pub fn check_text(&self, text: &str) -> MatchResult {
        self.set().check(text)
    }

    /// URLs are checked as plain text against the same rule lists.
    pub fn check_url(&self, url: &str) -> MatchResult {
        debug!(%url, "checking url");
        self.set().check(url)
    }

    /// Version marker of the on-disk store, `None` for unversioned stores.
    pub fn current_version(&self) -> Option<String> {
        self.store.version()
    }

    pub async fn is_update_available(&self) -> Result<bool, UpdateError> {
        self.updater.is_update_available().await
    }

    /// Syncs the on-disk store from the remote source and reloads the live
    /// set. Returns the store's version afterwards (unchanged on a no-op).
    pub async fn update(&self, force: bool) -> Result<String, UpdateError> {
        let version = self.updater.update(force).await?;
        self.reload()?;
        Ok(version)
    }
}

impl SpamMatcher for SpamFilter {
    fn check(&self, text: &str) -> MatchResult {
        self.check_text(text)
    }
}
