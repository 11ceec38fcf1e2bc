//! Live index over an on-disk password store.
//! Walks the store once, then keeps the index current from filesystem events.

pub mod discovery;
pub mod index;
pub mod watcher;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use passwatch_core::entry::{CredentialEntry, IndexSettings};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::instrument;

use crate::{
    index::CredentialIndex,
    watcher::{StoreWatcher, WatcherSettings},
};

/// Errors produced while locating, reading or watching a store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// None of the candidate roots exist.
    #[error("couldn't find a valid password store (tried: {tried})")]
    NotFound { tried: String },
    /// The recursive filesystem watch could not be set up.
    #[error("failed to watch {root}: {reason}")]
    Watch { root: String, reason: String },
    /// Reading a credential file failed.
    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },
}

/// Index and watcher settings for a store.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct StoreSettings {
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub watcher: WatcherSettings,
}

/// A password store root with its live credential index.
pub struct PasswordStore {
    index: Arc<CredentialIndex>,
    settings: StoreSettings,
    watcher: Option<StoreWatcher>,
}

impl PasswordStore {
    /// Index the store at `root`. Does not start watching.
    pub fn open(root: impl Into<PathBuf>, settings: StoreSettings) -> Self {
        let index = Arc::new(CredentialIndex::new(
            root,
            settings.index.clone(),
            settings.watcher.broadcast_capacity,
        ));
        index.rebuild_all();
        Self {
            index,
            settings,
            watcher: None,
        }
    }

    /// Locate the store root (see [`discovery::find_store_root`]) and index it.
    pub fn discover(config_override: Option<&Path>, settings: StoreSettings) -> Result<Self, StoreError> {
        let root = discovery::find_store_root(config_override)?;
        Ok(Self::open(root, settings))
    }

    /// Start keeping the index current from filesystem events.
    pub fn watch(&mut self) -> Result<(), StoreError> {
        if self.watcher.is_none() {
            self.watcher = Some(StoreWatcher::spawn(
                Arc::clone(&self.index),
                self.settings.watcher.queue_capacity,
            )?);
        }
        Ok(())
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn root(&self) -> &Path {
        self.index.root()
    }

    pub fn index(&self) -> &Arc<CredentialIndex> {
        &self.index
    }

    pub fn query(&self, query: &str) -> Vec<CredentialEntry> {
        self.index.query(query)
    }

    pub fn find(&self, display_name: &str) -> Option<CredentialEntry> {
        self.index.find(display_name)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.index.subscribe()
    }

    /// The encrypted file, base64 encoded, for export without decrypting.
    #[instrument(skip_all, fields(name = %entry.display_name))]
    pub fn raw_base64(&self, entry: &CredentialEntry) -> Result<String, StoreError> {
        let bytes = fs::read(&entry.path).map_err(|err| StoreError::Io {
            path: entry.path.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(STANDARD.encode(bytes))
    }
}
