use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use passwatch_core::{
    entry::{display_name, CredentialEntry, IndexSettings},
    search,
};
use tokio::{
    sync::broadcast::{self, error::RecvError},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Default number of status messages buffered per subscriber.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 32;

/// In-memory index of every credential file below a store root.
///
/// Reads take a short shared lock and copy results out. Full rebuilds walk the
/// tree without holding the lock and swap the new map in at the end, so a
/// reader never sees a half-built index.
pub struct CredentialIndex {
    root: PathBuf,
    settings: IndexSettings,
    entries: RwLock<HashMap<PathBuf, String>>,
    updates: broadcast::Sender<String>,
}

impl CredentialIndex {
    /// Create an empty index. Call [`CredentialIndex::rebuild_all`] to populate it.
    pub fn new(root: impl Into<PathBuf>, settings: IndexSettings, broadcast_capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(broadcast_capacity.max(1));
        Self {
            root: root.into(),
            settings,
            entries: RwLock::new(HashMap::new()),
            updates,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Replace the index with a fresh walk of the store root.
    pub fn rebuild_all(&self) -> usize {
        let fresh = self.walk(&self.root);
        let count = fresh.len();
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = fresh;

        info!(root = %self.root.display(), count, "rebuilt credential index");
        self.publish(format!("Indexed {count} entries"));
        count
    }

    /// Index a single path, overwriting any existing display name.
    pub fn add(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let name = display_name(&self.root, &path, &self.settings);
        debug!(name = %name, "indexed entry");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path, name);
        self.publish("Entry added".to_string());
    }

    /// Index every credential file in the subtree rooted at `path`.
    ///
    /// A file is its own subtree; a path that no longer exists adds nothing.
    pub fn add_tree(&self, path: &Path) -> usize {
        let found = self.walk(path);
        let count = found.len();
        if count > 0 {
            self.entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .extend(found);
        }
        debug!(path = %path.display(), count, "indexed subtree");
        self.publish("Index updated".to_string());
        count
    }

    /// Drop the entry for exactly `path`. Absent paths are ignored.
    pub fn remove(&self, path: &Path) -> bool {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some();
        if removed {
            debug!(path = %path.display(), "removed entry");
        }
        self.publish("Entry removed".to_string());
        removed
    }

    /// Entries whose display name matches `query`, sorted by path.
    pub fn query(&self, query: &str) -> Vec<CredentialEntry> {
        let mut hits: Vec<CredentialEntry> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .iter()
                .filter(|(_, name)| search::matches(query, name))
                .map(|(path, name)| CredentialEntry {
                    path: path.clone(),
                    display_name: name.clone(),
                })
                .collect()
        };
        hits.sort_by(|a, b| a.path.as_os_str().cmp(b.path.as_os_str()));
        hits
    }

    /// The entry shown as `display_name`, first in path order if names collide.
    pub fn find(&self, display_name: &str) -> Option<CredentialEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|(_, name)| name.as_str() == display_name)
            .min_by(|(a, _), (b, _)| a.as_os_str().cmp(b.as_os_str()))
            .map(|(path, name)| CredentialEntry {
                path: path.clone(),
                display_name: name.clone(),
            })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receive a status string for every mutation made after this call.
    ///
    /// Receivers that fall behind skip the oldest messages instead of slowing
    /// the writer down.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.updates.subscribe()
    }

    /// Invoke `callback` with every status string on a background task.
    ///
    /// Must be called from within a tokio runtime. The task ends when the index
    /// is dropped.
    pub fn on_change<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: Fn(&str) + Send + 'static,
    {
        let mut updates = self.subscribe();
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(status) => callback(&status),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "index subscriber fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn publish(&self, status: String) {
        // No subscribers is fine.
        let _ = self.updates.send(status);
    }

    fn walk(&self, start: &Path) -> HashMap<PathBuf, String> {
        WalkDir::new(start)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!(%err, "skipping unreadable path during walk");
                    None
                }
            })
            .filter(|entry| !entry.file_type().is_dir() && self.settings.is_credential(entry.path()))
            .map(|entry| {
                let path = entry.into_path();
                let name = display_name(&self.root, &path, &self.settings);
                (path, name)
            })
            .collect()
    }
}
