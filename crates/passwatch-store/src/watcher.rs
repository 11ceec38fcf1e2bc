use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

use notify::{
    event::ModifyKind, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::{index::CredentialIndex, StoreError};

/// Default capacity of the queue between the OS watcher and the index writer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Tunables for the filesystem watcher.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatcherSettings {
    /// Events buffered before new ones are dropped.
    pub queue_capacity: usize,
    /// Status messages buffered per index subscriber.
    pub broadcast_capacity: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            broadcast_capacity: crate::index::DEFAULT_BROADCAST_CAPACITY,
        }
    }
}

/// What the index writer does with one filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchAction {
    /// Index the subtree at each event path.
    IndexTree,
    /// Remove each event path from the index.
    Remove,
    /// Walk the whole store again.
    Rebuild,
    /// Content or metadata change; names are unaffected.
    Ignore,
}

/// Map an event kind onto an index mutation.
///
/// Renames carry no reliable old/new pairing across platforms, so they force a
/// full rebuild, as do events the backend could not classify.
pub fn classify(kind: &EventKind) -> WatchAction {
    match kind {
        EventKind::Create(_) => WatchAction::IndexTree,
        EventKind::Remove(_) => WatchAction::Remove,
        EventKind::Modify(ModifyKind::Name(_)) => WatchAction::Rebuild,
        EventKind::Modify(_) | EventKind::Access(_) => WatchAction::Ignore,
        EventKind::Any | EventKind::Other => WatchAction::Rebuild,
    }
}

/// Apply one event to the index and report what was done.
pub fn apply(index: &CredentialIndex, event: &Event) -> WatchAction {
    let action = classify(&event.kind);
    match action {
        WatchAction::IndexTree => {
            for path in &event.paths {
                index.add_tree(path);
            }
        }
        WatchAction::Remove => {
            for path in &event.paths {
                index.remove(path);
            }
        }
        WatchAction::Rebuild => {
            index.rebuild_all();
        }
        WatchAction::Ignore => {}
    }
    action
}

/// Keeps a recursive watch on the store root and feeds events into the index.
///
/// The OS callback only enqueues; a single writer thread drains the queue and
/// mutates the index. When the queue is full the newest event is dropped and a
/// resync flag is raised, which makes the writer rebuild the whole index once
/// it catches up. Dropping the watcher stops the OS watch, which closes the
/// queue and ends the writer thread.
pub struct StoreWatcher {
    watcher: Option<RecommendedWatcher>,
    writer: Option<JoinHandle<()>>,
}

impl StoreWatcher {
    pub fn spawn(index: Arc<CredentialIndex>, queue_capacity: usize) -> Result<Self, StoreError> {
        let root = index.root().to_path_buf();
        let watch_err = |err: notify::Error| StoreError::Watch {
            root: root.display().to_string(),
            reason: err.to_string(),
        };

        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let overflowed = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&overflowed);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match tx.try_send(res) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    if !flag.swap(true, Ordering::SeqCst) {
                        warn!("watch queue full, dropping events until the next full rebuild");
                    }
                }
                Err(TrySendError::Closed(_)) => {}
            }
        })
        .map_err(watch_err)?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(watch_err)?;

        let writer = thread::Builder::new()
            .name("passwatch-index-writer".to_string())
            .spawn(move || drain(&index, rx, &overflowed))
            .map_err(|err| StoreError::Watch {
                root: root.display().to_string(),
                reason: format!("spawning index writer: {err}"),
            })?;

        info!(root = %root.display(), queue_capacity, "watching credential store");
        Ok(Self {
            watcher: Some(watcher),
            writer: Some(writer),
        })
    }
}

impl Drop for StoreWatcher {
    fn drop(&mut self) {
        // Dropping the OS watcher drops the queue sender; the writer then exits.
        self.watcher.take();
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("index writer thread panicked");
            }
        }
    }
}

/// Single-writer loop: apply queued events until every sender is gone.
fn drain(
    index: &CredentialIndex,
    mut rx: mpsc::Receiver<notify::Result<Event>>,
    overflowed: &AtomicBool,
) {
    while let Some(res) = rx.blocking_recv() {
        match res {
            Ok(event) => {
                let action = apply(index, &event);
                debug!(?action, paths = ?event.paths, "applied watch event");
            }
            Err(err) => warn!(%err, "filesystem watch error"),
        }

        if overflowed.swap(false, Ordering::SeqCst) {
            info!("resyncing index after dropped watch events");
            index.rebuild_all();
        }
    }
    debug!("index writer stopped");
}
