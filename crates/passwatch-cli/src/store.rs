use color_eyre::{eyre::eyre, Result};
use passwatch_core::entry::CredentialEntry;
use passwatch_store::PasswordStore;
use tracing::debug;

use crate::config::Config;

/// Locate and index the password store named by the environment or config.
pub fn open(config: &Config) -> Result<PasswordStore> {
    let store = PasswordStore::discover(config.store_dir.as_deref(), config.store_settings())?;
    debug!(root = %store.root().display(), entries = store.index().len(), "password store opened");
    Ok(store)
}

/// Find an entry by its exact display name.
pub fn lookup(store: &PasswordStore, name: &str) -> Result<CredentialEntry> {
    store
        .find(name)
        .ok_or_else(|| eyre!("no entry named {name:?} in {}", store.root().display()))
}
