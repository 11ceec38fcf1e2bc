use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use serde::{Deserialize, Serialize};

/// Extension carried by every encrypted credential file.
pub const DEFAULT_SUFFIX: &str = ".gpg";

/// Display names longer than this many characters are shortened.
pub const DEFAULT_MAX_NAME_LEN: usize = 40;

const ELLIPSIS: &str = "...";

/// Rules used to turn an on-disk path into an index entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexSettings {
    /// File name suffix identifying encrypted credentials.
    pub suffix: String,
    /// Maximum display name length (in characters) before truncation.
    pub max_name_len: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            suffix: DEFAULT_SUFFIX.to_string(),
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl IndexSettings {
    /// Whether a file name marks an encrypted credential.
    pub fn is_credential(&self, path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().ends_with(&self.suffix))
            .unwrap_or(false)
    }
}

/// A single credential file known to the index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CredentialEntry {
    /// Absolute path of the encrypted file.
    pub path: PathBuf,
    /// Store-relative name shown to users.
    pub display_name: String,
}

impl CredentialEntry {
    pub fn new(root: &Path, path: impl Into<PathBuf>, settings: &IndexSettings) -> Self {
        let path = path.into();
        let display_name = display_name(root, &path, settings);
        Self { path, display_name }
    }
}

/// Derive the user-facing name of `path` relative to the store `root`.
///
/// `<root>/web/mail.gpg` becomes `web/mail`. Names longer than
/// `settings.max_name_len` characters keep only their tail, prefixed by `...`.
pub fn display_name(root: &Path, path: &Path, settings: &IndexSettings) -> String {
    let full = path.to_string_lossy();
    let root = root.to_string_lossy();

    let name = full.strip_prefix(root.as_ref()).unwrap_or(&full);
    let name = name.strip_suffix(settings.suffix.as_str()).unwrap_or(name);
    let name = name.strip_prefix(MAIN_SEPARATOR).unwrap_or(name);

    let len = name.chars().count();
    if len > settings.max_name_len {
        let tail: String = name.chars().skip(len - settings.max_name_len).collect();
        format!("{ELLIPSIS}{tail}")
    } else {
        name.to_string()
    }
}
