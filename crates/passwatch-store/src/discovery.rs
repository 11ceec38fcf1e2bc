use std::{
    env,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::StoreError;

/// Environment variable that overrides every other store location.
pub const STORE_DIR_ENV: &str = "PASSWORD_STORE_DIR";

/// Candidate store roots in priority order: environment override, configured
/// directory, `~/.password-store`, `~/password-store`.
pub fn candidates(
    env_override: Option<PathBuf>,
    config_override: Option<&Path>,
    home: Option<&Path>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    out.extend(env_override.filter(|path| !path.as_os_str().is_empty()));
    out.extend(config_override.map(Path::to_path_buf));
    if let Some(home) = home {
        out.push(home.join(".password-store"));
        out.push(home.join("password-store"));
    }
    out
}

/// First candidate that exists once symlinks are resolved.
pub fn first_existing(candidates: &[PathBuf]) -> Result<PathBuf, StoreError> {
    for candidate in candidates {
        match candidate.canonicalize() {
            Ok(resolved) => {
                debug!(candidate = %candidate.display(), resolved = %resolved.display(), "found store root");
                return Ok(resolved);
            }
            Err(err) => debug!(candidate = %candidate.display(), %err, "store root candidate rejected"),
        }
    }

    Err(StoreError::NotFound {
        tried: candidates
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// Locate the store root from the environment, config and home directory.
pub fn find_store_root(config_override: Option<&Path>) -> Result<PathBuf, StoreError> {
    let env_override = env::var_os(STORE_DIR_ENV).map(PathBuf::from);
    let home = dirs::home_dir();
    first_existing(&candidates(env_override, config_override, home.as_deref()))
}
