//! GnuPG plumbing for passwatch: the process-backed decryption backend,
//! a minimal OpenPGP packet reader and key metadata resolution.

pub mod gpg;
pub mod packet;
pub mod resolver;

#[cfg(test)]
mod fixtures;

use std::path::Path;

use passwatch_core::{
    backend::{Backend, BackendError, BackendSession},
    content::DecryptedContent,
};
use tracing::instrument;

pub use gpg::{GpgBackend, GpgSettings};
pub use resolver::KeyInfoResolver;

/// Decrypt the credential at `path` and split it into secret and metadata.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn decrypt_content<B: Backend + ?Sized>(
    backend: &B,
    path: &Path,
) -> Result<DecryptedContent, BackendError> {
    let session = BackendSession::open(backend)?;
    let plaintext = session.decrypt(path)?;
    Ok(DecryptedContent::parse(&plaintext))
}
