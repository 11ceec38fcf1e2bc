use std::path::Path;

use passwatch_core::{
    backend::{Backend, BackendSession},
    keyinfo::{AgentKeyStatus, KeyInfo},
};
use sha1::{Digest, Sha1};
use tracing::{debug, instrument, warn};

use crate::packet::{self, PublicKey, PublicKeyAlgorithm};

/// Agent keygrip of an RSA key: uppercase hex SHA-1 of `0x00 || modulus`.
pub fn rsa_keygrip(modulus: &[u8]) -> String {
    let start = modulus.iter().position(|b| *b != 0).unwrap_or(modulus.len());
    let mut hasher = Sha1::new();
    hasher.update([0u8]);
    hasher.update(&modulus[start..]);
    hex::encode_upper(hasher.finalize())
}

/// Looks up which key protects a credential file and whether the agent has
/// its passphrase cached.
pub struct KeyInfoResolver<B: Backend> {
    backend: B,
}

impl<B: Backend> KeyInfoResolver<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Resolve key metadata for the file at `path`.
    ///
    /// Never fails: unreadable files, unknown recipients and agent errors all
    /// degrade to an empty or partial [`KeyInfo`].
    #[instrument(skip_all, fields(path = %path.display(), backend = self.backend.name()))]
    pub fn resolve(&self, path: &Path) -> KeyInfo {
        let Some(key_id) = packet::find_key_id(path) else {
            debug!("no encrypted session key packet");
            return KeyInfo::default();
        };

        let session = match BackendSession::open(&self.backend) {
            Ok(session) => session,
            Err(err) => {
                warn!(%err, "backend unavailable");
                return KeyInfo::default();
            }
        };

        let Some(key) = find_public_key(&session, key_id) else {
            debug!(key_id = %format!("{key_id:016X}"), "recipient key not in public keyring");
            return KeyInfo::default();
        };

        let mut info = KeyInfo {
            fingerprint_short: key.fingerprint_short(),
            bit_length: key.bit_length,
            ..KeyInfo::default()
        };
        match key.algorithm {
            PublicKeyAlgorithm::Unknown(id) => {
                warn!(algorithm = id, "unknown public key algorithm");
            }
            algorithm if algorithm.supports_keygrip() => {
                info.algorithm_name = algorithm.display_name().unwrap_or_default().to_string();
                info.agent_status = agent_status(&session, &key);
            }
            algorithm => {
                info.algorithm_name = algorithm.display_name().unwrap_or_default().to_string();
            }
        }
        info
    }
}

fn find_public_key<B: Backend + ?Sized>(session: &BackendSession<'_, B>, key_id: u64) -> Option<PublicKey> {
    let keyring = match session.export_public_keyring() {
        Ok(keyring) => keyring,
        Err(err) => {
            warn!(%err, "failed to export public keyring");
            return None;
        }
    };
    let keys = match packet::parse_keyring(&keyring) {
        Ok(keys) => keys,
        Err(err) => {
            warn!(%err, "failed to parse public keyring");
            return None;
        }
    };
    keys.into_iter().find(|key| key.key_id == key_id)
}

fn agent_status<B: Backend + ?Sized>(session: &BackendSession<'_, B>, key: &PublicKey) -> AgentKeyStatus {
    let Some(modulus) = key.rsa_modulus.as_deref() else {
        return AgentKeyStatus::default();
    };
    let keygrip = rsa_keygrip(modulus);

    let reply = match session.send_agent_command(&format!("keyinfo {keygrip}")) {
        Ok(reply) => reply,
        Err(err) => {
            warn!(%err, %keygrip, "agent keyinfo query failed");
            return AgentKeyStatus::default();
        }
    };
    reply.parse().unwrap_or_else(|err| {
        warn!(%err, %keygrip, "malformed agent keyinfo reply");
        AgentKeyStatus::default()
    })
}
