use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use thiserror::Error;

/// Errors produced by decryption backends and the agent channel.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    /// A helper program could not be started.
    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },
    /// A helper program exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },
    /// The agent answered with an error or without a status line.
    #[error("agent error: {reason}")]
    Agent { reason: String },
    /// Requested file has no decryptable content.
    #[error("nothing to decrypt at {path}")]
    NotFound { path: String },
    /// A previous backend caller panicked while holding the backend lock.
    #[error("backend lock poisoned")]
    Poisoned,
}

/// Contract for the external decryption backend and its agent control channel.
///
/// Implementations are not expected to tolerate concurrent use; every call must
/// go through a [`BackendSession`], which serializes callers process-wide.
pub trait Backend: Send + Sync {
    /// Short name used for logging.
    fn name(&self) -> &'static str;

    /// Decrypt the file at `path` and return the plaintext.
    fn decrypt(&self, path: &Path) -> Result<Vec<u8>, BackendError>;

    /// Export every public key as a binary OpenPGP keyring.
    fn export_public_keyring(&self) -> Result<Vec<u8>, BackendError>;

    /// Send one command line to the agent and return its status reply line.
    fn send_agent_command(&self, command: &str) -> Result<String, BackendError>;
}

static BACKEND_LOCK: Mutex<()> = Mutex::new(());

/// Exclusive access to a backend for the lifetime of the value.
///
/// Only one session exists in the process at a time; opening a second one
/// blocks until the first is dropped. The lock is released on every exit path
/// because it is tied to the session's drop.
pub struct BackendSession<'a, B: Backend + ?Sized> {
    backend: &'a B,
    _guard: MutexGuard<'static, ()>,
}

impl<'a, B: Backend + ?Sized> BackendSession<'a, B> {
    pub fn open(backend: &'a B) -> Result<Self, BackendError> {
        let guard = BACKEND_LOCK.lock().map_err(|_| BackendError::Poisoned)?;
        Ok(Self {
            backend,
            _guard: guard,
        })
    }

    pub fn decrypt(&self, path: &Path) -> Result<Vec<u8>, BackendError> {
        self.backend.decrypt(path)
    }

    pub fn export_public_keyring(&self) -> Result<Vec<u8>, BackendError> {
        self.backend.export_public_keyring()
    }

    pub fn send_agent_command(&self, command: &str) -> Result<String, BackendError> {
        self.backend.send_agent_command(command)
    }
}

/// Canned backend for tests and offline smoke runs.
///
/// Answers from fixed tables and records every call it receives.
#[derive(Debug, Default)]
pub struct StaticBackend {
    plaintexts: HashMap<PathBuf, Vec<u8>>,
    keyring: Vec<u8>,
    agent_replies: HashMap<String, String>,
    calls: Mutex<Vec<String>>,
}

impl StaticBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plaintext(mut self, path: impl Into<PathBuf>, plaintext: &[u8]) -> Self {
        self.plaintexts.insert(path.into(), plaintext.to_vec());
        self
    }

    pub fn with_keyring(mut self, keyring: Vec<u8>) -> Self {
        self.keyring = keyring;
        self
    }

    pub fn with_agent_reply(mut self, command: impl Into<String>, reply: impl Into<String>) -> Self {
        self.agent_replies.insert(command.into(), reply.into());
        self
    }

    /// Calls received so far, in order (`decrypt <path>`, `export`, `agent <line>`).
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

impl Backend for StaticBackend {
    fn name(&self) -> &'static str {
        "static"
    }

    fn decrypt(&self, path: &Path) -> Result<Vec<u8>, BackendError> {
        self.record(format!("decrypt {}", path.display()));
        self.plaintexts
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                path: path.display().to_string(),
            })
    }

    fn export_public_keyring(&self) -> Result<Vec<u8>, BackendError> {
        self.record("export".to_string());
        Ok(self.keyring.clone())
    }

    fn send_agent_command(&self, command: &str) -> Result<String, BackendError> {
        self.record(format!("agent {command}"));
        self.agent_replies
            .get(command)
            .cloned()
            .ok_or_else(|| BackendError::Agent {
                reason: format!("no reply for `{command}`"),
            })
    }
}
