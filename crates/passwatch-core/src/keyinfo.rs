use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing an agent `KEYINFO` status line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentStatusError {
    /// The line did not split into exactly nine fields.
    #[error("expected 9 fields in agent status line, found {found}")]
    FieldCount { found: usize },
}

/// Passphrase-cache status reported by the agent for one keygrip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentKeyStatus {
    pub keygrip: String,
    pub key_type: String,
    pub serial_number: String,
    pub id_string: String,
    /// Whether the agent currently holds the passphrase.
    pub cached: bool,
    pub protection: String,
    pub fingerprint: String,
    pub ttl: String,
    pub flags: String,
}

impl FromStr for AgentKeyStatus {
    type Err = AgentStatusError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(' ').collect();
        let [keygrip, key_type, serial_number, id_string, cached, protection, fingerprint, ttl, flags] =
            fields.as_slice()
        else {
            return Err(AgentStatusError::FieldCount {
                found: fields.len(),
            });
        };

        Ok(Self {
            keygrip: keygrip.to_string(),
            key_type: key_type.to_string(),
            serial_number: serial_number.to_string(),
            id_string: id_string.to_string(),
            cached: *cached == "1",
            protection: protection.to_string(),
            fingerprint: fingerprint.to_string(),
            ttl: ttl.to_string(),
            flags: flags.to_string(),
        })
    }
}

/// Metadata about the key protecting a credential file.
///
/// An empty `algorithm_name` means no usable key was found; callers render
/// that as "not encrypted".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct KeyInfo {
    pub algorithm_name: String,
    /// Low 32 bits of the key id as uppercase hex.
    pub fingerprint_short: String,
    pub bit_length: u16,
    pub agent_status: AgentKeyStatus,
}

impl KeyInfo {
    pub fn is_encrypted(&self) -> bool {
        !self.algorithm_name.is_empty()
    }

    pub fn is_cached(&self) -> bool {
        self.agent_status.cached
    }

    /// One-line human summary, e.g. `RSA 4096 (1A2B3C4D) cached`.
    pub fn summary(&self) -> String {
        if !self.is_encrypted() {
            return "not encrypted".to_string();
        }
        let cache = if self.is_cached() { "cached" } else { "not cached" };
        format!(
            "{} {} ({}) {cache}",
            self.algorithm_name, self.bit_length, self.fingerprint_short
        )
    }
}
