use std::{
    ffi::OsStr,
    path::Path,
    process::{Command, Stdio},
};

use passwatch_core::backend::{Backend, BackendError};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Programs used to reach GnuPG and its agent.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GpgSettings {
    pub program: String,
    pub agent_program: String,
}

impl Default for GpgSettings {
    fn default() -> Self {
        Self {
            program: "gpg".to_string(),
            agent_program: "gpg-connect-agent".to_string(),
        }
    }
}

/// Backend that shells out to `gpg` and `gpg-connect-agent`.
#[derive(Debug, Clone, Default)]
pub struct GpgBackend {
    settings: GpgSettings,
}

impl GpgBackend {
    pub fn new(settings: GpgSettings) -> Self {
        Self { settings }
    }
}

impl Backend for GpgBackend {
    fn name(&self) -> &'static str {
        "gpg"
    }

    #[instrument(skip_all, fields(path = %path.display()))]
    fn decrypt(&self, path: &Path) -> Result<Vec<u8>, BackendError> {
        run(
            &self.settings.program,
            [
                OsStr::new("--quiet"),
                OsStr::new("--yes"),
                OsStr::new("--decrypt"),
                path.as_os_str(),
            ],
        )
    }

    #[instrument(skip_all)]
    fn export_public_keyring(&self) -> Result<Vec<u8>, BackendError> {
        run(&self.settings.program, ["--no-armor", "--export"])
    }

    #[instrument(skip_all, fields(%command))]
    fn send_agent_command(&self, command: &str) -> Result<String, BackendError> {
        let stdout = run(&self.settings.agent_program, [command, "/bye"])?;
        parse_agent_reply(&String::from_utf8_lossy(&stdout))
    }
}

/// Arguments of the first `S <KEYWORD> <args>` status line in an agent reply.
pub fn parse_agent_reply(output: &str) -> Result<String, BackendError> {
    for line in output.lines() {
        if let Some(status) = line.strip_prefix("S ") {
            let args = status.split_once(' ').map(|(_, args)| args).unwrap_or("");
            return Ok(args.to_string());
        }
        if let Some(reason) = line.strip_prefix("ERR ") {
            return Err(BackendError::Agent {
                reason: reason.to_string(),
            });
        }
    }
    Err(BackendError::Agent {
        reason: "agent sent no status line".to_string(),
    })
}

fn run<I, S>(program: &str, args: I) -> Result<Vec<u8>, BackendError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    debug!(program, "running backend command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| BackendError::Spawn {
            program: program.to_string(),
            reason: err.to_string(),
        })?;

    if !output.status.success() {
        return Err(BackendError::Command {
            program: program.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output.stdout)
}
