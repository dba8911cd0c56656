//! Remote session channel
//!
//! The engine drives commands on remote development environments through a
//! pooled terminal multiplexer. That collaborator lives behind
//! [`SessionChannel`]: a fallible, possibly slow RPC boundary. Connections
//! are acquired per command and never held across suspension points the
//! engine does not control; a lost connection is retried once by the
//! executor after re-establishing the session.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use thiserror::Error;

/// Errors surfaced by the session channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No session could be established for the environment.
    #[error("session unavailable for environment '{env}': {reason}")]
    SessionUnavailable { env: String, reason: String },

    /// The pooled connection was invalidated mid-operation. Retryable once
    /// after re-establishing the session.
    #[error("connection to environment '{env}' lost: {reason}")]
    ConnectionLost { env: String, reason: String },

    /// The remote command ran to completion and exited non-zero.
    #[error("command exited with status {exit_code}")]
    CommandFailed { exit_code: i32, output: String },

    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Output captured from a remote command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub output: String,
}

/// Interface to the remote terminal multiplexer.
#[async_trait]
pub trait SessionChannel: Send + Sync {
    /// Ensures a persistent multiplexed session exists for the environment.
    async fn ensure_session(&self, env_handle: &str) -> Result<(), ChannelError>;

    /// Runs a command inside the environment's session and captures its
    /// output.
    async fn run_command(
        &self,
        env_handle: &str,
        command: &str,
    ) -> Result<CommandOutput, ChannelError>;
}

/// Thin local-process implementation backing the binary.
///
/// Each environment gets a marker session; commands run under `sh -c` with
/// the handle exported as `DRYDOCK_ENV`.
pub struct ProcessChannel {
    sessions: Mutex<HashSet<String>>,
}

impl ProcessChannel {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashSet::new()),
        }
    }
}

impl Default for ProcessChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionChannel for ProcessChannel {
    async fn ensure_session(&self, env_handle: &str) -> Result<(), ChannelError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.insert(env_handle.to_string()) {
            tracing::debug!("Opened session for environment {}", env_handle);
        }
        Ok(())
    }

    async fn run_command(
        &self,
        env_handle: &str,
        command: &str,
    ) -> Result<CommandOutput, ChannelError> {
        {
            let sessions = self.sessions.lock().unwrap();
            if !sessions.contains(env_handle) {
                return Err(ChannelError::SessionUnavailable {
                    env: env_handle.to_string(),
                    reason: "no session established".to_string(),
                });
            }
        }

        let out = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .env("DRYDOCK_ENV", env_handle)
            .output()
            .await?;

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        output.push_str(&String::from_utf8_lossy(&out.stderr));
        let exit_code = out.status.code().unwrap_or(-1);

        if out.status.success() {
            Ok(CommandOutput { exit_code, output })
        } else {
            Err(ChannelError::CommandFailed { exit_code, output })
        }
    }
}
