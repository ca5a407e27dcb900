//! SSH session factory.
//!
//! Sessions are driven through the system `ssh` binary with a fixed option
//! set: no user config, no known-hosts bookkeeping, key authentication only.

use crate::DriverError;
use std::process::{Command, Stdio};
use tracing::debug;

const SSH_BINARY: &str = "ssh";

const BASE_SSH_OPTIONS: &[&str] = &[
    "-F",
    "/dev/null",
    "-o",
    "ConnectionAttempts=3",
    "-o",
    "ConnectTimeout=10",
    "-o",
    "ControlMaster=no",
    "-o",
    "ControlPath=none",
    "-o",
    "LogLevel=quiet",
    "-o",
    "PasswordAuthentication=no",
    "-o",
    "ServerAliveInterval=60",
    "-o",
    "StrictHostKeyChecking=no",
    "-o",
    "UserKnownHostsFile=/dev/null",
];

/// Authentication material for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshAuth {
    pub keys: Vec<String>,
}

impl SshAuth {
    pub fn with_key(key_path: impl Into<String>) -> Self {
        Self {
            keys: vec![key_path.into()],
        }
    }
}

/// An SSH session to one machine.
pub trait SshClient: Send {
    /// Run `command` and return its combined stdout and stderr.
    fn output(&self, command: &str) -> Result<String, DriverError>;

    /// Attach the caller's terminal to a remote shell, or run `args`
    /// interactively when non-empty.
    fn shell(&self, args: &[String]) -> Result<(), DriverError>;
}

/// Client that shells out to the system `ssh` binary.
#[derive(Debug, Clone)]
pub struct ExternalClient {
    binary: String,
    args: Vec<String>,
}

impl ExternalClient {
    pub fn new(user: &str, host: &str, port: u16, auth: &SshAuth) -> Self {
        let mut args: Vec<String> = BASE_SSH_OPTIONS.iter().map(|s| (*s).to_owned()).collect();
        args.push(format!("{user}@{host}"));

        let keys: Vec<&String> = auth.keys.iter().filter(|k| !k.is_empty()).collect();
        if !keys.is_empty() {
            args.push("-o".to_owned());
            args.push("IdentitiesOnly=yes".to_owned());
        }
        for key in keys {
            args.push("-i".to_owned());
            args.push(key.clone());
        }

        args.push("-p".to_owned());
        args.push(port.to_string());

        Self {
            binary: SSH_BINARY.to_owned(),
            args,
        }
    }

    /// Arguments passed to `ssh` ahead of the remote command.
    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl SshClient for ExternalClient {
    fn output(&self, command: &str) -> Result<String, DriverError> {
        debug!("running remote command: {command}");
        let output = Command::new(&self.binary)
            .args(&self.args)
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| DriverError::Ssh(format!("failed to spawn {}: {e}", self.binary)))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            let status = output
                .status
                .code()
                .map_or_else(|| "a signal".to_owned(), |c| format!("code {c}"));
            Err(DriverError::Ssh(format!(
                "command '{command}' exited with {status}: {}",
                combined.trim()
            )))
        }
    }

    fn shell(&self, args: &[String]) -> Result<(), DriverError> {
        let status = Command::new(&self.binary)
            .args(&self.args)
            .args(args)
            .status()
            .map_err(|e| DriverError::Ssh(format!("failed to spawn {}: {e}", self.binary)))?;
        if status.success() {
            Ok(())
        } else {
            Err(DriverError::Ssh(format!("ssh session exited with {status}")))
        }
    }
}

/// Build a session handle for `user@host:port`.
pub fn new_client(
    user: &str,
    host: &str,
    port: u16,
    auth: &SshAuth,
) -> Result<Box<dyn SshClient>, DriverError> {
    if host.is_empty() {
        return Err(DriverError::Ssh("no ssh host address available".to_owned()));
    }
    if user.is_empty() {
        return Err(DriverError::Ssh("no ssh username available".to_owned()));
    }
    if port == 0 {
        return Err(DriverError::Ssh(format!("invalid ssh port 0 for {host}")));
    }
    Ok(Box::new(ExternalClient::new(user, host, port, auth)))
}
