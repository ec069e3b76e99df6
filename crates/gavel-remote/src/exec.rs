//! Command execution on named hosts.

use std::collections::{HashMap, HashSet};
use std::process::{Output, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use openssh::{KnownHosts, Session};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::stage_log::StageLog;

/// Exit status and captured output of one command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// A successful command printing `stdout`.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A command exiting with `code` and printing `stderr`.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout.trim_end(), self.stderr)
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// Runs shell commands on named hosts.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `host` and capture its output.
    async fn run(&self, host: &str, command: &str) -> RemoteResult<CommandOutput>;

    /// Run `command` on `host`, handing each stdout line to `on_line` as it
    /// arrives. Returns the exit code.
    async fn stream(
        &self,
        host: &str,
        command: &str,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> RemoteResult<i32>;
}

/// Run a command and record it, and its output, in `log`.
pub async fn run_logged(
    executor: &dyn RemoteExecutor,
    log: &StageLog,
    host: &str,
    command: &str,
) -> RemoteResult<CommandOutput> {
    log.command(host, command);
    let output = executor.run(host, command).await?;
    log.output(&output);
    debug!(stage = %log.stage(), %host, exit = output.exit_code, "command finished");
    Ok(output)
}

// ── Local ─────────────────────────────────────────────────────────

/// Runs commands through `sh -c` on this machine.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    fn command(command: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(&self, host: &str, command: &str) -> RemoteResult<CommandOutput> {
        let output = Self::command(command)
            .output()
            .await
            .map_err(|e| spawn_error(host, command, e))?;
        Ok(output.into())
    }

    async fn stream(
        &self,
        host: &str,
        command: &str,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> RemoteResult<i32> {
        let mut child = Self::command(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| spawn_error(host, command, e))?;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await.map_err(|source| RemoteError::Output {
                host: host.to_string(),
                source,
            })? {
                on_line(&line);
            }
        }

        let status = child.wait().await.map_err(|source| RemoteError::Output {
            host: host.to_string(),
            source,
        })?;
        Ok(status.code().unwrap_or(-1))
    }
}

// ── SSH ───────────────────────────────────────────────────────────

/// Runs commands over multiplexed ssh sessions, one per host.
///
/// Hosts named in the local set bypass ssh and run through `sh -c`.
pub struct SshExecutor {
    user: Option<String>,
    local_hosts: HashSet<String>,
    sessions: Mutex<HashMap<String, Arc<Session>>>,
    local: LocalExecutor,
}

impl SshExecutor {
    pub fn new(user: Option<String>) -> Self {
        Self {
            user,
            local_hosts: ["localhost", "127.0.0.1"]
                .into_iter()
                .map(String::from)
                .collect(),
            sessions: Mutex::new(HashMap::new()),
            local: LocalExecutor,
        }
    }

    /// Treat `host` as this machine.
    pub fn with_local_host(mut self, host: impl Into<String>) -> Self {
        self.local_hosts.insert(host.into());
        self
    }

    fn is_local(&self, host: &str) -> bool {
        self.local_hosts.contains(host)
    }

    async fn session(&self, host: &str) -> RemoteResult<Arc<Session>> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get(host) {
            return Ok(Arc::clone(session));
        }

        let destination = match &self.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        };
        let session = Session::connect_mux(&destination, KnownHosts::Accept)
            .await
            .map_err(|e| RemoteError::Connect {
                host: host.to_string(),
                message: e.to_string(),
            })?;
        debug!(%host, "ssh session established");

        let session = Arc::new(session);
        sessions.insert(host.to_string(), Arc::clone(&session));
        Ok(session)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: &str, command: &str) -> RemoteResult<CommandOutput> {
        if self.is_local(host) {
            return self.local.run(host, command).await;
        }

        let session = self.session(host).await?;
        let output = session
            .shell(command)
            .output()
            .await
            .map_err(|e| spawn_error(host, command, e))?;
        Ok(output.into())
    }

    async fn stream(
        &self,
        host: &str,
        command: &str,
        on_line: &mut (dyn for<'l> FnMut(&'l str) + Send),
    ) -> RemoteResult<i32> {
        if self.is_local(host) {
            return self.local.stream(host, command, on_line).await;
        }

        let session = self.session(host).await?;
        let mut child = session
            .shell(command)
            .stdout(openssh::Stdio::piped())
            .stderr(openssh::Stdio::null())
            .spawn()
            .await
            .map_err(|e| spawn_error(host, command, e))?;

        if let Some(stdout) = child.stdout().take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await.map_err(|source| RemoteError::Output {
                host: host.to_string(),
                source,
            })? {
                on_line(&line);
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| spawn_error(host, command, e))?;
        Ok(status.code().unwrap_or(-1))
    }
}

fn spawn_error(host: &str, command: &str, error: impl std::fmt::Display) -> RemoteError {
    RemoteError::Spawn {
        host: host.to_string(),
        command: command.to_string(),
        message: error.to_string(),
    }
}
