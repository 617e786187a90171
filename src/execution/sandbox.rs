//! Execution session bound to one long-lived container.
//!
//! A [`Sandbox`] owns one runtime connection and one container handle.
//! It connects lazily: every operation that needs the container calls
//! [`Sandbox::connect`] first, which is a no-op once connected.
//!
//! ```text
//! Unconnected --connect--> Connected --close--> Closed
//!                              ^                   |
//!                              +------connect------+
//! ```
//!
//! Timeouts are measured, not enforced. A command that overruns its timeout
//! keeps running inside the container; the session only reports
//! `timeout_occurred` once the runtime returns.

use std::fmt;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::execution::docker_client::DockerRuntime;
use crate::execution::runtime::{
    ContainerHandle, ContainerRuntime, ExecRequest, RawExecOutput, RuntimeClient, RuntimeError,
};
use crate::result::{ContainerInfo, ExecutionResult};

/// Code run by [`Sandbox::is_healthy`].
pub const HEALTH_PROBE: &str = "print('health_check')";
/// Marker the probe must print.
pub const HEALTH_MARKER: &str = "health_check";
/// Timeout for the health probe, in seconds.
pub const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No client, no container handle.
    Unconnected,
    /// Client acquired and container resolved.
    Connected,
    /// Released by `close()`. The next operation reconnects.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unconnected => write!(f, "unconnected"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

/// Per-call overrides for [`Sandbox::execute`] and [`Sandbox::execute_file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Data fed to the process's stdin.
    pub stdin: Option<String>,
    /// Working directory; empty falls back to the configuration.
    pub workdir: Option<String>,
    /// Timeout in seconds; zero falls back to the configuration.
    pub timeout: Option<u64>,
}

impl ExecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stdin payload.
    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    /// Sets the working directory.
    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

/// Per-call overrides for [`Sandbox::execute_shell`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOptions {
    pub workdir: Option<String>,
    pub timeout: Option<u64>,
    /// Shell binary; empty falls back to the configuration.
    pub shell: Option<String>,
}

impl ShellOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the working directory.
    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Sets the shell.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = Some(shell.into());
        self
    }
}

/// Sandboxed execution session against an existing container.
pub struct Sandbox {
    config: SandboxConfig,
    runtime: Arc<dyn ContainerRuntime>,
    client: Option<Box<dyn RuntimeClient>>,
    container: Option<Box<dyn ContainerHandle>>,
    state: SessionState,
}

impl Sandbox {
    /// Creates an unconnected session against the local Docker daemon.
    pub fn new(config: SandboxConfig) -> Self {
        Self::with_runtime(config, Arc::new(DockerRuntime::new()))
    }

    /// Creates an unconnected session against an arbitrary runtime.
    pub fn with_runtime(config: SandboxConfig, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime,
            client: None,
            container: None,
            state: SessionState::Unconnected,
        }
    }

    /// Creates a session and connects it immediately.
    ///
    /// Pair with [`close`](Self::close) on every exit path.
    pub async fn open(
        config: SandboxConfig,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, SandboxError> {
        let mut sandbox = Self::with_runtime(config, runtime);
        sandbox.connect().await?;
        Ok(sandbox)
    }

    /// Acquires a runtime client and resolves the configured container.
    ///
    /// A connected session returns immediately without touching the runtime.
    /// If the client was acquired but the lookup failed, the client is kept
    /// and the next call only retries the lookup.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::Connection` if the runtime cannot be reached or
    /// the lookup fails for a reason other than absence, and
    /// `SandboxError::ContainerNotFound` if the container does not exist.
    pub async fn connect(&mut self) -> Result<(), SandboxError> {
        if self.state == SessionState::Connected {
            return Ok(());
        }

        let client = match self.client.take() {
            Some(client) => client,
            None => {
                debug!("Connecting to container runtime");
                self.runtime
                    .connect()
                    .await
                    .map_err(|e| SandboxError::Connection(e.to_string()))?
            }
        };

        let lookup = client.get_container(self.config.container()).await;
        self.client = Some(client);

        let handle = lookup.map_err(|e| match e {
            RuntimeError::NotFound(_) => SandboxError::ContainerNotFound {
                container: self.config.container().to_string(),
            },
            other => SandboxError::Connection(format!("Failed to access container: {other}")),
        })?;

        info!(
            container = %self.config.container(),
            container_id = %handle.id(),
            "Sandbox connected"
        );
        self.container = Some(handle);
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Runs `code` with the configured interpreter (`<interpreter> -c <code>`).
    ///
    /// Only connection failures are returned as `Err`. Failures while the
    /// command is in flight come back as a result with exit code `-1` and the
    /// failure message in `stderr`.
    pub async fn execute(
        &mut self,
        code: &str,
        options: ExecOptions,
    ) -> Result<ExecutionResult, SandboxError> {
        let cmd = vec![
            self.config.interpreter().to_string(),
            "-c".to_string(),
            code.to_string(),
        ];
        self.dispatch(cmd, options.workdir, options.timeout, options.stdin)
            .await
    }

    /// Runs `command` through the shell (`<shell> -c <command>`).
    ///
    /// Same error contract as [`execute`](Self::execute).
    pub async fn execute_shell(
        &mut self,
        command: &str,
        options: ShellOptions,
    ) -> Result<ExecutionResult, SandboxError> {
        let shell = options
            .shell
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.config.shell().to_string());
        let cmd = vec![shell, "-c".to_string(), command.to_string()];
        self.dispatch(cmd, options.workdir, options.timeout, None)
            .await
    }

    /// Reads a local file and runs its contents via [`execute`](Self::execute).
    ///
    /// A missing file yields a result with exit code 1 without contacting
    /// the runtime. `args` is accepted but not passed to the interpreter.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::Io` if the file exists but cannot be read as
    /// UTF-8 text, plus the connection errors of `execute`.
    pub async fn execute_file(
        &mut self,
        path: impl AsRef<Path>,
        args: &[String],
        options: ExecOptions,
    ) -> Result<ExecutionResult, SandboxError> {
        let path = path.as_ref();

        let code = match tokio::fs::read_to_string(path).await {
            Ok(code) => code,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Script not found, skipping dispatch");
                return Ok(ExecutionResult {
                    stdout: String::new(),
                    stderr: format!("File not found: {}", path.display()),
                    exit_code: 1,
                    execution_time: 0.0,
                    timeout_occurred: false,
                    container_id: self.container_id().unwrap_or_default().to_string(),
                    command: format!("{} {}", self.config.interpreter(), path.display()),
                });
            }
            Err(e) => return Err(SandboxError::Io(e)),
        };

        if !args.is_empty() {
            debug!(
                path = %path.display(),
                args = args.len(),
                "Script arguments are not forwarded to the interpreter"
            );
        }

        self.execute(&code, options).await
    }

    /// Probes the container with a short interpreter run.
    ///
    /// Returns false on any failure, including connection errors.
    pub async fn is_healthy(&mut self) -> bool {
        if let Err(e) = self.connect().await {
            debug!(error = %e, "Health check could not connect");
            return false;
        }

        match self
            .execute(HEALTH_PROBE, ExecOptions::new().with_timeout(HEALTH_TIMEOUT_SECS))
            .await
        {
            Ok(result) => result.success() && result.stdout.contains(HEALTH_MARKER),
            Err(e) => {
                debug!(error = %e, "Health check failed");
                false
            }
        }
    }

    /// Reads fresh container metadata from the runtime.
    pub async fn get_container_info(&mut self) -> Result<ContainerInfo, SandboxError> {
        let container = self.config.container().to_string();
        let handle = self.handle().await?;

        let attrs = handle.attrs().await.map_err(|e| match e {
            RuntimeError::NotFound(_) => SandboxError::ContainerNotFound {
                container: container.clone(),
            },
            other => SandboxError::Connection(format!("Failed to inspect container: {other}")),
        })?;

        Ok(ContainerInfo::from_attrs(handle.id(), attrs))
    }

    /// Releases the runtime client and forgets the container handle.
    ///
    /// Safe to call repeatedly and on sessions that never connected.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.close().await;
            debug!(container = %self.config.container(), "Sandbox connection closed");
        }
        self.container = None;
        self.state = SessionState::Closed;
    }

    /// The session's configuration.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// ID of the resolved container, if connected.
    pub fn container_id(&self) -> Option<&str> {
        self.container.as_deref().map(|handle| handle.id())
    }

    async fn handle(&mut self) -> Result<&dyn ContainerHandle, SandboxError> {
        self.connect().await?;
        self.container
            .as_deref()
            .ok_or_else(|| SandboxError::Connection("Container handle missing".to_string()))
    }

    async fn dispatch(
        &mut self,
        cmd: Vec<String>,
        workdir: Option<String>,
        timeout: Option<u64>,
        stdin: Option<String>,
    ) -> Result<ExecutionResult, SandboxError> {
        let workdir = workdir
            .filter(|w| !w.is_empty())
            .unwrap_or_else(|| self.config.workdir().to_string());
        let timeout = timeout
            .filter(|t| *t > 0)
            .unwrap_or_else(|| self.config.timeout());

        let handle = self.handle().await?;
        let container_id = handle.id().to_string();
        let request = ExecRequest::new(cmd, workdir).with_stdin(stdin);
        let command = request.command_line();

        debug!(
            container_id = %container_id,
            workdir = %request.workdir,
            timeout_secs = timeout,
            "Dispatching command"
        );

        let started = Instant::now();
        let outcome = handle.exec(request).await;
        let execution_time = started.elapsed().as_secs_f64();
        let timeout_occurred = execution_time > timeout as f64;

        if timeout_occurred {
            warn!(
                container_id = %container_id,
                elapsed_secs = execution_time,
                timeout_secs = timeout,
                "Command exceeded its timeout"
            );
        }

        let result = match outcome {
            Ok(raw) => from_raw(raw, execution_time, timeout_occurred, container_id, command),
            Err(e) => {
                warn!(container_id = %container_id, error = %e, "Command dispatch failed");
                ExecutionResult {
                    stdout: String::new(),
                    stderr: e.to_string(),
                    exit_code: -1,
                    execution_time,
                    timeout_occurred,
                    container_id,
                    command,
                }
            }
        };

        Ok(result)
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("container_id", &self.container_id())
            .finish()
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!(
                container = %self.config.container(),
                "Sandbox dropped without close(); releasing connection"
            );
        }
    }
}

fn from_raw(
    raw: RawExecOutput,
    execution_time: f64,
    timeout_occurred: bool,
    container_id: String,
    command: String,
) -> ExecutionResult {
    ExecutionResult {
        stdout: decode(raw.stdout),
        stderr: decode(raw.stderr),
        exit_code: raw.exit_code,
        execution_time,
        timeout_occurred,
        container_id,
        command,
    }
}

fn decode(bytes: Option<Vec<u8>>) -> String {
    bytes
        .map(|b| String::from_utf8_lossy(&b).into_owned())
        .unwrap_or_default()
}
