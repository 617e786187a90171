//! Container runtime abstraction.
//!
//! The session never talks to a runtime directly. It goes through these
//! three traits, mirroring the three things a runtime hands out:
//!
//! ```text
//! ContainerRuntime --connect--> RuntimeClient --get_container--> ContainerHandle
//! ```
//!
//! [`DockerRuntime`](super::docker_client::DockerRuntime) is the production
//! implementation. Tests substitute an in-memory one.

use async_trait::async_trait;
use thiserror::Error;

/// Failures reported by a runtime implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("No such container: {0}")]
    NotFound(String),

    #[error("Runtime API error: {0}")]
    Api(String),

    /// The request could not be carried to or from the runtime.
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A command to run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Program and arguments.
    pub cmd: Vec<String>,
    /// Working directory inside the container.
    pub workdir: String,
    /// Data written to the process's stdin, which is then closed.
    pub stdin: Option<String>,
    pub capture_stdout: bool,
    pub capture_stderr: bool,
    /// Keep stdout and stderr apart instead of interleaving them.
    pub separate_streams: bool,
}

impl ExecRequest {
    /// Creates a request capturing both streams separately.
    pub fn new(cmd: Vec<String>, workdir: impl Into<String>) -> Self {
        Self {
            cmd,
            workdir: workdir.into(),
            stdin: None,
            capture_stdout: true,
            capture_stderr: true,
            separate_streams: true,
        }
    }

    /// Sets the stdin payload.
    pub fn with_stdin(mut self, stdin: Option<String>) -> Self {
        self.stdin = stdin;
        self
    }

    /// The command as a single space-joined string.
    pub fn command_line(&self) -> String {
        self.cmd.join(" ")
    }
}

/// Raw process output as returned by the runtime.
///
/// `None` means the runtime produced no data for that stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExecOutput {
    pub exit_code: i64,
    pub stdout: Option<Vec<u8>>,
    pub stderr: Option<Vec<u8>>,
}

/// Runtime-reported container attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerAttrs {
    /// `Name`, usually with a leading `/`.
    pub name: String,
    /// `Config.Image`.
    pub image: String,
    /// `State.Status`.
    pub status: String,
    /// `Created`.
    pub created: String,
}

/// Entry point to a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Acquires a fresh client. Each call yields an independent connection.
    async fn connect(&self) -> Result<Box<dyn RuntimeClient>, RuntimeError>;
}

/// A live connection to the runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Resolves a container by name or ID.
    async fn get_container(&self, id_or_name: &str)
        -> Result<Box<dyn ContainerHandle>, RuntimeError>;

    /// Releases the connection.
    async fn close(&mut self);
}

/// A resolved container.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    /// Full container ID.
    fn id(&self) -> &str;

    /// Runs a command to completion and captures its output.
    async fn exec(&self, request: ExecRequest) -> Result<RawExecOutput, RuntimeError>;

    /// Reads the container's current attributes.
    async fn attrs(&self) -> Result<ContainerAttrs, RuntimeError>;
}
