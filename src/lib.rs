//! solitary: run code and shell commands inside a long-lived container.
//!
//! A [`Sandbox`] connects to a container runtime (Docker by default), finds
//! a named container and executes commands in it, returning a typed
//! [`ExecutionResult`] that classifies itself as output or error.
//!
//! ```ignore
//! use solitary::{ExecOptions, ResultType, Sandbox, SandboxConfig};
//!
//! let config = SandboxConfig::builder("sandbox")
//!     .with_workdir("/projects")
//!     .with_timeout(10)
//!     .build()?;
//!
//! let mut sandbox = Sandbox::new(config);
//! let result = sandbox.execute("1/0", ExecOptions::default()).await?;
//! assert_eq!(result.return_value().kind, ResultType::Error);
//! sandbox.close().await;
//! ```
//!
//! Callers without an async runtime can use [`blocking::Sandbox`].

pub mod blocking;
pub mod config;
pub mod error;
pub mod execution;
pub mod result;

pub use config::{SandboxConfig, SandboxConfigBuilder};
pub use error::{SandboxError, ValidationError};
pub use execution::{DockerRuntime, ExecOptions, Sandbox, SessionState, ShellOptions};
pub use result::{ContainerInfo, ExecutionResult, ResultType, ResultValue};
