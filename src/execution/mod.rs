//! Command execution inside an existing container.
//!
//! This module holds the session type and the runtime it talks through.
//!
//! # Architecture
//!
//! ```text
//! Sandbox --ContainerRuntime--> RuntimeClient --> ContainerHandle --exec--> ExecutionResult
//! ```
//!
//! # Example
//!
//! ```ignore
//! use solitary::execution::{ExecOptions, Sandbox};
//! use solitary::SandboxConfig;
//!
//! let config = SandboxConfig::builder("sandbox").with_workdir("/projects").build()?;
//! let mut sandbox = Sandbox::new(config);
//!
//! let result = sandbox.execute("print('hello')", ExecOptions::default()).await?;
//! println!("{}", result.return_value().content);
//! sandbox.close().await;
//! ```

pub mod docker_client;
pub mod runtime;
pub mod sandbox;

#[cfg(test)]
pub(crate) mod mock;

pub use docker_client::{DockerClient, DockerContainer, DockerEndpoint, DockerRuntime};
pub use runtime::{
    ContainerAttrs, ContainerHandle, ContainerRuntime, ExecRequest, RawExecOutput, RuntimeClient,
    RuntimeError,
};
pub use sandbox::{ExecOptions, Sandbox, SessionState, ShellOptions};
