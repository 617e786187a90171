//! Synchronous sandbox sessions.
//!
//! [`Sandbox`] here wraps the async [`execution::Sandbox`](crate::execution::Sandbox)
//! and drives it on a private current-thread Tokio runtime, so every call
//! blocks the calling thread until the container runtime answers.
//!
//! Do not use it from inside an async context; `block_on` panics there.

use std::path::Path;
use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::config::SandboxConfig;
use crate::error::SandboxError;
use crate::execution::docker_client::DockerRuntime;
use crate::execution::runtime::ContainerRuntime;
use crate::execution::sandbox::{ExecOptions, Sandbox as AsyncSandbox, SessionState, ShellOptions};
use crate::result::{ContainerInfo, ExecutionResult};

/// Blocking counterpart of [`crate::Sandbox`].
#[derive(Debug)]
pub struct Sandbox {
    inner: AsyncSandbox,
    runtime: Runtime,
}

impl Sandbox {
    /// Creates an unconnected session against the local Docker daemon.
    pub fn new(config: SandboxConfig) -> Result<Self, SandboxError> {
        Self::with_runtime(config, Arc::new(DockerRuntime::new()))
    }

    /// Creates an unconnected session against an arbitrary runtime.
    ///
    /// # Errors
    ///
    /// Returns `SandboxError::Connection` if the Tokio runtime backing the
    /// session cannot be built.
    pub fn with_runtime(
        config: SandboxConfig,
        container_runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, SandboxError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SandboxError::Connection(format!("Failed to start I/O runtime: {e}")))?;

        Ok(Self {
            inner: AsyncSandbox::with_runtime(config, container_runtime),
            runtime,
        })
    }

    /// Creates a session and connects it immediately.
    pub fn open(
        config: SandboxConfig,
        container_runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self, SandboxError> {
        let mut sandbox = Self::with_runtime(config, container_runtime)?;
        sandbox.connect()?;
        Ok(sandbox)
    }

    pub fn connect(&mut self) -> Result<(), SandboxError> {
        self.runtime.block_on(self.inner.connect())
    }

    pub fn execute(
        &mut self,
        code: &str,
        options: ExecOptions,
    ) -> Result<ExecutionResult, SandboxError> {
        self.runtime.block_on(self.inner.execute(code, options))
    }

    pub fn execute_shell(
        &mut self,
        command: &str,
        options: ShellOptions,
    ) -> Result<ExecutionResult, SandboxError> {
        self.runtime.block_on(self.inner.execute_shell(command, options))
    }

    pub fn execute_file(
        &mut self,
        path: impl AsRef<Path>,
        args: &[String],
        options: ExecOptions,
    ) -> Result<ExecutionResult, SandboxError> {
        self.runtime
            .block_on(self.inner.execute_file(path, args, options))
    }

    pub fn is_healthy(&mut self) -> bool {
        self.runtime.block_on(self.inner.is_healthy())
    }

    pub fn get_container_info(&mut self) -> Result<ContainerInfo, SandboxError> {
        self.runtime.block_on(self.inner.get_container_info())
    }

    pub fn close(&mut self) {
        self.runtime.block_on(self.inner.close())
    }

    pub fn config(&self) -> &SandboxConfig {
        self.inner.config()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn container_id(&self) -> Option<&str> {
        self.inner.container_id()
    }
}

impl Drop for Sandbox {
    fn drop(&mut self) {
        // Close while the runtime is still alive so the client shuts down cleanly.
        if self.inner.state() != SessionState::Closed {
            self.runtime.block_on(self.inner.close());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::mock::MockRuntime;
    use crate::execution::runtime::RuntimeError;
    use crate::result::ResultType;

    fn config() -> SandboxConfig {
        SandboxConfig::builder("sandbox")
            .with_workdir("/projects")
            .with_timeout(10)
            .build()
            .unwrap()
    }

    #[test]
    fn test_blocking_execute() {
        let mock = MockRuntime::new().respond(0, b"hi\n", b"");
        let mut sandbox = Sandbox::with_runtime(config(), mock.clone().into_runtime()).unwrap();

        let result = sandbox.execute("print('hi')", ExecOptions::default()).unwrap();
        assert!(result.success());
        assert_eq!(result.return_value().kind, ResultType::Output);
        assert_eq!(result.return_value().content, "hi\n");
        assert_eq!(sandbox.state(), SessionState::Connected);

        sandbox.close();
        sandbox.close();
        assert_eq!(sandbox.state(), SessionState::Closed);
        assert_eq!(mock.calls().closes, 1);
    }

    #[test]
    fn test_blocking_health_and_info() {
        let mock = MockRuntime::new().respond(0, b"health_check\n", b"");
        let mut sandbox = Sandbox::open(config(), mock.clone().into_runtime()).unwrap();

        assert!(sandbox.is_healthy());
        let info = sandbox.get_container_info().unwrap();
        assert_eq!(info.name, "sandbox");
        assert_eq!(sandbox.config().workdir(), "/projects");
    }

    #[test]
    fn test_blocking_shell_and_missing_file() {
        let mock = MockRuntime::new().respond(0, b"ok\n", b"");
        let mut sandbox = Sandbox::with_runtime(config(), mock.clone().into_runtime()).unwrap();

        let result = sandbox.execute_shell("echo ok", ShellOptions::default()).unwrap();
        assert_eq!(result.stdout, "ok\n");

        let missing = sandbox
            .execute_file("/no/such/file.py", &[], ExecOptions::default())
            .unwrap();
        assert_eq!(missing.exit_code, 1);
        assert_eq!(mock.calls().execs.len(), 1);
    }

    #[test]
    fn test_drop_closes_connected_session() {
        let mock = MockRuntime::new();
        {
            let mut sandbox = Sandbox::with_runtime(config(), mock.clone().into_runtime()).unwrap();
            sandbox.connect().unwrap();
        }
        assert_eq!(mock.calls().closes, 1);
    }

    #[test]
    fn test_blocking_connect_error() {
        let mock = MockRuntime::new().fail_lookup(RuntimeError::NotFound("sandbox".to_string()));
        let err = Sandbox::open(config(), mock.into_runtime()).unwrap_err();
        assert!(err.is_not_found());
    }
}
