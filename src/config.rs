//! Execution parameters for a sandbox session.
//!
//! A [`SandboxConfig`] is validated once, at construction, and cannot be
//! changed afterwards. To run with different parameters, derive a new value
//! through [`SandboxConfig::to_builder`].

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Smallest accepted timeout, in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;
/// Largest accepted timeout, in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 3600;

pub const DEFAULT_WORKDIR: &str = "/workspace";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHELL: &str = "/bin/bash";
pub const DEFAULT_INTERPRETER: &str = "python3";

const ENV_CONTAINER: &str = "SOLITARY_CONTAINER";
const ENV_WORKDIR: &str = "SOLITARY_WORKDIR";
const ENV_TIMEOUT: &str = "SOLITARY_TIMEOUT";
const ENV_SHELL: &str = "SOLITARY_SHELL";
const ENV_INTERPRETER: &str = "SOLITARY_INTERPRETER";

/// Immutable configuration for a sandbox session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSandboxConfig")]
pub struct SandboxConfig {
    container: String,
    workdir: String,
    timeout: u64,
    shell: String,
    interpreter: String,
}

impl SandboxConfig {
    /// Creates a configuration for `container` with every other field at
    /// its default.
    pub fn new(container: impl Into<String>) -> Result<Self, ValidationError> {
        Self::builder(container).build()
    }

    /// Starts a builder for a configuration targeting `container`.
    pub fn builder(container: impl Into<String>) -> SandboxConfigBuilder {
        SandboxConfigBuilder::new(container)
    }

    /// Returns a builder pre-filled with this configuration's values.
    pub fn to_builder(&self) -> SandboxConfigBuilder {
        SandboxConfigBuilder {
            container: self.container.clone(),
            workdir: self.workdir.clone(),
            timeout: self.timeout,
            shell: self.shell.clone(),
            interpreter: self.interpreter.clone(),
        }
    }

    /// Parses a YAML document into a validated configuration.
    ///
    /// ```yaml
    /// container: sandbox
    /// workdir: /projects
    /// timeout: 10
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ValidationError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Creates a configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `SOLITARY_CONTAINER`: container name or ID (required)
    /// - `SOLITARY_WORKDIR`: working directory (defaults to `/workspace`)
    /// - `SOLITARY_TIMEOUT`: timeout in seconds (defaults to 30)
    /// - `SOLITARY_SHELL`: shell for `execute_shell` (defaults to `/bin/bash`)
    /// - `SOLITARY_INTERPRETER`: program for `execute` (defaults to `python3`)
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::MissingEnv` if `SOLITARY_CONTAINER` is not set,
    /// and the usual validation errors for out-of-range values.
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let container = lookup(ENV_CONTAINER).ok_or(ValidationError::MissingEnv(ENV_CONTAINER))?;
        let mut builder = Self::builder(container);

        if let Some(workdir) = lookup(ENV_WORKDIR) {
            builder = builder.with_workdir(workdir);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let timeout = raw
                .trim()
                .parse::<u64>()
                .map_err(|_| ValidationError::InvalidTimeout(raw.clone()))?;
            builder = builder.with_timeout(timeout);
        }
        if let Some(shell) = lookup(ENV_SHELL) {
            builder = builder.with_shell(shell);
        }
        if let Some(interpreter) = lookup(ENV_INTERPRETER) {
            builder = builder.with_interpreter(interpreter);
        }

        builder.build()
    }

    /// Container name or ID to connect to.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Working directory for execution inside the container.
    pub fn workdir(&self) -> &str {
        &self.workdir
    }

    /// Execution timeout in seconds.
    pub fn timeout(&self) -> u64 {
        self.timeout
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Shell used by `execute_shell`.
    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Program used by `execute` to run inline code.
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

/// Builder for [`SandboxConfig`]. Validation happens in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SandboxConfigBuilder {
    container: String,
    workdir: String,
    timeout: u64,
    shell: String,
    interpreter: String,
}

impl SandboxConfigBuilder {
    fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            workdir: DEFAULT_WORKDIR.to_string(),
            timeout: DEFAULT_TIMEOUT_SECS,
            shell: DEFAULT_SHELL.to_string(),
            interpreter: DEFAULT_INTERPRETER.to_string(),
        }
    }

    /// Sets the working directory.
    pub fn with_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    /// Sets the shell.
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Sets the interpreter.
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// Validates the collected values and produces the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if:
    /// - the container is empty
    /// - the timeout is outside `[1, 3600]`
    pub fn build(self) -> Result<SandboxConfig, ValidationError> {
        if self.container.is_empty() {
            return Err(ValidationError::EmptyContainer);
        }
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&self.timeout) {
            return Err(ValidationError::TimeoutOutOfRange(self.timeout));
        }

        Ok(SandboxConfig {
            container: self.container,
            workdir: self.workdir,
            timeout: self.timeout,
            shell: self.shell,
            interpreter: self.interpreter,
        })
    }
}

/// Wire shape used when deserializing; funnels through the builder.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSandboxConfig {
    container: String,
    #[serde(default = "default_workdir")]
    workdir: String,
    #[serde(default = "default_timeout")]
    timeout: u64,
    #[serde(default = "default_shell")]
    shell: String,
    #[serde(default = "default_interpreter")]
    interpreter: String,
}

fn default_workdir() -> String {
    DEFAULT_WORKDIR.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

fn default_interpreter() -> String {
    DEFAULT_INTERPRETER.to_string()
}

impl TryFrom<RawSandboxConfig> for SandboxConfig {
    type Error = ValidationError;

    fn try_from(raw: RawSandboxConfig) -> Result<Self, Self::Error> {
        SandboxConfig::builder(raw.container)
            .with_workdir(raw.workdir)
            .with_timeout(raw.timeout)
            .with_shell(raw.shell)
            .with_interpreter(raw.interpreter)
            .build()
    }
}
