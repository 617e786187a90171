//! Typed outcomes of sandbox operations.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::execution::runtime::ContainerAttrs;

/// Classification of an execution outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    /// The command produced usable output.
    Output,
    /// The command failed or wrote to stderr.
    Error,
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultType::Output => write!(f, "output"),
            ResultType::Error => write!(f, "error"),
        }
    }
}

/// Structured return value derived from an [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultValue {
    #[serde(rename = "type")]
    pub kind: ResultType,
    pub content: String,
}

impl ResultValue {
    pub fn output(content: impl Into<String>) -> Self {
        Self {
            kind: ResultType::Output,
            content: content.into(),
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: ResultType::Error,
            content: content.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResultType::Error
    }
}

/// Result of a single command executed in the sandbox.
///
/// Values are never mutated after construction. `success` and
/// `return_value` are derived on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Standard output.
    #[serde(default)]
    pub stdout: String,
    /// Standard error.
    #[serde(default)]
    pub stderr: String,
    /// Process exit code; `-1` when the command could not be dispatched.
    pub exit_code: i64,
    /// Wall-clock seconds measured around the dispatch call.
    pub execution_time: f64,
    /// Whether `execution_time` exceeded the effective timeout.
    #[serde(default)]
    pub timeout_occurred: bool,
    /// Container ID used for execution.
    pub container_id: String,
    /// Command that was executed, space-joined.
    pub command: String,
}

impl ExecutionResult {
    /// True if the command exited with code 0 within its timeout.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timeout_occurred
    }

    /// Classifies the outcome.
    ///
    /// Order matters: stdout of a successful run wins, then any stderr
    /// (even for a failed run), then a generic failure message.
    pub fn return_value(&self) -> ResultValue {
        let success = self.success();

        if success && !self.stdout.is_empty() {
            ResultValue::output(self.stdout.clone())
        } else if !self.stderr.is_empty() {
            ResultValue::error(self.stderr.clone())
        } else if !success {
            ResultValue::error(format!("Command failed with exit code {}", self.exit_code))
        } else {
            ResultValue::output(String::new())
        }
    }
}

/// Snapshot of container metadata reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    /// Container name without the runtime's leading `/`.
    pub name: String,
    pub image: String,
    pub status: String,
    /// Creation timestamp, as reported by the runtime.
    pub created: String,
}

impl ContainerInfo {
    pub(crate) fn from_attrs(id: impl Into<String>, attrs: ContainerAttrs) -> Self {
        Self {
            id: id.into(),
            name: attrs.name.trim_start_matches('/').to_string(),
            image: attrs.image,
            status: attrs.status,
            created: attrs.created,
        }
    }

    /// Parses `created` as an RFC 3339 timestamp, if the runtime used one.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}
