//! In-memory runtime for tests. Records every call it receives.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::execution::runtime::{
    ContainerAttrs, ContainerHandle, ContainerRuntime, ExecRequest, RawExecOutput, RuntimeClient,
    RuntimeError,
};

pub(crate) const MOCK_CONTAINER_ID: &str = "c0ffee1234567890";

/// Calls observed by the mock.
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub connects: usize,
    pub lookups: Vec<String>,
    pub execs: Vec<ExecRequest>,
    pub attrs: usize,
    pub closes: usize,
}

impl Calls {
    /// Total number of calls of any kind.
    pub fn total(&self) -> usize {
        self.connects + self.lookups.len() + self.execs.len() + self.attrs + self.closes
    }
}

#[derive(Default)]
struct Script {
    connect_errors: VecDeque<RuntimeError>,
    lookup_errors: VecDeque<RuntimeError>,
    exec_results: VecDeque<Result<RawExecOutput, RuntimeError>>,
    exec_delay: Option<Duration>,
    attrs: Option<Result<ContainerAttrs, RuntimeError>>,
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Calls>,
    script: Mutex<Script>,
}

/// Scriptable runtime. Unscripted exec calls succeed with empty output.
#[derive(Clone, Default)]
pub(crate) struct MockRuntime {
    shared: Arc<Shared>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_connect(self, error: RuntimeError) -> Self {
        self.script().connect_errors.push_back(error);
        self
    }

    pub fn fail_lookup(self, error: RuntimeError) -> Self {
        self.script().lookup_errors.push_back(error);
        self
    }

    pub fn respond(self, exit_code: i64, stdout: &[u8], stderr: &[u8]) -> Self {
        let output = RawExecOutput {
            exit_code,
            stdout: (!stdout.is_empty()).then(|| stdout.to_vec()),
            stderr: (!stderr.is_empty()).then(|| stderr.to_vec()),
        };
        self.script().exec_results.push_back(Ok(output));
        self
    }

    pub fn respond_raw(self, output: RawExecOutput) -> Self {
        self.script().exec_results.push_back(Ok(output));
        self
    }

    pub fn fail_exec(self, error: RuntimeError) -> Self {
        self.script().exec_results.push_back(Err(error));
        self
    }

    pub fn exec_delay(self, delay: Duration) -> Self {
        self.script().exec_delay = Some(delay);
        self
    }

    pub fn attrs(self, attrs: Result<ContainerAttrs, RuntimeError>) -> Self {
        self.script().attrs = Some(attrs);
        self
    }

    pub fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.shared.calls.lock().expect("lock poisoned")
    }

    pub fn into_runtime(self) -> Arc<dyn ContainerRuntime> {
        Arc::new(self)
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.shared.script.lock().expect("lock poisoned")
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn connect(&self) -> Result<Box<dyn RuntimeClient>, RuntimeError> {
        self.calls().connects += 1;
        if let Some(error) = self.script().connect_errors.pop_front() {
            return Err(error);
        }
        Ok(Box::new(MockClient {
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct MockClient {
    shared: Arc<Shared>,
}

#[async_trait]
impl RuntimeClient for MockClient {
    async fn get_container(
        &self,
        id_or_name: &str,
    ) -> Result<Box<dyn ContainerHandle>, RuntimeError> {
        self.shared
            .calls
            .lock()
            .expect("lock poisoned")
            .lookups
            .push(id_or_name.to_string());
        if let Some(error) = self.shared.script.lock().expect("lock poisoned").lookup_errors.pop_front() {
            return Err(error);
        }
        Ok(Box::new(MockHandle {
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn close(&mut self) {
        self.shared.calls.lock().expect("lock poisoned").closes += 1;
    }
}

struct MockHandle {
    shared: Arc<Shared>,
}

#[async_trait]
impl ContainerHandle for MockHandle {
    fn id(&self) -> &str {
        MOCK_CONTAINER_ID
    }

    async fn exec(&self, request: ExecRequest) -> Result<RawExecOutput, RuntimeError> {
        self.shared
            .calls
            .lock()
            .expect("lock poisoned")
            .execs
            .push(request);

        let (next, delay) = {
            let mut script = self.shared.script.lock().expect("lock poisoned");
            (script.exec_results.pop_front(), script.exec_delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        next.unwrap_or_else(|| Ok(RawExecOutput::default()))
    }

    async fn attrs(&self) -> Result<ContainerAttrs, RuntimeError> {
        self.shared.calls.lock().expect("lock poisoned").attrs += 1;
        self.shared
            .script
            .lock()
            .expect("lock poisoned")
            .attrs
            .clone()
            .unwrap_or_else(|| {
                Ok(ContainerAttrs {
                    name: "/sandbox".to_string(),
                    image: "python:3.11-slim".to_string(),
                    status: "running".to_string(),
                    created: "2024-05-01T12:00:00.000000000Z".to_string(),
                })
            })
    }
}
