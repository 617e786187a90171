//! Docker Engine runtime using the bollard crate.
//!
//! Implements the runtime traits against a local (or explicitly addressed)
//! Docker daemon. Containers are only looked up and exec'd into; nothing
//! here creates, starts or removes containers.

use std::io::ErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogOutput};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerInspectResponse, ExecInspectResponse};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::{Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;
use tracing::debug;

use crate::execution::runtime::{
    ContainerAttrs, ContainerHandle, ContainerRuntime, ExecRequest, RawExecOutput, RuntimeClient,
    RuntimeError,
};

/// Request timeout for explicit endpoints, in seconds.
const DEFAULT_API_TIMEOUT_SECS: u64 = 120;

/// How many times to inspect a finished exec for its exit code.
const EXIT_CODE_POLLS: u32 = 20;
const EXIT_CODE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Where to reach the Docker daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DockerEndpoint {
    /// `DOCKER_HOST` if set, otherwise the platform's default socket.
    LocalDefaults,
    /// A unix socket path, e.g. `/var/run/docker.sock`.
    #[cfg(unix)]
    Unix(String),
    /// An HTTP address, e.g. `tcp://127.0.0.1:2375`.
    Http(String),
}

/// [`ContainerRuntime`] backed by the Docker Engine API.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    endpoint: DockerEndpoint,
    timeout_secs: u64,
}

impl DockerRuntime {
    /// Creates a runtime connecting with local defaults.
    pub fn new() -> Self {
        Self::with_endpoint(DockerEndpoint::LocalDefaults)
    }

    /// Creates a runtime for an explicit endpoint.
    pub fn with_endpoint(endpoint: DockerEndpoint) -> Self {
        Self {
            endpoint,
            timeout_secs: DEFAULT_API_TIMEOUT_SECS,
        }
    }

    /// Sets the API request timeout used for explicit endpoints.
    pub fn with_api_timeout(mut self, seconds: u64) -> Self {
        self.timeout_secs = seconds;
        self
    }

    pub fn endpoint(&self) -> &DockerEndpoint {
        &self.endpoint
    }

    fn open(&self) -> Result<Docker, BollardError> {
        match &self.endpoint {
            DockerEndpoint::LocalDefaults => Docker::connect_with_local_defaults(),
            #[cfg(unix)]
            DockerEndpoint::Unix(path) => {
                Docker::connect_with_unix(path, self.timeout_secs, API_DEFAULT_VERSION)
            }
            DockerEndpoint::Http(addr) => {
                Docker::connect_with_http(addr, self.timeout_secs, API_DEFAULT_VERSION)
            }
        }
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn connect(&self) -> Result<Box<dyn RuntimeClient>, RuntimeError> {
        let docker = self
            .open()
            .map_err(|e| RuntimeError::Transport(format!("Failed to connect: {e}")))?;

        // The handshake is what actually reaches the daemon.
        docker
            .ping()
            .await
            .map_err(|e| RuntimeError::Transport(format!("Docker daemon not reachable: {e}")))?;

        debug!(endpoint = ?self.endpoint, "Connected to Docker daemon");
        Ok(Box::new(DockerClient::from_docker(docker)))
    }
}

/// A live Docker connection.
pub struct DockerClient {
    docker: Option<Docker>,
}

impl DockerClient {
    /// Wraps an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker: Some(docker),
        }
    }

    fn docker(&self) -> Result<&Docker, RuntimeError> {
        self.docker
            .as_ref()
            .ok_or_else(|| RuntimeError::Transport("Docker client is closed".to_string()))
    }
}

#[async_trait]
impl RuntimeClient for DockerClient {
    async fn get_container(
        &self,
        id_or_name: &str,
    ) -> Result<Box<dyn ContainerHandle>, RuntimeError> {
        let docker = self.docker()?;
        let info = inspect(docker, id_or_name).await?;

        let id = info.id.unwrap_or_else(|| id_or_name.to_string());
        Ok(Box::new(DockerContainer {
            docker: docker.clone(),
            id,
        }))
    }

    async fn close(&mut self) {
        // bollard has no explicit shutdown; dropping the handle releases the pool.
        self.docker = None;
    }
}

/// A container resolved through [`DockerClient`].
pub struct DockerContainer {
    docker: Docker,
    id: String,
}

impl DockerContainer {
    /// Docker may still report the exec as running right after its streams
    /// close, so the exit code is polled until it settles.
    async fn wait_exit_code(&self, exec_id: &str) -> Result<i64, RuntimeError> {
        for attempt in 0..EXIT_CODE_POLLS {
            let info = self
                .docker
                .inspect_exec(exec_id)
                .await
                .map_err(map_bollard_error)?;

            if let Some(code) = settled_exit_code(&info) {
                return Ok(code);
            }

            debug!(exec_id, attempt, "Exec not settled yet");
            sleep(EXIT_CODE_POLL_INTERVAL).await;
        }

        Err(RuntimeError::Api("exec finished without exit code".to_string()))
    }
}

#[async_trait]
impl ContainerHandle for DockerContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn exec(&self, request: ExecRequest) -> Result<RawExecOutput, RuntimeError> {
        let exec_options = CreateExecOptions {
            cmd: Some(request.cmd.clone()),
            working_dir: Some(request.workdir.clone()),
            attach_stdin: Some(request.stdin.is_some()),
            attach_stdout: Some(request.capture_stdout),
            attach_stderr: Some(request.capture_stderr),
            tty: Some(false),
            ..Default::default()
        };

        let exec = self
            .docker
            .create_exec(&self.id, exec_options)
            .await
            .map_err(map_bollard_error)?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(map_bollard_error)?;

        let (stdout, stderr) = match start_result {
            StartExecResults::Attached { output, mut input } => {
                // Stdin is fed while the output drains.
                let feed = async {
                    match &request.stdin {
                        Some(data) => feed_stdin(&mut input, data.as_bytes()).await,
                        None => Ok(()),
                    }
                };
                let (fed, drained) =
                    tokio::join!(feed, drain_output(output, request.separate_streams));
                let captured = drained?;
                fed?;
                captured
            }
            StartExecResults::Detached => (None, None),
        };

        let exit_code = self.wait_exit_code(&exec.id).await?;

        Ok(RawExecOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn attrs(&self) -> Result<ContainerAttrs, RuntimeError> {
        let info = inspect(&self.docker, &self.id).await?;
        Ok(attrs_from_inspect(info))
    }
}

async fn inspect(docker: &Docker, id: &str) -> Result<ContainerInspectResponse, RuntimeError> {
    docker
        .inspect_container(id, None::<InspectContainerOptions>)
        .await
        .map_err(|e| match e {
            BollardError::DockerResponseServerError {
                status_code: 404, ..
            } => RuntimeError::NotFound(id.to_string()),
            other => map_bollard_error(other),
        })
}

/// Writes `data` to the process and closes its stdin.
///
/// A process that exits or closes stdin early is not an error; its output
/// is still collected.
async fn feed_stdin<W>(input: &mut W, data: &[u8]) -> Result<(), RuntimeError>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        input.write_all(data).await?;
        input.shutdown().await
    }
    .await;

    match written {
        Ok(()) => Ok(()),
        Err(e) if matches!(e.kind(), ErrorKind::BrokenPipe | ErrorKind::ConnectionReset) => {
            debug!(error = %e, "Process stopped reading stdin");
            Ok(())
        }
        Err(e) => Err(RuntimeError::Transport(format!("Failed to write stdin: {e}"))),
    }
}

/// Collects the attached output stream.
///
/// Streams that never produced a frame stay `None`. Stderr is folded into
/// stdout unless `separate_streams` is set.
async fn drain_output<S>(
    mut output: S,
    separate_streams: bool,
) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>), RuntimeError>
where
    S: Stream<Item = Result<LogOutput, BollardError>> + Unpin,
{
    let mut stdout: Option<Vec<u8>> = None;
    let mut stderr: Option<Vec<u8>> = None;

    while let Some(chunk) = output.next().await {
        match chunk {
            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                stdout.get_or_insert_with(Vec::new).extend_from_slice(&message);
            }
            Ok(LogOutput::StdErr { message }) => {
                let target = if separate_streams {
                    &mut stderr
                } else {
                    &mut stdout
                };
                target.get_or_insert_with(Vec::new).extend_from_slice(&message);
            }
            Ok(_) => {}
            Err(e) => {
                return Err(RuntimeError::Transport(format!("Error reading output: {e}")));
            }
        }
    }

    Ok((stdout, stderr))
}

fn settled_exit_code(info: &ExecInspectResponse) -> Option<i64> {
    match info.running {
        Some(true) => None,
        _ => info.exit_code,
    }
}

fn map_bollard_error(e: BollardError) -> RuntimeError {
    match e {
        BollardError::DockerResponseServerError {
            status_code: 404,
            message,
        } => RuntimeError::NotFound(message),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Api(format!("{status_code}: {message}")),
        other => RuntimeError::Transport(other.to_string()),
    }
}

fn attrs_from_inspect(info: ContainerInspectResponse) -> ContainerAttrs {
    ContainerAttrs {
        name: info.name.unwrap_or_default(),
        image: info.config.and_then(|c| c.image).unwrap_or_default(),
        status: info
            .state
            .and_then(|s| s.status)
            .map(|s| s.to_string())
            .unwrap_or_default(),
        created: info.created.unwrap_or_default(),
    }
}
