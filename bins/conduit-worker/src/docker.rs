//! Container runtime client
//!
//! Thin façade over the daemon API. Every call maps one lifecycle operation
//! onto one (or, for attach-and-start, two) daemon requests and translates
//! daemon failures into the `RuntimeError` taxonomy.

use crate::error::{Result, RuntimeError};
use crate::spec::ContainerSpec;
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    ListContainersOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{DeviceMapping, HostConfig, HostConfigLogConfig};
use bollard::{Docker, API_DEFAULT_VERSION};
use conduit_common::naming;
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Seconds before an idle daemon request is abandoned
const DAEMON_TIMEOUT_SECS: u64 = 120;

/// Destination for one demultiplexed output stream
pub type OutputSink<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Container runtime operations used by the engine
///
/// Any implementation must guarantee:
/// 1. `remove` of a missing container succeeds
/// 2. `attach_and_start` attaches before it starts, and returns only once
///    the container closed its output streams
/// 3. `wait` reports a non-zero exit status as a value, not an error
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Exact name lookup, including stopped containers
    async fn container_exists(&self, name: &str) -> Result<bool>;

    async fn pull(&self, image: &str, tag: &str) -> Result<()>;

    /// Returns the daemon-assigned container id
    async fn create(&self, spec: &ContainerSpec) -> Result<String>;

    async fn remove(&self, name: &str) -> Result<()>;

    async fn attach_and_start(
        &self,
        id: &str,
        stdout: OutputSink<'_>,
        stderr: OutputSink<'_>,
    ) -> Result<()>;

    async fn wait(&self, id: &str) -> Result<i64>;

    /// Names of all containers carrying `key=value`
    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<String>>;
}

/// Daemon client shared by every container of a job
#[derive(Clone)]
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect to the daemon and verify the session with a ping
    ///
    /// `unix://` endpoints use the socket, an empty endpoint uses the local
    /// defaults, anything else (`tcp://`, `http://`) goes over HTTP.
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let connection_failed = |e: DockerError| RuntimeError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            message: e.to_string(),
        };

        let docker = if endpoint.is_empty() {
            Docker::connect_with_local_defaults()
        } else if endpoint.starts_with("unix://") {
            Docker::connect_with_unix(endpoint, DAEMON_TIMEOUT_SECS, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_http(endpoint, DAEMON_TIMEOUT_SECS, API_DEFAULT_VERSION)
        }
        .map_err(connection_failed)?;

        docker.ping().await.map_err(connection_failed)?;
        info!(endpoint = %endpoint, "Connected to container daemon");

        Ok(Self { docker })
    }

    async fn list(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> std::result::Result<Vec<String>, DockerError> {
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        Ok(containers
            .into_iter()
            .flat_map(|c| c.names.unwrap_or_default())
            .map(|n| naming::normalize(&n).to_string())
            .collect())
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn container_exists(&self, name: &str) -> Result<bool> {
        // The daemon's name filter is a substring match
        let filters = HashMap::from([(
            "name".to_string(),
            vec![naming::normalize(name).to_string()],
        )]);

        let names = self
            .list(filters)
            .await
            .map_err(|e| RuntimeError::LookupFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(names.iter().any(|n| naming::same_container_name(n, name)))
    }

    async fn pull(&self, image: &str, tag: &str) -> Result<()> {
        let reference = format!("{}:{}", image, tag);
        let options = Some(CreateImageOptions {
            from_image: image,
            tag,
            ..Default::default()
        });

        info!(image = %reference, "Pulling image");

        // Drain the status stream to completion
        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            let progress = result.map_err(|e| RuntimeError::PullFailed {
                image: reference.clone(),
                message: e.to_string(),
            })?;
            if let Some(status) = progress.status {
                debug!(image = %reference, status = %status, "Pull progress");
            }
        }

        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String> {
        let options = Some(CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        });

        let response = self
            .docker
            .create_container(options, container_config(spec))
            .await
            .map_err(|e| RuntimeError::CreateFailed {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;

        for warning in &response.warnings {
            warn!(container = %spec.name, warning = %warning, "Daemon warning on create");
        }

        Ok(response.id)
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self
            .docker
            .remove_container(naming::normalize(name), Some(options))
            .await
        {
            Ok(()) => {
                debug!(container = %name, "Container removed");
                Ok(())
            }
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => {
                debug!(container = %name, "Container already gone");
                Ok(())
            }
            Err(e) => Err(RuntimeError::RemoveFailed {
                name: name.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn attach_and_start(
        &self,
        id: &str,
        stdout: OutputSink<'_>,
        stderr: OutputSink<'_>,
    ) -> Result<()> {
        let options = AttachContainerOptions::<String> {
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            ..Default::default()
        };

        let AttachContainerResults { mut output, .. } = self
            .docker
            .attach_container(id, Some(options))
            .await
            .map_err(|e| RuntimeError::AttachFailed {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::StartFailed {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        debug!(container_id = %id, "Container started, streaming output");

        while let Some(frame) = output.next().await {
            let frame = frame.map_err(|e| RuntimeError::AttachFailed {
                id: id.to_string(),
                message: format!("output stream interrupted: {}", e),
            })?;

            match frame {
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    stdout
                        .write_all(&message)
                        .await
                        .map_err(RuntimeError::LogWriteFailed)?;
                }
                LogOutput::StdErr { message } => {
                    stderr
                        .write_all(&message)
                        .await
                        .map_err(RuntimeError::LogWriteFailed)?;
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        stdout.flush().await.map_err(RuntimeError::LogWriteFailed)?;
        stderr.flush().await.map_err(RuntimeError::LogWriteFailed)?;

        Ok(())
    }

    async fn wait(&self, id: &str) -> Result<i64> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // Non-zero exit codes arrive as an error variant
            Some(Err(DockerError::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(RuntimeError::WaitFailed {
                id: id.to_string(),
                message: e.to_string(),
            }),
            None => Err(RuntimeError::WaitFailed {
                id: id.to_string(),
                message: "wait stream closed without a status".to_string(),
            }),
        }
    }

    async fn list_by_label(&self, key: &str, value: &str) -> Result<Vec<String>> {
        let filters = HashMap::from([(
            "label".to_string(),
            vec![format!("{}={}", key, value)],
        )]);

        self.list(filters)
            .await
            .map_err(|e| RuntimeError::LookupFailed {
                name: format!("label {}={}", key, value),
                message: e.to_string(),
            })
    }
}

/// Translate a spec into the daemon's create request body
fn container_config(spec: &ContainerSpec) -> Config<String> {
    let host_config = HostConfig {
        memory: spec.memory,
        cpu_shares: spec.cpu_shares,
        network_mode: spec.network_mode.clone(),
        binds: non_empty(&spec.binds),
        devices: if spec.devices.is_empty() {
            None
        } else {
            Some(
                spec.devices
                    .iter()
                    .map(|d| DeviceMapping {
                        path_on_host: Some(d.host_path.clone()),
                        path_in_container: Some(d.container_path.clone()),
                        cgroup_permissions: Some(d.cgroup_permissions.clone()),
                    })
                    .collect(),
            )
        },
        volumes_from: non_empty(&spec.volumes_from),
        log_config: Some(HostConfigLogConfig {
            typ: Some(spec.log_driver.clone()),
            config: None,
        }),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        entrypoint: spec.entrypoint.clone().map(|e| vec![e]),
        cmd: non_empty(&spec.cmd),
        working_dir: spec.working_dir.clone(),
        env: non_empty(&spec.env),
        labels: Some(
            spec.labels
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        volumes: if spec.volumes.is_empty() {
            None
        } else {
            Some(
                spec.volumes
                    .iter()
                    .map(|path| (path.clone(), HashMap::new()))
                    .collect(),
            )
        },
        attach_stdout: Some(spec.attach_output),
        attach_stderr: Some(spec.attach_output),
        tty: Some(false),
        host_config: Some(host_config),
        ..Default::default()
    }
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}
