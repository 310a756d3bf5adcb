/// Container Spec Builder - Job Model to Daemon Parameters
///
/// **Core Responsibility:**
/// Map one container role of a job into a fully-resolved container
/// specification.
///
/// **Critical Properties:**
/// - Pure: no daemon calls, no filesystem access
/// - Deterministic: same job, role and configuration → same spec
/// - One code path for all four roles, so the label, log driver and
///   bind-mount rules live in exactly one place
///
/// Fields the component leaves at zero keep the daemon's zero-value meaning
/// (memory 0 = unlimited, CPU shares 0 = default weight).

use crate::error::{Result, RuntimeError};
use conduit_common::naming::{self, Role, INVOCATION_LABEL};
use conduit_common::types::{Device, Job, Step, StepInput, Volume, VolumesFrom};
use conduit_common::Config;
use indexmap::IndexMap;

/// Daemon log driver for every container; output is captured over attach
pub const LOG_DRIVER_NONE: &str = "none";

/// Fully-resolved runtime parameters for one container
///
/// Built fresh for every run and consumed by `create`; never mutated after.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    /// `name:tag`
    pub image: String,
    pub entrypoint: Option<String>,
    pub cmd: Vec<String>,
    pub working_dir: Option<String>,
    /// `KEY=VALUE`, component keys first
    pub env: Vec<String>,
    pub memory: Option<i64>,
    pub cpu_shares: Option<i64>,
    pub network_mode: Option<String>,
    /// `hostPath:containerPath:mode`
    pub binds: Vec<String>,
    pub devices: Vec<Device>,
    pub volumes_from: Vec<String>,
    /// Anonymous volume mount points
    pub volumes: Vec<String>,
    pub labels: IndexMap<String, String>,
    pub log_driver: String,
    pub attach_output: bool,
}

/// Tagged container role with the job data it needs
#[derive(Debug, Clone, Copy)]
pub enum ContainerRole<'a> {
    Step {
        job: &'a Job,
        step: &'a Step,
        index: usize,
    },
    Download {
        job: &'a Job,
        input: &'a StepInput,
        index: usize,
    },
    Upload {
        job: &'a Job,
    },
    SharedData {
        volumes_from: &'a VolumesFrom,
        invocation_id: &'a str,
    },
}

impl ContainerRole<'_> {
    pub fn kind(&self) -> Role {
        match self {
            ContainerRole::Step { .. } => Role::Step,
            ContainerRole::Download { .. } => Role::Download,
            ContainerRole::Upload { .. } => Role::Upload,
            ContainerRole::SharedData { .. } => Role::SharedData,
        }
    }

    pub fn invocation_id(&self) -> &str {
        match self {
            ContainerRole::Step { job, .. }
            | ContainerRole::Download { job, .. }
            | ContainerRole::Upload { job } => job.invocation_id.as_str(),
            ContainerRole::SharedData { invocation_id, .. } => *invocation_id,
        }
    }

    /// Deterministic container name for this role
    pub fn container_name(&self) -> String {
        match self {
            ContainerRole::Step { job, step, index } => {
                naming::step_container_name(step, *index, &job.invocation_id)
            }
            ContainerRole::Download { job, index, .. } => {
                naming::download_container_name(*index, &job.invocation_id)
            }
            ContainerRole::Upload { job } => naming::upload_container_name(&job.invocation_id),
            ContainerRole::SharedData {
                volumes_from,
                invocation_id,
            } => naming::data_container_name(volumes_from, invocation_id),
        }
    }

    /// Image and tag to pull before creation
    pub fn image<'c>(&'c self, config: &'c Config) -> (&'c str, &'c str) {
        match self {
            ContainerRole::Step { step, .. } => {
                let image = &step.component.container.image;
                (image.name.as_str(), image.tag.as_str())
            }
            ContainerRole::Download { .. } | ContainerRole::Upload { .. } => {
                (config.transfer_image.as_str(), config.transfer_tag.as_str())
            }
            ContainerRole::SharedData { volumes_from, .. } => {
                (volumes_from.name.as_str(), volumes_from.tag.as_str())
            }
        }
    }
}

/// Build the container specification for a role
pub fn build(role: &ContainerRole<'_>, config: &Config) -> Result<ContainerSpec> {
    let (image, tag) = role.image(config);
    let mut spec = ContainerSpec {
        name: role.container_name(),
        image: image_reference(image, tag)?,
        entrypoint: None,
        cmd: Vec::new(),
        working_dir: None,
        env: Vec::new(),
        memory: None,
        cpu_shares: None,
        network_mode: None,
        binds: Vec::new(),
        devices: Vec::new(),
        volumes_from: Vec::new(),
        volumes: Vec::new(),
        labels: IndexMap::from([(
            INVOCATION_LABEL.to_string(),
            role.invocation_id().to_string(),
        )]),
        log_driver: LOG_DRIVER_NONE.to_string(),
        attach_output: true,
    };

    match role {
        ContainerRole::Step { job, step, .. } => {
            let container = &step.component.container;
            spec.entrypoint = non_empty(&container.entrypoint);
            spec.cmd = step.arguments.clone();
            spec.working_dir = Some(
                non_empty(&container.working_dir)
                    .unwrap_or_else(|| config.step_working_dir.clone()),
            );
            spec.env = merged_environment(&container.environment, &job.environment);
            spec.memory = Some(container.memory_limit);
            spec.cpu_shares = Some(container.cpu_shares);
            spec.network_mode = non_empty(&container.network_mode);
            spec.binds = container.volumes.iter().map(bind).collect();
            spec.devices = container.devices.clone();
            spec.volumes_from = container
                .volumes_from
                .iter()
                .map(|vf| naming::data_container_name(vf, &job.invocation_id))
                .collect();
        }
        ContainerRole::Download { job, input, .. } => {
            spec.cmd = input.arguments(&job.submitter, &job.file_metadata);
            transfer_mounts(&mut spec, config);
        }
        ContainerRole::Upload { job } => {
            spec.cmd = job.final_output_arguments();
            transfer_mounts(&mut spec, config);
        }
        ContainerRole::SharedData { volumes_from, .. } => {
            if volumes_from.name_prefix.trim().is_empty() {
                return Err(RuntimeError::InvalidSpec(format!(
                    "data container for image {} has no name prefix",
                    spec.image
                )));
            }
            if volumes_from.container_path.is_empty() {
                return Err(RuntimeError::InvalidSpec(format!(
                    "data container {} has no container path",
                    spec.name
                )));
            }
            if volumes_from.host_path.is_empty() {
                spec.volumes = vec![volumes_from.container_path.clone()];
            } else {
                spec.binds = vec![bind(&Volume {
                    host_path: volumes_from.host_path.clone(),
                    container_path: volumes_from.container_path.clone(),
                    read_only: volumes_from.read_only,
                })];
            }
            spec.attach_output = false;
        }
    }

    Ok(spec)
}

fn image_reference(name: &str, tag: &str) -> Result<String> {
    if name.trim().is_empty() || tag.trim().is_empty() {
        return Err(RuntimeError::InvalidSpec(format!(
            "image reference requires a name and a tag, got '{}:{}'",
            name, tag
        )));
    }
    Ok(format!("{}:{}", name, tag))
}

fn transfer_mounts(spec: &mut ContainerSpec, config: &Config) {
    spec.working_dir = Some(config.transfer_working_dir.clone());
    spec.binds = vec![bind(&Volume {
        host_path: config.host_work_dir.display().to_string(),
        container_path: config.transfer_working_dir.clone(),
        read_only: false,
    })];
}

fn bind(volume: &Volume) -> String {
    let mode = if volume.read_only { "ro" } else { "rw" };
    format!("{}:{}:{}", volume.host_path, volume.container_path, mode)
}

/// Component keys first, job-scoped keys appended, last write wins.
/// An overridden key keeps the position of its first declaration.
fn merged_environment(
    component: &IndexMap<String, String>,
    job: &IndexMap<String, String>,
) -> Vec<String> {
    let mut merged = component.clone();
    for (key, value) in job {
        merged.insert(key.clone(), value.clone());
    }
    merged
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
