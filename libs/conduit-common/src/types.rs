use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Job Description (Immutable Input)
/// A job is write-once - the engine only reads it
///
/// ## Step Execution Semantics:
/// - Steps execute **sequentially** in declaration order
/// - Step index is stable and keys container names and log paths
/// - The invocation id is unique per execution, never per job definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub invocation_id: String,
    #[serde(default)]
    pub submitter: String,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub file_metadata: Vec<FileMetadata>,
    /// Job-scoped variables, appended after each component's own environment
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

impl Job {
    /// Argument list for the upload container
    ///
    /// `put`, then every retained output path in step order, then the
    /// optional `--user` / `--destination` flags and metadata pairs.
    pub fn final_output_arguments(&self) -> Vec<String> {
        let mut args = vec!["put".to_string()];

        for step in &self.steps {
            for output in step.config.outputs.iter().filter(|o| o.retain) {
                args.push(output.source.clone());
            }
        }

        if !self.submitter.is_empty() {
            args.push("--user".to_string());
            args.push(self.submitter.clone());
        }
        if let Some(dir) = self.output_dir.as_deref().filter(|d| !d.is_empty()) {
            args.push("--destination".to_string());
            args.push(dir.to_string());
        }
        args.extend(metadata_arguments(&self.file_metadata));

        args
    }

    /// Every volumes-from descriptor declared by any step, in step order
    pub fn volumes_from(&self) -> impl Iterator<Item = &VolumesFrom> {
        self.steps
            .iter()
            .flat_map(|s| s.component.container.volumes_from.iter())
    }
}

/// One pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub component: Component,
    #[serde(default)]
    pub config: StepConfig,
    /// Literal command arguments, passed to the container untouched
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub name: String,
    pub container: ContainerSettings,
}

/// Container template declared by a component
///
/// Zero-valued fields keep the daemon's meaning: a memory limit of 0 is
/// unlimited, 0 CPU shares is the default weight, an empty network mode is
/// the daemon's default network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContainerSettings {
    #[serde(default)]
    pub name: String,
    pub image: ContainerImage,
    #[serde(default)]
    pub entrypoint: String,
    #[serde(default)]
    pub memory_limit: i64,
    #[serde(default)]
    pub cpu_shares: i64,
    #[serde(default)]
    pub network_mode: String,
    #[serde(default)]
    pub working_dir: String,
    #[serde(default)]
    pub environment: IndexMap<String, String>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub volumes_from: Vec<VolumesFrom>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerImage {
    pub name: String,
    #[serde(default = "default_tag")]
    pub tag: String,
}

fn default_tag() -> String {
    "latest".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub host_path: String,
    pub container_path: String,
    #[serde(default = "default_cgroup_permissions")]
    pub cgroup_permissions: String,
}

fn default_cgroup_permissions() -> String {
    "rwm".to_string()
}

/// Host bind mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Shared-data container descriptor
///
/// The container is created from `name:tag`, never started, and referenced
/// by other containers through `volumes_from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumesFrom {
    pub name: String,
    pub name_prefix: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub host_path: String,
    pub container_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StepConfig {
    #[serde(default)]
    pub inputs: Vec<StepInput>,
    #[serde(default)]
    pub outputs: Vec<StepOutput>,
}

/// Input staged into the working directory before a step runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepInput {
    #[serde(default)]
    pub id: String,
    /// Source path or URI
    pub value: String,
}

impl StepInput {
    /// Argument list for the download container
    pub fn arguments(&self, submitter: &str, metadata: &[FileMetadata]) -> Vec<String> {
        let mut args = vec![
            "get".to_string(),
            "--source".to_string(),
            self.value.clone(),
        ];
        if !submitter.is_empty() {
            args.push("--user".to_string());
            args.push(submitter.to_string());
        }
        args.extend(metadata_arguments(metadata));
        args
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    #[serde(default)]
    pub name: String,
    pub source: String,
    #[serde(default = "default_retain")]
    pub retain: bool,
}

fn default_retain() -> bool {
    true
}

/// AVU triple attached to every transferred file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub attribute: String,
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

impl FileMetadata {
    pub fn argument(&self) -> [String; 2] {
        [
            "-m".to_string(),
            format!("{},{},{}", self.attribute, self.value, self.unit),
        ]
    }
}

fn metadata_arguments(metadata: &[FileMetadata]) -> impl Iterator<Item = String> + '_ {
    metadata.iter().flat_map(|m| m.argument())
}
