//! Container naming semantics - defines only semantics, not runtime logic
//! Ensures the engine and its cleanup paths never drift: every name is
//! derived from role, index and invocation id, so a retry of the same
//! invocation lands on the same name.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::types::{Step, VolumesFrom};

/// Label carrying the invocation id on every container the engine creates
pub const INVOCATION_LABEL: &str = "conduit.invocation-id";

/// Container role within one job execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Step,
    Download,
    Upload,
    SharedData,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Step => write!(f, "step"),
            Role::Download => write!(f, "input"),
            Role::Upload => write!(f, "output"),
            Role::SharedData => write!(f, "data"),
        }
    }
}

/// Captured stream of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Step container name: the component's declared container name, or the
/// step index when the component leaves it blank
pub fn step_container_name(step: &Step, index: usize, invocation_id: &str) -> String {
    let declared = step.component.container.name.trim();
    if declared.is_empty() {
        format!("{}-{}-{}", Role::Step, index, invocation_id)
    } else {
        format!("{}-{}", declared, invocation_id)
    }
}

pub fn download_container_name(index: usize, invocation_id: &str) -> String {
    format!("{}-{}-{}", Role::Download, index, invocation_id)
}

pub fn upload_container_name(invocation_id: &str) -> String {
    format!("{}-{}", Role::Upload, invocation_id)
}

pub fn data_container_name(volumes_from: &VolumesFrom, invocation_id: &str) -> String {
    format!("{}-{}", volumes_from.name_prefix, invocation_id)
}

/// Strip the daemon's leading-slash convention for comparison
pub fn normalize(name: &str) -> &str {
    name.trim_start_matches('/')
}

pub fn same_container_name(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Log file path for one stream of one container run
///
/// `index` is the step/input index, or `output` for the upload container.
pub fn log_path(
    log_dir: &Path,
    role: Role,
    stream: Stream,
    index: &str,
    invocation_id: &str,
) -> PathBuf {
    log_dir.join(format!("{}-{}-{}-{}.log", role, stream, index, invocation_id))
}

/// Step log paths honour an explicit per-step override
pub fn step_log_path(
    log_dir: &Path,
    step: &Step,
    stream: Stream,
    index: usize,
    invocation_id: &str,
) -> PathBuf {
    let explicit = match stream {
        Stream::Stdout => step.stdout_path.as_deref(),
        Stream::Stderr => step.stderr_path.as_deref(),
    };
    match explicit.filter(|p| !p.is_empty()) {
        Some(path) => PathBuf::from(path),
        None => log_path(log_dir, Role::Step, stream, &index.to_string(), invocation_id),
    }
}
