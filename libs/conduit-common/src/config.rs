use std::env;
use std::path::PathBuf;

/// Engine configuration
/// Provides defaults with environment variable overrides
///
/// Passed explicitly into every engine; there is no global instance.
#[derive(Debug, Clone)]
pub struct Config {
    pub docker_uri: String,
    /// Transfer agent image used by download and upload containers
    pub transfer_image: String,
    pub transfer_tag: String,
    pub log_dir: PathBuf,
    /// Host directory bound into transfer containers
    pub host_work_dir: PathBuf,
    pub step_working_dir: String,
    pub transfer_working_dir: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            docker_uri: env::var("DOCKER_URI")
                .unwrap_or_else(|_| "unix:///var/run/docker.sock".to_string()),
            transfer_image: env::var("TRANSFER_IMAGE")
                .unwrap_or_else(|_| "discoenv/porklock".to_string()),
            transfer_tag: env::var("TRANSFER_TAG").unwrap_or_else(|_| "latest".to_string()),
            log_dir: env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),
            host_work_dir: env::var("HOST_WORK_DIR")
                .map(PathBuf::from)
                .ok()
                .or_else(|| env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from(".")),
            step_working_dir: env::var("STEP_WORKING_DIR")
                .unwrap_or_else(|_| "/work".to_string()),
            transfer_working_dir: env::var("TRANSFER_WORKING_DIR")
                .unwrap_or_else(|_| "/de-app-work".to_string()),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
