//! Output capture for attached containers
//!
//! Each executed container gets one stdout and one stderr file, opened in
//! append mode before the daemon is touched.

use crate::error::{Result, RuntimeError};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Open log file pair for one container run
pub struct LogPair {
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub stdout: File,
    pub stderr: File,
}

impl LogPair {
    /// Open (or create) both files; parent directories are created as needed
    pub async fn open(stdout_path: PathBuf, stderr_path: PathBuf) -> Result<Self> {
        let stdout = open_append(&stdout_path).await?;
        let stderr = open_append(&stderr_path).await?;

        debug!(
            stdout = %stdout_path.display(),
            stderr = %stderr_path.display(),
            "Opened container log files"
        );

        Ok(Self {
            stdout_path,
            stderr_path,
            stdout,
            stderr,
        })
    }

    /// Flush and close both files
    pub async fn finish(mut self) -> Result<()> {
        self.stdout
            .flush()
            .await
            .map_err(RuntimeError::LogWriteFailed)?;
        self.stderr
            .flush()
            .await
            .map_err(RuntimeError::LogWriteFailed)?;
        self.stdout
            .sync_all()
            .await
            .map_err(RuntimeError::LogWriteFailed)?;
        self.stderr
            .sync_all()
            .await
            .map_err(RuntimeError::LogWriteFailed)?;
        Ok(())
    }
}

async fn open_append(path: &Path) -> Result<File> {
    let setup_failed = |source| RuntimeError::LogSetupFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(setup_failed)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(setup_failed)
}
