mod capture;
mod docker;
mod engine;
mod error;
mod spec;

use anyhow::{Context, Result};
use clap::Parser;
use conduit_common::{Config, Job};
use docker::DockerClient;
use engine::Engine;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "conduit-worker")]
#[command(about = "Run a job's containers against a container daemon", long_about = None)]
struct Cli {
    /// Path to the job description (JSON)
    #[arg(short, long)]
    job: PathBuf,

    /// Daemon endpoint (unix://, tcp:// or http://)
    #[arg(long, env = "DOCKER_URI")]
    docker_uri: Option<String>,

    /// Directory for container stdout/stderr files
    #[arg(long, env = "LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Transfer agent image for input and output containers
    #[arg(long, env = "TRANSFER_IMAGE")]
    transfer_image: Option<String>,

    #[arg(long, env = "TRANSFER_TAG")]
    transfer_tag: Option<String>,

    /// Remove every container of the invocation once the job finishes
    #[arg(long)]
    cleanup: bool,
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(uri) = &self.docker_uri {
            config.docker_uri = uri.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(image) = &self.transfer_image {
            config.transfer_image = image.clone();
        }
        if let Some(tag) = &self.transfer_tag {
            config.transfer_tag = tag.clone();
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let config = cli.config();

    let raw = std::fs::read_to_string(&cli.job)
        .with_context(|| format!("failed to read job file {}", cli.job.display()))?;
    let job: Job = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse job file {}", cli.job.display()))?;

    info!(
        invocation_id = %job.invocation_id,
        steps = job.steps.len(),
        docker_uri = %config.docker_uri,
        "Conduit worker booting"
    );

    let client = DockerClient::connect(&config.docker_uri)
        .await
        .context("container daemon unavailable")?;

    // Ctrl-C aborts the blocking daemon call in flight
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received shutdown signal, cancelling job");
            let _ = cancel_tx.send(true);
        }
    });

    let engine = Engine::new(Arc::new(client), config).with_cancellation(cancel_rx);
    info!(
        log_dir = %engine.config().log_dir.display(),
        transfer_image = %engine.config().transfer_image,
        "Engine ready"
    );

    let outcome = engine.run_job(&job).await;

    if cli.cleanup {
        match engine.remove_invocation(&job.invocation_id).await {
            Ok(removed) => info!(removed, "Cleaned up invocation containers"),
            Err(e) => error!(error = %e, "Failed to clean up invocation containers"),
        }
    }

    let exit_code = outcome.context("job failed")?;
    info!(invocation_id = %job.invocation_id, exit_code, "Conduit worker finished");

    if exit_code != 0 {
        std::process::exit(i32::try_from(exit_code).unwrap_or(1));
    }
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}
