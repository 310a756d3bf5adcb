/// Lifecycle Engine - Drives Containers Through Their Lifecycle
///
/// **Core Responsibility:**
/// Run one container role to completion and report its exit code.
///
/// **Lifecycle (per container):**
/// Unpulled → Pulled → NameChecked → Created → Attached → Running → Exited
///
/// **Critical Ordering Guarantees:**
/// - Log files are opened before the daemon is touched
/// - A stale container with the same name is removed before create
/// - Attach is established before start
/// - Removal is caller-directed, so failed containers stay inspectable
///
/// **Concurrency:**
/// Every call is a single sequential protocol. Callers may run independent
/// roles concurrently against one shared engine.

use crate::capture::LogPair;
use crate::docker::ContainerRuntime;
use crate::error::{LifecycleError, Result, RuntimeError};
use crate::spec::{self, ContainerRole, ContainerSpec};
use conduit_common::naming::{self, Role, Stream, INVOCATION_LABEL};
use conduit_common::types::{Job, Step, StepInput, VolumesFrom};
use conduit_common::Config;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct Engine<R: ContainerRuntime> {
    runtime: Arc<R>,
    config: Config,
    cancel: watch::Receiver<bool>,
}

impl<R: ContainerRuntime> Engine<R> {
    pub fn new(runtime: Arc<R>, config: Config) -> Self {
        // Sender dropped: never cancelled
        let (_, cancel) = watch::channel(false);
        Self {
            runtime,
            config,
            cancel,
        }
    }

    /// Abort blocking operations once `true` is published on the channel
    pub fn with_cancellation(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a step container and return its exit code
    pub async fn run_step(
        &self,
        job: &Job,
        step: &Step,
        index: usize,
    ) -> std::result::Result<i64, LifecycleError> {
        let logs = (
            naming::step_log_path(&self.config.log_dir, step, Stream::Stdout, index, &job.invocation_id),
            naming::step_log_path(&self.config.log_dir, step, Stream::Stderr, index, &job.invocation_id),
        );
        self.run(&ContainerRole::Step { job, step, index }, Some(logs))
            .await
    }

    /// Stage one input into the host working directory
    pub async fn download_inputs(
        &self,
        job: &Job,
        input: &StepInput,
        index: usize,
    ) -> std::result::Result<i64, LifecycleError> {
        let logs = self.log_paths(Role::Download, &index.to_string(), &job.invocation_id);
        self.run(&ContainerRole::Download { job, input, index }, Some(logs))
            .await
    }

    /// Stage every retained output out of the host working directory
    pub async fn upload_outputs(&self, job: &Job) -> std::result::Result<i64, LifecycleError> {
        let logs = self.log_paths(Role::Upload, "output", &job.invocation_id);
        self.run(&ContainerRole::Upload { job }, Some(logs)).await
    }

    /// Create (never start) a container that holds a shared mount point
    ///
    /// Always returns 0 once the container exists.
    pub async fn create_data_container(
        &self,
        volumes_from: &VolumesFrom,
        invocation_id: &str,
    ) -> std::result::Result<i64, LifecycleError> {
        self.run(
            &ContainerRole::SharedData {
                volumes_from,
                invocation_id,
            },
            None,
        )
        .await
    }

    /// Remove a container by name; a missing container is not an error
    pub async fn remove_container(&self, name: &str) -> Result<()> {
        info!(container = %name, "Removing container");
        self.runtime.remove(name).await
    }

    /// Remove every container labelled with the invocation id
    ///
    /// Returns how many containers were removed.
    pub async fn remove_invocation(&self, invocation_id: &str) -> Result<usize> {
        let names = self
            .runtime
            .list_by_label(INVOCATION_LABEL, invocation_id)
            .await?;

        for name in &names {
            self.remove_container(name).await?;
        }

        info!(
            invocation_id = %invocation_id,
            removed = names.len(),
            "Removed invocation containers"
        );
        Ok(names.len())
    }

    /// Run a whole job: data containers, then inputs and step for each step
    /// in order, then one upload
    ///
    /// Stops at the first non-zero exit code and returns it. The upload still
    /// runs when at least one step ran, so partial results are staged out.
    pub async fn run_job(&self, job: &Job) -> std::result::Result<i64, LifecycleError> {
        info!(
            invocation_id = %job.invocation_id,
            steps = job.steps.len(),
            "Running job"
        );

        let mut seen = HashSet::new();
        for volumes_from in job.volumes_from() {
            if seen.insert(naming::data_container_name(volumes_from, &job.invocation_id)) {
                self.create_data_container(volumes_from, &job.invocation_id)
                    .await?;
            }
        }

        let mut exit_code = 0;
        let mut steps_ran = 0;
        let mut input_index = 0;

        'steps: for (index, step) in job.steps.iter().enumerate() {
            for input in &step.config.inputs {
                exit_code = self.download_inputs(job, input, input_index).await?;
                input_index += 1;
                if exit_code != 0 {
                    warn!(
                        invocation_id = %job.invocation_id,
                        step = index,
                        exit_code,
                        "Input download failed"
                    );
                    break 'steps;
                }
            }

            exit_code = self.run_step(job, step, index).await?;
            steps_ran += 1;
            if exit_code != 0 {
                warn!(
                    invocation_id = %job.invocation_id,
                    step = index,
                    exit_code,
                    "Step failed"
                );
                break;
            }
        }

        if steps_ran > 0 {
            let upload_code = self.upload_outputs(job).await?;
            if exit_code == 0 {
                exit_code = upload_code;
            }
        }

        info!(invocation_id = %job.invocation_id, exit_code, "Job finished");
        Ok(exit_code)
    }

    fn log_paths(&self, role: Role, index: &str, invocation_id: &str) -> (PathBuf, PathBuf) {
        (
            naming::log_path(&self.config.log_dir, role, Stream::Stdout, index, invocation_id),
            naming::log_path(&self.config.log_dir, role, Stream::Stderr, index, invocation_id),
        )
    }

    async fn run(
        &self,
        role: &ContainerRole<'_>,
        logs: Option<(PathBuf, PathBuf)>,
    ) -> std::result::Result<i64, LifecycleError> {
        let fail = |kind| LifecycleError {
            role: role.kind(),
            container: role.container_name(),
            invocation_id: role.invocation_id().to_string(),
            kind,
        };

        let spec = spec::build(role, &self.config).map_err(fail)?;

        let mut logs = match logs {
            Some((stdout, stderr)) => Some(LogPair::open(stdout, stderr).await.map_err(fail)?),
            None => None,
        };

        info!(
            role = %role.kind(),
            container = %spec.name,
            invocation_id = %role.invocation_id(),
            image = %spec.image,
            "Starting container lifecycle"
        );

        let mut created = false;
        let outcome = self
            .drive(role, &spec, logs.as_mut(), &mut created)
            .await;

        let log_files = logs
            .as_ref()
            .map(|l| (l.stdout_path.clone(), l.stderr_path.clone()));
        let flushed = match logs {
            Some(logs) => logs.finish().await,
            None => Ok(()),
        };

        match outcome {
            Ok(exit_code) => {
                flushed.map_err(fail)?;
                info!(
                    role = %role.kind(),
                    container = %spec.name,
                    exit_code,
                    stdout = ?log_files.as_ref().map(|(stdout, _)| stdout),
                    stderr = ?log_files.as_ref().map(|(_, stderr)| stderr),
                    "Container exited"
                );
                Ok(exit_code)
            }
            Err(kind) => {
                if let Err(e) = flushed {
                    warn!(container = %spec.name, error = %e, "Failed to flush container logs");
                }
                // Only a container this run asked for; an older one keeps its name
                if kind.is_cancelled() && created {
                    if let Err(e) = self.runtime.remove(&spec.name).await {
                        warn!(container = %spec.name, error = %e, "Cleanup after cancellation failed");
                    }
                }
                Err(fail(kind))
            }
        }
    }

    async fn drive(
        &self,
        role: &ContainerRole<'_>,
        spec: &ContainerSpec,
        logs: Option<&mut LogPair>,
        created: &mut bool,
    ) -> Result<i64> {
        let (image, tag) = role.image(&self.config);
        self.cancellable(self.runtime.pull(image, tag)).await?;

        if self
            .cancellable(self.runtime.container_exists(&spec.name))
            .await?
        {
            warn!(container = %spec.name, "Removing stale container from an earlier run");
            self.runtime.remove(&spec.name).await?;
        }

        // Set before the request: a cancelled create may still land on the daemon
        *created = true;
        let id = self.cancellable(self.runtime.create(spec)).await?;
        debug!(container = %spec.name, container_id = %id, "Container created");

        // Data containers only need to exist
        let Some(logs) = logs else {
            return Ok(0);
        };

        self.cancellable(
            self.runtime
                .attach_and_start(&id, &mut logs.stdout, &mut logs.stderr),
        )
        .await?;

        self.cancellable(self.runtime.wait(&id)).await
    }

    async fn cancellable<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let mut cancel = self.cancel.clone();
        if *cancel.borrow_and_update() {
            return Err(RuntimeError::Cancelled);
        }

        tokio::select! {
            result = operation => result,
            _ = cancelled(&mut cancel) => Err(RuntimeError::Cancelled),
        }
    }
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if cancel.changed().await.is_err() {
            // No sender left, cancellation can never arrive
            std::future::pending::<()>().await;
        }
        if *cancel.borrow_and_update() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::fake::{Call, FakeRuntime};
    use crate::spec::tests::{test_config, test_job};
    use std::time::Duration;
    use tempfile::TempDir;

    fn engine(runtime: FakeRuntime, dir: &TempDir) -> Engine<FakeRuntime> {
        let mut config = test_config();
        config.log_dir = dir.path().join("logs");
        Engine::new(Arc::new(runtime), config)
    }

    fn hi_runtime() -> FakeRuntime {
        FakeRuntime {
            stdout: b"hi\n".to_vec(),
            ..FakeRuntime::new()
        }
    }

    #[tokio::test]
    async fn test_run_step_captures_output() {
        let dir = TempDir::new().unwrap();
        let runtime = hi_runtime();
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();

        let exit_code = engine.run_step(&job, &job.steps[0], 0).await.unwrap();

        assert_eq!(exit_code, 0);
        let stdout_path = naming::step_log_path(
            &engine.config().log_dir,
            &job.steps[0],
            Stream::Stdout,
            0,
            &job.invocation_id,
        );
        let stdout = std::fs::read_to_string(stdout_path).unwrap();
        assert_eq!(stdout.trim(), "hi");

        let name = format!("echo-test-{}", job.invocation_id);
        assert_eq!(
            runtime.calls(),
            vec![
                Call::Pull("alpine:latest".to_string()),
                Call::Exists(name.clone()),
                Call::Create(name),
                Call::AttachAndStart("fake-1".to_string()),
                Call::Wait("fake-1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_stale_container_removed_before_create() {
        let dir = TempDir::new().unwrap();
        let job = test_job();
        let name = format!("echo-test-{}", job.invocation_id);
        let runtime = hi_runtime().with_existing(&format!("/{}", name), &job.invocation_id);
        let engine = engine(runtime.clone(), &dir);

        engine.run_step(&job, &job.steps[0], 0).await.unwrap();

        let calls = runtime.calls();
        let removes: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, Call::Remove(_)))
            .collect();
        let creates: Vec<_> = calls
            .iter()
            .filter(|c| matches!(c, Call::Create(_)))
            .collect();
        assert_eq!(removes, vec![&Call::Remove(name.clone())]);
        assert_eq!(creates, vec![&Call::Create(name.clone())]);

        let remove_at = calls.iter().position(|c| matches!(c, Call::Remove(_)));
        let create_at = calls.iter().position(|c| matches!(c, Call::Create(_)));
        assert!(remove_at < create_at);
        assert_eq!(runtime.container_names(), vec![name]);
    }

    #[tokio::test]
    async fn test_rerun_same_invocation_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let runtime = hi_runtime();
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();

        engine.run_step(&job, &job.steps[0], 0).await.unwrap();
        engine.run_step(&job, &job.steps[0], 0).await.unwrap();

        let created: Vec<_> = runtime.created().into_iter().map(|s| s.name).collect();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0], created[1]);
        assert_eq!(runtime.container_names(), vec![created[0].clone()]);

        // Both runs appended to the same log file
        let stdout_path = naming::step_log_path(
            &engine.config().log_dir,
            &job.steps[0],
            Stream::Stdout,
            0,
            &job.invocation_id,
        );
        assert_eq!(std::fs::read_to_string(stdout_path).unwrap(), "hi\nhi\n");
    }

    #[tokio::test]
    async fn test_log_setup_failure_touches_no_container() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();

        let runtime = hi_runtime();
        let mut config = test_config();
        config.log_dir = blocker.join("logs");
        let engine = Engine::new(Arc::new(runtime.clone()), config);
        let job = test_job();

        let err = engine.run_step(&job, &job.steps[0], 0).await.unwrap_err();

        assert!(matches!(err.kind, RuntimeError::LogSetupFailed { .. }));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_spec_fails_before_daemon() {
        let dir = TempDir::new().unwrap();
        let runtime = hi_runtime();
        let engine = engine(runtime.clone(), &dir);
        let mut job = test_job();
        job.steps[0].component.container.image.name = String::new();

        let err = engine.run_step(&job, &job.steps[0], 0).await.unwrap_err();

        assert!(matches!(err.kind, RuntimeError::InvalidSpec(_)));
        assert!(runtime.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pull_failure_carries_context() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime {
            fail_pull: true,
            ..FakeRuntime::new()
        };
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();

        let err = engine.download_inputs(&job, &job.steps[0].config.inputs[0], 0).await.unwrap_err();

        assert_eq!(err.role, Role::Download);
        assert_eq!(err.container, format!("input-0-{}", job.invocation_id));
        assert_eq!(err.invocation_id, job.invocation_id);
        assert!(matches!(err.kind, RuntimeError::PullFailed { .. }));
        assert!(!runtime.calls().iter().any(|c| matches!(c, Call::Create(_))));
    }

    #[tokio::test]
    async fn test_attach_failure_never_waits_and_keeps_container() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime {
            fail_attach: true,
            ..FakeRuntime::new()
        };
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();

        let err = engine.run_step(&job, &job.steps[0], 0).await.unwrap_err();

        assert!(matches!(err.kind, RuntimeError::AttachFailed { .. }));
        let calls = runtime.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Wait(_))));
        assert!(!calls.iter().any(|c| matches!(c, Call::Remove(_))));
        assert_eq!(runtime.container_names().len(), 1);
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_is_reported() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime {
            stderr: b"sh: boom: not found\n".to_vec(),
            exit_code: 127,
            ..FakeRuntime::new()
        };
        let engine = engine(runtime, &dir);
        let job = test_job();

        let exit_code = engine.run_step(&job, &job.steps[0], 0).await.unwrap();

        assert_eq!(exit_code, 127);
        let stderr_path = naming::step_log_path(
            &engine.config().log_dir,
            &job.steps[0],
            Stream::Stderr,
            0,
            &job.invocation_id,
        );
        assert!(std::fs::read_to_string(stderr_path).unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_cancellation_removes_created_container() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime {
            hang_on_wait: true,
            ..FakeRuntime::new()
        };
        let (tx, rx) = watch::channel(false);
        let engine = engine(runtime.clone(), &dir).with_cancellation(rx);
        let job = test_job();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let err = engine.run_step(&job, &job.steps[0], 0).await.unwrap_err();

        assert!(err.kind.is_cancelled());
        let name = format!("echo-test-{}", job.invocation_id);
        assert_eq!(runtime.calls().last(), Some(&Call::Remove(name)));
        assert!(runtime.container_names().is_empty());
    }

    #[tokio::test]
    async fn test_already_cancelled_never_creates() {
        let dir = TempDir::new().unwrap();
        let runtime = hi_runtime();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let engine = engine(runtime.clone(), &dir).with_cancellation(rx);
        let job = test_job();

        let err = engine.upload_outputs(&job).await.unwrap_err();

        assert!(err.kind.is_cancelled());
        assert!(runtime.created().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_create_keeps_existing_container() {
        let dir = TempDir::new().unwrap();
        let job = test_job();
        let name = format!("echo-test-{}", job.invocation_id);
        let runtime = hi_runtime().with_existing(&name, &job.invocation_id);
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let engine = engine(runtime.clone(), &dir).with_cancellation(rx);

        let err = engine.run_step(&job, &job.steps[0], 0).await.unwrap_err();

        assert!(err.kind.is_cancelled());
        assert!(!runtime.calls().iter().any(|c| matches!(c, Call::Remove(_))));
        assert_eq!(runtime.container_names(), vec![name]);
    }

    #[tokio::test]
    async fn test_cancellation_during_pull_leaves_daemon_untouched() {
        let dir = TempDir::new().unwrap();
        let job = test_job();
        let name = format!("echo-test-{}", job.invocation_id);
        let runtime = FakeRuntime {
            hang_on_pull: true,
            ..FakeRuntime::new()
        }
        .with_existing(&name, &job.invocation_id);
        let (tx, rx) = watch::channel(false);
        let engine = engine(runtime.clone(), &dir).with_cancellation(rx);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let err = engine.run_step(&job, &job.steps[0], 0).await.unwrap_err();

        assert!(err.kind.is_cancelled());
        assert_eq!(runtime.calls(), vec![Call::Pull("alpine:latest".to_string())]);
        assert_eq!(runtime.container_names(), vec![name]);
    }

    #[tokio::test]
    async fn test_cancellation_during_attach_removes_created_container() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime {
            hang_on_attach: true,
            ..FakeRuntime::new()
        };
        let (tx, rx) = watch::channel(false);
        let engine = engine(runtime.clone(), &dir).with_cancellation(rx);
        let job = test_job();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let err = engine.run_step(&job, &job.steps[0], 0).await.unwrap_err();

        assert!(err.kind.is_cancelled());
        let name = format!("echo-test-{}", job.invocation_id);
        let calls = runtime.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::Wait(_))));
        assert_eq!(calls.last(), Some(&Call::Remove(name)));
        assert!(runtime.container_names().is_empty());
    }

    #[tokio::test]
    async fn test_upload_outputs_container() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime {
            stdout: b"put /de-app-work/out.txt\n".to_vec(),
            ..FakeRuntime::new()
        };
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();

        let exit_code = engine.upload_outputs(&job).await.unwrap();

        assert_eq!(exit_code, 0);
        let created = runtime.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, format!("output-{}", job.invocation_id));
        assert_eq!(created[0].cmd, vec!["put", "/de-app-work/out.txt"]);
        assert_eq!(created[0].working_dir.as_deref(), Some("/de-app-work"));
        assert_eq!(runtime.calls()[0], Call::Pull("discoenv/porklock:test".to_string()));

        let stdout_path = naming::log_path(
            &engine.config().log_dir,
            Role::Upload,
            Stream::Stdout,
            "output",
            &job.invocation_id,
        );
        assert_eq!(
            std::fs::read_to_string(stdout_path).unwrap().trim(),
            job.final_output_arguments().join(" ")
        );
    }

    #[tokio::test]
    async fn test_download_inputs_command_matches_arguments() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();
        let input = &job.steps[0].config.inputs[0];

        engine.download_inputs(&job, input, 0).await.unwrap();

        let created = runtime.created();
        assert_eq!(created[0].cmd, input.arguments(&job.submitter, &job.file_metadata));
        assert_eq!(created[0].binds, vec!["/tmp/job-work:/de-app-work:rw"]);
    }

    #[tokio::test]
    async fn test_create_data_container_is_never_started() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();
        let vf = &job.steps[0].component.container.volumes_from[0];

        let exit_code = engine
            .create_data_container(vf, &job.invocation_id)
            .await
            .unwrap();

        assert_eq!(exit_code, 0);
        let calls = runtime.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::AttachAndStart(_) | Call::Wait(_))));
        assert_eq!(
            runtime.container_names(),
            vec![format!("echo-test-data-{}", job.invocation_id)]
        );
    }

    #[tokio::test]
    async fn test_remove_missing_container_succeeds() {
        let dir = TempDir::new().unwrap();
        let engine = engine(FakeRuntime::new(), &dir);
        engine.remove_container("test_not_there").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_invocation_only_touches_labelled_containers() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new().with_existing("someone-else", "other-invocation");
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();

        engine.run_job(&job).await.unwrap();
        let removed = engine.remove_invocation(&job.invocation_id).await.unwrap();

        // data, input, step and output containers
        assert_eq!(removed, 4);
        assert_eq!(runtime.container_names(), vec!["someone-else".to_string()]);
    }

    #[tokio::test]
    async fn test_run_job_order() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime::new();
        let engine = engine(runtime.clone(), &dir);
        let job = test_job();

        let exit_code = engine.run_job(&job).await.unwrap();

        assert_eq!(exit_code, 0);
        let created: Vec<_> = runtime.created().into_iter().map(|s| s.name).collect();
        assert_eq!(
            created,
            vec![
                format!("echo-test-data-{}", job.invocation_id),
                format!("input-0-{}", job.invocation_id),
                format!("echo-test-{}", job.invocation_id),
                format!("output-{}", job.invocation_id),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_job_stops_on_failure_but_uploads() {
        let dir = TempDir::new().unwrap();
        let runtime = FakeRuntime {
            exit_code: 2,
            ..FakeRuntime::new()
        };
        let engine = engine(runtime.clone(), &dir);
        let mut job = test_job();
        job.steps[0].config.inputs.clear();
        let second = job.steps[0].clone();
        job.steps.push(second);
        job.steps[1].component.container.name = String::new();

        let exit_code = engine.run_job(&job).await.unwrap();

        assert_eq!(exit_code, 2);
        let created: Vec<_> = runtime.created().into_iter().map(|s| s.name).collect();
        assert!(!created.contains(&format!("step-1-{}", job.invocation_id)));
        assert_eq!(created.last(), Some(&format!("output-{}", job.invocation_id)));
    }
}
