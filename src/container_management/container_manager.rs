use crate::challenges::ChallengeCatalog;
use crate::configuration::types::ContainerSettings;
use crate::container_management::docker_driver::ContainerDriver;
use crate::container_management::types::{BindMount, ContainerSpec, ExecSpec, ExecStream};
use crate::error_handling::types::{ContainerError, DriverError};
use chrono::Utc;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Label carrying the owning user id. Doubles as the selector for
/// "every container this system created".
pub const LABEL_USER_ID: &str = "challenges.user_id";
pub const LABEL_CHALLENGE_ID: &str = "challenges.challenge_id";
pub const LABEL_CREATED_AT: &str = "challenges.created_at";

/// Mount point of the challenge directory inside the container.
pub const CHALLENGE_MOUNT: &str = "/challenge";

const STOP_GRACE_SECONDS: i64 = 5;

/// Dockerfile for the base image: minimum shell toolset, non-root user,
/// a main process that idles until the engine stops it.
const BASE_DOCKERFILE: &str = r#"FROM debian:bookworm-slim
RUN apt-get update \
    && apt-get install -y --no-install-recommends \
        bash coreutils procps grep sed python3 \
    && rm -rf /var/lib/apt/lists/*
RUN useradd --create-home --shell /bin/bash challenger
USER challenger
WORKDIR /home/challenger
CMD ["sleep", "infinity"]
"#;

/// Orchestrates challenge container lifecycle on top of a
/// [`ContainerDriver`].
///
/// The manager is stateless apart from the lazily-set "image built"
/// flag; every container it creates carries ownership labels so that
/// cleanup can find stragglers without local bookkeeping.
pub struct ContainerManager {
    driver: Arc<dyn ContainerDriver>,
    settings: ContainerSettings,
    catalog: Arc<dyn ChallengeCatalog>,
    /// Build-or-wait guard: concurrent `ensure_image` callers collapse
    /// to at most one build.
    image_ready: Mutex<bool>,
}

impl ContainerManager {
    pub fn new(
        driver: Arc<dyn ContainerDriver>,
        settings: ContainerSettings,
        catalog: Arc<dyn ChallengeCatalog>,
    ) -> Self {
        Self {
            driver,
            settings,
            catalog,
            image_ready: Mutex::new(false),
        }
    }

    /// Makes sure the base image exists, building it from the embedded
    /// Dockerfile when missing. Idempotent.
    pub async fn ensure_image(&self) -> Result<(), ContainerError> {
        let mut ready = self.image_ready.lock().await;
        if *ready {
            return Ok(());
        }

        let name = &self.settings.image_name;
        let exists = self
            .driver
            .image_exists(name)
            .await
            .map_err(|e| ContainerError::ImageBuildFailed(e.to_string()))?;
        if !exists {
            info!("base image {} missing, building it", name);
            self.driver
                .build_image(name, BASE_DOCKERFILE.as_bytes())
                .await
                .map_err(|e| ContainerError::ImageBuildFailed(e.to_string()))?;
            info!("base image {} built", name);
        }

        *ready = true;
        Ok(())
    }

    /// Creates and starts a container for the given challenge.
    ///
    /// The challenge directory is mounted read-only at `/challenge`; if
    /// it contains a `setup.sh`, the script is executed and its output
    /// drained before the container is handed out.
    pub async fn create_for_challenge(
        &self,
        challenge_id: i64,
        user_id: i64,
    ) -> Result<String, ContainerError> {
        let dir = self
            .catalog
            .dir(challenge_id)
            .ok_or(ContainerError::ChallengeNotFound(challenge_id))?;
        if !dir.is_absolute() {
            return Err(ContainerError::CreationFailed(format!(
                "challenge directory {} is not absolute",
                dir.display()
            )));
        }

        let mut labels = HashMap::new();
        labels.insert(LABEL_USER_ID.to_string(), user_id.to_string());
        labels.insert(LABEL_CHALLENGE_ID.to_string(), challenge_id.to_string());
        labels.insert(LABEL_CREATED_AT.to_string(), Utc::now().to_rfc3339());

        let has_setup = dir.join("setup.sh").is_file();
        let spec = ContainerSpec {
            image: self.settings.image_name.clone(),
            tty: true,
            mounts: vec![BindMount {
                source: dir,
                target: CHALLENGE_MOUNT.to_string(),
                read_only: true,
            }],
            memory_bytes: self.settings.memory_bytes,
            cpu_nanocores: self.settings.cpu_nanocores,
            pids_limit: self.settings.pids_limit,
            network_mode: self.settings.network_mode.clone(),
            labels,
        };

        let container_id = self
            .driver
            .create_container(&spec)
            .await
            .map_err(|e| ContainerError::CreationFailed(e.to_string()))?;

        if let Err(e) = self.driver.start_container(&container_id).await {
            let _ = self.driver.remove_container(&container_id, true).await;
            return Err(ContainerError::StartFailed(e.to_string()));
        }

        if has_setup {
            match self.run_script(&container_id, "/challenge/setup.sh").await {
                Ok(Some(0)) => {}
                Ok(code) => warn!(
                    "setup script for challenge {} exited with {:?}",
                    challenge_id, code
                ),
                Err(e) => warn!(
                    "setup script for challenge {} failed to run: {}",
                    challenge_id, e
                ),
            }
        }

        info!(
            "created container {} for user {} challenge {}",
            container_id, user_id, challenge_id
        );
        Ok(container_id)
    }

    /// Runs the challenge's validation script and reports whether it
    /// exited 0. Transport failures count as non-success; the caller
    /// still records the attempt.
    pub async fn validate(&self, container_id: &str, challenge_id: i64) -> bool {
        match self.run_script(container_id, "/challenge/validate.sh").await {
            Ok(Some(0)) => {
                info!(
                    "validation passed for challenge {} in container {}",
                    challenge_id, container_id
                );
                true
            }
            Ok(code) => {
                info!(
                    "validation for challenge {} exited with {:?}",
                    challenge_id, code
                );
                false
            }
            Err(e) => {
                warn!(
                    "validation transport failure in container {}: {}",
                    container_id, e
                );
                false
            }
        }
    }

    /// Opens an interactive bash with a TTY inside the container.
    ///
    /// The tty flag is set on both the exec creation and the exec start;
    /// without it the engine frames stdout/stderr with an 8-byte header
    /// that corrupts terminal rendering.
    pub async fn attach_pty(&self, container_id: &str) -> Result<ExecStream, ContainerError> {
        let exec_id = self
            .driver
            .exec_create(
                container_id,
                &ExecSpec {
                    cmd: vec!["/bin/bash".to_string()],
                    attach_stdin: true,
                    attach_stdout: true,
                    attach_stderr: true,
                    tty: true,
                },
            )
            .await
            .map_err(|e| ContainerError::AttachFailed(e.to_string()))?;

        self.driver
            .exec_start(&exec_id, true, true)
            .await
            .map_err(|e| ContainerError::AttachFailed(e.to_string()))
    }

    /// Stops (grace 5 s, failures swallowed — the container may already
    /// be dead) and force-removes the container.
    pub async fn remove(&self, container_id: &str) -> Result<(), ContainerError> {
        if let Err(e) = self
            .driver
            .stop_container(container_id, STOP_GRACE_SECONDS)
            .await
        {
            debug!("stop of container {} failed: {}", container_id, e);
        }
        self.driver
            .remove_container(container_id, true)
            .await
            .map_err(|e| ContainerError::RemoveFailed(e.to_string()))
    }

    /// Removes every container this system created, continuing past
    /// individual failures and returning the first one.
    pub async fn cleanup_all(&self) -> Result<usize, ContainerError> {
        let ids = self
            .driver
            .list_containers(LABEL_USER_ID)
            .await
            .map_err(|e| ContainerError::RemoveFailed(e.to_string()))?;

        let mut removed = 0;
        let mut first_error = None;
        for id in ids {
            match self.remove(&id).await {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!("failed to remove container {}: {}", id, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Executes a script attached and drains its output to completion.
    ///
    /// Draining is part of the contract: on many engines the exec's
    /// exit code is undefined until end-of-stream.
    async fn run_script(
        &self,
        container_id: &str,
        script: &str,
    ) -> Result<Option<i64>, DriverError> {
        let exec_id = self
            .driver
            .exec_create(
                container_id,
                &ExecSpec {
                    cmd: vec!["/bin/bash".to_string(), script.to_string()],
                    attach_stdin: false,
                    attach_stdout: true,
                    attach_stderr: true,
                    tty: false,
                },
            )
            .await?;

        let mut stream = self.driver.exec_start(&exec_id, true, false).await?;
        while let Some(chunk) = stream.output.next().await {
            let bytes = chunk?;
            let text = String::from_utf8_lossy(&bytes);
            let text = text.trim_end();
            if !text.is_empty() {
                debug!("{}[{}]: {}", script, container_id, text);
            }
        }

        let status = self.driver.exec_inspect(&exec_id).await?;
        Ok(status.exit_code)
    }
}
