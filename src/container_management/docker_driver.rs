use crate::container_management::types::{ContainerSpec, ExecSpec, ExecStatus, ExecStream};
use crate::error_handling::types::DriverError;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures_util::StreamExt;
use log::debug;
use std::collections::HashMap;

/// Capability over the container engine.
///
/// Implementations encapsulate all engine calls and nothing else: no
/// retries, no classification beyond [`DriverError`]. Higher layers
/// decide policy.
#[async_trait]
pub trait ContainerDriver: Send + Sync {
    async fn image_exists(&self, name: &str) -> Result<bool, DriverError>;

    async fn build_image(&self, name: &str, dockerfile: &[u8]) -> Result<(), DriverError>;

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DriverError>;

    async fn start_container(&self, id: &str) -> Result<(), DriverError>;

    async fn stop_container(&self, id: &str, grace_seconds: i64) -> Result<(), DriverError>;

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DriverError>;

    async fn exec_create(&self, id: &str, spec: &ExecSpec) -> Result<String, DriverError>;

    /// Starts an exec. `hijack` attaches the duplex stream; the `tty`
    /// flag must match the one given at exec creation, otherwise the
    /// engine multiplexes stdout/stderr with an 8-byte framing header.
    async fn exec_start(&self, exec_id: &str, hijack: bool, tty: bool)
        -> Result<ExecStream, DriverError>;

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecStatus, DriverError>;

    /// Lists container ids carrying the given label (any value).
    async fn list_containers(&self, label: &str) -> Result<Vec<String>, DriverError>;
}

/// [`ContainerDriver`] over the local Docker daemon.
pub struct DockerDriver {
    docker: Docker,
}

impl DockerDriver {
    /// Connects to the local daemon and verifies it answers pings.
    pub async fn connect() -> Result<Self, DriverError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DriverError::Engine(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| DriverError::Engine(format!("engine not reachable: {}", e)))?;
        Ok(Self { docker })
    }

    fn map_err(err: bollard::errors::Error) -> DriverError {
        match err {
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            } => DriverError::NotFound,
            bollard::errors::Error::DockerResponseServerError {
                status_code: 409, ..
            } => DriverError::AlreadyExists,
            other => DriverError::Engine(other.to_string()),
        }
    }

    /// Single-file tar archive used as the build context.
    fn dockerfile_context(dockerfile: &[u8]) -> Result<Vec<u8>, DriverError> {
        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header
            .set_path("Dockerfile")
            .map_err(|e| DriverError::Build(e.to_string()))?;
        header.set_size(dockerfile.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append(&header, dockerfile)
            .map_err(|e| DriverError::Build(e.to_string()))?;
        builder
            .into_inner()
            .map_err(|e| DriverError::Build(e.to_string()))
    }
}

#[async_trait]
impl ContainerDriver for DockerDriver {
    async fn image_exists(&self, name: &str) -> Result<bool, DriverError> {
        match self.docker.inspect_image(name).await {
            Ok(_) => Ok(true),
            Err(e) => match Self::map_err(e) {
                DriverError::NotFound => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn build_image(&self, name: &str, dockerfile: &[u8]) -> Result<(), DriverError> {
        let context = Self::dockerfile_context(dockerfile)?;
        let options = BuildImageOptions {
            t: name.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context.into()));
        while let Some(item) = stream.next().await {
            let info = item.map_err(Self::map_err)?;
            if let Some(error) = info.error {
                return Err(DriverError::Build(error));
            }
            if let Some(line) = info.stream {
                let line = line.trim();
                if !line.is_empty() {
                    debug!("build[{}]: {}", name, line);
                }
            }
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, DriverError> {
        let binds: Vec<String> = spec
            .mounts
            .iter()
            .map(|m| {
                if m.read_only {
                    format!("{}:{}:ro", m.source.display(), m.target)
                } else {
                    format!("{}:{}", m.source.display(), m.target)
                }
            })
            .collect();

        let host_config = HostConfig {
            binds: if binds.is_empty() { None } else { Some(binds) },
            memory: Some(spec.memory_bytes),
            nano_cpus: Some(spec.cpu_nanocores),
            pids_limit: Some(spec.pids_limit),
            network_mode: Some(spec.network_mode.clone()),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            tty: Some(spec.tty),
            open_stdin: Some(spec.tty),
            labels: Some(spec.labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(Self::map_err)?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DriverError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(Self::map_err)
    }

    async fn stop_container(&self, id: &str, grace_seconds: i64) -> Result<(), DriverError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: grace_seconds }))
            .await
            .map_err(Self::map_err)
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DriverError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force,
                    ..Default::default()
                }),
            )
            .await
            .map_err(Self::map_err)
    }

    async fn exec_create(&self, id: &str, spec: &ExecSpec) -> Result<String, DriverError> {
        let options = CreateExecOptions {
            cmd: Some(spec.cmd.clone()),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(spec.attach_stdout),
            attach_stderr: Some(spec.attach_stderr),
            tty: Some(spec.tty),
            ..Default::default()
        };
        let created = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(Self::map_err)?;
        Ok(created.id)
    }

    async fn exec_start(
        &self,
        exec_id: &str,
        hijack: bool,
        tty: bool,
    ) -> Result<ExecStream, DriverError> {
        let options = StartExecOptions {
            detach: !hijack,
            tty,
            ..Default::default()
        };
        match self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(Self::map_err)?
        {
            StartExecResults::Attached { output, input } => Ok(ExecStream {
                output: Box::pin(output.map(|item| match item {
                    Ok(chunk) => Ok(chunk.into_bytes().to_vec()),
                    Err(e) => Err(Self::map_err(e)),
                })),
                input,
            }),
            StartExecResults::Detached => Err(DriverError::Engine(
                "exec started detached, no stream attached".to_string(),
            )),
        }
    }

    async fn exec_inspect(&self, exec_id: &str) -> Result<ExecStatus, DriverError> {
        let inspect = self
            .docker
            .inspect_exec(exec_id)
            .await
            .map_err(Self::map_err)?;
        Ok(ExecStatus {
            exit_code: inspect.exit_code,
            running: inspect.running.unwrap_or(false),
        })
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<String>, DriverError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);
        let options = ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(Self::map_err)?;
        Ok(containers.into_iter().filter_map(|c| c.id).collect())
    }
}
