//! Docker backend for [`ContainerEngine`] built on `bollard`.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{
    ContainerCreateBody, HostConfig, Mount, MountTypeEnum, RestartPolicy as DockerRestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, ListContainersOptions,
    RemoveContainerOptions, RemoveVolumeOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use futures_util::TryStreamExt;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::ContainerEngine;
use crate::error::{EngineError, EngineResult};
use crate::spec::*;

/// Connection to the local Docker daemon.
///
/// Owns the optional pull-progress log file; both are released when the
/// value is dropped.
pub struct DockerEngine {
    docker: Docker,
    pull_log: Option<Mutex<File>>,
}

impl DockerEngine {
    /// Connect with the platform defaults (unix socket or named pipe,
    /// honouring `DOCKER_HOST`). Pull progress is appended to `pull_log`.
    pub async fn connect(pull_log: Option<&Path>) -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| EngineError::Connection(e.to_string()))?;

        let pull_log = match pull_log {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                debug!(?path, "engine pull log opened");
                Some(Mutex::new(file))
            }
            None => None,
        };

        Ok(Self { docker, pull_log })
    }

    async fn write_pull_log(&self, line: &str) {
        let Some(log) = &self.pull_log else {
            return;
        };
        let mut file = log.lock().await;
        if let Err(e) = file.write_all(format!("{line}\n").as_bytes()).await {
            warn!(error = %e, "could not write engine pull log");
        }
    }
}

/// Split an image reference into repository and tag, defaulting the tag
/// to `latest`. Digest references are passed through whole.
fn split_image_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => (&image[..name_start + i], &image[name_start + i + 1..]),
        None => (image, "latest"),
    }
}

fn host_config(spec: &ContainerSpec) -> HostConfig {
    let restart_policy = match spec.restart_policy {
        RestartPolicy::Never => DockerRestartPolicy {
            name: Some(RestartPolicyNameEnum::NO),
            maximum_retry_count: None,
        },
        RestartPolicy::OnFailure { max_retries } => DockerRestartPolicy {
            name: Some(RestartPolicyNameEnum::ON_FAILURE),
            maximum_retry_count: Some(max_retries),
        },
        RestartPolicy::Always => DockerRestartPolicy {
            name: Some(RestartPolicyNameEnum::ALWAYS),
            maximum_retry_count: None,
        },
        RestartPolicy::UnlessStopped => DockerRestartPolicy {
            name: Some(RestartPolicyNameEnum::UNLESS_STOPPED),
            maximum_retry_count: None,
        },
    };

    let mounts = spec
        .mounts
        .iter()
        .map(|m| Mount {
            typ: Some(MountTypeEnum::VOLUME),
            source: Some(m.volume.clone()),
            target: Some(m.target.clone()),
            ..Default::default()
        })
        .collect();

    HostConfig {
        network_mode: Some(spec.network_mode.as_str().to_string()),
        restart_policy: Some(restart_policy),
        mounts: Some(mounts),
        ..Default::default()
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn pull_image(&self, image: &str) -> EngineResult<()> {
        let (repository, tag) = split_image_reference(image);
        info!(%image, "pulling image");

        let options = Some(CreateImageOptions {
            from_image: Some(repository.to_string()),
            tag: (!tag.is_empty()).then(|| tag.to_string()),
            ..Default::default()
        });

        let mut pull_stream = self.docker.create_image(options, None, None);
        while let Some(progress) = pull_stream.try_next().await? {
            if let Some(status) = progress.status {
                let line = match progress.id {
                    Some(id) => format!("{image} {id}: {status}"),
                    None => format!("{image}: {status}"),
                };
                self.write_pull_log(&line).await;
            }
        }

        debug!(%image, "image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String> {
        let options = Some(CreateContainerOptions {
            name: Some(spec.name.clone()),
            platform: String::new(),
        });

        let body = ContainerCreateBody {
            image: Some(spec.image.clone()),
            env: Some(spec.env_list()),
            host_config: Some(host_config(spec)),
            ..Default::default()
        };

        let created = self.docker.create_container(options, body).await?;
        for warning in &created.warnings {
            warn!(name = %spec.name, %warning, "engine warning on create");
        }

        debug!(name = %spec.name, id = %created.id, "container created");
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions>)
            .await?;
        debug!(%id, "container started");
        Ok(())
    }

    async fn stop_container(&self, id: &str, timeout: Duration) -> EngineResult<()> {
        let options = Some(StopContainerOptions {
            t: Some(timeout_secs(timeout)),
            ..Default::default()
        });
        self.docker.stop_container(id, options).await?;
        debug!(%id, "container stopped");
        Ok(())
    }

    async fn restart_container(&self, id: &str, timeout: Duration) -> EngineResult<()> {
        let options = Some(RestartContainerOptions {
            t: Some(timeout_secs(timeout)),
            ..Default::default()
        });
        self.docker.restart_container(id, options).await?;
        debug!(%id, "container restarted");
        Ok(())
    }

    async fn remove_container(&self, id: &str, options: RemoveOptions) -> EngineResult<()> {
        let remove_options = Some(RemoveContainerOptions {
            force: options.force,
            v: options.volumes,
            link: false,
        });
        self.docker.remove_container(id, remove_options).await?;
        debug!(%id, force = options.force, "container removed");
        Ok(())
    }

    async fn remove_volume(&self, name: &str) -> EngineResult<()> {
        self.docker
            .remove_volume(name, None::<RemoveVolumeOptions>)
            .await?;
        debug!(%name, "volume removed");
        Ok(())
    }

    async fn inspect_mounts(&self, id: &str) -> EngineResult<Vec<MountInfo>> {
        let details = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;

        let mounts = details
            .mounts
            .unwrap_or_default()
            .into_iter()
            .map(|m| MountInfo {
                name: m.name,
                destination: m.destination.unwrap_or_default(),
            })
            .collect();
        Ok(mounts)
    }

    async fn list_containers(&self, all: bool) -> EngineResult<Vec<ContainerSummary>> {
        let options = Some(ListContainersOptions {
            all,
            ..Default::default()
        });

        let containers = self.docker.list_containers(options).await?;
        let summaries = containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let names = c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .collect();
                Some(ContainerSummary { id, names })
            })
            .collect();
        Ok(summaries)
    }
}
