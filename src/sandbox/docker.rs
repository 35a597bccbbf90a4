//! Docker isolation provider
//!
//! Each environment is one container created from a language image. Files
//! are uploaded as a tar archive before start, so untrusted text never passes
//! through a shell command line.

use async_trait::async_trait;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    AttachContainerOptionsBuilder, CreateContainerOptions, CreateImageOptions,
    InspectContainerOptions, RemoveContainerOptionsBuilder, StartContainerOptions,
    UploadToContainerOptionsBuilder, WaitContainerOptions,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use super::{
    EnvironmentHandle, EnvironmentLimits, EnvironmentSpec, IsolationProvider, OutputStream,
    ProviderError, SandboxFile,
};
use crate::config::DockerEndpoint;

/// Request timeout for the Docker API client, in seconds
const DOCKER_CLIENT_TIMEOUT_SECS: u64 = 120;

/// Counter for container names within this process
static CONTAINER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Provider backed by a Docker daemon (local socket or remote TCP endpoint)
#[derive(Clone)]
pub struct DockerProvider {
    docker: Docker,
}

impl DockerProvider {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the daemon selected by the configuration
    pub fn connect(endpoint: &DockerEndpoint) -> Result<Self, ProviderError> {
        let docker = match endpoint {
            DockerEndpoint::Local => Docker::connect_with_local_defaults()?,
            DockerEndpoint::Remote { host, port } => {
                let addr = format!("http://{}:{}", host, port);
                Docker::connect_with_http(&addr, DOCKER_CLIENT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
        };
        Ok(Self::new(docker))
    }
}

fn next_container_name() -> String {
    let counter = CONTAINER_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("code-runner-{}-{}", std::process::id(), counter)
}

fn host_config(limits: &EnvironmentLimits) -> HostConfig {
    let memory_bytes = i64::from(limits.memory_mb) * 1024 * 1024;
    HostConfig {
        memory: Some(memory_bytes),
        memory_swap: Some(memory_bytes),
        nano_cpus: Some((limits.cpus * 1_000_000_000.0) as i64),
        pids_limit: Some(i64::from(limits.pids)),
        network_mode: limits.network_disabled.then(|| "none".to_string()),
        ..Default::default()
    }
}

/// Build a tar archive holding the work dir and the given files.
///
/// Paths are relative to `/`, so the archive is uploaded at the root and
/// creates the work dir if the image lacks it.
pub fn build_archive(work_dir: &str, files: &[SandboxFile]) -> std::io::Result<Vec<u8>> {
    let root = work_dir.trim_matches('/');
    let mut builder = tar::Builder::new(Vec::new());

    let mut dir_header = tar::Header::new_gnu();
    dir_header.set_entry_type(tar::EntryType::Directory);
    dir_header.set_mode(0o777);
    dir_header.set_size(0);
    builder.append_data(&mut dir_header, format!("{}/", root), std::io::empty())?;

    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
        header.set_size(file.contents.len() as u64);
        builder.append_data(
            &mut header,
            format!("{}/{}", root, file.name),
            file.contents.as_slice(),
        )?;
    }

    builder.into_inner()
}

#[async_trait]
impl IsolationProvider for DockerProvider {
    async fn create(&self, spec: &EnvironmentSpec) -> Result<EnvironmentHandle, ProviderError> {
        let options = Some(CreateContainerOptions {
            name: Some(next_container_name()),
            ..Default::default()
        });

        let config = ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.work_dir.clone()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            network_disabled: Some(spec.limits.network_disabled),
            host_config: Some(host_config(&spec.limits)),
            ..Default::default()
        };

        let container = self.docker.create_container(options, config).await?;
        debug!("Created container {} from {}", container.id, spec.image);
        Ok(EnvironmentHandle::new(container.id))
    }

    async fn write_files(
        &self,
        handle: &EnvironmentHandle,
        files: &[SandboxFile],
    ) -> Result<(), ProviderError> {
        let archive = build_archive(super::WORK_DIR, files)?;
        let options = UploadToContainerOptionsBuilder::default().path("/").build();

        self.docker
            .upload_to_container(handle.id(), Some(options), bollard::body_full(archive.into()))
            .await?;
        Ok(())
    }

    async fn attach(&self, handle: &EnvironmentHandle) -> Result<OutputStream, ProviderError> {
        let options = AttachContainerOptionsBuilder::default()
            .stream(true)
            .stdout(true)
            .stderr(true)
            .build();

        let results = self
            .docker
            .attach_container(handle.id(), Some(options))
            .await?;

        Ok(results
            .output
            .map(|item| {
                item.map(|log: LogOutput| log.into_bytes().to_vec())
                    .map_err(ProviderError::from)
            })
            .boxed())
    }

    async fn start(&self, handle: &EnvironmentHandle) -> Result<(), ProviderError> {
        self.docker
            .start_container(handle.id(), None::<StartContainerOptions>)
            .await?;
        Ok(())
    }

    async fn exit_status(&self, handle: &EnvironmentHandle) -> Result<i64, ProviderError> {
        // A non-zero exit arrives as an Err item; the status itself is read by inspect.
        let mut wait = self
            .docker
            .wait_container(handle.id(), None::<WaitContainerOptions>);
        if let Some(Err(e)) = wait.next().await {
            debug!("Wait on container {} returned: {}", handle.id(), e);
        }

        let info = self
            .docker
            .inspect_container(handle.id(), None::<InspectContainerOptions>)
            .await?;

        let state = info
            .state
            .ok_or_else(|| ProviderError::Other("Container has no state".to_string()))?;
        if state.running == Some(true) {
            return Err(ProviderError::Other(format!(
                "Container {} is still running",
                handle.id()
            )));
        }
        state
            .exit_code
            .ok_or_else(|| ProviderError::Other("Container has no exit code".to_string()))
    }

    async fn remove(&self, handle: EnvironmentHandle) -> Result<(), ProviderError> {
        let options = RemoveContainerOptionsBuilder::default().force(true).build();
        self.docker
            .remove_container(handle.id(), Some(options))
            .await?;
        debug!("Removed container {}", handle.id());
        Ok(())
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        self.docker.ping().await?;
        Ok(())
    }

    async fn ensure_image(&self, image: &str) -> Result<(), ProviderError> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!("Image {} already present", image);
            return Ok(());
        }

        info!("Pulling image {}", image);
        let options = Some(CreateImageOptions {
            from_image: Some(image.to_string()),
            ..Default::default()
        });
        let mut pull = self.docker.create_image(options, None, None);
        while let Some(progress) = pull.next().await {
            progress?;
        }
        info!("Pulled image {}", image);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_build_archive_layout() {
        let files = vec![
            SandboxFile::new("main.c", "printf(\"hi\");"),
            SandboxFile::new("stdin.txt", ""),
        ];
        let archive = build_archive("/sandbox", &files).unwrap();

        let mut reader = tar::Archive::new(archive.as_slice());
        let mut entries = Vec::new();
        for entry in reader.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().to_string();
            let mut contents = String::new();
            entry.read_to_string(&mut contents).unwrap();
            entries.push((path, contents));
        }

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0.trim_end_matches('/'), "sandbox");
        assert_eq!(entries[1], ("sandbox/main.c".into(), "printf(\"hi\");".into()));
        assert_eq!(entries[2], ("sandbox/stdin.txt".into(), String::new()));
    }

    #[test]
    fn test_host_config_limits() {
        let config = host_config(&EnvironmentLimits {
            memory_mb: 128,
            cpus: 0.5,
            pids: 32,
            network_disabled: true,
        });

        assert_eq!(config.memory, Some(128 * 1024 * 1024));
        assert_eq!(config.memory_swap, config.memory);
        assert_eq!(config.nano_cpus, Some(500_000_000));
        assert_eq!(config.pids_limit, Some(32));
        assert_eq!(config.network_mode.as_deref(), Some("none"));
    }

    #[test]
    fn test_container_names_are_unique() {
        assert_ne!(next_container_name(), next_container_name());
    }
}
