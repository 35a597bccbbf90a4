//! Sandbox module - Isolation provider abstraction
//!
//! This module defines the capability the engine needs from a container
//! service:
//! - Environment creation with resource limits
//! - File transfer into the environment
//! - Combined output streaming, start, exit status and removal
//!
//! The sandbox module does NOT:
//! - Interpret exit statuses (that's the classifier's job)
//! - Know about languages or compilation
//! - Sanitize or bound output

pub mod docker;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use docker::DockerProvider;

/// Directory inside the environment where sources and stdin are placed
pub const WORK_DIR: &str = "/sandbox";

/// Errors reported by an isolation provider
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Docker API error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("Failed to build upload archive: {0}")]
    Archive(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Resource limits applied to every environment
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentLimits {
    /// Memory limit in MB (swap is capped to the same value)
    pub memory_mb: u32,
    /// CPU quota in whole or fractional cores
    pub cpus: f64,
    /// Maximum number of processes
    pub pids: u32,
    /// Disable all networking
    pub network_disabled: bool,
}

impl Default for EnvironmentLimits {
    fn default() -> Self {
        Self {
            memory_mb: 256,
            cpus: 1.0,
            pids: 64,
            network_disabled: true,
        }
    }
}

/// What to create: image, command and limits
#[derive(Debug, Clone)]
pub struct EnvironmentSpec {
    pub image: String,
    /// Full command (program + args)
    pub command: Vec<String>,
    pub work_dir: String,
    pub limits: EnvironmentLimits,
}

impl EnvironmentSpec {
    pub fn new(image: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            image: image.into(),
            command,
            work_dir: WORK_DIR.to_string(),
            limits: EnvironmentLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: EnvironmentLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// A file placed into the work dir before the environment starts
#[derive(Debug, Clone)]
pub struct SandboxFile {
    /// Name relative to the work dir
    pub name: String,
    pub contents: Vec<u8>,
}

impl SandboxFile {
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Reference to one created environment.
///
/// Not `Clone`: `remove` consumes it, so a handle can be removed at most once.
#[derive(Debug)]
pub struct EnvironmentHandle {
    id: String,
}

impl EnvironmentHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Combined stdout/stderr chunks in arrival order
pub type OutputStream = BoxStream<'static, Result<Vec<u8>, ProviderError>>;

/// Container service capable of running one program per environment
#[async_trait]
pub trait IsolationProvider: Send + Sync {
    /// Create (but do not start) an environment
    async fn create(&self, spec: &EnvironmentSpec) -> Result<EnvironmentHandle, ProviderError>;

    /// Place files into the environment's work dir
    async fn write_files(
        &self,
        handle: &EnvironmentHandle,
        files: &[SandboxFile],
    ) -> Result<(), ProviderError>;

    /// Attach to the combined output; ends when the program exits
    async fn attach(&self, handle: &EnvironmentHandle) -> Result<OutputStream, ProviderError>;

    async fn start(&self, handle: &EnvironmentHandle) -> Result<(), ProviderError>;

    /// Wait for termination and report the exit status
    async fn exit_status(&self, handle: &EnvironmentHandle) -> Result<i64, ProviderError>;

    /// Force-remove the environment, whatever state it is in
    async fn remove(&self, handle: EnvironmentHandle) -> Result<(), ProviderError>;

    /// Check the provider is reachable
    async fn ping(&self) -> Result<(), ProviderError>;

    /// Make sure an image is available locally, pulling it if needed
    async fn ensure_image(&self, image: &str) -> Result<(), ProviderError>;
}
