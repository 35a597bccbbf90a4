//! Engine module - One generic runner for every language
//!
//! This module drives a single run end to end:
//! - Resolves the language profile and materializes the run script
//! - Creates the sandbox, writes source and stdin, attaches, starts
//! - Collects output under a supervisory deadline, then classifies it
//! - Removes the sandbox exactly once, on every path
//!
//! The engine module does NOT:
//! - Talk to Docker directly (it goes through `IsolationProvider`)
//! - Know per-language quirks beyond what the profile table says

pub mod classify;
pub mod sanitize;

use futures_util::stream::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::core::{ExecutionOutcome, ExecutionRequest};
use crate::error::ExecutionError;
use crate::languages::{LanguageProfile, Languages, RunPlan, STDIN_FILE};
use crate::sandbox::{
    EnvironmentHandle, EnvironmentSpec, IsolationProvider, OutputStream, SandboxFile,
};

pub use classify::classify;
pub use sanitize::sanitize;

/// Bounded buffer for one run's combined output
#[derive(Debug)]
struct CaptureBuffer {
    bytes: Vec<u8>,
    limit: usize,
    dropped: usize,
}

impl CaptureBuffer {
    fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            dropped: 0,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        let kept = room.min(chunk.len());
        self.bytes.extend_from_slice(&chunk[..kept]);
        self.dropped += chunk.len() - kept;
    }
}

/// Removes a sandbox whose run was dropped before reaching its own cleanup.
///
/// Disarmed right before the normal removal, so a sandbox is removed once
/// either way.
struct AbandonGuard {
    provider: Arc<dyn IsolationProvider>,
    sandbox_id: Option<String>,
}

impl AbandonGuard {
    fn new(provider: Arc<dyn IsolationProvider>, sandbox_id: &str) -> Self {
        Self {
            provider,
            sandbox_id: Some(sandbox_id.to_string()),
        }
    }

    fn disarm(&mut self) {
        self.sandbox_id = None;
    }
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        let Some(sandbox_id) = self.sandbox_id.take() else {
            return;
        };
        warn!("Run dropped before cleanup, removing sandbox {} in background", sandbox_id);

        let provider = self.provider.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    let handle = EnvironmentHandle::new(sandbox_id.as_str());
                    if let Err(e) = provider.remove(handle).await {
                        warn!("Failed to remove abandoned sandbox {}: {}", sandbox_id, e);
                    }
                });
            }
            Err(_) => warn!("No runtime left to remove sandbox {}", sandbox_id),
        }
    }
}

/// Runs requests against an injected isolation provider
pub struct ExecutionEngine {
    provider: Arc<dyn IsolationProvider>,
    languages: Arc<Languages>,
    config: EngineConfig,
}

impl ExecutionEngine {
    pub fn new(
        provider: Arc<dyn IsolationProvider>,
        languages: Arc<Languages>,
        config: EngineConfig,
    ) -> Self {
        Self {
            provider,
            languages,
            config,
        }
    }

    pub fn languages(&self) -> &Languages {
        &self.languages
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether the isolation provider is reachable
    pub async fn is_ready(&self) -> bool {
        match self.provider.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Isolation provider is not reachable: {}", e);
                false
            }
        }
    }

    /// Run one request to completion.
    ///
    /// Once a sandbox has been created it is removed before this returns,
    /// whatever happened in between. If the future is dropped mid-run, the
    /// removal is spawned onto the runtime instead.
    pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionOutcome, ExecutionError> {
        let profile = self
            .languages
            .get(&request.language)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(request.language.clone()))?;
        let plan = profile.plan(request.aux_filename.as_deref(), self.config.timeout_secs)?;

        let spec = EnvironmentSpec::new(&plan.image, plan.command())
            .with_limits(self.config.limits.clone());
        let handle = self
            .provider
            .create(&spec)
            .await
            .map_err(ExecutionError::Provisioning)?;
        let sandbox_id = handle.id().to_string();
        debug!("Created sandbox {} for {}", sandbox_id, profile.id);

        let mut guard = AbandonGuard::new(self.provider.clone(), &sandbox_id);
        let started = Instant::now();
        let result = self.drive(&handle, profile, &plan, request).await;

        guard.disarm();
        if let Err(e) = self.provider.remove(handle).await {
            warn!("Failed to remove sandbox {}: {}", sandbox_id, e);
        }

        match &result {
            Ok(outcome) => info!(
                "Run finished: language={}, outcome={}, elapsed_ms={}, output_chars={}",
                profile.id,
                outcome.kind,
                started.elapsed().as_millis(),
                outcome.text.chars().count()
            ),
            Err(e) => warn!("Run failed: language={}, error={}", profile.id, e),
        }

        result
    }

    /// Everything between creation and removal
    async fn drive(
        &self,
        handle: &EnvironmentHandle,
        profile: &LanguageProfile,
        plan: &RunPlan,
        request: &ExecutionRequest,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let files = [
            SandboxFile::new(plan.source_file.as_str(), request.source_code.as_bytes()),
            SandboxFile::new(STDIN_FILE, request.stdin.as_bytes()),
        ];
        self.provider
            .write_files(handle, &files)
            .await
            .map_err(ExecutionError::Provisioning)?;

        // Attach before start so no early output is missed
        let mut output = self
            .provider
            .attach(handle)
            .await
            .map_err(ExecutionError::Stream)?;
        self.provider
            .start(handle)
            .await
            .map_err(ExecutionError::Provisioning)?;

        let mut capture = CaptureBuffer::new(self.config.max_capture_bytes);
        let waited = tokio::time::timeout(
            self.config.supervisor_timeout,
            self.collect(handle, &mut output, &mut capture),
        )
        .await;

        if capture.dropped > 0 {
            debug!(
                "Discarded {} bytes beyond the capture limit for {}",
                capture.dropped,
                handle.id()
            );
        }

        match waited {
            Ok(exit_status) => classify(
                exit_status?,
                &capture.bytes,
                &profile.captured_exit_codes,
                self.config.max_output_chars,
            ),
            Err(_) => {
                warn!(
                    "Sandbox {} exceeded the supervisory deadline of {:?}",
                    handle.id(),
                    self.config.supervisor_timeout
                );
                Ok(ExecutionOutcome::timed_out(&sanitize(
                    &capture.bytes,
                    self.config.max_output_chars,
                )))
            }
        }
    }

    /// Drain the output stream in arrival order, then read the exit status
    async fn collect(
        &self,
        handle: &EnvironmentHandle,
        output: &mut OutputStream,
        capture: &mut CaptureBuffer,
    ) -> Result<i64, ExecutionError> {
        while let Some(chunk) = output.next().await {
            let chunk = chunk.map_err(ExecutionError::Stream)?;
            capture.push(&chunk);
        }

        self.provider
            .exit_status(handle)
            .await
            .map_err(ExecutionError::ExitStatus)
    }
}
