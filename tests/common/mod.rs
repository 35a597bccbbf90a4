//! In-memory isolation provider for lifecycle tests

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use code_runner::config::EngineConfig;
use code_runner::languages::Languages;
use code_runner::sandbox::{
    EnvironmentHandle, EnvironmentSpec, IsolationProvider, OutputStream, ProviderError,
    SandboxFile,
};
use code_runner::ExecutionEngine;

/// Provider operation, used to count calls and inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Create,
    WriteFiles,
    Attach,
    Start,
    Stream,
    ExitStatus,
    Remove,
    Ping,
}

/// What the fake sandbox prints
#[derive(Debug, Clone)]
pub enum Output {
    /// Print the source file back, a few bytes per chunk
    EchoSource,
    Chunks(Vec<Vec<u8>>),
}

pub struct FakeProvider {
    exit_status: i64,
    output: Output,
    fail_at: Option<Step>,
    hang_after_output: bool,
    next_id: AtomicUsize,
    calls: Mutex<HashMap<Step, usize>>,
    files: Mutex<HashMap<String, Vec<SandboxFile>>>,
    specs: Mutex<Vec<EnvironmentSpec>>,
    removed: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            exit_status: 0,
            output: Output::EchoSource,
            fail_at: None,
            hang_after_output: false,
            next_id: AtomicUsize::new(0),
            calls: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            specs: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_exit_status(mut self, status: i64) -> Self {
        self.exit_status = status;
        self
    }

    pub fn with_output(mut self, chunks: Vec<&[u8]>) -> Self {
        self.output = Output::Chunks(chunks.into_iter().map(|c| c.to_vec()).collect());
        self
    }

    pub fn failing_at(mut self, step: Step) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Keep the output stream open forever after the configured output
    pub fn hanging(mut self) -> Self {
        self.hang_after_output = true;
        self
    }

    pub fn calls(&self, step: Step) -> usize {
        self.calls.lock().unwrap().get(&step).copied().unwrap_or(0)
    }

    /// Files written into the sandbox with the given index (creation order)
    pub fn files_of(&self, index: usize) -> Vec<SandboxFile> {
        let id = format!("fake-{}", index);
        self.files.lock().unwrap().get(&id).cloned().unwrap_or_default()
    }

    pub fn file(&self, index: usize, name: &str) -> Option<Vec<u8>> {
        self.files_of(index)
            .into_iter()
            .find(|f| f.name == name)
            .map(|f| f.contents)
    }

    pub fn specs(&self) -> Vec<EnvironmentSpec> {
        self.specs.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    fn record(&self, step: Step) -> Result<(), ProviderError> {
        *self.calls.lock().unwrap().entry(step).or_insert(0) += 1;
        if self.fail_at == Some(step) {
            return Err(ProviderError::Other(format!("injected {:?} failure", step)));
        }
        Ok(())
    }

    fn chunks_for(&self, handle: &EnvironmentHandle) -> Vec<Vec<u8>> {
        match &self.output {
            Output::Chunks(chunks) => chunks.clone(),
            Output::EchoSource => {
                let files = self.files.lock().unwrap();
                let source = files
                    .get(handle.id())
                    .and_then(|files| files.iter().find(|f| f.name != "stdin.txt"))
                    .map(|f| f.contents.clone())
                    .unwrap_or_default();
                source.chunks(3).map(|c| c.to_vec()).collect()
            }
        }
    }
}

#[async_trait]
impl IsolationProvider for FakeProvider {
    async fn create(&self, spec: &EnvironmentSpec) -> Result<EnvironmentHandle, ProviderError> {
        self.record(Step::Create)?;
        self.specs.lock().unwrap().push(spec.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(EnvironmentHandle::new(format!("fake-{}", id)))
    }

    async fn write_files(
        &self,
        handle: &EnvironmentHandle,
        files: &[SandboxFile],
    ) -> Result<(), ProviderError> {
        self.record(Step::WriteFiles)?;
        self.files
            .lock()
            .unwrap()
            .insert(handle.id().to_string(), files.to_vec());
        Ok(())
    }

    async fn attach(&self, handle: &EnvironmentHandle) -> Result<OutputStream, ProviderError> {
        self.record(Step::Attach)?;
        let chunks = self.chunks_for(handle);
        let fail_stream = self.fail_at == Some(Step::Stream);

        let body = stream::iter(chunks.into_iter().map(Ok)).then(|chunk| async move {
            tokio::task::yield_now().await;
            chunk
        });

        if fail_stream {
            let broken = stream::once(async {
                Err(ProviderError::Other("injected Stream failure".to_string()))
            });
            return Ok(body.chain(broken).boxed());
        }
        if self.hang_after_output {
            return Ok(body.chain(stream::pending()).boxed());
        }
        Ok(body.boxed())
    }

    async fn start(&self, _handle: &EnvironmentHandle) -> Result<(), ProviderError> {
        self.record(Step::Start)
    }

    async fn exit_status(&self, _handle: &EnvironmentHandle) -> Result<i64, ProviderError> {
        self.record(Step::ExitStatus)?;
        Ok(self.exit_status)
    }

    async fn remove(&self, handle: EnvironmentHandle) -> Result<(), ProviderError> {
        self.removed.lock().unwrap().push(handle.id().to_string());
        self.record(Step::Remove)
    }

    async fn ping(&self) -> Result<(), ProviderError> {
        self.record(Step::Ping)
    }

    async fn ensure_image(&self, _image: &str) -> Result<(), ProviderError> {
        Ok(())
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        supervisor_timeout: Duration::from_secs(5),
        ..EngineConfig::default()
    }
}

pub fn engine_with(provider: Arc<FakeProvider>, config: EngineConfig) -> ExecutionEngine {
    ExecutionEngine::new(
        provider,
        Arc::new(Languages::builtin().unwrap()),
        config,
    )
}

pub fn engine(provider: Arc<FakeProvider>) -> ExecutionEngine {
    engine_with(provider, test_config())
}
