use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use code_runner::api::{self, AppState};
use code_runner::config::{DockerEndpoint, EngineConfig, ServerConfig};
use code_runner::engine::ExecutionEngine;
use code_runner::languages::Languages;
use code_runner::sandbox::{DockerProvider, IsolationProvider};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("code_runner=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let server_config = ServerConfig::from_env()?;
    let engine_config = EngineConfig::from_env()?;
    info!(
        "Engine config: timeout={}s, supervisor={:?}, max_output_chars={}, limits={:?}",
        engine_config.timeout_secs,
        engine_config.supervisor_timeout,
        engine_config.max_output_chars,
        engine_config.limits
    );

    // Load language configurations
    let languages = match &server_config.languages_path {
        Some(path) => {
            let languages = Languages::from_path(path)?;
            info!("Loaded language configurations from {}", path);
            languages
        }
        None => Languages::builtin()?,
    };
    info!("Supported languages: {:?}", languages.supported());

    let provider = DockerProvider::connect(&server_config.docker_endpoint)
        .context("Failed to create Docker client")?;
    match &server_config.docker_endpoint {
        DockerEndpoint::Remote { host, port } => {
            info!("Connected to remote Docker: {}:{}", host, port)
        }
        DockerEndpoint::Local => info!("Using local Docker socket"),
    }

    if let Err(e) = provider.ping().await {
        warn!("Docker daemon did not answer ping: {}", e);
    }

    if server_config.pull_images {
        for image in languages.images() {
            if let Err(e) = provider.ensure_image(&image).await {
                warn!("Failed to pull image {}: {}", image, e);
            }
        }
    }

    let engine = ExecutionEngine::new(Arc::new(provider), Arc::new(languages), engine_config);
    let app = api::router(AppState::new(Arc::new(engine)));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", server_config.port))?;
    info!("Listening on port {}", server_config.port);

    axum::serve(listener, app).await?;
    Ok(())
}
