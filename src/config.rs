//! Worker configuration
//!
//! Loaded once at startup from environment variables (and `.env`), then
//! passed down explicitly.

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::sanitize::MAX_OUTPUT_CHARS;
use crate::sandbox::EnvironmentLimits;

/// Which Docker daemon to talk to
#[derive(Debug, Clone, PartialEq)]
pub enum DockerEndpoint {
    /// Local socket (or DOCKER_HOST)
    Local,
    /// Remote daemon exposed over TCP
    Remote { host: String, port: u16 },
}

/// Execution engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-clock limit enforced by `timeout` inside the sandbox (default: 5s)
    pub timeout_secs: u64,
    /// Engine-side deadline for one run, independent of the in-sandbox limit (default: 30s)
    pub supervisor_timeout: Duration,
    /// Maximum characters of output returned to the caller
    pub max_output_chars: usize,
    /// Maximum raw bytes kept from the output stream (default: 16MB)
    pub max_capture_bytes: usize,
    pub limits: EnvironmentLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            supervisor_timeout: Duration::from_secs(30),
            max_output_chars: MAX_OUTPUT_CHARS,
            max_capture_bytes: 16 * 1024 * 1024,
            limits: EnvironmentLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let limits = EnvironmentLimits {
            memory_mb: env_or("SANDBOX_MEMORY_MB", defaults.limits.memory_mb)?,
            cpus: env_or("SANDBOX_CPUS", defaults.limits.cpus)?,
            pids: env_or("SANDBOX_PIDS", defaults.limits.pids)?,
            network_disabled: env_or("SANDBOX_NETWORK_DISABLED", defaults.limits.network_disabled)?,
        };

        let config = Self {
            timeout_secs: env_or("EXECUTION_TIMEOUT_SECS", defaults.timeout_secs)?,
            supervisor_timeout: Duration::from_secs(env_or(
                "SUPERVISOR_TIMEOUT_SECS",
                defaults.supervisor_timeout.as_secs(),
            )?),
            max_output_chars: env_or("MAX_OUTPUT_CHARS", defaults.max_output_chars)?,
            max_capture_bytes: env_or("MAX_CAPTURE_BYTES", defaults.max_capture_bytes)?,
            limits,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the sandbox cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.supervisor_timeout.as_secs() <= self.timeout_secs {
            anyhow::bail!(
                "SUPERVISOR_TIMEOUT_SECS ({}) must exceed EXECUTION_TIMEOUT_SECS ({})",
                self.supervisor_timeout.as_secs(),
                self.timeout_secs
            );
        }
        if !self.limits.cpus.is_finite() || self.limits.cpus <= 0.0 {
            anyhow::bail!(
                "SANDBOX_CPUS must be a positive number, got {}",
                self.limits.cpus
            );
        }
        Ok(())
    }
}

/// HTTP server and process-level configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Alternative language table; the embedded one is used when unset
    pub languages_path: Option<String>,
    pub docker_endpoint: DockerEndpoint,
    /// Pull every profile image at startup
    pub pull_images: bool,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let docker_endpoint = match (std::env::var("VM_IP"), std::env::var("VM_PORT")) {
            (Ok(host), Ok(port)) => DockerEndpoint::Remote {
                host,
                port: port
                    .parse()
                    .with_context(|| format!("Invalid VM_PORT: {}", port))?,
            },
            _ => DockerEndpoint::Local,
        };

        Ok(Self {
            port: env_or("PORT", 5000)?,
            languages_path: std::env::var("LANGUAGES_CONFIG").ok(),
            docker_endpoint,
            pull_images: env_or("PULL_IMAGES", false)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("Invalid {}: {:?} ({})", key, raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.max_output_chars, 500_000);
        assert!(config.supervisor_timeout > Duration::from_secs(config.timeout_secs));
    }

    #[test]
    fn test_validate_cpus() {
        assert!(EngineConfig::default().validate().is_ok());

        for cpus in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = EngineConfig {
                limits: EnvironmentLimits {
                    cpus,
                    ..EnvironmentLimits::default()
                },
                ..EngineConfig::default()
            };
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("SANDBOX_CPUS"), "{}", cpus);
        }
    }

    #[test]
    fn test_validate_supervisor_timeout() {
        let config = EngineConfig {
            timeout_secs: 30,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SUPERVISOR_TIMEOUT_SECS"));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value::<u64>("X", " 7 ").unwrap(), 7);
        assert!(parse_value::<bool>("X", "true").unwrap());
        let err = parse_value::<u16>("PORT", "http").unwrap_err();
        assert!(err.to_string().contains("Invalid PORT"));
    }
}
