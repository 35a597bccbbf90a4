//! Error types for a single execution run

use thiserror::Error;

use crate::sandbox::ProviderError;

/// Failure of one run.
///
/// Timeouts and programs exiting with a captured status are not errors; they
/// resolve to an [`ExecutionOutcome`](crate::ExecutionOutcome).
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No profile is registered for the requested language
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Caller-supplied class name cannot be used as a Java identifier
    #[error("Invalid class name: {0:?}")]
    InvalidClassName(String),

    /// Creating, preparing or starting the sandbox failed
    #[error("Failed to provision sandbox: {0}")]
    Provisioning(#[source] ProviderError),

    /// Attaching to or reading the output stream failed
    #[error("Failed to read sandbox output: {0}")]
    Stream(#[source] ProviderError),

    /// The provider could not report how the program terminated
    #[error("Failed to read exit status: {0}")]
    ExitStatus(#[source] ProviderError),

    /// The program exited with a status that has no defined meaning
    #[error("Program exited with status {status}")]
    UnclassifiedExit { status: i64 },
}

impl ExecutionError {
    /// Whether the request itself was rejected before any sandbox existed
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            ExecutionError::UnsupportedLanguage(_) | ExecutionError::InvalidClassName(_)
        )
    }
}
