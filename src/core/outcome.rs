use serde::{Deserialize, Serialize};
use std::fmt;

/// First line of the text returned for a run killed by the time limit
pub const TIMEOUT_BANNER: &str = "EXECUTION TIMED OUT\nOUTPUT CAPTURED TILL TIMEOUT\n";

/// Input for one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Language id or alias (e.g. "cpp", "python")
    pub language: String,
    pub source_code: String,
    #[serde(default)]
    pub stdin: String,
    /// Class name for toolchains that need one (Java)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aux_filename: Option<String>,
}

impl ExecutionRequest {
    pub fn new(language: impl Into<String>, source_code: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            source_code: source_code.into(),
            stdin: String::new(),
            aux_filename: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_aux_filename(mut self, name: impl Into<String>) -> Self {
        self.aux_filename = Some(name.into());
        self
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Exited with status 0
    Success,
    /// Exited with a status whose output is still returned (compile errors, tracebacks)
    RuntimeOutput,
    /// Killed by the time limit; carries the output produced until then
    TimedOut,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeKind::Success => "success",
            OutcomeKind::RuntimeOutput => "runtime_output",
            OutcomeKind::TimedOut => "timed_out",
        };
        write!(f, "{}", s)
    }
}

/// Result of a run, the only thing handed back to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub kind: OutcomeKind,
    /// Sanitized, bounded program output
    pub text: String,
}

impl ExecutionOutcome {
    pub fn success(text: String) -> Self {
        Self {
            kind: OutcomeKind::Success,
            text,
        }
    }

    pub fn runtime_output(text: String) -> Self {
        Self {
            kind: OutcomeKind::RuntimeOutput,
            text,
        }
    }

    /// Prepends the timeout banner to already sanitized output
    pub fn timed_out(text: &str) -> Self {
        Self {
            kind: OutcomeKind::TimedOut,
            text: format!("{}{}", TIMEOUT_BANNER, text),
        }
    }
}
