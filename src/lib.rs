//! Sandboxed code execution worker
//!
//! Runs untrusted programs in throwaway Docker containers and reports their
//! captured output. The crate is split the same way the worker is wired:
//! - `languages`: declarative build/run profiles, one per language
//! - `sandbox`: the isolation provider seam and its Docker implementation
//! - `engine`: one generic runner that drives a provider through a single run
//! - `api`: the HTTP surface callers submit code through

pub mod api;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod languages;
pub mod sandbox;

pub use crate::core::{ExecutionOutcome, ExecutionRequest, OutcomeKind};
pub use crate::engine::ExecutionEngine;
pub use crate::error::ExecutionError;
pub use crate::languages::{LanguageProfile, Languages};
