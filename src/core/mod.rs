pub mod outcome;

pub use outcome::{ExecutionOutcome, ExecutionRequest, OutcomeKind};
