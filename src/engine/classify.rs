//! Exit status classification

use crate::core::ExecutionOutcome;
use crate::error::ExecutionError;
use crate::languages::TIMEOUT_EXIT_STATUS;

use super::sanitize::sanitize;

/// Map a terminated run to an outcome.
///
/// Precedence: timeout sentinel, captured statuses, other non-zero, zero.
pub fn classify(
    exit_status: i64,
    raw_output: &[u8],
    captured_exit_codes: &[i64],
    max_chars: usize,
) -> Result<ExecutionOutcome, ExecutionError> {
    if exit_status == TIMEOUT_EXIT_STATUS {
        return Ok(ExecutionOutcome::timed_out(&sanitize(raw_output, max_chars)));
    }
    if captured_exit_codes.contains(&exit_status) {
        return Ok(ExecutionOutcome::runtime_output(sanitize(
            raw_output, max_chars,
        )));
    }
    if exit_status != 0 {
        return Err(ExecutionError::UnclassifiedExit {
            status: exit_status,
        });
    }
    Ok(ExecutionOutcome::success(sanitize(raw_output, max_chars)))
}
