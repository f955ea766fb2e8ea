//! The boundary between the engine and whatever executes instructions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Tri-state result of running one instruction or one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Proceed to the next instruction.
    Continue,
    /// Terminate the whole session successfully.
    Shutdown,
    /// Abort and signal failure upstream.
    FinishedWithError,
}

impl ExecutionOutcome {
    pub fn is_continue(self) -> bool {
        self == ExecutionOutcome::Continue
    }

    /// Whether a caller should treat this outcome as a failed session.
    pub fn is_failure(self) -> bool {
        self == ExecutionOutcome::FinishedWithError
    }
}

impl std::fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionOutcome::Continue => "continue",
            ExecutionOutcome::Shutdown => "shutdown",
            ExecutionOutcome::FinishedWithError => "finished with error",
        };
        f.write_str(s)
    }
}

/// Runs one fully resolved instruction line.
///
/// Implementations own their own latency and timeouts. The engine makes
/// exactly one call per instruction, never retries, and stops the containing
/// script on anything but `Continue`. An `Err` is an unexpected failure and
/// terminates the whole invocation.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn run_with_args(&self, instruction: &str) -> Result<ExecutionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_finished_with_error_is_failure() {
        assert!(!ExecutionOutcome::Continue.is_failure());
        assert!(!ExecutionOutcome::Shutdown.is_failure());
        assert!(ExecutionOutcome::FinishedWithError.is_failure());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionOutcome::FinishedWithError).unwrap();
        assert_eq!(json, "\"finished_with_error\"");
    }
}
