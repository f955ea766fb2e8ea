//! Executes one prepared script, instruction by instruction.

use delivery_state::ContentDigest;
use tracing::debug;

use crate::dispatch::{CommandDispatcher, ExecutionOutcome};
use crate::error::Result;

/// A script with its tokens resolved, ready to dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedScript {
    pub name: String,
    pub instructions: Vec<String>,
    /// Digest of the unresolved file bytes (what the ledger records).
    pub digest: ContentDigest,
}

/// Result of running one script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptRun {
    /// `Continue` if every instruction continued, else the first other outcome.
    pub outcome: ExecutionOutcome,
    /// Instructions that returned `Continue`.
    pub completed: usize,
}

impl ScriptRun {
    pub fn signed_for(&self) -> bool {
        self.outcome.is_continue()
    }
}

/// Dispatch each instruction in order; stop at the first non-`Continue`.
pub async fn execute_script(
    dispatcher: &dyn CommandDispatcher,
    script: &PreparedScript,
) -> Result<ScriptRun> {
    for (idx, instruction) in script.instructions.iter().enumerate() {
        debug!(script = %script.name, line = idx + 1, "dispatching instruction");
        let outcome = dispatcher.run_with_args(instruction).await?;
        if !outcome.is_continue() {
            debug!(script = %script.name, line = idx + 1, %outcome, "script halted");
            return Ok(ScriptRun {
                outcome,
                completed: idx,
            });
        }
    }

    Ok(ScriptRun {
        outcome: ExecutionOutcome::Continue,
        completed: script.instructions.len(),
    })
}
