//! Ledger readiness state machine and the ledger-tracked run loop.
//!
//! ```text
//! Probe ── exists() = true ──────────────────────────────► Normal-run
//!   │  ── exists() = false ──► Create ── ok ─────────────► Normal-run
//!   │                            └── err ──► FinishedWithError
//!   └──── Unavailable ──► run first script untracked
//!                           ├── not signed for ──► FinishedWithError (no ledger)
//!                           └── signed for ──► Create ── err ──► FinishedWithError
//!                                                 └── ok ──► save entry ──► Normal-run (rest)
//! ```

use delivery_state::{LedgerEntry, StorageError};
use tracing::{debug, info, instrument, warn};

use super::runner::{execute_script, PreparedScript};
use super::DeliveryEngine;
use crate::dispatch::ExecutionOutcome;
use crate::error::Result;
use crate::settings::HashPolicy;

/// What the run loop does after one script.
enum Step {
    Next,
    Stop(ExecutionOutcome),
}

impl DeliveryEngine {
    /// Make the ledger usable, then deliver `scripts` in order.
    #[instrument(skip_all, fields(scripts = scripts.len()))]
    pub(super) async fn deliver(&self, scripts: Vec<PreparedScript>) -> Result<ExecutionOutcome> {
        match self.ledger.exists().await {
            Ok(true) => {
                debug!("ledger present");
                self.normal_run(&scripts).await
            }
            Ok(false) => {
                info!("ledger absent, creating it");
                if let Err(e) = self.ledger.create().await {
                    self.say(format!("Could not create the delivery ledger: {e}"));
                    return Ok(ExecutionOutcome::FinishedWithError);
                }
                self.normal_run(&scripts).await
            }
            Err(e) if e.is_unavailable() => self.bootstrap_then_run(scripts, e).await,
            Err(e) => {
                self.say(format!("Could not read the delivery ledger: {e}"));
                Ok(ExecutionOutcome::FinishedWithError)
            }
        }
    }

    /// Run the first script without the ledger, expecting it to provision
    /// the store, then create the ledger and continue with the rest.
    async fn bootstrap_then_run(
        &self,
        mut scripts: Vec<PreparedScript>,
        cause: StorageError,
    ) -> Result<ExecutionOutcome> {
        if scripts.is_empty() {
            self.say(format!("Delivery ledger unavailable: {cause}"));
            return Ok(ExecutionOutcome::FinishedWithError);
        }
        let first = scripts.remove(0);

        warn!(script = %first.name, error = %cause, "ledger unavailable, bootstrapping");
        self.say(format!(
            "Delivery ledger unavailable ({cause}); running {} to provision it",
            first.name
        ));

        let run = execute_script(self.dispatcher.as_ref(), &first).await?;
        if !run.signed_for() {
            self.say(format!(
                "{} did not complete ({}); the delivery ledger was not created",
                first.name, run.outcome
            ));
            return Ok(ExecutionOutcome::FinishedWithError);
        }

        if let Err(e) = self.ledger.create().await {
            self.say(format!(
                "{} completed but the database problem persists: {e}",
                first.name
            ));
            return Ok(ExecutionOutcome::FinishedWithError);
        }

        let entry = LedgerEntry::new(first.name.clone(), true, first.digest.clone());
        if let Err(e) = self.ledger.save(&entry).await {
            self.say(format!(
                "{} completed but could not be recorded: {e}",
                first.name
            ));
            return Ok(ExecutionOutcome::FinishedWithError);
        }
        self.say(format!("{} signed for", first.name));

        self.normal_run(&scripts).await
    }

    /// Deliver each script unless the ledger says it was already signed for.
    async fn normal_run(&self, scripts: &[PreparedScript]) -> Result<ExecutionOutcome> {
        for script in scripts {
            match self.ledger.claim(&script.name, &self.session).await {
                Ok(true) => {}
                Ok(false) => {
                    self.say(format!(
                        "{name} is being delivered by another session; stopping \
                         (`deliver unlock {name}` releases it if that session is gone)",
                        name = script.name
                    ));
                    return Ok(ExecutionOutcome::FinishedWithError);
                }
                Err(e) => {
                    self.say(format!("Could not claim {}: {e}", script.name));
                    return Ok(ExecutionOutcome::FinishedWithError);
                }
            }

            let step = self.deliver_claimed(script).await;

            if let Err(e) = self.ledger.release(&script.name, &self.session).await {
                warn!(script = %script.name, error = %e, "failed to release claim");
            }

            match step? {
                Step::Next => continue,
                Step::Stop(outcome) => return Ok(outcome),
            }
        }

        Ok(ExecutionOutcome::Continue)
    }

    async fn deliver_claimed(&self, script: &PreparedScript) -> Result<Step> {
        // Read after claiming: another session may have finished it meanwhile.
        let latest = match self.ledger.find_by_name(&script.name).await {
            Ok(latest) => latest,
            Err(e) => {
                self.say(format!("Could not read the ledger entry for {}: {e}", script.name));
                return Ok(Step::Stop(ExecutionOutcome::FinishedWithError));
            }
        };

        if let Some(entry) = latest.filter(|e| e.signed_for) {
            return Ok(self.skip_signed_for(script, &entry));
        }

        self.say(format!("Delivering {}", script.name));
        let run = execute_script(self.dispatcher.as_ref(), script).await?;

        let entry = LedgerEntry::new(script.name.clone(), run.signed_for(), script.digest.clone());
        if let Err(e) = self.ledger.save(&entry).await {
            self.say(format!("{} ran but could not be recorded: {e}", script.name));
            return Ok(Step::Stop(ExecutionOutcome::FinishedWithError));
        }

        match run.outcome {
            ExecutionOutcome::Continue => {
                info!(script = %script.name, "signed for");
                self.say(format!("{} signed for", script.name));
                Ok(Step::Next)
            }
            ExecutionOutcome::Shutdown => {
                info!(script = %script.name, "shutdown requested");
                self.say(format!(
                    "{} requested shutdown after {} instruction(s); stopping",
                    script.name, run.completed
                ));
                Ok(Step::Stop(ExecutionOutcome::Shutdown))
            }
            ExecutionOutcome::FinishedWithError => {
                warn!(script = %script.name, line = run.completed + 1, "delivery failed");
                self.say(format!(
                    "{} failed at instruction {}; stopping",
                    script.name,
                    run.completed + 1
                ));
                Ok(Step::Stop(ExecutionOutcome::FinishedWithError))
            }
        }
    }

    fn skip_signed_for(&self, script: &PreparedScript, entry: &LedgerEntry) -> Step {
        let signed_on = entry.execution_date.format("%Y-%m-%d %H:%M:%S");

        if entry.hash != script.digest {
            match self.settings.hash_policy {
                HashPolicy::Ignore => {
                    debug!(script = %script.name, "content changed since signed for");
                }
                HashPolicy::Warn => {
                    self.say(format!(
                        "Warning: {} changed since it was signed for (recorded {}, now {})",
                        script.name,
                        entry.hash.short(),
                        script.digest.short()
                    ));
                }
                HashPolicy::Reject => {
                    self.say(format!(
                        "{} changed since it was signed for on {signed_on} (recorded {}, now {}); stopping",
                        script.name,
                        entry.hash.short(),
                        script.digest.short()
                    ));
                    return Step::Stop(ExecutionOutcome::FinishedWithError);
                }
            }
        }

        self.say(format!("Skipping {}: signed for on {signed_on}", script.name));
        Step::Next
    }
}
