//! Delivery engine: turns a directory of scripts into an ordered, resumable,
//! signed-for unit of work.
//!
//! One run:
//! 1. parse `-p:`/`-s:` arguments
//! 2. list scripts in file-name order and apply the stop marker
//! 3. merge built-in and user parameters (user values win)
//! 4. validate every script's tokens before anything executes
//! 5. bring the ledger up (see [`bootstrap`]) and deliver
//!
//! Execution is strictly sequential: one script at a time, one instruction
//! at a time, each dispatcher and ledger call awaited before the next.

mod bootstrap;
pub mod runner;

use std::collections::BTreeSet;
use std::sync::Arc;

use delivery_state::DeliveryLedger;
use tracing::{info, instrument, warn};

use crate::args::RunArgs;
use crate::dispatch::{CommandDispatcher, ExecutionOutcome};
use crate::error::Result;
use crate::output::OutputSink;
use crate::script::{DeliveryScript, ScriptStore};
use crate::settings::DeliverySettings;
use crate::tokens::{find_tokens, format_missing, resolve, validate, ParameterSet};

pub use runner::{execute_script, PreparedScript, ScriptRun};

/// Orchestrates script store, token resolver, ledger and dispatcher.
pub struct DeliveryEngine {
    settings: DeliverySettings,
    ledger: Arc<dyn DeliveryLedger>,
    dispatcher: Arc<dyn CommandDispatcher>,
    output: Arc<dyn OutputSink>,
    /// Claim owner for this engine's ledger claims.
    session: String,
}

impl DeliveryEngine {
    pub fn new(
        settings: DeliverySettings,
        ledger: Arc<dyn DeliveryLedger>,
        dispatcher: Arc<dyn CommandDispatcher>,
        output: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            settings,
            ledger,
            dispatcher,
            output,
            session: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Use a fixed session id instead of a random one.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Run every pending delivery script.
    ///
    /// Returns `Continue` when everything attempted was signed for or
    /// skipped, `Shutdown` when a script asked to end the session, and
    /// `FinishedWithError` otherwise. `Err` is reserved for unexpected
    /// dispatcher failures.
    #[instrument(skip_all, fields(session = %self.session, dir = %self.settings.delivery_dir.display()))]
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<ExecutionOutcome> {
        let run_args = match RunArgs::parse(args) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.say(format!("Cannot run deliveries: {e}"));
                return Ok(ExecutionOutcome::FinishedWithError);
            }
        };

        let store = ScriptStore::new(&self.settings.delivery_dir);
        let scripts = match store.list_scripts().await {
            Ok(scripts) => scripts,
            Err(e) => {
                // Nothing was attempted, so this is not a failed delivery.
                self.say(e.to_string());
                return Ok(ExecutionOutcome::Continue);
            }
        };
        if scripts.is_empty() {
            self.say(format!(
                "No delivery scripts found in {}",
                self.settings.delivery_dir.display()
            ));
            return Ok(ExecutionOutcome::Continue);
        }

        let scripts = self.apply_stop_marker(scripts, run_args.stop_before.as_deref());
        if scripts.is_empty() {
            self.say("Nothing to deliver before the stop marker".to_string());
            return Ok(ExecutionOutcome::Continue);
        }

        let params = self
            .settings
            .builtin_parameters()
            .merged_with(&run_args.parameters);

        let prepared = match prepare_scripts(scripts, &params) {
            Ok(prepared) => prepared,
            Err(missing) => {
                warn!(missing = missing.len(), "refusing to run with unresolved tokens");
                self.say("The following parameters are missing:".to_string());
                self.output.lines(&format_missing(&missing));
                return Ok(ExecutionOutcome::FinishedWithError);
            }
        };

        info!(count = prepared.len(), "delivering scripts");
        self.deliver(prepared).await
    }

    /// Drop the claim on `name` whatever its owner or age.
    ///
    /// For claims left by a session that was killed before it could release
    /// them and that should not wait out the lease.
    pub async fn unlock(&self, name: &str) -> ExecutionOutcome {
        match self.ledger.force_release(name).await {
            Ok(true) => {
                info!(script = name, "claim released by operator");
                self.say(format!("Released the claim on {name}"));
                ExecutionOutcome::Continue
            }
            Ok(false) => {
                self.say(format!("{name} is not claimed"));
                ExecutionOutcome::Continue
            }
            Err(e) => {
                self.say(format!("Could not release the claim on {name}: {e}"));
                ExecutionOutcome::FinishedWithError
            }
        }
    }

    /// Keep only scripts strictly before `marker`.
    fn apply_stop_marker(
        &self,
        mut scripts: Vec<DeliveryScript>,
        marker: Option<&str>,
    ) -> Vec<DeliveryScript> {
        let Some(marker) = marker else {
            return scripts;
        };
        match scripts.iter().position(|s| s.name == marker) {
            Some(idx) => {
                info!(marker, kept = idx, "applying stop marker");
                scripts.truncate(idx);
            }
            None => {
                self.say(format!(
                    "Warning: stop marker {marker} matches no delivery script; running all"
                ));
            }
        }
        scripts
    }

    fn say(&self, line: String) {
        self.output.line(&line);
    }
}

/// Validate every script's tokens, then resolve them all.
///
/// Returns the union of missing names if any script cannot be fully
/// resolved; in that case nothing is resolved at all.
pub fn prepare_scripts(
    scripts: Vec<DeliveryScript>,
    params: &ParameterSet,
) -> std::result::Result<Vec<PreparedScript>, BTreeSet<String>> {
    let mut missing = BTreeSet::new();
    for script in &scripts {
        let absent = validate(&find_tokens(&script.instructions), params);
        if !absent.is_empty() {
            warn!(script = %script.name, missing = ?absent, "unresolved tokens");
            missing.extend(absent);
        }
    }
    if !missing.is_empty() {
        return Err(missing);
    }

    Ok(scripts
        .into_iter()
        .map(|script| PreparedScript {
            instructions: resolve(&script.instructions, params),
            name: script.name,
            digest: script.digest,
        })
        .collect())
}
