//! Tracking reporter: read-only status and audit views over the ledger.
//!
//! Nothing here mutates the ledger. Every ledger failure is printed and
//! mapped to `FinishedWithError`; none is returned to the caller.

use std::collections::HashSet;
use std::sync::Arc;

use delivery_state::{DeliveryLedger, LedgerEntry};
use tracing::warn;

use crate::dispatch::ExecutionOutcome;
use crate::output::OutputSink;
use crate::script::ScriptStore;

const NOT_ATTEMPTED: &str = "not attempted";

/// Prints ledger tables through an [`OutputSink`].
pub struct TrackingReporter {
    ledger: Arc<dyn DeliveryLedger>,
    output: Arc<dyn OutputSink>,
}

impl TrackingReporter {
    pub fn new(ledger: Arc<dyn DeliveryLedger>, output: Arc<dyn OutputSink>) -> Self {
        Self { ledger, output }
    }

    /// Every signed-for entry, oldest first.
    pub async fn signed_for(&self) -> ExecutionOutcome {
        let entries = match self.load_all().await {
            Ok(Some(entries)) => entries,
            Ok(None) => return ExecutionOutcome::Continue,
            Err(outcome) => return outcome,
        };
        let rows: Vec<_> = entries
            .iter()
            .filter(|e| e.signed_for)
            .map(entry_row)
            .collect();
        if rows.is_empty() {
            self.output.line("No deliveries have been signed for yet");
        } else {
            self.print_table(rows);
        }
        ExecutionOutcome::Continue
    }

    /// Every recorded attempt, oldest first.
    pub async fn history(&self) -> ExecutionOutcome {
        let entries = match self.load_all().await {
            Ok(Some(entries)) => entries,
            Ok(None) => return ExecutionOutcome::Continue,
            Err(outcome) => return outcome,
        };
        if entries.is_empty() {
            self.output.line("No deliveries have been attempted yet");
        } else {
            self.print_table(entries.iter().map(entry_row).collect());
        }
        ExecutionOutcome::Continue
    }

    /// Latest entry for each requested name, in the order given.
    pub async fn status(&self, names: &[String]) -> ExecutionOutcome {
        match self.ledger_ready().await {
            Ok(true) => {}
            Ok(false) => return ExecutionOutcome::Continue,
            Err(outcome) => return outcome,
        }

        let mut rows = Vec::with_capacity(names.len());
        for name in names {
            match self.ledger.find_by_name(name).await {
                Ok(Some(entry)) => rows.push(entry_row(&entry)),
                Ok(None) => rows.push(pending_row(name)),
                Err(e) => return self.fail("read the delivery ledger", &e),
            }
        }
        self.print_table(rows);
        ExecutionOutcome::Continue
    }

    /// Scripts in `store` the ledger has never seen.
    pub async fn available(&self, store: &ScriptStore) -> ExecutionOutcome {
        let names = match store.script_names().await {
            Ok(names) => names,
            Err(e) => {
                self.output.line(&e.to_string());
                return ExecutionOutcome::FinishedWithError;
            }
        };

        let seen: HashSet<String> = match self.load_all().await {
            Ok(Some(entries)) => entries.into_iter().map(|e| e.name).collect(),
            Ok(None) => HashSet::new(),
            Err(outcome) => return outcome,
        };

        let pending: Vec<_> = names
            .iter()
            .filter(|name| !seen.contains(*name))
            .map(|name| pending_row(name))
            .collect();
        if pending.is_empty() {
            self.output.line(&format!(
                "Every delivery script in {} has been attempted",
                store.directory().display()
            ));
        } else {
            self.print_table(pending);
        }
        ExecutionOutcome::Continue
    }

    /// `Ok(None)` when the ledger has not been created.
    async fn load_all(&self) -> Result<Option<Vec<LedgerEntry>>, ExecutionOutcome> {
        if !self.ledger_ready().await? {
            return Ok(None);
        }
        self.ledger
            .fetch_all()
            .await
            .map(Some)
            .map_err(|e| self.fail("read the delivery ledger", &e))
    }

    async fn ledger_ready(&self) -> Result<bool, ExecutionOutcome> {
        match self.ledger.exists().await {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.output
                    .line("The delivery ledger has not been created yet");
                Ok(false)
            }
            Err(e) => Err(self.fail("reach the delivery ledger", &e)),
        }
    }

    fn fail(&self, action: &str, err: &dyn std::fmt::Display) -> ExecutionOutcome {
        warn!(error = %err, "tracking query failed");
        self.output.line(&format!("Could not {action}: {err}"));
        ExecutionOutcome::FinishedWithError
    }

    fn print_table(&self, rows: Vec<[String; 4]>) {
        let header = ["Name", "Executed", "Signed for", "Hash"].map(String::from);
        let mut widths = header.clone().map(|h| h.len());
        for row in &rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.len());
            }
        }

        let render = |row: &[String; 4]| {
            format!(
                "{:<w0$}  {:<w1$}  {:<w2$}  {}",
                row[0],
                row[1],
                row[2],
                row[3],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2],
            )
            .trim_end()
            .to_string()
        };

        self.output.line(&render(&header));
        for row in &rows {
            self.output.line(&render(row));
        }
    }
}

fn entry_row(entry: &LedgerEntry) -> [String; 4] {
    [
        entry.name.clone(),
        entry.execution_date.format("%Y-%m-%d %H:%M:%S").to_string(),
        if entry.signed_for { "yes" } else { "no" }.to_string(),
        entry.hash.short().to_string(),
    ]
}

fn pending_row(name: &str) -> [String; 4] {
    [
        name.to_string(),
        NOT_ATTEMPTED.to_string(),
        "no".to_string(),
        String::new(),
    ]
}
