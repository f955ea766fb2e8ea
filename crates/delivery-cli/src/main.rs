//! Delivery CLI
//!
//! The `deliver` command runs an ordered directory of delivery scripts
//! against the built-in command registry, recording each attempt in the
//! delivery ledger.
//!
//! ## Commands
//!
//! - `run`: deliver every pending script (`-p:key=value`, `-s:stop-before`)
//! - `status`: signed-for scripts, or the latest attempt of named scripts
//! - `history`: every recorded attempt
//! - `available`: scripts the ledger has never seen
//! - `commands`: instructions a delivery script may use
//! - `unlock`: drop a claim left behind by a session that died mid-delivery

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};

use delivery_core::{
    CommandDispatcher, CommandRegistry, ConsoleOutput, DeliveryEngine, DeliveryLedger,
    DeliverySettings, ExecutionOutcome, OutputSink, ScriptStore, TrackingReporter,
};
use delivery_state::SurrealDeliveryLedger;

#[derive(Parser)]
#[command(name = "deliver")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run ordered, resumable delivery scripts", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Delivery script directory (overrides DELIVERY_DIR)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver every script that has not been signed for
    Run {
        /// `-p:name=value` parameters and an optional `-s:script` stop marker
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Show signed-for scripts, or the latest attempt of the named scripts
    Status {
        /// Script file names to report on
        names: Vec<String>,
    },

    /// Show every recorded attempt, oldest first
    History,

    /// List scripts in the delivery directory that were never attempted
    Available,

    /// List the commands available to delivery scripts
    Commands {
        /// Show detailed help for one command
        topic: Option<String>,
    },

    /// Release the claim on a script held by a session that is gone
    Unlock {
        /// Script file name
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    delivery_core::telemetry::init_tracing(cli.json, level);

    let mut settings =
        DeliverySettings::from_env().context("Failed to read delivery settings")?;
    if let Some(dir) = cli.dir {
        settings.delivery_dir = dir;
    }
    debug!(dir = %settings.delivery_dir.display(), "settings loaded");

    // Connection is deferred to first use so the engine can bootstrap.
    let ledger: Arc<dyn DeliveryLedger> = Arc::new(SurrealDeliveryLedger::from_env());
    let output: Arc<dyn OutputSink> = Arc::new(ConsoleOutput);

    let outcome = match cli.command {
        Commands::Run { args } => cmd_run(settings, ledger, output, &args).await?,
        Commands::Status { names } => {
            let reporter = TrackingReporter::new(ledger, output);
            if names.is_empty() {
                reporter.signed_for().await
            } else {
                reporter.status(&names).await
            }
        }
        Commands::History => TrackingReporter::new(ledger, output).history().await,
        Commands::Available => {
            let store = ScriptStore::new(&settings.delivery_dir);
            TrackingReporter::new(ledger, output).available(&store).await
        }
        Commands::Commands { topic } => cmd_commands(output, topic.as_deref()).await?,
        Commands::Unlock { name } => cmd_unlock(settings, ledger, output, &name).await,
    };

    if outcome.is_failure() {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_run(
    settings: DeliverySettings,
    ledger: Arc<dyn DeliveryLedger>,
    output: Arc<dyn OutputSink>,
    args: &[String],
) -> Result<ExecutionOutcome> {
    let registry = Arc::new(CommandRegistry::with_builtins(output.clone()));
    let engine = DeliveryEngine::new(settings, ledger, registry, output);
    debug!(session = engine.session(), "starting delivery run");

    engine.run(args).await.context("Delivery run aborted")
}

async fn cmd_unlock(
    settings: DeliverySettings,
    ledger: Arc<dyn DeliveryLedger>,
    output: Arc<dyn OutputSink>,
    name: &str,
) -> ExecutionOutcome {
    let registry = Arc::new(CommandRegistry::with_builtins(output.clone()));
    DeliveryEngine::new(settings, ledger, registry, output)
        .unlock(name)
        .await
}

async fn cmd_commands(
    output: Arc<dyn OutputSink>,
    topic: Option<&str>,
) -> Result<ExecutionOutcome> {
    let registry = CommandRegistry::with_builtins(output);
    let instruction = match topic {
        Some(topic) => format!("help {topic}"),
        None => "help".to_string(),
    };
    registry
        .run_with_args(&instruction)
        .await
        .context("Failed to show command help")
}

#[cfg(test)]
mod tests {
    use super::*;
    use delivery_core::BufferedOutput;

    #[test]
    fn run_accepts_raw_engine_arguments() {
        let cli = Cli::try_parse_from([
            "deliver",
            "--dir",
            "/srv/deliveries",
            "run",
            "-p:bar=baz",
            "-s:003.delivery",
        ])
        .unwrap();

        assert_eq!(cli.dir, Some(PathBuf::from("/srv/deliveries")));
        match cli.command {
            Commands::Run { args } => assert_eq!(args, vec!["-p:bar=baz", "-s:003.delivery"]),
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn status_takes_optional_names() {
        let cli = Cli::try_parse_from(["deliver", "status"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { names } if names.is_empty()));

        let cli = Cli::try_parse_from(["deliver", "-v", "status", "001.delivery"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Status { names } if names == ["001.delivery"]));
    }

    #[tokio::test]
    async fn run_against_embedded_store_is_resumable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001-greet.delivery"), "echo hello $who$").unwrap();
        std::fs::write(dir.path().join("002-done.delivery"), "echo done").unwrap();

        let ledger: Arc<dyn DeliveryLedger> = Arc::new(SurrealDeliveryLedger::in_memory());
        let out = Arc::new(BufferedOutput::new());
        let args = vec!["-p:who=world".to_string()];

        let outcome = cmd_run(
            DeliverySettings::new(dir.path()),
            ledger.clone(),
            out.clone(),
            &args,
        )
        .await
        .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Continue);
        assert!(out.contains("hello world"));
        assert!(out.contains("002-done.delivery signed for"));

        let again = Arc::new(BufferedOutput::new());
        let outcome = cmd_run(DeliverySettings::new(dir.path()), ledger, again.clone(), &args)
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Continue);
        assert!(again.contains("Skipping 001-greet.delivery"));
        assert!(!again.contains("hello world"));
    }

    #[test]
    fn unlock_requires_a_name() {
        let cli = Cli::try_parse_from(["deliver", "unlock", "003.delivery"]).unwrap();
        assert!(matches!(cli.command, Commands::Unlock { name } if name == "003.delivery"));

        assert!(Cli::try_parse_from(["deliver", "unlock"]).is_err());
    }

    #[tokio::test]
    async fn unlock_recovers_from_a_killed_session() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001.delivery"), "echo recovered").unwrap();

        let ledger: Arc<dyn DeliveryLedger> = Arc::new(SurrealDeliveryLedger::in_memory());
        ledger.create().await.unwrap();
        // A session that claimed the script and never came back.
        assert!(ledger.claim("001.delivery", "killed-session").await.unwrap());

        let out = Arc::new(BufferedOutput::new());
        let none: Vec<String> = Vec::new();
        let outcome = cmd_run(DeliverySettings::new(dir.path()), ledger.clone(), out.clone(), &none)
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::FinishedWithError);
        assert!(out.contains("deliver unlock 001.delivery"));

        let outcome = cmd_unlock(
            DeliverySettings::new(dir.path()),
            ledger.clone(),
            out.clone(),
            "001.delivery",
        )
        .await;
        assert_eq!(outcome, ExecutionOutcome::Continue);
        assert!(out.contains("Released the claim on 001.delivery"));

        let outcome = cmd_run(DeliverySettings::new(dir.path()), ledger, out.clone(), &none)
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::Continue);
        assert!(out.contains("recovered"));
        assert!(out.contains("001.delivery signed for"));
    }

    #[tokio::test]
    async fn commands_lists_builtins() {
        let out = Arc::new(BufferedOutput::new());
        let outcome = cmd_commands(out.clone(), None).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Continue);
        assert!(out.contains("Available commands:"));
        assert!(out.contains("exec"));
    }
}
