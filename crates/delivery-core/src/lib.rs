//! Delivery Core Library
//!
//! Runs an ordered directory of delivery scripts against a command
//! dispatcher, recording each attempt in a [`DeliveryLedger`] so that
//! scripts already signed for are never run twice.
//!
//! The pieces:
//! - [`script`]: discovers `*.delivery` files and strips comments
//! - [`tokens`]: `$Name$` parameter validation and substitution
//! - [`engine`]: the run loop, including ledger bootstrap recovery
//! - [`registry`]: the default [`CommandDispatcher`] and built-in commands
//! - [`tracking`]: read-only ledger reports

pub mod args;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod output;
pub mod registry;
pub mod script;
pub mod settings;
pub mod telemetry;
pub mod tokens;
pub mod tracking;

pub use args::RunArgs;
pub use dispatch::{CommandDispatcher, ExecutionOutcome};
pub use engine::{execute_script, prepare_scripts, DeliveryEngine, PreparedScript, ScriptRun};
pub use error::{DeliveryError, Result};
pub use output::{BufferedOutput, ConsoleOutput, OutputSink};
pub use registry::{Command, CommandContext, CommandFactory, CommandRegistry, DetailedHelp};
pub use script::{DeliveryScript, ScriptStore, COMMENT_MARKER, SCRIPT_EXTENSION};
pub use settings::{
    DeliverySettings, HashPolicy, PARAM_DELIVERY_FOLDER, PARAM_INSTALL_PATH,
    PARAM_RUNTIME_VERSION, PARAM_SITE_ROOT,
};
pub use tokens::ParameterSet;
pub use tracking::TrackingReporter;

pub use delivery_state::{ContentDigest, DeliveryLedger, LedgerEntry, StorageError};
