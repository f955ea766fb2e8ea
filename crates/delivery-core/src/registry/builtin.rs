//! Built-in commands available to every delivery script.

use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command as Process;
use tracing::{debug, warn};

use super::{Command, CommandRegistry, DetailedHelp};
use crate::dispatch::ExecutionOutcome;
use crate::error::Result;
use crate::output::OutputSink;

pub(super) fn register_all(registry: &mut CommandRegistry) {
    registry
        .register("echo", &["print"], |ctx| {
            Box::new(Echo {
                output: ctx.output.clone(),
            })
        })
        .register("exec", &["run"], |ctx| {
            Box::new(Exec {
                output: ctx.output.clone(),
            })
        })
        .register("sh", &["shell"], |ctx| {
            Box::new(Shell {
                output: ctx.output.clone(),
            })
        })
        .register("exit", &["quit"], |_| Box::new(Exit));
}

// ---------------------------------------------------------------------------
// echo
// ---------------------------------------------------------------------------

struct Echo {
    output: Arc<dyn OutputSink>,
}

#[async_trait]
impl Command for Echo {
    fn summary(&self) -> &'static str {
        "print the arguments"
    }

    async fn run(&self, args: &[String]) -> Result<ExecutionOutcome> {
        self.output.line(&args.join(" "));
        Ok(ExecutionOutcome::Continue)
    }
}

// ---------------------------------------------------------------------------
// exec / sh
// ---------------------------------------------------------------------------

struct Exec {
    output: Arc<dyn OutputSink>,
}

impl DetailedHelp for Exec {
    fn usage(&self) -> Vec<String> {
        vec![
            "Usage: exec <program> [args...]".to_string(),
            "Runs the program directly (no shell). Exit code 0 continues the".to_string(),
            "delivery; anything else fails it.".to_string(),
        ]
    }
}

#[async_trait]
impl Command for Exec {
    fn summary(&self) -> &'static str {
        "run a program"
    }

    async fn run(&self, args: &[String]) -> Result<ExecutionOutcome> {
        let Some((program, rest)) = args.split_first() else {
            self.output.line("exec: missing program");
            return Ok(ExecutionOutcome::FinishedWithError);
        };
        run_process(self.output.as_ref(), program, rest).await
    }

    fn detailed_help(&self) -> Option<&dyn DetailedHelp> {
        Some(self)
    }
}

struct Shell {
    output: Arc<dyn OutputSink>,
}

impl DetailedHelp for Shell {
    fn usage(&self) -> Vec<String> {
        vec![
            "Usage: sh <command line>".to_string(),
            "Runs the words joined by spaces through `sh -c`.".to_string(),
        ]
    }
}

#[async_trait]
impl Command for Shell {
    fn summary(&self) -> &'static str {
        "run a shell command line"
    }

    async fn run(&self, args: &[String]) -> Result<ExecutionOutcome> {
        if args.is_empty() {
            self.output.line("sh: missing command line");
            return Ok(ExecutionOutcome::FinishedWithError);
        }
        let script = args.join(" ");
        run_process(self.output.as_ref(), "sh", &["-c".to_string(), script]).await
    }

    fn detailed_help(&self) -> Option<&dyn DetailedHelp> {
        Some(self)
    }
}

/// Spawn, wait, echo captured output, and map the exit status.
async fn run_process(
    output: &dyn OutputSink,
    program: &str,
    args: &[String],
) -> Result<ExecutionOutcome> {
    debug!(program, args = ?args, "spawning process");

    let result = Process::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await;

    let out = match result {
        Ok(out) => out,
        Err(e) => {
            warn!(program, error = %e, "failed to spawn");
            output.line(&format!("{program}: {e}"));
            return Ok(ExecutionOutcome::FinishedWithError);
        }
    };

    for line in String::from_utf8_lossy(&out.stdout).lines() {
        output.line(line);
    }
    for line in String::from_utf8_lossy(&out.stderr).lines() {
        output.line(line);
    }

    if out.status.success() {
        Ok(ExecutionOutcome::Continue)
    } else {
        let code = out
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        output.line(&format!("{program} exited with {code}"));
        Ok(ExecutionOutcome::FinishedWithError)
    }
}

// ---------------------------------------------------------------------------
// exit
// ---------------------------------------------------------------------------

struct Exit;

#[async_trait]
impl Command for Exit {
    fn summary(&self) -> &'static str {
        "end the session"
    }

    async fn run(&self, _args: &[String]) -> Result<ExecutionOutcome> {
        Ok(ExecutionOutcome::Shutdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::CommandDispatcher;
    use crate::output::BufferedOutput;

    fn registry() -> (Arc<BufferedOutput>, CommandRegistry) {
        let out = Arc::new(BufferedOutput::new());
        let reg = CommandRegistry::with_builtins(out.clone());
        (out, reg)
    }

    #[tokio::test]
    async fn echo_prints_words() {
        let (out, reg) = registry();
        let outcome = reg.run_with_args(r#"echo "hello world" again"#).await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Continue);
        assert_eq!(out.captured(), vec!["hello world again"]);
    }

    #[tokio::test]
    async fn exit_and_quit_shut_down() {
        let (_, reg) = registry();
        assert_eq!(
            reg.run_with_args("exit").await.unwrap(),
            ExecutionOutcome::Shutdown
        );
        assert_eq!(
            reg.run_with_args("QUIT").await.unwrap(),
            ExecutionOutcome::Shutdown
        );
    }

    #[tokio::test]
    async fn exec_maps_exit_status() {
        let (out, reg) = registry();
        assert_eq!(
            reg.run_with_args("exec true").await.unwrap(),
            ExecutionOutcome::Continue
        );
        assert_eq!(
            reg.run_with_args("exec false").await.unwrap(),
            ExecutionOutcome::FinishedWithError
        );
        assert!(out.contains("false exited with 1"));
    }

    #[tokio::test]
    async fn exec_of_missing_program_fails_without_error() {
        let (_, reg) = registry();
        let outcome = reg
            .run_with_args("exec definitely-not-a-real-program-xyz")
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::FinishedWithError);
    }

    #[tokio::test]
    async fn sh_captures_stdout() {
        let (out, reg) = registry();
        let outcome = reg.run_with_args("sh echo from-shell").await.unwrap();
        assert_eq!(outcome, ExecutionOutcome::Continue);
        assert!(out.contains("from-shell"));
    }

    #[tokio::test]
    async fn help_uses_detailed_capability() {
        let (out, reg) = registry();
        reg.run_with_args("help exec").await.unwrap();
        assert!(out.contains("Usage: exec <program> [args...]"));
        assert!(out.contains("Aliases: run"));
    }

    #[test]
    fn builtins_are_listed() {
        let (_, reg) = registry();
        assert_eq!(reg.names(), vec!["echo", "exec", "exit", "sh"]);
    }
}
