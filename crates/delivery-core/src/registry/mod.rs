//! Command registry: the default [`CommandDispatcher`].
//!
//! Commands are registered once at startup as name/alias → factory entries.
//! Each dispatched instruction constructs a fresh handler from its factory.
//! Detailed help is an explicit capability a command opts into through
//! [`Command::detailed_help`].

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::dispatch::{CommandDispatcher, ExecutionOutcome};
use crate::error::Result;
use crate::output::OutputSink;

/// Collaborators handed to every command factory.
#[derive(Clone)]
pub struct CommandContext {
    pub output: Arc<dyn OutputSink>,
}

/// Capability: a command that can describe its usage in detail.
pub trait DetailedHelp {
    fn usage(&self) -> Vec<String>;
}

/// One executable command.
#[async_trait]
pub trait Command: Send + Sync {
    /// One-line description for `help`.
    fn summary(&self) -> &'static str;

    async fn run(&self, args: &[String]) -> Result<ExecutionOutcome>;

    fn detailed_help(&self) -> Option<&dyn DetailedHelp> {
        None
    }
}

/// Builds a command handler.
pub type CommandFactory = fn(&CommandContext) -> Box<dyn Command>;

struct Registration {
    name: &'static str,
    aliases: Vec<&'static str>,
    factory: CommandFactory,
}

/// Name/alias → factory table.
pub struct CommandRegistry {
    context: CommandContext,
    commands: Vec<Registration>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    /// Empty registry.
    pub fn new(output: Arc<dyn OutputSink>) -> Self {
        Self {
            context: CommandContext { output },
            commands: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Registry with `echo`, `exec`, `sh` and `exit`.
    pub fn with_builtins(output: Arc<dyn OutputSink>) -> Self {
        let mut registry = Self::new(output);
        builtin::register_all(&mut registry);
        registry
    }

    /// Register a command. Names and aliases are case-insensitive; a later
    /// registration of the same word replaces the earlier one.
    pub fn register(
        &mut self,
        name: &'static str,
        aliases: &[&'static str],
        factory: CommandFactory,
    ) -> &mut Self {
        let slot = self.commands.len();
        self.commands.push(Registration {
            name,
            aliases: aliases.to_vec(),
            factory,
        });
        for word in std::iter::once(&name).chain(aliases.iter()) {
            self.index.insert(word.to_ascii_lowercase(), slot);
        }
        self
    }

    /// Construct the handler registered under `word`.
    pub fn resolve(&self, word: &str) -> Option<Box<dyn Command>> {
        self.index
            .get(&word.to_ascii_lowercase())
            .map(|&slot| (self.commands[slot].factory)(&self.context))
    }

    /// Primary names of all reachable commands, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .commands
            .iter()
            .enumerate()
            .filter(|(slot, reg)| self.index.get(&reg.name.to_ascii_lowercase()) == Some(slot))
            .map(|(_, reg)| reg.name)
            .collect();
        names.sort_unstable();
        names
    }

    /// Help text: a summary table, or one command's detailed usage.
    pub fn help_lines(&self, topic: Option<&str>) -> Option<Vec<String>> {
        let Some(topic) = topic else {
            let mut lines = vec!["Available commands:".to_string()];
            for name in self.names() {
                if let Some(cmd) = self.resolve(name) {
                    lines.push(format!("  {:<10} {}", name, cmd.summary()));
                }
            }
            return Some(lines);
        };

        let slot = *self.index.get(&topic.to_ascii_lowercase())?;
        let reg = &self.commands[slot];
        let cmd = (reg.factory)(&self.context);

        let mut lines = vec![format!("{} - {}", reg.name, cmd.summary())];
        if !reg.aliases.is_empty() {
            lines.push(format!("Aliases: {}", reg.aliases.join(", ")));
        }
        match cmd.detailed_help() {
            Some(detail) => lines.extend(detail.usage()),
            None => lines.push("No detailed help available.".to_string()),
        }
        Some(lines)
    }
}

#[async_trait]
impl CommandDispatcher for CommandRegistry {
    async fn run_with_args(&self, instruction: &str) -> Result<ExecutionOutcome> {
        let words = split_words(instruction);
        let Some((name, args)) = words.split_first() else {
            return Ok(ExecutionOutcome::Continue);
        };

        if name.eq_ignore_ascii_case("help") {
            return Ok(match self.help_lines(args.first().map(String::as_str)) {
                Some(lines) => {
                    self.context.output.lines(&lines);
                    ExecutionOutcome::Continue
                }
                None => {
                    self.context
                        .output
                        .line(&format!("No help for unknown command '{}'", args[0]));
                    ExecutionOutcome::FinishedWithError
                }
            });
        }

        match self.resolve(name) {
            Some(cmd) => {
                debug!(command = %name, args = args.len(), "dispatching");
                cmd.run(args).await
            }
            None => {
                self.context
                    .output
                    .line(&format!("Unknown command '{name}'"));
                Ok(ExecutionOutcome::FinishedWithError)
            }
        }
    }
}

/// Split an instruction into words on whitespace, keeping double-quoted
/// runs together. `\"` inside quotes is a literal quote.
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}
