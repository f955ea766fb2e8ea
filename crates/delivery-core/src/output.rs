//! User-visible status lines.
//!
//! Kept apart from `tracing`: logs are for operators debugging the tool,
//! these lines are the tool's answer (missing parameters, skip/run/fail
//! notices, status tables).

use std::sync::Mutex;

/// Destination for line-oriented status messages.
pub trait OutputSink: Send + Sync {
    fn line(&self, line: &str);

    fn lines(&self, lines: &[String]) {
        for line in lines {
            self.line(line);
        }
    }
}

/// Prints every line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleOutput;

impl OutputSink for ConsoleOutput {
    fn line(&self, line: &str) {
        println!("{line}");
    }
}

/// Captures lines in memory.
#[derive(Debug, Default)]
pub struct BufferedOutput {
    lines: Mutex<Vec<String>>,
}

impl BufferedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn captured(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// Whether any captured line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.captured().iter().any(|l| l.contains(needle))
    }
}

impl OutputSink for BufferedOutput {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_output_keeps_order() {
        let out = BufferedOutput::new();
        out.line("first");
        out.lines(&["second".to_string(), "third".to_string()]);
        assert_eq!(out.captured(), vec!["first", "second", "third"]);
        assert!(out.contains("sec"));
    }
}
