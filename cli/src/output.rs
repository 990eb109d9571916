//! CLI output helpers and the lifecycle log sink.

use std::sync::Mutex;

use colored::Colorize;

/// Receives the lifecycle messages of a run, in call order
pub trait LogSink: Send + Sync {
    fn log(&self, message: &str);
}

/// Writes `[HH:MM:SS] message` lines to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleLog;

impl LogSink for ConsoleLog {
    fn log(&self, message: &str) {
        println!("{} {}", muted(&timestamp()), message);
    }
}

/// Keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryLog {
    lines: Mutex<Vec<String>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl LogSink for MemoryLog {
    fn log(&self, message: &str) {
        let mut lines = match self.lines.lock() {
            Ok(lines) => lines,
            Err(poisoned) => poisoned.into_inner(),
        };
        lines.push(message.to_string());
    }
}

fn timestamp() -> String {
    format!("[{}]", chrono::Local::now().format("%H:%M:%S"))
}

pub fn muted(text: &str) -> String {
    format!("{}", text.bright_black())
}

pub fn err_line(text: &str) -> String {
    format!("{} {}", "Error:".red().bold(), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_log_keeps_order() {
        let log = MemoryLog::new();
        log.log("first");
        log.log("second");
        assert_eq!(log.lines(), vec!["first", "second"]);
    }

    #[test]
    fn timestamp_is_bracketed_clock_time() {
        let ts = timestamp();
        assert_eq!(ts.len(), "[00:00:00]".len());
        assert!(ts.starts_with('[') && ts.ends_with(']'));
        assert_eq!(ts.matches(':').count(), 2);
    }
}
