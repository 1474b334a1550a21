//! Human-readable action log for a single run.
//!
//! Every decision the orchestrator takes (skip, submit, fill, block, drop) is
//! recorded here and mirrored to `tracing`. The ledger persists the rendered
//! log per run, so a run can be audited without the global log file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for ActionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionLevel::Info => "INFO",
            ActionLevel::Warn => "WARN",
            ActionLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEntry {
    pub at: DateTime<Utc>,
    pub level: ActionLevel,
    pub ticker: Option<String>,
    pub message: String,
}

impl fmt::Display for ActionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] ", self.at.format("%Y-%m-%d %H:%M:%S"), self.level)?;
        if let Some(ticker) = &self.ticker {
            write!(f, "{ticker}: ")?;
        }
        f.write_str(&self.message)
    }
}

/// Ordered list of actions taken during one run.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    entries: Vec<ActionEntry>,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&mut self, ticker: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(ticker = ticker.unwrap_or("-"), "{message}");
        self.push(ActionLevel::Info, ticker, message);
    }

    pub fn warn(&mut self, ticker: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(ticker = ticker.unwrap_or("-"), "{message}");
        self.push(ActionLevel::Warn, ticker, message);
    }

    pub fn error(&mut self, ticker: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(ticker = ticker.unwrap_or("-"), "{message}");
        self.push(ActionLevel::Error, ticker, message);
    }

    fn push(&mut self, level: ActionLevel, ticker: Option<&str>, message: String) {
        self.entries.push(ActionEntry {
            at: Utc::now(),
            level,
            ticker: ticker.map(str::to_string),
            message,
        });
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if any entry for `ticker` contains `needle`.
    pub fn mentions(&self, ticker: &str, needle: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.ticker.as_deref() == Some(ticker) && e.message.contains(needle))
    }

    /// One line per entry.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }
}
