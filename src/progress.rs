//! Reindex progress reporting.
//!
//! A full-vault scan emits a [`ReindexProgress`] after every tenth document
//! and after the last one. The CLI prints them on **stderr** so stdout stays
//! parseable; embedders subscribe through [`ChannelProgress`].

use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;

/// One reindex-progress event.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ReindexProgress {
    pub current: u64,
    pub total: u64,
    pub message: String,
}

/// Receives progress events from a vault scan.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ReindexProgress);
}

/// Human-friendly progress on stderr: "scan  1,230 / 5,000  projects/@a/x.json".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: &ReindexProgress) {
        let line = format!(
            "scan  {} / {}  {}\n",
            format_number(event.current),
            format_number(event.total),
            event.message
        );
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: &ReindexProgress) {
        let obj = serde_json::json!({
            "event": "reindex_progress",
            "current": event.current,
            "total": event.total,
            "message": event.message,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &ReindexProgress) {}
}

/// Forwards events into an unbounded channel. A closed receiver drops them.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ReindexProgress>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ReindexProgress>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressReporter for ChannelProgress {
    fn report(&self, event: &ReindexProgress) {
        let _ = self.tx.send(event.clone());
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
