//! Ingest progress reporting.
//!
//! Progress goes to **stderr** so stdout stays parseable for scripts
//! (`plenary ingest > summary.txt`).

use std::io::Write;

use crate::models::Collection;

/// A single progress event emitted by the ingest pipeline.
#[derive(Clone, Debug)]
pub enum IngestProgressEvent {
    /// Listing the input directory. Total unknown.
    Discovering { dir: String },
    /// `n` of `total` files have finished parsing (successfully or not).
    Parsed { n: u64, total: u64, file: String },
    /// `n` of `total` records of one collection have been written.
    Persisting {
        collection: Collection,
        n: u64,
        total: u64,
    },
}

pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  parsing  12 / 340 files  session_12.xml".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovering { dir } => {
                format!("ingest {}  discovering...\n", dir)
            }
            IngestProgressEvent::Parsed { n, total, file } => format!(
                "ingest  parsing  {} / {} files  {}\n",
                format_number(*n),
                format_number(*total),
                file
            ),
            IngestProgressEvent::Persisting {
                collection,
                n,
                total,
            } => format!(
                "ingest  persisting {}  {} / {}\n",
                collection.label(),
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = event_json(&event).to_string();
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{}", line);
        let _ = stderr.flush();
    }
}

fn event_json(event: &IngestProgressEvent) -> serde_json::Value {
    match event {
        IngestProgressEvent::Discovering { dir } => serde_json::json!({
            "event": "progress",
            "phase": "discovering",
            "dir": dir
        }),
        IngestProgressEvent::Parsed { n, total, file } => serde_json::json!({
            "event": "progress",
            "phase": "parsing",
            "n": n,
            "total": total,
            "file": file
        }),
        IngestProgressEvent::Persisting {
            collection,
            n,
            total,
        } => serde_json::json!({
            "event": "progress",
            "phase": "persisting",
            "collection": collection,
            "n": n,
            "total": total
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut out = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
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

    pub fn reporter(&self) -> Box<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
