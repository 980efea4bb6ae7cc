//! Ingestion pipeline orchestration.
//!
//! Coordinates one ingest run: discovery → parallel parse → aggregation →
//! batched persistence → summary.
//!
//! Each discovered file gets one task. A task waits for a worker permit,
//! parses its file on the blocking pool and appends the records to the
//! shared [`Aggregate`]. The parse phase runs under one deadline; when it
//! passes, queued files are never started, running parses are left to
//! finish in the background and whatever was aggregated so far is
//! persisted. File failures and chunk failures are recorded in the
//! [`IngestSummary`]; only a missing input directory or an unreachable
//! store abort the run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::buffer::Aggregate;
use crate::config::Config;
use crate::discovery;
use crate::models::{Collection, RecordCounts};
use crate::persist::{persist_records, WriteFailure};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};
use crate::store::{DocumentStore, StoreError};
use crate::transcript::{self, ParsedTranscript, TranscriptError};

/// Run-level failures. Everything else ends up in the summary.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("input directory does not exist: {}", .0.display())]
    MissingInputDir(PathBuf),

    #[error("input path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("cannot read input directory {}: {message}", .path.display())]
    UnreadableInputDir { path: PathBuf, message: String },

    #[error("invalid include pattern: {0}")]
    InvalidPattern(#[from] globset::Error),

    #[error("document store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
}

/// Parses one transcript file. [`transcript::parse_file`] in production.
pub type ParseFn = fn(&Path) -> Result<ParsedTranscript, TranscriptError>;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub input_dir: PathBuf,
    pub include_globs: Vec<String>,
    pub workers: usize,
    pub batch_size: usize,
    /// Bound on the parse phase only; persistence is not timed.
    pub timeout: Duration,
    /// Ingest at most this many files (after sorting by name).
    pub limit: Option<usize>,
}

impl IngestOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            input_dir: config.ingest.input_dir.clone(),
            include_globs: config.ingest.include_globs.clone(),
            workers: config.ingest.effective_workers(),
            batch_size: config.ingest.batch_size,
            timeout: config.ingest.timeout(),
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    /// The input directory held no matching files.
    NoInput,
    /// Every file parsed and every record was written.
    Complete,
    /// Some files, records or the deadline went wrong, but something parsed.
    Partial,
    /// Files were found but none of them parsed.
    AllFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestSummary {
    pub input_dir: String,
    pub files_discovered: u64,
    pub files_parsed: u64,
    /// Files not finished before the deadline.
    pub files_skipped: u64,
    pub failures: Vec<FileFailure>,
    pub timed_out: bool,
    /// Records aggregated from parsed files. Agenda items count every
    /// emitted snapshot.
    pub parsed: RecordCounts,
    /// Records the store acknowledged.
    pub persisted: RecordCounts,
    pub write_failures: Vec<WriteFailure>,
    pub outcome: IngestOutcome,
}

impl IngestSummary {
    fn new(input_dir: &Path, files_discovered: u64) -> Self {
        Self {
            input_dir: input_dir.display().to_string(),
            files_discovered,
            files_parsed: 0,
            files_skipped: 0,
            failures: Vec::new(),
            timed_out: false,
            parsed: RecordCounts::default(),
            persisted: RecordCounts::default(),
            write_failures: Vec::new(),
            outcome: IngestOutcome::NoInput,
        }
    }

    pub fn outcome(&self) -> IngestOutcome {
        if self.files_discovered == 0 {
            IngestOutcome::NoInput
        } else if self.files_parsed == 0 {
            IngestOutcome::AllFailed
        } else if self.failures.is_empty()
            && self.write_failures.is_empty()
            && !self.timed_out
            && self.files_skipped == 0
        {
            IngestOutcome::Complete
        } else {
            IngestOutcome::Partial
        }
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ingest {}", self.input_dir)?;
        writeln!(f, "  files discovered: {}", self.files_discovered)?;
        writeln!(f, "  files parsed: {}", self.files_parsed)?;
        writeln!(f, "  files failed: {}", self.failures.len())?;
        if self.files_skipped > 0 {
            writeln!(f, "  files skipped: {}", self.files_skipped)?;
        }
        if self.timed_out {
            writeln!(f, "  timed out: yes")?;
        }
        writeln!(
            f,
            "  parsed: {} speeches, {} agenda items, {} comments",
            self.parsed.speeches, self.parsed.agenda_items, self.parsed.comments
        )?;
        writeln!(
            f,
            "  persisted: {} speeches, {} agenda items, {} comments",
            self.persisted.speeches, self.persisted.agenda_items, self.persisted.comments
        )?;
        for failure in &self.failures {
            writeln!(f, "  failed: {}: {}", failure.file, failure.error)?;
        }
        for failure in &self.write_failures {
            match &failure.id {
                Some(id) => writeln!(
                    f,
                    "  write failed: {} {}: {}",
                    failure.collection.label(),
                    id,
                    failure.error
                )?,
                None => writeln!(
                    f,
                    "  write failed: {} chunk {}: {}",
                    failure.collection.label(),
                    failure.chunk,
                    failure.error
                )?,
            }
        }
        let status = match self.outcome {
            IngestOutcome::NoInput => "no input",
            IngestOutcome::Complete => "ok",
            IngestOutcome::Partial => "partial",
            IngestOutcome::AllFailed => "failed",
        };
        write!(f, "{}", status)
    }
}

enum WorkerOutcome {
    Parsed(RecordCounts),
    Failed(String),
    /// The pool was closed before a permit was granted.
    NotStarted,
}

pub async fn ingest_directory(
    store: &dyn DocumentStore,
    options: &IngestOptions,
    progress: &dyn IngestProgressReporter,
) -> Result<IngestSummary, IngestError> {
    ingest_with_parser(store, options, progress, transcript::parse_file).await
}

/// [`ingest_directory`] with a custom per-file parser.
pub async fn ingest_with_parser(
    store: &dyn DocumentStore,
    options: &IngestOptions,
    progress: &dyn IngestProgressReporter,
    parse: ParseFn,
) -> Result<IngestSummary, IngestError> {
    progress.report(IngestProgressEvent::Discovering {
        dir: options.input_dir.display().to_string(),
    });
    let mut files = discovery::discover_files(&options.input_dir, &options.include_globs)?;
    if let Some(limit) = options.limit {
        files.truncate(limit);
    }

    store.ping().await.map_err(IngestError::StoreUnavailable)?;

    let mut summary = IngestSummary::new(&options.input_dir, files.len() as u64);
    if files.is_empty() {
        info!(dir = %options.input_dir.display(), "no transcript files found");
        summary.outcome = summary.outcome();
        return Ok(summary);
    }

    let workers = options.workers.max(1);
    info!(files = files.len(), workers, "parsing transcripts");

    let aggregate = Arc::new(Aggregate::new());
    let semaphore = Arc::new(Semaphore::new(workers));
    let deadline = Instant::now() + options.timeout;
    let total = files.len() as u64;

    let mut tasks = JoinSet::new();
    for path in files {
        let semaphore = semaphore.clone();
        let aggregate = aggregate.clone();
        tasks.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return (path, WorkerOutcome::NotStarted);
            };
            let file = path.clone();
            let parsed = tokio::task::spawn_blocking(move || {
                let parsed = parse(&file)?;
                let counts = parsed.counts();
                Ok::<_, TranscriptError>(aggregate.absorb(parsed).then_some(counts))
            })
            .await;
            let outcome = match parsed {
                Ok(Ok(Some(counts))) => WorkerOutcome::Parsed(counts),
                // Finished after the aggregate was sealed.
                Ok(Ok(None)) => WorkerOutcome::NotStarted,
                Ok(Err(e)) => WorkerOutcome::Failed(e.to_string()),
                Err(e) if e.is_panic() => WorkerOutcome::Failed("parser panicked".to_string()),
                Err(e) => WorkerOutcome::Failed(e.to_string()),
            };
            (path, outcome)
        });
    }

    let mut tally = ParseTally {
        finished: 0,
        total,
    };
    while !tasks.is_empty() {
        match timeout_at(deadline, tasks.join_next()).await {
            Ok(Some(Ok((path, outcome)))) => tally.record(&mut summary, &path, outcome, progress),
            Ok(Some(Err(e))) => error!(error = %e, "ingest task failed"),
            Ok(None) => break,
            Err(_) => {
                summary.timed_out = true;
                break;
            }
        }
    }

    if summary.timed_out {
        // Harvest tasks that finished right at the deadline, then stop
        // queued files from starting. Running parses finish on their own.
        while let Some(joined) = tasks.try_join_next() {
            if let Ok((path, outcome)) = joined {
                tally.record(&mut summary, &path, outcome, progress);
            }
        }
        semaphore.close();
        tasks.detach_all();
        warn!(
            timeout_secs = options.timeout.as_secs_f64(),
            finished = tally.finished,
            total,
            "parse phase timed out; persisting completed files"
        );
    }
    aggregate.seal();
    // A parse can land in the aggregate between the deadline and the seal
    // without its task being harvested, so file counts come from the
    // aggregate itself.
    summary.files_parsed = aggregate.files();
    summary.files_skipped = total.saturating_sub(summary.files_parsed + summary.failures.len() as u64);
    summary.parsed = aggregate.counts();

    let speeches = aggregate.speeches.drain();
    let agenda_items = aggregate.agenda_items.drain();
    let comments = aggregate.comments.drain();

    let batch_size = options.batch_size.max(1);
    let reports = [
        (
            Collection::Speeches,
            persist_records(store, &speeches, batch_size, progress).await,
        ),
        (
            Collection::AgendaItems,
            persist_records(store, &agenda_items, batch_size, progress).await,
        ),
        (
            Collection::Comments,
            persist_records(store, &comments, batch_size, progress).await,
        ),
    ];
    for (collection, report) in reports {
        summary.persisted.add(collection, report.persisted);
        summary.write_failures.extend(report.failures);
    }

    summary.outcome = summary.outcome();
    info!(
        files = summary.files_discovered,
        parsed = summary.files_parsed,
        failed = summary.failures.len(),
        skipped = summary.files_skipped,
        records = summary.persisted.total(),
        write_failures = summary.write_failures.len(),
        outcome = ?summary.outcome,
        "ingest finished"
    );
    Ok(summary)
}

struct ParseTally {
    finished: u64,
    total: u64,
}

impl ParseTally {
    fn record(
        &mut self,
        summary: &mut IngestSummary,
        path: &Path,
        outcome: WorkerOutcome,
        progress: &dyn IngestProgressReporter,
    ) {
        match outcome {
            WorkerOutcome::Parsed(counts) => {
                debug!(file = %path.display(), speeches = counts.speeches, comments = counts.comments, "parsed");
            }
            WorkerOutcome::Failed(error) => {
                warn!(file = %path.display(), error = %error, "failed to parse transcript");
                summary.failures.push(FileFailure {
                    file: path.display().to_string(),
                    error,
                });
            }
            WorkerOutcome::NotStarted => return,
        }
        self.finished += 1;
        progress.report(IngestProgressEvent::Parsed {
            n: self.finished,
            total: self.total,
            file: file_name(path),
        });
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
