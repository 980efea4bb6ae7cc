//! Thread-safe aggregation buffers shared by parse workers.
//!
//! Workers append a whole file's output at once, so each file's records
//! stay contiguous and in document order; interleaving between files is
//! unspecified.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use crate::models::{AgendaItem, Collection, Comment, RecordCounts, Speech};
use crate::transcript::ParsedTranscript;

/// Append-only buffer with internal locking.
#[derive(Debug)]
pub struct RecordBuffer<T> {
    items: Mutex<Vec<T>>,
}

impl<T> Default for RecordBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RecordBuffer<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
        }
    }

    pub fn extend(&self, records: Vec<T>) {
        if records.is_empty() {
            return;
        }
        // Poisoning is ignored: the Vec is valid after any panicking `extend`.
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        items.extend(records);
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take everything appended so far, leaving the buffer empty.
    pub fn drain(&self) -> Vec<T> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *items)
    }
}

/// One buffer per record kind.
///
/// Once [`Aggregate::seal`] returns, no file is half-absorbed and later
/// [`Aggregate::absorb`] calls are refused.
#[derive(Debug, Default)]
pub struct Aggregate {
    pub speeches: RecordBuffer<Speech>,
    pub agenda_items: RecordBuffer<AgendaItem>,
    pub comments: RecordBuffer<Comment>,
    files: AtomicU64,
    sealed: RwLock<bool>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move one file's output into the shared buffers. Returns `false` if
    /// the aggregate was already sealed and the records were dropped.
    pub fn absorb(&self, parsed: ParsedTranscript) -> bool {
        let sealed = self.sealed.read().unwrap_or_else(|e| e.into_inner());
        if *sealed {
            return false;
        }
        self.speeches.extend(parsed.speeches);
        self.agenda_items.extend(parsed.agenda_items);
        self.comments.extend(parsed.comments);
        self.files.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Number of files absorbed so far.
    pub fn files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    /// Stop accepting files. Waits for in-progress `absorb` calls.
    pub fn seal(&self) {
        *self.sealed.write().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn counts(&self) -> RecordCounts {
        let mut counts = RecordCounts::default();
        counts.add(Collection::Speeches, self.speeches.len() as u64);
        counts.add(Collection::AgendaItems, self.agenda_items.len() as u64);
        counts.add(Collection::Comments, self.comments.len() as u64);
        counts
    }
}
