//! Record model produced by the transcript parser and persisted by the
//! ingestion pipeline.
//!
//! Every persisted record implements [`Record`], which ties it to its
//! target [`Collection`] and exposes the primary key used for upserts.
//! Field names serialize in camelCase to match the stored document shape
//! (`speakerId`, `fullSpeechText`, ...).

use serde::{Deserialize, Serialize};

/// Place recorded when a transcript header omits `<ort>`.
pub const DEFAULT_PLACE: &str = "Berlin";
/// Legislative period recorded when a transcript header omits `<wahlperiode>`.
pub const DEFAULT_ELECTORAL_PERIOD: i64 = 20;

/// Logical collection a record is persisted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Speeches,
    AgendaItems,
    Comments,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Speeches,
        Collection::AgendaItems,
        Collection::Comments,
    ];

    /// Human-readable label used in logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Collection::Speeches => "speeches",
            Collection::AgendaItems => "agenda items",
            Collection::Comments => "comments",
        }
    }

    /// Parse the short names accepted on the command line.
    pub fn from_cli_name(name: &str) -> Option<Self> {
        match name {
            "speeches" | "speech" => Some(Collection::Speeches),
            "agenda" | "agenda_items" | "agenda-items" => Some(Collection::AgendaItems),
            "comments" | "comment" => Some(Collection::Comments),
            _ => None,
        }
    }
}

/// A record that can be upserted into a [`Collection`] keyed by its id.
pub trait Record: Serialize + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

/// Session metadata parsed once from the `<kopfdaten>` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    /// Legislative period. `None` when the header carried a period element
    /// without any digits.
    pub wp: Option<i64>,
    /// Session number, same null rule as `wp`.
    pub index: Option<i64>,
    pub title: Option<String>,
    pub place: String,
    /// Epoch milliseconds; `date`, `starttime` and `endtime` are always equal.
    pub date: i64,
    pub starttime: i64,
    pub endtime: i64,
}

/// Kind of a [`TextFragment`] inside a speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FragmentKind {
    Text,
    Comment,
}

/// One paragraph or interjection in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFragment {
    pub id: String,
    pub speaker_id: Option<String>,
    pub text: String,
    pub kind: FragmentKind,
}

/// One agenda entry. The parser emits a snapshot every time a content block
/// closes, so the same id can appear several times with growing `content`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    pub id: String,
    pub index: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
}

impl AgendaItem {
    /// Append a content fragment, separated from existing content by `"; "`.
    pub fn append_content(&mut self, text: &str) {
        match self.content.as_mut() {
            Some(existing) if !existing.is_empty() => {
                existing.push_str("; ");
                existing.push_str(text);
            }
            _ => self.content = Some(text.to_string()),
        }
    }
}

impl Record for AgendaItem {
    const COLLECTION: Collection = Collection::AgendaItems;

    fn id(&self) -> &str {
        &self.id
    }
}

/// One contiguous utterance by one speaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Speech {
    pub id: String,
    pub speaker_id: Option<String>,
    pub speaker_name: Option<String>,
    pub party: Option<String>,
    pub protocol: Option<Protocol>,
    pub agenda: Option<AgendaItem>,
    pub text_content: Vec<TextFragment>,
    pub full_speech_text: String,
}

impl Speech {
    /// Space-joined text of every `text` fragment after the first fragment.
    ///
    /// The first fragment is skipped whatever its kind; in most transcripts
    /// it is the speaker introduction line. Flagged as a candidate bug in
    /// DESIGN.md but kept for compatibility with existing stored data.
    pub fn build_full_text(fragments: &[TextFragment]) -> String {
        fragments
            .iter()
            .skip(1)
            .filter(|f| f.kind == FragmentKind::Text)
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

impl Record for Speech {
    const COLLECTION: Collection = Collection::Speeches;

    fn id(&self) -> &str {
        &self.id
    }
}

/// An interjection recorded inside a speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub speech_id: String,
    pub speaker_id: String,
    pub text: String,
    /// Wall-clock capture time in epoch milliseconds (not from the document).
    pub timestamp: i64,
}

impl Record for Comment {
    const COLLECTION: Collection = Collection::Comments;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Per-kind record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecordCounts {
    pub speeches: u64,
    pub agenda_items: u64,
    pub comments: u64,
}

impl RecordCounts {
    pub fn get(&self, collection: Collection) -> u64 {
        match collection {
            Collection::Speeches => self.speeches,
            Collection::AgendaItems => self.agenda_items,
            Collection::Comments => self.comments,
        }
    }

    pub fn add(&mut self, collection: Collection, n: u64) {
        match collection {
            Collection::Speeches => self.speeches += n,
            Collection::AgendaItems => self.agenda_items += n,
            Collection::Comments => self.comments += n,
        }
    }

    pub fn total(&self) -> u64 {
        self.speeches + self.agenda_items + self.comments
    }
}
