//! Streaming transcript parser.
//!
//! Turns one plenary-protocol XML document into [`Speech`], [`AgendaItem`]
//! and [`Comment`] records. The parser is an event-driven state machine:
//! [`TranscriptParser::open`], [`TranscriptParser::text`] and
//! [`TranscriptParser::close`] are fed from a `quick-xml` reader by
//! [`parse_reader`], and [`TranscriptParser::finish`] yields the output.
//!
//! One parser handles exactly one document. Malformed field content never
//! fails the parse: unparseable numbers become `None`, unparseable dates
//! become epoch zero, missing ids are generated. Only I/O failures and XML
//! syntax errors surface as [`TranscriptError`].
//!
//! Agenda items are emitted as a snapshot on every `<ivz-eintrag-inhalt>`
//! close, so one logical item can appear several times with growing
//! content. Use [`ParsedTranscript::latest_agenda_items`] when only the
//! final snapshot per id is wanted.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::NaiveDate;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::Reader;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::marker::Marker;
use crate::models::{
    AgendaItem, Collection, Comment, FragmentKind, Protocol, RecordCounts, Speech, TextFragment,
    DEFAULT_ELECTORAL_PERIOD, DEFAULT_PLACE,
};

/// Placeholder used for comment references when no speech or speaker is open.
pub const UNKNOWN_REF: &str = "unknown";

/// Failure to read or tokenize a transcript.
#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: u64, message: String },
}

/// The innermost construct the parser is currently inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Idle,
    InSession,
    InAgendaTitle,
    InAgendaContent,
    InComment,
    InHeader,
}

/// Attributes of one opened element, in document order.
#[derive(Debug, Clone, Default)]
pub struct ElementAttrs(Vec<(String, String)>);

impl ElementAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn from_xml(start: &BytesStart<'_>) -> Self {
        // Malformed attributes degrade to "absent".
        let attrs = start
            .attributes()
            .flatten()
            .filter_map(|a| {
                let key = std::str::from_utf8(a.key.as_ref()).ok()?.to_string();
                let value = a
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned());
                Some((key, value))
            })
            .collect();
        Self(attrs)
    }
}

/// Records produced from one transcript, in document order.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTranscript {
    pub speeches: Vec<Speech>,
    pub agenda_items: Vec<AgendaItem>,
    pub comments: Vec<Comment>,
}

impl ParsedTranscript {
    pub fn counts(&self) -> RecordCounts {
        let mut counts = RecordCounts::default();
        counts.add(Collection::Speeches, self.speeches.len() as u64);
        counts.add(Collection::AgendaItems, self.agenda_items.len() as u64);
        counts.add(Collection::Comments, self.comments.len() as u64);
        counts
    }

    pub fn is_empty(&self) -> bool {
        self.speeches.is_empty() && self.agenda_items.is_empty() && self.comments.is_empty()
    }

    /// Collapse agenda snapshots to the last one emitted per id, ordered by
    /// first appearance.
    pub fn latest_agenda_items(&self) -> Vec<AgendaItem> {
        let mut order: Vec<&str> = Vec::new();
        let mut latest: std::collections::HashMap<&str, &AgendaItem> =
            std::collections::HashMap::new();
        for item in &self.agenda_items {
            if latest.insert(item.id.as_str(), item).is_none() {
                order.push(item.id.as_str());
            }
        }
        order
            .into_iter()
            .filter_map(|id| latest.get(id).map(|item| (*item).clone()))
            .collect()
    }
}

/// Header fields collected between `<kopfdaten>` open and close.
///
/// The outer `Option` tracks presence; for the numeric fields the inner
/// `Option` is `None` when the element was present but had no digits.
#[derive(Debug, Default)]
struct HeaderDraft {
    wp: Option<Option<i64>>,
    index: Option<Option<i64>>,
    title: Option<String>,
    place: Option<String>,
    date: Option<i64>,
}

impl HeaderDraft {
    fn finish(self) -> Protocol {
        let date = self.date.unwrap_or(0);
        Protocol {
            wp: self.wp.unwrap_or(Some(DEFAULT_ELECTORAL_PERIOD)),
            index: self.index.unwrap_or(Some(0)),
            title: self.title,
            place: self.place.unwrap_or_else(|| DEFAULT_PLACE.to_string()),
            date,
            starttime: date,
            endtime: date,
        }
    }
}

#[derive(Debug)]
struct SpeechDraft {
    id: String,
    fragments: Vec<TextFragment>,
}

/// Side-channel state that outlives single elements but never a document.
#[derive(Debug, Default)]
struct ParseContext {
    speaker_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    party: Option<String>,
    agenda: Option<AgendaItem>,
    header: Option<HeaderDraft>,
    protocol: Option<Protocol>,
    date_attr: Option<String>,
}

impl ParseContext {
    fn reset_speaker(&mut self) {
        self.speaker_id = None;
        self.first_name = None;
        self.last_name = None;
        self.party = None;
    }

    fn speaker_name(&self) -> Option<String> {
        let mut name = String::new();
        if let Some(first) = &self.first_name {
            name.push_str(first);
            name.push(' ');
        }
        if let Some(last) = &self.last_name {
            name.push_str(last);
        }
        let name = name.trim();
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Single-document transcript state machine. Not reentrant; create one per
/// document.
#[derive(Debug, Default)]
pub struct TranscriptParser {
    text: String,
    speech: Option<SpeechDraft>,
    comment: Option<Comment>,
    in_agenda_title: bool,
    in_agenda_content: bool,
    ctx: ParseContext,
    out: ParsedTranscript,
}

impl TranscriptParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParserState {
        if self.comment.is_some() {
            ParserState::InComment
        } else if self.in_agenda_content {
            ParserState::InAgendaContent
        } else if self.in_agenda_title {
            ParserState::InAgendaTitle
        } else if self.ctx.header.is_some() {
            ParserState::InHeader
        } else if self.speech.is_some() {
            ParserState::InSession
        } else {
            ParserState::Idle
        }
    }

    /// Handle an element open.
    pub fn open(&mut self, marker: Marker, attrs: &ElementAttrs) {
        self.text.clear();

        match marker {
            Marker::Speech => {
                let id = attrs
                    .get("id")
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("speech-{}", Uuid::new_v4().simple()));
                if let Some(dropped) = self.speech.take() {
                    debug!(speech = %dropped.id, "speech opened before previous one closed; dropping it");
                }
                self.ctx.reset_speaker();
                self.speech = Some(SpeechDraft {
                    id,
                    fragments: Vec::new(),
                });
            }
            Marker::Speaker => {
                self.ctx.speaker_id = attrs.get("id").map(str::to_string);
            }
            Marker::AgendaItem => {
                let id = attrs
                    .get("id")
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(generate_agenda_id);
                self.ctx.agenda = Some(AgendaItem {
                    id,
                    index: attrs.get("top-id").map(str::to_string),
                    title: attrs.get("titel").map(str::to_string),
                    content: attrs.get("inhalt").map(str::to_string),
                });
            }
            Marker::AgendaTitle => self.in_agenda_title = true,
            Marker::AgendaContent => self.in_agenda_content = true,
            Marker::Header => self.ctx.header = Some(HeaderDraft::default()),
            Marker::Date => {
                self.ctx.date_attr = attrs.get("date").map(str::to_string);
            }
            Marker::Comment => {
                let speech_id = self
                    .speech
                    .as_ref()
                    .map(|s| s.id.clone())
                    .unwrap_or_else(|| UNKNOWN_REF.to_string());
                let speaker_id = self
                    .ctx
                    .speaker_id
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_REF.to_string());
                self.comment = Some(Comment {
                    id: format!("{}-{}", speech_id, Uuid::new_v4().simple()),
                    speech_id,
                    speaker_id,
                    text: String::new(),
                    timestamp: chrono::Utc::now().timestamp_millis(),
                });
            }
            Marker::FirstName
            | Marker::LastName
            | Marker::Party
            | Marker::ElectoralPeriod
            | Marker::SessionNumber
            | Marker::Place
            | Marker::SessionTitle
            | Marker::Paragraph
            | Marker::Other => {}
        }
    }

    /// Append character data to the accumulator.
    pub fn text(&mut self, chunk: &str) {
        self.text.push_str(chunk);
    }

    /// Handle an element close.
    pub fn close(&mut self, marker: Marker) {
        let text = self.text.trim().to_string();

        if marker.is_header_field() && self.ctx.header.is_none() {
            return;
        }

        match marker {
            Marker::Paragraph => self.push_fragment(FragmentKind::Text, &text),
            Marker::Comment => {
                if let Some(mut comment) = self.comment.take() {
                    if !text.is_empty() {
                        comment.text = text.clone();
                        self.out.comments.push(comment);
                        self.push_fragment(FragmentKind::Comment, &text);
                    }
                }
            }
            Marker::FirstName => self.ctx.first_name = Some(text),
            Marker::LastName => self.ctx.last_name = Some(text),
            Marker::Party => {
                self.ctx.party = if text.is_empty() { None } else { Some(text) };
            }
            Marker::AgendaTitle => {
                self.in_agenda_title = false;
                if let Some(agenda) = self.ctx.agenda.as_mut() {
                    agenda.index = Some(text.clone());
                    agenda.title = Some(text);
                }
            }
            Marker::AgendaContent => {
                self.in_agenda_content = false;
                if let Some(agenda) = self.ctx.agenda.as_mut() {
                    agenda.append_content(&text);
                    self.out.agenda_items.push(agenda.clone());
                }
            }
            Marker::Speech => self.finish_speech(),
            Marker::ElectoralPeriod => {
                if let Some(header) = self.ctx.header.as_mut() {
                    header.wp = Some(parse_digits(&text));
                }
            }
            Marker::SessionNumber => {
                if let Some(header) = self.ctx.header.as_mut() {
                    header.index = Some(parse_digits(&text));
                }
            }
            Marker::Place => {
                if let Some(header) = self.ctx.header.as_mut() {
                    header.place = Some(text);
                }
            }
            Marker::SessionTitle => {
                if let Some(header) = self.ctx.header.as_mut() {
                    header.title = Some(text);
                }
            }
            Marker::Date => {
                let millis = parse_date_millis(self.ctx.date_attr.as_deref());
                if let Some(header) = self.ctx.header.as_mut() {
                    header.date = Some(millis);
                }
            }
            Marker::Header => {
                if let Some(header) = self.ctx.header.take() {
                    self.ctx.protocol = Some(header.finish());
                }
            }
            Marker::Speaker | Marker::AgendaItem | Marker::Other => {}
        }
    }

    pub fn finish(self) -> ParsedTranscript {
        if let Some(open) = &self.speech {
            debug!(speech = %open.id, "document ended inside a speech; dropping it");
        }
        self.out
    }

    fn push_fragment(&mut self, kind: FragmentKind, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(speech) = self.speech.as_mut() {
            // Ordinal ids keep re-ingested speeches byte-identical.
            let ordinal = speech.fragments.len();
            speech.fragments.push(TextFragment {
                id: format!("{}-{}", speech.id, ordinal),
                speaker_id: self.ctx.speaker_id.clone(),
                text: text.to_string(),
                kind,
            });
        }
    }

    fn finish_speech(&mut self) {
        let Some(draft) = self.speech.take() else {
            return;
        };

        let speech = Speech {
            id: draft.id,
            speaker_id: self.ctx.speaker_id.clone(),
            speaker_name: self.ctx.speaker_name(),
            party: self.ctx.party.clone(),
            protocol: self.ctx.protocol.clone(),
            agenda: self.ctx.agenda.clone(),
            full_speech_text: Speech::build_full_text(&draft.fragments),
            text_content: draft.fragments,
        };
        self.out.speeches.push(speech);
        self.ctx.reset_speaker();
    }
}

fn generate_agenda_id() -> String {
    format!("agenda-{}", Uuid::new_v4())
}

/// Keep only ASCII digits and parse; `None` when nothing numeric remains.
pub fn parse_digits(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

/// Parse a `dd.MM.yyyy` date into epoch milliseconds at UTC midnight.
/// Anything unparseable, including a missing value, yields 0.
pub fn parse_date_millis(value: Option<&str>) -> i64 {
    value
        .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%d.%m.%Y").ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or(0)
}

fn decode_text(text: &BytesText<'_>) -> String {
    text.unescape()
        .map(|t| t.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(text).into_owned())
}

/// Drive a fresh [`TranscriptParser`] over an XML byte stream.
pub fn parse_reader<R: BufRead>(input: R) -> Result<ParsedTranscript, TranscriptError> {
    let mut reader = Reader::from_reader(input);
    // Mismatched end tags are tolerated so one broken speech does not take
    // the rest of the document with it.
    reader.config_mut().check_end_names = false;

    let mut parser = TranscriptParser::new();
    let mut buf = Vec::new();
    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(quick_xml::Error::Io(e)) => {
                return Err(TranscriptError::Io(std::io::Error::new(
                    e.kind(),
                    e.to_string(),
                )))
            }
            Err(e) => {
                return Err(TranscriptError::Syntax {
                    position: reader.buffer_position() as u64,
                    message: e.to_string(),
                })
            }
        };
        match event {
            Event::Start(e) => {
                parser.open(Marker::from_name(e.local_name().as_ref()), &ElementAttrs::from_xml(&e));
            }
            Event::Empty(e) => {
                let marker = Marker::from_name(e.local_name().as_ref());
                parser.open(marker, &ElementAttrs::from_xml(&e));
                parser.close(marker);
            }
            Event::End(e) => parser.close(Marker::from_name(e.local_name().as_ref())),
            Event::Text(e) => parser.text(&decode_text(&e)),
            Event::CData(e) => parser.text(&String::from_utf8_lossy(&e)),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(parser.finish())
}

pub fn parse_str(xml: &str) -> Result<ParsedTranscript, TranscriptError> {
    parse_reader(xml.as_bytes())
}

pub fn parse_file(path: &Path) -> Result<ParsedTranscript, TranscriptError> {
    let file = File::open(path)?;
    parse_reader(BufReader::new(file))
}
