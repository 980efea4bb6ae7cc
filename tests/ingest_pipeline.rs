use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;

use plenary_ingest::config::Config;
use plenary_ingest::ingest::{
    ingest_directory, ingest_with_parser, IngestError, IngestOptions, IngestOutcome,
};
use plenary_ingest::models::Collection;
use plenary_ingest::progress::NoProgress;
use plenary_ingest::runtime;
use plenary_ingest::store::{
    BulkWriteResult, DocumentStore, MemoryStore, SqliteStore, StoreError, StoredDocument,
};
use plenary_ingest::transcript::{self, ParsedTranscript, TranscriptError};

fn options(dir: &Path) -> IngestOptions {
    IngestOptions {
        input_dir: dir.to_path_buf(),
        include_globs: vec!["*.xml".to_string()],
        workers: 4,
        batch_size: 1000,
        timeout: Duration::from_secs(30),
        limit: None,
    }
}

fn speech_doc(id: &str) -> String {
    format!(
        r#"<dbtplenarprotokoll><sitzungsverlauf><rede id="{id}"><p>Intro {id}</p><p>Text {id}.</p></rede></sitzungsverlauf></dbtplenarprotokoll>"#
    )
}

const SESSION_1: &str = r#"<dbtplenarprotokoll>
  <sitzungsverlauf>
    <rede id="ID1">
      <p>Hello.</p>
      <kommentar>Interjection!</kommentar>
      <p>World.</p>
    </rede>
  </sitzungsverlauf>
</dbtplenarprotokoll>"#;

#[tokio::test]
async fn session_scenario() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("session_1.xml"), SESSION_1).unwrap();
    let store = MemoryStore::new();

    let summary = ingest_directory(&store, &options(tmp.path()), &NoProgress)
        .await
        .unwrap();

    assert_eq!(summary.outcome, IngestOutcome::Complete);
    assert_eq!(summary.files_parsed, 1);
    assert_eq!(store.ids(Collection::Speeches).await.unwrap(), vec!["ID1"]);

    let speech = store.get(Collection::Speeches, "ID1").await.unwrap().unwrap();
    assert_eq!(speech["fullSpeechText"], "World.");

    assert_eq!(store.count(Collection::Comments).await.unwrap(), 1);
    let comment_id = store.ids(Collection::Comments).await.unwrap().remove(0);
    let comment = store
        .get(Collection::Comments, &comment_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(comment["speechId"], "ID1");
    assert_eq!(comment["text"], "Interjection!");
    assert!(comment_id.starts_with("ID1-"));
}

async fn snapshot(store: &dyn DocumentStore, collection: Collection) -> Vec<serde_json::Value> {
    let mut docs = Vec::new();
    for id in store.ids(collection).await.unwrap() {
        docs.push(store.get(collection, &id).await.unwrap().unwrap());
    }
    docs
}

const AGENDA_SESSION: &str = r#"<dbtplenarprotokoll>
  <sitzungsverlauf>
    <tagesordnungspunkt id="TOP-7" top-id="Tagesordnungspunkt 7">
      <ivz-block-titel>Haushalt</ivz-block-titel>
      <ivz-eintrag-inhalt>Erste Beratung</ivz-eintrag-inhalt>
      <ivz-eintrag-inhalt>Drucksache 20/1</ivz-eintrag-inhalt>
    </tagesordnungspunkt>
    <rede id="A1"><p>Intro</p><p>Zum Haushalt.</p></rede>
  </sitzungsverlauf>
</dbtplenarprotokoll>"#;

#[tokio::test]
async fn reingest_converges_in_sqlite() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("protocols");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("session_1.xml"), SESSION_1).unwrap();
    fs::write(input.join("agenda.xml"), AGENDA_SESSION).unwrap();
    for i in 0..5 {
        fs::write(input.join(format!("s{}.xml", i)), speech_doc(&format!("S{}", i))).unwrap();
    }

    let mut config = Config::minimal();
    config.db.path = tmp.path().join("plenary.sqlite");
    let store = SqliteStore::open(&config).await.unwrap();

    let first = ingest_directory(&store, &options(&input), &NoProgress)
        .await
        .unwrap();
    let speeches_after_first = snapshot(&store, Collection::Speeches).await;
    let agenda_after_first = snapshot(&store, Collection::AgendaItems).await;
    assert_eq!(store.count(Collection::Comments).await.unwrap(), 1);

    let second = ingest_directory(&store, &options(&input), &NoProgress)
        .await
        .unwrap();
    let speeches_after_second = snapshot(&store, Collection::Speeches).await;
    let agenda_after_second = snapshot(&store, Collection::AgendaItems).await;

    assert_eq!(first.persisted.speeches, 7);
    assert_eq!(second.persisted.speeches, 7);
    assert_eq!(store.count(Collection::Speeches).await.unwrap(), 7);
    assert_eq!(speeches_after_first, speeches_after_second);

    // Two snapshots of TOP-7 per run, one stored record.
    assert_eq!(second.persisted.agenda_items, 2);
    assert_eq!(store.count(Collection::AgendaItems).await.unwrap(), 1);
    assert_eq!(agenda_after_first, agenda_after_second);
    assert_eq!(
        agenda_after_second[0]["content"],
        "Erste Beratung; Drucksache 20/1"
    );

    // Comment ids are generated per parse, so each run adds its comments.
    assert_eq!(store.count(Collection::Comments).await.unwrap(), 2);
}

#[tokio::test]
async fn hundred_files_concurrently() {
    let tmp = TempDir::new().unwrap();
    let expected: Vec<String> = (0..100).map(|i| format!("S{:03}", i)).collect();
    for id in &expected {
        fs::write(tmp.path().join(format!("{}.xml", id)), speech_doc(id)).unwrap();
    }

    for _ in 0..3 {
        let store = MemoryStore::new();
        let mut opts = options(tmp.path());
        opts.workers = 8;
        opts.batch_size = 7;

        let summary = ingest_directory(&store, &opts, &NoProgress).await.unwrap();

        assert_eq!(summary.files_discovered, 100);
        assert_eq!(summary.files_parsed, 100);
        assert_eq!(summary.parsed.speeches, 100);
        assert_eq!(summary.persisted.speeches, 100);
        assert_eq!(store.ids(Collection::Speeches).await.unwrap(), expected);
    }
}

#[tokio::test]
async fn well_formed_speech_survives_broken_sibling() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("mixed.xml"),
        r#"<dbtplenarprotokoll><sitzungsverlauf>
            <rede id="GOOD"><p>a</p><p>b</p></rede>
            <rede id="BROKEN"><p>never closed</p>
        </sitzungsverlauf></dbtplenarprotokoll>"#,
    )
    .unwrap();
    let store = MemoryStore::new();

    let summary = ingest_directory(&store, &options(tmp.path()), &NoProgress)
        .await
        .unwrap();

    assert!(summary.failures.is_empty());
    assert_eq!(store.ids(Collection::Speeches).await.unwrap(), vec!["GOOD"]);
}

#[tokio::test]
async fn bad_file_does_not_stop_the_batch() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.xml"), speech_doc("A")).unwrap();
    fs::write(tmp.path().join("b.xml"), "<rede id=\"B\"><p>cut off</p").unwrap();
    fs::write(tmp.path().join("c.xml"), speech_doc("C")).unwrap();
    let store = MemoryStore::new();

    let summary = ingest_directory(&store, &options(tmp.path()), &NoProgress)
        .await
        .unwrap();

    assert_eq!(summary.outcome, IngestOutcome::Partial);
    assert_eq!(summary.files_parsed, 2);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].file.ends_with("b.xml"));
    assert!(summary.failures[0].error.contains("XML syntax error"));
    assert_eq!(store.ids(Collection::Speeches).await.unwrap(), vec!["A", "C"]);
}

#[tokio::test]
async fn every_file_failing_is_distinct_from_no_input() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("x.xml"), "<a><b>text</b").unwrap();
    let store = MemoryStore::new();
    let summary = ingest_directory(&store, &options(tmp.path()), &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.outcome, IngestOutcome::AllFailed);

    let empty = TempDir::new().unwrap();
    fs::write(empty.path().join("notes.txt"), "not xml").unwrap();
    let summary = ingest_directory(&store, &options(empty.path()), &NoProgress)
        .await
        .unwrap();
    assert_eq!(summary.outcome, IngestOutcome::NoInput);
    assert_eq!(summary.files_discovered, 0);
}

#[tokio::test]
async fn missing_input_dir_is_fatal() {
    let tmp = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let err = ingest_directory(&store, &options(&tmp.path().join("gone")), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::MissingInputDir(_)));
}

#[tokio::test]
async fn limit_caps_the_file_count() {
    let tmp = TempDir::new().unwrap();
    for i in 0..5 {
        fs::write(tmp.path().join(format!("{}.xml", i)), speech_doc(&format!("L{}", i))).unwrap();
    }
    let store = MemoryStore::new();
    let mut opts = options(tmp.path());
    opts.limit = Some(2);

    let summary = ingest_directory(&store, &opts, &NoProgress).await.unwrap();
    assert_eq!(summary.files_discovered, 2);
    assert_eq!(store.ids(Collection::Speeches).await.unwrap(), vec!["L0", "L1"]);
}

#[tokio::test]
async fn last_agenda_snapshot_wins() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("agenda.xml"),
        r#"<dbtplenarprotokoll><tagesordnungspunkt id="TOP-7">
            <ivz-eintrag-inhalt>Erste Beratung</ivz-eintrag-inhalt>
            <ivz-eintrag-inhalt>Zweite Beratung</ivz-eintrag-inhalt>
            <ivz-eintrag-inhalt>Abstimmung</ivz-eintrag-inhalt>
        </tagesordnungspunkt></dbtplenarprotokoll>"#,
    )
    .unwrap();

    for batch_size in [1, 1000] {
        let store = MemoryStore::new();
        let mut opts = options(tmp.path());
        opts.batch_size = batch_size;
        let summary = ingest_directory(&store, &opts, &NoProgress).await.unwrap();

        assert_eq!(summary.parsed.agenda_items, 3);
        assert_eq!(store.count(Collection::AgendaItems).await.unwrap(), 1);
        let item = store
            .get(Collection::AgendaItems, "TOP-7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(item["content"], "Erste Beratung; Zweite Beratung; Abstimmung");
    }
}

struct UnreachableStore;

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn upsert_many(
        &self,
        _collection: Collection,
        _docs: &[StoredDocument],
    ) -> Result<BulkWriteResult, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
    async fn get(
        &self,
        _collection: Collection,
        _id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        Ok(None)
    }
    async fn count(&self, _collection: Collection) -> Result<u64, StoreError> {
        Ok(0)
    }
    async fn ids(&self, _collection: Collection) -> Result<Vec<String>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn unreachable_store_is_fatal() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a.xml"), speech_doc("A")).unwrap();

    let err = ingest_directory(&UnreachableStore, &options(tmp.path()), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::StoreUnavailable(_)));
    assert!(err.to_string().contains("document store unavailable"));
}

/// Fails the second speech chunk, delegates everything else.
struct FlakyStore {
    inner: MemoryStore,
    speech_calls: AtomicUsize,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
    async fn upsert_many(
        &self,
        collection: Collection,
        docs: &[StoredDocument],
    ) -> Result<BulkWriteResult, StoreError> {
        if collection == Collection::Speeches && self.speech_calls.fetch_add(1, Ordering::SeqCst) == 1
        {
            return Err(StoreError::Unavailable("write timed out".into()));
        }
        self.inner.upsert_many(collection, docs).await
    }
    async fn get(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.inner.get(collection, id).await
    }
    async fn count(&self, collection: Collection) -> Result<u64, StoreError> {
        self.inner.count(collection).await
    }
    async fn ids(&self, collection: Collection) -> Result<Vec<String>, StoreError> {
        self.inner.ids(collection).await
    }
}

#[tokio::test]
async fn failed_chunk_does_not_roll_back_others() {
    let tmp = TempDir::new().unwrap();
    for i in 0..10 {
        fs::write(tmp.path().join(format!("{}.xml", i)), speech_doc(&format!("F{}", i))).unwrap();
    }
    let store = FlakyStore {
        inner: MemoryStore::new(),
        speech_calls: AtomicUsize::new(0),
    };
    let mut opts = options(tmp.path());
    opts.batch_size = 4;

    let summary = ingest_directory(&store, &opts, &NoProgress).await.unwrap();

    assert_eq!(summary.outcome, IngestOutcome::Partial);
    assert_eq!(summary.parsed.speeches, 10);
    assert_eq!(summary.persisted.speeches, 6);
    assert_eq!(summary.write_failures.len(), 1);
    assert_eq!(summary.write_failures[0].chunk, 1);
    assert_eq!(summary.write_failures[0].id, None);
    assert_eq!(store.count(Collection::Speeches).await.unwrap(), 6);
}

fn slow_parse(path: &Path) -> Result<ParsedTranscript, TranscriptError> {
    if path.to_string_lossy().contains("slow") {
        std::thread::sleep(Duration::from_secs(2));
    }
    transcript::parse_file(path)
}

#[tokio::test]
async fn timeout_persists_what_finished() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a_slow.xml"), speech_doc("SLOW")).unwrap();
    fs::write(tmp.path().join("b.xml"), speech_doc("B")).unwrap();
    fs::write(tmp.path().join("c.xml"), speech_doc("C")).unwrap();
    let store = MemoryStore::new();
    let mut opts = options(tmp.path());
    opts.workers = 2;
    opts.timeout = Duration::from_millis(500);

    let summary = ingest_with_parser(&store, &opts, &NoProgress, slow_parse)
        .await
        .unwrap();

    assert!(summary.timed_out);
    assert_eq!(summary.outcome, IngestOutcome::Partial);
    assert_eq!(summary.files_parsed, 2);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(store.ids(Collection::Speeches).await.unwrap(), vec!["B", "C"]);
}

fn hanging_parse(path: &Path) -> Result<ParsedTranscript, TranscriptError> {
    if path.to_string_lossy().contains("hang") {
        std::thread::sleep(Duration::from_secs(60));
    }
    transcript::parse_file(path)
}

#[test]
fn hung_parse_does_not_hold_the_runtime() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("a_hang.xml"), speech_doc("H")).unwrap();
    fs::write(tmp.path().join("b.xml"), speech_doc("B")).unwrap();
    let mut opts = options(tmp.path());
    opts.timeout = Duration::from_millis(300);

    let started = Instant::now();
    let (summary, ids) = runtime::block_on(async {
        let store = MemoryStore::new();
        let summary = ingest_with_parser(&store, &opts, &NoProgress, hanging_parse).await?;
        let ids = store.ids(Collection::Speeches).await?;
        Ok((summary, ids))
    })
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(summary.timed_out);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(ids, vec!["B"]);
}

fn staggered_parse(path: &Path) -> Result<ParsedTranscript, TranscriptError> {
    let n: u64 = path
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| s.trim_start_matches('f').parse().ok())
        .unwrap_or(0);
    std::thread::sleep(Duration::from_millis(10 * n));
    transcript::parse_file(path)
}

#[tokio::test]
async fn timed_out_summary_counts_agree_with_records() {
    let tmp = TempDir::new().unwrap();
    for i in 0..40 {
        fs::write(tmp.path().join(format!("f{:02}.xml", i)), speech_doc(&format!("F{}", i))).unwrap();
    }
    let store = MemoryStore::new();
    let mut opts = options(tmp.path());
    opts.workers = 40;
    opts.timeout = Duration::from_millis(200);

    let summary = ingest_with_parser(&store, &opts, &NoProgress, staggered_parse)
        .await
        .unwrap();

    assert!(summary.timed_out);
    assert_eq!(summary.parsed.speeches, summary.files_parsed);
    assert_eq!(summary.persisted.speeches, summary.files_parsed);
    assert_eq!(
        summary.files_parsed + summary.files_skipped + summary.failures.len() as u64,
        40
    );
    assert!(summary.files_skipped > 0);
}

fn panicking_parse(path: &Path) -> Result<ParsedTranscript, TranscriptError> {
    if path.to_string_lossy().contains("boom") {
        panic!("parser bug");
    }
    transcript::parse_file(path)
}

#[tokio::test]
async fn parser_panic_is_a_file_failure() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("boom.xml"), speech_doc("X")).unwrap();
    fs::write(tmp.path().join("fine.xml"), speech_doc("Y")).unwrap();
    let store = MemoryStore::new();

    let summary = ingest_with_parser(&store, &options(tmp.path()), &NoProgress, panicking_parse)
        .await
        .unwrap();

    assert_eq!(summary.files_parsed, 1);
    assert_eq!(summary.failures.len(), 1);
    assert!(summary.failures[0].file.ends_with("boom.xml"));
    assert_eq!(store.ids(Collection::Speeches).await.unwrap(), vec!["Y"]);
}

#[tokio::test]
async fn comments_reference_their_speech() {
    let tmp = TempDir::new().unwrap();
    for i in 0..4 {
        fs::write(
            tmp.path().join(format!("{}.xml", i)),
            format!(
                r#"<dbtplenarprotokoll><rede id="R{i}"><p>x</p><kommentar>(Beifall {i})</kommentar></rede></dbtplenarprotokoll>"#
            ),
        )
        .unwrap();
    }
    let store = MemoryStore::new();
    ingest_directory(&store, &options(tmp.path()), &NoProgress)
        .await
        .unwrap();

    let mut pairs = BTreeSet::new();
    for id in store.ids(Collection::Comments).await.unwrap() {
        let comment = store.get(Collection::Comments, &id).await.unwrap().unwrap();
        let speech_id = comment["speechId"].as_str().unwrap().to_string();
        assert!(id.starts_with(&format!("{}-", speech_id)));
        pairs.insert((speech_id, comment["text"].as_str().unwrap().to_string()));
    }
    let expected: BTreeSet<_> = (0..4)
        .map(|i| (format!("R{}", i), format!("(Beifall {})", i)))
        .collect();
    assert_eq!(pairs, expected);
}
