//! Integration tests for the submission workflow against the in-memory store.
//!
//! Retry timing is checked with tokio's paused clock, so the exponential
//! backoff runs instantly while `tokio::time::Instant` still sees the waits.

use async_trait::async_trait;
use pdf_intake::store::memory::StoreOp;
use pdf_intake::store::EntryKind;
use pdf_intake::{
    ingest, Decision, ExtractionError, FolderId, FolderIds, IngestProgressCallback, IntakeConfig,
    IntakeError, MemoryBackend, RemoteStore, StoreError, Submission, TextBlock, TextExtractor,
    UploadedFile,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

const LEDGER: &str = "workListFile.csv";

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Route library logs through the test harness; `RUST_LOG=pdf_intake=debug` to see them.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Two-column page: the left column is drawn after the right one.
struct TwoColumnExtractor;

#[async_trait]
impl TextExtractor for TwoColumnExtractor {
    async fn extract_blocks(&self, pdf: &[u8]) -> Result<Vec<Vec<TextBlock>>, ExtractionError> {
        if !pdf.starts_with(b"%PDF") {
            return Err(ExtractionError::NotAPdf {
                magic: pdf.iter().take(8).copied().collect(),
            });
        }
        Ok(vec![vec![
            TextBlock::new(320.0, 100.0, 560.0, 112.0, "right one"),
            TextBlock::new(72.0, 100.0, 300.0, 112.0, "left one"),
            TextBlock::new(320.0, 120.0, 560.0, 132.0, "right two"),
            TextBlock::new(72.0, 120.0, 300.0, 132.0, "left two"),
        ]])
    }
}

fn orig() -> FolderId {
    FolderId::new("orig")
}

fn proc_root() -> FolderId {
    FolderId::new("proc")
}

fn config() -> IntakeConfig {
    IntakeConfig::builder(FolderIds::new("orig", "proc"), "s3cret")
        .build()
        .unwrap()
}

fn new_store() -> RemoteStore<MemoryBackend> {
    init_tracing();
    RemoteStore::new(MemoryBackend::with_roots(["orig", "proc"]))
}

fn seed_ledger(store: &RemoteStore<MemoryBackend>, rows: &str) {
    store.backend().seed_file(
        &proc_root(),
        LEDGER,
        "text/csv",
        format!("file_name,email,status\n{rows}"),
    );
}

fn ledger_text(store: &RemoteStore<MemoryBackend>) -> String {
    let bytes = store
        .backend()
        .file_content(&proc_root(), LEDGER)
        .expect("exactly one ledger file");
    String::from_utf8(bytes).unwrap()
}

fn submission(email: &str, names: &[&str]) -> Submission {
    Submission {
        email: email.into(),
        password: "s3cret".into(),
        files: names
            .iter()
            .map(|n| UploadedFile::new(*n, b"%PDF-1.7 fake".to_vec()))
            .collect(),
    }
}

fn user_folder(store: &RemoteStore<MemoryBackend>, root: &FolderId, name: &str) -> Option<FolderId> {
    store
        .backend()
        .children(root)
        .into_iter()
        .find(|(e, _)| e.kind == EntryKind::Folder && e.name == name)
        .map(|(e, _)| e.folder_id())
}

// ── Workflow ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_submission_stores_pdf_text_and_ledger_row() {
    let store = new_store();
    let report = ingest(
        &store,
        &TwoColumnExtractor,
        &submission("jane.doe@x.com", &["report.pdf"]),
        &config(),
    )
    .await
    .unwrap();

    let outcome = &report.files[0];
    assert_eq!(outcome.decision, Some(Decision::AcceptedNew));
    assert_eq!(outcome.message(), "Accepted: new record.");
    assert_eq!(outcome.pdf.as_ref().unwrap().name, "janedoe_report.pdf");
    assert_eq!(outcome.text.as_ref().unwrap().name, "janedoe_report.pdf.txt");

    let text_folder = user_folder(&store, &proc_root(), "janedoe").unwrap();
    let text = store
        .backend()
        .file_content(&text_folder, "janedoe_report.pdf.txt")
        .unwrap();
    assert_eq!(
        String::from_utf8(text).unwrap(),
        "--- Page 1 ---\nleft one\nleft two\nright one\nright two"
    );

    let pdf_folder = user_folder(&store, &orig(), "janedoe").unwrap();
    assert_eq!(
        store
            .backend()
            .file_content(&pdf_folder, "janedoe_report.pdf")
            .unwrap(),
        b"%PDF-1.7 fake"
    );

    assert_eq!(
        ledger_text(&store),
        "file_name,email,status\njanedoe_report.pdf.txt,jane.doe@x.com,Process\n"
    );
}

#[tokio::test]
async fn ready_record_denies_without_store_writes() {
    let store = new_store();
    seed_ledger(&store, "janedoe_old.pdf.txt,jane.doe@x.com,Ready\n");

    let report = ingest(
        &store,
        &TwoColumnExtractor,
        &submission("jane.doe@x.com", &["new.pdf"]),
        &config(),
    )
    .await
    .unwrap();

    assert_eq!(report.files[0].decision, Some(Decision::Denied));
    assert_eq!(report.files[0].message(), "Denied: service already provided.");
    assert!(report.ledger.is_none());
    assert_eq!(report.stats.denied, 1);
    assert!(store.backend().ops().is_empty());
    assert_eq!(
        ledger_text(&store),
        "file_name,email,status\njanedoe_old.pdf.txt,jane.doe@x.com,Ready\n"
    );
}

#[tokio::test]
async fn pending_record_is_overwritten_and_old_uploads_removed() {
    let store = new_store();
    seed_ledger(
        &store,
        "a_x.pdf.txt,a@x.com,Ready\njanedoe_old.pdf.txt,jane.doe@x.com,Process\n",
    );
    let old_pdfs = store.backend().seed_folder(&orig(), "janedoe");
    store
        .backend()
        .seed_file(&old_pdfs, "janedoe_old.pdf", "application/pdf", "old");
    let old_texts = store.backend().seed_folder(&proc_root(), "janedoe");
    store
        .backend()
        .seed_file(&old_texts, "janedoe_old.pdf.txt", "text/plain", "old");

    let report = ingest(
        &store,
        &TwoColumnExtractor,
        &submission("jane.doe@x.com", &["new.pdf"]),
        &config(),
    )
    .await
    .unwrap();

    assert_eq!(report.files[0].decision, Some(Decision::AcceptedOverwrite));
    let deletes = store
        .backend()
        .ops()
        .into_iter()
        .filter(|op| matches!(op, StoreOp::Delete { .. }))
        .count();
    assert_eq!(deletes, 2);

    let texts = user_folder(&store, &proc_root(), "janedoe").unwrap();
    let names: Vec<String> = store
        .backend()
        .children(&texts)
        .into_iter()
        .map(|(e, _)| e.name)
        .collect();
    assert_eq!(names, vec!["janedoe_new.pdf.txt"]);

    // Row order and size are preserved; only jane's row changes.
    assert_eq!(
        ledger_text(&store),
        "file_name,email,status\na_x.pdf.txt,a@x.com,Ready\njanedoe_new.pdf.txt,jane.doe@x.com,Process\n"
    );
}

#[tokio::test]
async fn keeping_previous_uploads_skips_the_cleanup() {
    let store = new_store();
    seed_ledger(&store, "janedoe_old.pdf.txt,jane.doe@x.com,Process\n");
    let old_texts = store.backend().seed_folder(&proc_root(), "janedoe");
    store
        .backend()
        .seed_file(&old_texts, "janedoe_old.pdf.txt", "text/plain", "old");

    let config = IntakeConfig::builder(FolderIds::new("orig", "proc"), "s3cret")
        .clean_previous_uploads(false)
        .build()
        .unwrap();
    ingest(
        &store,
        &TwoColumnExtractor,
        &submission("jane.doe@x.com", &["new.pdf"]),
        &config,
    )
    .await
    .unwrap();

    assert_eq!(store.backend().children(&old_texts).len(), 2);
}

#[tokio::test]
async fn non_pdf_file_fails_alone() {
    let store = new_store();
    let mut sub = submission("bob@x.com", &["good.pdf"]);
    sub.files.insert(0, UploadedFile::new("notes.docx", b"PK\x03\x04".to_vec()));

    let report = ingest(&store, &TwoColumnExtractor, &sub, &config())
        .await
        .unwrap();

    assert!(matches!(
        report.files[0].error,
        Some(pdf_intake::FileError::Extraction {
            source: ExtractionError::NotAPdf { .. },
            ..
        })
    ));
    assert!(report.files[1].is_stored());
    assert_eq!(
        ledger_text(&store),
        "file_name,email,status\nbob_good.pdf.txt,bob@x.com,Process\n"
    );
}

#[tokio::test]
async fn malformed_ledger_is_fatal() {
    let store = new_store();
    seed_ledger(&store, "a.txt,a@x.com,Done\n");

    let err = ingest(
        &store,
        &TwoColumnExtractor,
        &submission("a@x.com", &["a.pdf"]),
        &config(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IntakeError::MalformedLedger(_)));
    assert!(store.backend().ops().is_empty());
}

#[tokio::test]
async fn ledger_with_a_non_csv_type_is_not_overwritten() {
    let store = new_store();
    let rows = "file_name,email,status\na_a.pdf.txt,a@x.com,Ready\nb_b.pdf.txt,b@x.com,Process\n";
    store.backend().seed_file(&proc_root(), LEDGER, "text/plain", rows);

    let err = ingest(
        &store,
        &TwoColumnExtractor,
        &submission("c@x.com", &["c.pdf"]),
        &config(),
    )
    .await
    .unwrap_err();
    assert!(
        matches!(err, IntakeError::Store(StoreError::MalformedTabular { .. })),
        "got: {err:?}"
    );
    assert!(store.backend().ops().is_empty());
    assert_eq!(ledger_text(&store), rows);
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl IngestProgressCallback for Events {
    fn on_submission_start(&self, total_files: usize) {
        self.0.lock().unwrap().push(format!("start {total_files}"));
    }
    fn on_file_complete(&self, index: usize, _total: usize, _name: &str, decision: Decision) {
        self.0.lock().unwrap().push(format!("file {index} {decision:?}"));
    }
    fn on_file_error(&self, index: usize, _total: usize, _name: &str, _error: &str) {
        self.0.lock().unwrap().push(format!("error {index}"));
    }
    fn on_ledger_written(&self, rows: usize) {
        self.0.lock().unwrap().push(format!("ledger {rows}"));
    }
    fn on_submission_complete(&self, total: usize, accepted: usize) {
        self.0.lock().unwrap().push(format!("done {accepted}/{total}"));
    }
}

#[tokio::test]
async fn progress_events_follow_the_submission() {
    let store = new_store();
    let events = Arc::new(Events::default());
    let config = IntakeConfig::builder(FolderIds::new("orig", "proc"), "s3cret")
        .progress_callback(events.clone())
        .build()
        .unwrap();

    let mut sub = submission("c@x.com", &["one.pdf"]);
    sub.files.push(UploadedFile::new("two.pdf", b"garbage".to_vec()));
    ingest(&store, &TwoColumnExtractor, &sub, &config)
        .await
        .unwrap();

    assert_eq!(
        *events.0.lock().unwrap(),
        vec![
            "start 2",
            "file 1 AcceptedNew",
            "error 2",
            "ledger 1",
            "done 1/2"
        ]
    );
}

// ── Ledger conflict retry ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn conflict_budget_exhausted_keeps_uploaded_files() {
    let store = new_store();
    seed_ledger(&store, "a_x.pdf.txt,a@x.com,Ready\n");
    store.backend().inject_conflicts(3);

    let start = Instant::now();
    let err = ingest(
        &store,
        &TwoColumnExtractor,
        &submission("jane.doe@x.com", &["report.pdf"]),
        &config(),
    )
    .await
    .unwrap_err();
    let waited = start.elapsed();

    assert!(matches!(
        err,
        IntakeError::Store(StoreError::MaxRetriesExceeded { attempts: 3, .. })
    ));
    // 2 + 4 + 8 backoff units of one second.
    assert!(waited >= Duration::from_secs(14), "waited {waited:?}");
    assert!(waited < Duration::from_secs(15), "waited {waited:?}");

    let pdfs = user_folder(&store, &orig(), "janedoe").unwrap();
    assert!(store
        .backend()
        .file_content(&pdfs, "janedoe_report.pdf")
        .is_some());
    // The ledger was not updated.
    assert_eq!(
        ledger_text(&store),
        "file_name,email,status\na_x.pdf.txt,a@x.com,Ready\n"
    );
}

#[tokio::test(start_paused = true)]
async fn ledger_write_succeeds_on_third_attempt() {
    let store = new_store();
    seed_ledger(&store, "a_x.pdf.txt,a@x.com,Ready\n");
    let ledger_id = store
        .backend()
        .children(&proc_root())
        .into_iter()
        .find(|(e, _)| e.name == LEDGER)
        .map(|(e, _)| e.id)
        .unwrap();
    store.backend().inject_conflicts(2);

    let start = Instant::now();
    let report = ingest(
        &store,
        &TwoColumnExtractor,
        &submission("jane.doe@x.com", &["report.pdf"]),
        &config(),
    )
    .await
    .unwrap();
    let waited = start.elapsed();

    assert!(waited >= Duration::from_secs(6), "waited {waited:?}");
    assert!(waited < Duration::from_secs(7), "waited {waited:?}");
    // Updated in place: same file identity.
    assert_eq!(report.ledger.unwrap().id.as_str(), ledger_id);
    assert_eq!(report.stats.ledger_rows, 2);
    assert!(ledger_text(&store).ends_with("janedoe_report.pdf.txt,jane.doe@x.com,Process\n"));
}

#[tokio::test(start_paused = true)]
async fn backoff_unit_is_configurable() {
    let store = new_store();
    seed_ledger(&store, "");
    store.backend().inject_conflicts(1);
    let config = IntakeConfig::builder(FolderIds::new("orig", "proc"), "s3cret")
        .ledger_backoff_unit(Duration::from_millis(10))
        .build()
        .unwrap();

    let start = Instant::now();
    ingest(
        &store,
        &TwoColumnExtractor,
        &submission("d@x.com", &["d.pdf"]),
        &config,
    )
    .await
    .unwrap();
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(20), "waited {waited:?}");
    assert!(waited < Duration::from_millis(40), "waited {waited:?}");
}

#[tokio::test]
async fn duplicate_ledger_files_are_collapsed() {
    let store = new_store();
    seed_ledger(&store, "");
    seed_ledger(&store, "");

    ingest(
        &store,
        &TwoColumnExtractor,
        &submission("e@x.com", &["e.pdf"]),
        &config(),
    )
    .await
    .unwrap();

    assert_eq!(
        ledger_text(&store),
        "file_name,email,status\ne_e.pdf.txt,e@x.com,Process\n"
    );
}

// ── Session ──────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn connect_retries_with_fixed_delay() {
    let backend = MemoryBackend::with_roots(["orig", "proc"]);
    backend.inject_auth_failures(2);

    let start = Instant::now();
    let store = RemoteStore::connect(backend, &config().auth).await;
    assert!(store.is_ok());
    let waited = start.elapsed();
    assert!(waited >= Duration::from_secs(4), "waited {waited:?}");
    assert!(waited < Duration::from_secs(5), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn connect_gives_up_after_max_attempts() {
    let backend = MemoryBackend::with_roots(["orig", "proc"]);
    backend.inject_auth_failures(3);

    let err = match RemoteStore::connect(backend, &config().auth).await {
        Ok(_) => panic!("expected authentication to fail"),
        Err(e) => e,
    };
    assert!(matches!(
        err,
        IntakeError::AuthenticationFailed { attempts: 3, .. }
    ));
    assert!(err.user_message().contains("try again later"));
}
