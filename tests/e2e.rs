//! End-to-end tests against a real Google Drive.
//!
//! These tests talk to the Drive v3 API and, for the extraction test, need
//! a pdfium shared library. They are gated behind `E2E_ENABLED` so they do
//! not run in CI unless explicitly requested.
//!
//! Required environment:
//!   E2E_ENABLED=1
//!   GOOGLE_DRIVE_TOKEN            access token with the drive scope
//!   PDF_INTAKE_E2E_PARENT         folder id the tests may create scratch folders in
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use pdf_intake::store::{EntryFilter, Table};
use pdf_intake::{
    ingest, Decision, DriveBackend, FolderId, FolderIds, IntakeConfig, PdfiumExtractor,
    RemoteStore, StoreBackend, Submission, UploadedFile,
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED and the Drive variables are set.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        match (
            std::env::var("GOOGLE_DRIVE_TOKEN"),
            std::env::var("PDF_INTAKE_E2E_PARENT"),
        ) {
            (Ok(token), Ok(parent)) => (token, FolderId::new(parent)),
            _ => {
                println!("SKIP — GOOGLE_DRIVE_TOKEN and PDF_INTAKE_E2E_PARENT must be set");
                return;
            }
        }
    }};
}

async fn connect(token: String) -> RemoteStore<DriveBackend> {
    let backend = DriveBackend::new(token, Duration::from_secs(60)).expect("HTTP client");
    RemoteStore::connect(backend, &Default::default())
        .await
        .expect("Drive should accept the token")
}

fn scratch_name(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{prefix}-{nanos}")
}

/// Smallest PDF pdfium accepts: one page with one line of text.
fn tiny_pdf(text: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
         /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{body}\nendobj\n", i + 1).as_bytes());
    }
    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for off in offsets {
        pdf.extend_from_slice(format!("{off:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        )
        .as_bytes(),
    );
    pdf
}

// ── Store protocol tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_drive_folder_and_overwrite() {
    let (token, parent) = e2e_skip_unless_ready!();
    let store = connect(token).await;
    let name = scratch_name("pdf-intake-e2e");

    let folder = store.ensure_folder(&parent, &name).await.unwrap();
    let again = store.ensure_folder(&parent, &name).await.unwrap();
    assert_eq!(folder, again, "ensure_folder must reuse the existing folder");

    store
        .write_file(&folder, "a.txt", "text/plain", b"first".to_vec())
        .await
        .unwrap();
    let second = store
        .write_file(&folder, "a.txt", "text/plain", b"second".to_vec())
        .await
        .unwrap();

    let files = store
        .backend()
        .list(&folder, &EntryFilter::files_named("a.txt"))
        .await
        .unwrap();
    assert_eq!(files.len(), 1, "overwrite must leave a single file");
    assert_eq!(store.backend().download(&second.id).await.unwrap(), b"second");

    assert!(store.delete_folder_if_exists(&parent, &name).await.unwrap());
    assert!(!store.delete_folder_if_exists(&parent, &name).await.unwrap());
}

#[tokio::test]
async fn test_drive_tabular_update_keeps_identity() {
    let (token, parent) = e2e_skip_unless_ready!();
    let store = connect(token).await;
    let name = scratch_name("pdf-intake-e2e-ledger");
    let folder = store.ensure_folder(&parent, &name).await.unwrap();

    let mut table = Table::new(["file_name", "email", "status"]);
    table.rows.push(vec!["a.txt".into(), "a@x.com".into(), "Process".into()]);
    let created = store
        .write_tabular_with_retry(&folder, "ledger.csv", &table, &Default::default())
        .await
        .unwrap();

    table.rows[0][2] = "Ready".into();
    let updated = store
        .write_tabular_with_retry(&folder, "ledger.csv", &table, &Default::default())
        .await
        .unwrap();
    assert_eq!(created.id, updated.id);

    let read = store.read_tabular(&folder, "ledger.csv").await.unwrap().unwrap();
    assert_eq!(read, table);

    store.delete_folder_if_exists(&parent, &name).await.unwrap();
}

// ── Full submission ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_drive_full_submission() {
    let (token, parent) = e2e_skip_unless_ready!();
    let store = connect(token).await;

    let originals = store
        .ensure_folder(&parent, &scratch_name("pdf-intake-orig"))
        .await
        .unwrap();
    let to_process = store
        .ensure_folder(&parent, &scratch_name("pdf-intake-proc"))
        .await
        .unwrap();
    let config = IntakeConfig::builder(
        FolderIds {
            originals: originals.clone(),
            to_process: to_process.clone(),
        },
        "s3cret",
    )
    .build()
    .unwrap();

    let submission = Submission {
        email: "e2e.user@example.org".into(),
        password: "s3cret".into(),
        files: vec![UploadedFile::new("hello.pdf", tiny_pdf("Hello intake"))],
    };
    let report = ingest(&store, &PdfiumExtractor, &submission, &config)
        .await
        .expect("submission should succeed");

    println!("{}", serde_json::to_string_pretty(&report).unwrap());
    assert_eq!(report.files[0].decision, Some(Decision::AcceptedNew));
    let text = report.files[0].text.as_ref().expect("text artifact");
    let content = store.backend().download(&text.id).await.unwrap();
    let content = String::from_utf8(content).unwrap();
    assert!(content.starts_with("--- Page 1 ---\n"), "got: {content}");
    assert!(content.contains("Hello intake"), "got: {content}");

    for root in [&originals, &to_process] {
        store.backend().delete(root.as_str()).await.unwrap();
    }
}
