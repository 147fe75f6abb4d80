//! CLI binary for pdf-intake.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `IntakeConfig`, runs one submission and prints the report.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_intake::{
    extract_text, ingest, ColumnReconstructor, Decision, DriveBackend, FolderIds,
    IngestProgressCallback, IngestionReport, IntakeConfig, MemoryBackend, PdfiumExtractor,
    ProgressCallback, RemoteStore, StoreBackend, Submission, TextExtractor, UploadedFile,
    DEFAULT_COLUMN_THRESHOLD,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders one bar over the submitted files plus a log line per file.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:32.green/238}] {pos:>2}/{len} files  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Submitting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_submission_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.set_message("reading ledger…");
    }

    fn on_file_start(&self, _index: usize, _total: usize, file_name: &str) {
        self.bar.set_message(file_name.to_string());
    }

    fn on_file_complete(&self, index: usize, total: usize, file_name: &str, decision: Decision) {
        let mark = if decision.is_accepted() {
            green("✓")
        } else {
            yellow("–")
        };
        self.bar.println(format!(
            "  {mark} {index:>2}/{total:<2}  {file_name}  {}",
            dim(decision.message())
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, total: usize, file_name: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {index:>2}/{total:<2}  {file_name}  {}",
            red("✗"),
            red(error)
        ));
        self.bar.inc(1);
    }

    fn on_ledger_written(&self, ledger_rows: usize) {
        self.bar
            .println(format!("  {} ledger saved ({ledger_rows} rows)", green("✓")));
    }

    fn on_submission_complete(&self, total_files: usize, accepted: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        eprintln!(
            "{} {}/{} files accepted{}",
            if accepted == total_files {
                green("✔")
            } else {
                yellow("⚠")
            },
            bold(&accepted.to_string()),
            total_files,
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Submit two PDFs to Google Drive
  export GOOGLE_DRIVE_TOKEN=ya29....
  pdf-intake submit --email jane.doe@uni.edu --password s3cret \
      --originals-folder 1AbC --to-process-folder 1XyZ paper.pdf appendix.pdf

  # Same flow against an in-memory store (nothing leaves the machine)
  pdf-intake submit --dry-run --email jane.doe@uni.edu --password s3cret \
      --originals-folder orig --to-process-folder proc paper.pdf

  # Print the reading-order text of a local PDF
  pdf-intake reconstruct paper.pdf

  # JSON report for scripting
  pdf-intake --json submit ... > report.json

ENVIRONMENT VARIABLES:
  GOOGLE_DRIVE_TOKEN               OAuth access token with Drive scope
  PDF_INTAKE_SHARED_PASSWORD       Shared secret submitters must provide
  PDF_INTAKE_ORIGINALS_FOLDER      Drive folder id for original PDFs
  PDF_INTAKE_TO_PROCESS_FOLDER     Drive folder id for text artifacts + ledger
  PDFIUM_DYNAMIC_LIB_PATH          Directory containing libpdfium
  RUST_LOG                         Override log filter (e.g. pdf_intake=debug)
"#;

/// Accept PDF submissions into a shared Drive folder tree.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-intake",
    version,
    about = "Accept PDF submissions into per-user Drive folders with a shared ledger",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Output a structured JSON report instead of text.
    #[arg(long, global = true, env = "PDF_INTAKE_JSON")]
    json: bool,

    /// Disable the progress bar.
    #[arg(long, global = true, env = "PDF_INTAKE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF_INTAKE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF_INTAKE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one submission.
    Submit(SubmitArgs),
    /// Print the reading-order text of a local PDF.
    Reconstruct(ReconstructArgs),
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// PDF files to submit.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Submitter's email address.
    #[arg(long)]
    email: String,

    /// Password typed by the submitter.
    #[arg(long)]
    password: String,

    /// Shared secret the password is checked against (defaults to --password).
    #[arg(long, env = "PDF_INTAKE_SHARED_PASSWORD", hide_env_values = true)]
    shared_password: Option<String>,

    /// Folder id of the originals root.
    #[arg(long, env = "PDF_INTAKE_ORIGINALS_FOLDER")]
    originals_folder: String,

    /// Folder id of the to-process root (holds the ledger).
    #[arg(long, env = "PDF_INTAKE_TO_PROCESS_FOLDER")]
    to_process_folder: String,

    /// Ledger file name inside the to-process root.
    #[arg(long, env = "PDF_INTAKE_LEDGER", default_value = "workListFile.csv")]
    ledger: String,

    /// Ledger write attempts on version conflicts.
    #[arg(long, env = "PDF_INTAKE_LEDGER_ATTEMPTS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..=16))]
    ledger_attempts: u32,

    /// Base backoff between ledger attempts, in milliseconds.
    #[arg(long, env = "PDF_INTAKE_BACKOFF_MS", default_value_t = 1000)]
    backoff_ms: u64,

    /// Ward-distance cut for column detection, in PDF points.
    #[arg(long, env = "PDF_INTAKE_COLUMN_THRESHOLD", default_value_t = DEFAULT_COLUMN_THRESHOLD)]
    column_threshold: f64,

    /// Keep earlier uploads of a pending submission instead of deleting them.
    #[arg(long, env = "PDF_INTAKE_KEEP_PREVIOUS")]
    keep_previous: bool,

    /// Drive OAuth access token.
    #[arg(long, env = "GOOGLE_DRIVE_TOKEN", hide_env_values = true,
          required_unless_present = "dry_run")]
    token: Option<String>,

    /// Per-request HTTP timeout in seconds.
    #[arg(long, env = "PDF_INTAKE_HTTP_TIMEOUT", default_value_t = 60)]
    http_timeout: u64,

    /// Use an in-memory store instead of Google Drive.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct ReconstructArgs {
    /// Local PDF file.
    input: PathBuf,

    /// Ward-distance cut for column detection, in PDF points.
    #[arg(long, env = "PDF_INTAKE_COLUMN_THRESHOLD", default_value_t = DEFAULT_COLUMN_THRESHOLD)]
    column_threshold: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // With the progress bar active only errors are logged; the bar covers
    // everything else.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && matches!(cli.command, Command::Submit(_));
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Reconstruct(ref args) => reconstruct(&cli, args).await,
        Command::Submit(ref args) => submit(&cli, args, show_progress).await,
    }
}

async fn reconstruct(cli: &Cli, args: &ReconstructArgs) -> Result<()> {
    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {:?}", args.input))?;

    let extractor = PdfiumExtractor;
    if cli.json {
        let pages = extractor
            .extract_blocks(&bytes)
            .await
            .context("Text extraction failed")?;
        let json = serde_json::to_string_pretty(&pages).context("Failed to serialise blocks")?;
        println!("{json}");
        return Ok(());
    }

    let reconstructor = ColumnReconstructor::new(args.column_threshold);
    let text = extract_text(&extractor, &reconstructor, &bytes)
        .await
        .context("Text extraction failed")?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    handle
        .write_all(text.as_bytes())
        .context("Failed to write to stdout")?;
    if !text.ends_with('\n') {
        handle.write_all(b"\n").ok();
    }
    Ok(())
}

async fn submit(cli: &Cli, args: &SubmitArgs, show_progress: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };
    let config = build_config(args, progress_cb)?;
    let submission = read_submission(args).await?;

    let report = if args.dry_run {
        let backend = MemoryBackend::with_roots([
            config.folders.originals.as_str(),
            config.folders.to_process.as_str(),
        ]);
        let store = RemoteStore::connect(backend, &config.auth)
            .await
            .context("Failed to open in-memory store")?;
        let report = run(&store, &submission, &config).await?;
        if !cli.quiet && !cli.json {
            eprintln!("{}", dim("dry run: store operations"));
            for op in store.backend().ops() {
                eprintln!("  {}", dim(&format!("{op:?}")));
            }
        }
        report
    } else {
        let token = args
            .token
            .clone()
            .context("A Drive token is required (--token or GOOGLE_DRIVE_TOKEN)")?;
        let backend = DriveBackend::new(token, Duration::from_secs(args.http_timeout))
            .context("Failed to build HTTP client")?;
        let store = RemoteStore::connect(backend, &config.auth)
            .await
            .context("Failed to connect to Google Drive")?;
        run(&store, &submission, &config).await?
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_report(&report);
    }
    Ok(())
}

async fn run<B: StoreBackend>(
    store: &RemoteStore<B>,
    submission: &Submission,
    config: &IntakeConfig,
) -> Result<IngestionReport> {
    ingest(store, &PdfiumExtractor, submission, config)
        .await
        .map_err(|e| anyhow::anyhow!("{}\n  cause: {}", e.user_message(), e))
}

fn print_report(report: &IngestionReport) {
    println!("User:    {}", report.user_key);
    for file in &report.files {
        println!("  {:<40} {}", file.original_name, file.message());
    }
    match report.ledger {
        Some(ref ledger) => println!("Ledger:  {} ({} rows)", ledger.name, report.stats.ledger_rows),
        None => println!("Ledger:  unchanged"),
    }
    println!("Took:    {}ms", report.stats.total_duration_ms);
}

/// Map CLI args to `IntakeConfig`.
fn build_config(args: &SubmitArgs, progress: Option<ProgressCallback>) -> Result<IntakeConfig> {
    let shared = args
        .shared_password
        .clone()
        .unwrap_or_else(|| args.password.clone());

    let mut builder = IntakeConfig::builder(
        FolderIds::new(&args.originals_folder, &args.to_process_folder),
        shared,
    )
    .ledger_file_name(&args.ledger)
    .ledger_max_attempts(args.ledger_attempts)
    .ledger_backoff_unit(Duration::from_millis(args.backoff_ms))
    .column_threshold(args.column_threshold)
    .clean_previous_uploads(!args.keep_previous);

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_submission(args: &SubmitArgs) -> Result<Submission> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        files.push(UploadedFile::new(file_name(path)?, bytes));
    }
    Ok(Submission {
        email: args.email.clone(),
        password: args.password.clone(),
        files,
    })
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{:?} has no file name", path))
}
