//! CLI binary for edgequake-pdf2pages.
//!
//! A thin shim over the library crate: a SQLite record store and a local
//! object-storage directory stand in for the production collaborators.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgequake_pdf2pages::pipeline::render::count_pages;
use edgequake_pdf2pages::storage::new_doc_id;
use edgequake_pdf2pages::{
    BatchCoordinator, BatchProgressCallback, Document, DocumentVersion, LocalObjectStorage,
    PageRenderer, PdfiumRenderer, PipelineConfig, ProgressCallback, RecordStore,
    SqliteRecordStore, StorageType, TaskRunner, Team,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per finished page. Pages finish out
/// of order, so start times are tracked per page number.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<u32, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving document version…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page: u32) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: u32) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} pages…"))
        ));
    }

    fn on_page_start(&self, page: u32, _total: u32) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page, Instant::now());
        }
        self.bar.set_message(format!("page {page}"));
    }

    fn on_page_complete(&self, page: u32, total: u32, page_id: &str) {
        let secs = self.elapsed_secs(page);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page,
            total,
            dim(page_id),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page: u32, total: u32, error: &str) {
        let secs = self.elapsed_secs(page);

        let msg: String = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page,
            total,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: u32, success_count: u32) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} pages converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

/// `inspect` only reads links, which do not depend on resolution.
const INSPECT_SCALE: f32 = 0.1;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Store a PDF and create team/document/version records
  pdf2pages register deck.pdf --team team_acme --name "Board deck"

  # Convert every page of a version to PNG
  pdf2pages convert ver_3f2a...

  # List the stored page records
  pdf2pages pages ver_3f2a...

  # Run a raw task payload, as a job runner would
  pdf2pages task '{"task":"convert-pdf-to-images","documentVersionId":"ver_3f2a..."}'

  # Page count and hyperlinks, no database needed
  pdf2pages inspect deck.pdf

ENVIRONMENT VARIABLES:
  PDF2PAGES_DB                 SQLite record store (default: pdf2pages.db)
  PDF2PAGES_STORAGE_DIR        Object storage root (default: ./storage)
  PDF2PAGES_PUBLIC_BASE_URL    Serve LOCAL objects from this base URL instead of file://
  PDF2PAGES_REVALIDATE_URL     Base URL of the app exposing /api/revalidate
  PDF2PAGES_REVALIDATE_TOKEN   Shared secret for the revalidation call
  PDFIUM_LIB_PATH              Path to libpdfium; otherwise one is downloaded and cached
  PDF2PAGES_SYSTEM_PDFIUM      Bind the system libpdfium instead of downloading
  PDFIUM_AUTO_CACHE_DIR        Where the downloaded libpdfium is cached
"#;

/// Render uploaded PDFs into per-page PNG images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2pages",
    version,
    about = "Render every page of a stored PDF into a PNG and record its links",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database holding teams, documents, versions and pages.
    #[arg(long, global = true, env = "PDF2PAGES_DB", default_value = "pdf2pages.db")]
    db: PathBuf,

    /// Root directory of the local object storage.
    #[arg(long, global = true, env = "PDF2PAGES_STORAGE_DIR", default_value = "storage")]
    storage_dir: PathBuf,

    /// Public base URL for LOCAL objects (otherwise file:// URLs are used).
    #[arg(long, global = true, env = "PDF2PAGES_PUBLIC_BASE_URL")]
    public_base_url: Option<String>,

    /// Page tasks in flight at once.
    #[arg(short, long, global = true, env = "PDF2PAGES_CONCURRENCY", default_value_t = 10)]
    concurrency: usize,

    /// HTTP request timeout in seconds.
    #[arg(long, global = true, env = "PDF2PAGES_REQUEST_TIMEOUT", default_value_t = 120)]
    request_timeout: u64,

    /// Base URL of the app exposing /api/revalidate.
    #[arg(long, global = true, env = "PDF2PAGES_REVALIDATE_URL")]
    revalidate_url: Option<String>,

    /// Shared secret for the revalidation call.
    #[arg(long, global = true, env = "PDF2PAGES_REVALIDATE_TOKEN", hide_env_values = true)]
    revalidate_token: Option<String>,

    /// Path to the pdfium shared library. When unset, a prebuilt library is
    /// downloaded once and cached.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Use the system pdfium instead of downloading one.
    #[arg(long, global = true, env = "PDF2PAGES_SYSTEM_PDFIUM")]
    system_pdfium: bool,

    /// Print results as JSON.
    #[arg(long, global = true, env = "PDF2PAGES_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDF2PAGES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2PAGES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2PAGES_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store a PDF and create its team, document and version records.
    Register {
        /// Local PDF file.
        pdf: PathBuf,
        /// Owning team id for a new document (created when missing).
        /// Ignored with `--document`, which keeps that document's team.
        #[arg(long, default_value = "team_local")]
        team: String,
        /// Existing document id to add a new version to.
        #[arg(long)]
        document: Option<String>,
        /// Document name (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
    },
    /// Convert every page of a document version.
    Convert {
        version_id: String,
    },
    /// List the page records of a document version.
    Pages {
        version_id: String,
    },
    /// Run a raw JSON task payload.
    Task {
        /// Payload JSON, or `-` to read it from stdin.
        payload: String,
    },
    /// Print page count and hyperlinks of a local PDF.
    Inspect {
        pdf: PathBuf,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Registered {
    team_id: String,
    document_id: String,
    version_id: String,
    version_number: u32,
    num_pages: u32,
    file: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InspectedPage {
    page_number: u32,
    embedded_links: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs while it is on screen.
    let show_progress = !cli.quiet
        && !cli.no_progress
        && !cli.json
        && matches!(cli.command, Command::Convert { .. });
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

    // ── Ensure a pdfium library is available ─────────────────────────────
    // Only `pages` runs without rendering.
    if cli.pdfium_lib.is_none()
        && !cli.system_pdfium
        && !matches!(cli.command, Command::Pages { .. })
    {
        cli.pdfium_lib = Some(provision_pdfium(cli.quiet)?);
    }

    match &cli.command {
        Command::Register {
            pdf,
            team,
            document,
            name,
        } => register(&cli, pdf, team, document.as_deref(), name.as_deref()).await,
        Command::Convert { version_id } => convert(&cli, version_id, show_progress).await,
        Command::Pages { version_id } => pages(&cli, version_id).await,
        Command::Task { payload } => task(&cli, payload).await,
        Command::Inspect { pdf } => inspect(&cli, pdf).await,
    }
}

/// Download libpdfium into the user cache on first run; later runs only
/// check the path.
fn provision_pdfium(quiet: bool) -> Result<PathBuf> {
    if quiet || pdfium_auto::is_pdfium_cached() {
        return tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine");
    }

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix("PDF engine");
    bar.enable_steady_tick(Duration::from_millis(80));

    let on_progress = |downloaded: u64, total: Option<u64>| {
        if let Some(total) = total {
            if bar.length() != Some(total) {
                bar.set_length(total);
            }
        }
        bar.set_position(downloaded);
    };
    let path =
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(Some(&on_progress)))
            .context("Failed to download PDFium engine")?;
    bar.finish_with_message("ready ✓");
    Ok(path)
}

fn renderer(cli: &Cli) -> Arc<dyn PageRenderer> {
    match &cli.pdfium_lib {
        Some(path) => Arc::new(PdfiumRenderer::with_library(path)),
        None => Arc::new(PdfiumRenderer::new()),
    }
}

fn storage(cli: &Cli) -> LocalObjectStorage {
    let storage = LocalObjectStorage::new(&cli.storage_dir);
    match &cli.public_base_url {
        Some(base) => storage.with_public_base_url(base),
        None => storage,
    }
}

fn open_store(cli: &Cli) -> Result<Arc<SqliteRecordStore>> {
    let store = SqliteRecordStore::open(&cli.db)
        .with_context(|| format!("Failed to open record store {:?}", cli.db))?;
    Ok(Arc::new(store))
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .concurrency(cli.concurrency)
        .request_timeout_secs(cli.request_timeout);
    if let Some(ref url) = cli.revalidate_url {
        builder = builder.revalidate_url(url);
    }
    if let Some(ref token) = cli.revalidate_token {
        builder = builder.revalidate_token(token);
    }
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn coordinator(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchCoordinator> {
    let config = build_config(cli, progress)?;
    BatchCoordinator::with_defaults(open_store(cli)?, Arc::new(storage(cli)), config)
        .context("Failed to initialise HTTP client")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialise output")?
    );
    Ok(())
}

/// Where a newly registered version goes.
#[derive(Debug, PartialEq)]
struct RegisterTarget {
    team_id: String,
    document_id: String,
    version_number: u32,
}

/// An existing document keeps its own team and gets the next version
/// number; otherwise `team_id` and a fresh document are created.
async fn resolve_target(
    store: &dyn RecordStore,
    team_id: &str,
    document_id: Option<&str>,
    name: Option<&str>,
    file_name: &str,
) -> Result<RegisterTarget> {
    if let Some(id) = document_id {
        let document = store
            .find_document(id)
            .await?
            .with_context(|| format!("Document {id} not found"))?;
        let owner = document
            .team_id
            .with_context(|| format!("Document {id} has no team"))?;
        let next = store
            .list_versions(id)
            .await?
            .iter()
            .map(|v| v.version_number)
            .max()
            .unwrap_or(0)
            + 1;
        return Ok(RegisterTarget {
            team_id: owner,
            document_id: id.to_string(),
            version_number: next,
        });
    }

    store
        .insert_team(Team {
            id: team_id.to_string(),
            name: team_id.to_string(),
        })
        .await?;
    let id = new_doc_id();
    store
        .insert_document(Document {
            id: id.clone(),
            name: name.unwrap_or(file_name).to_string(),
            team_id: Some(team_id.to_string()),
        })
        .await?;
    Ok(RegisterTarget {
        team_id: team_id.to_string(),
        document_id: id,
        version_number: 1,
    })
}

async fn register(
    cli: &Cli,
    pdf: &Path,
    team_id: &str,
    document_id: Option<&str>,
    name: Option<&str>,
) -> Result<()> {
    let bytes = tokio::fs::read(pdf)
        .await
        .with_context(|| format!("Failed to read {:?}", pdf))?;
    let num_pages = count_pages(renderer(cli), bytes.clone())
        .await
        .context("Failed to open PDF")?;

    let store = open_store(cli)?;
    let file_name = pdf
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document.pdf".to_string());

    let target = resolve_target(store.as_ref(), team_id, document_id, name, &file_name).await?;
    let team_id = target.team_id.as_str();
    let document_id = target.document_id;
    let version_number = target.version_number;

    let file = storage(cli)
        .put_source(team_id, &document_id, &file_name, &bytes)
        .await
        .context("Failed to store source PDF")?;

    let version = DocumentVersion {
        id: format!("ver_{}", uuid::Uuid::new_v4().simple()),
        document_id: document_id.clone(),
        version_number,
        num_pages: Some(num_pages),
        file: file.clone(),
        storage_type: StorageType::Local,
        has_pages: false,
        is_primary: false,
    };
    store.insert_version(version.clone()).await?;

    let registered = Registered {
        team_id: team_id.to_string(),
        document_id,
        version_id: version.id,
        version_number,
        num_pages,
        file,
    };
    if cli.json {
        print_json(&registered)?;
    } else if !cli.quiet {
        println!("Version:   {}", bold(&registered.version_id));
        println!("Document:  {} (v{})", registered.document_id, registered.version_number);
        println!("Pages:     {}", registered.num_pages);
        println!("File:      {}", dim(&registered.file));
    }
    Ok(())
}

async fn convert(cli: &Cli, version_id: &str, show_progress: bool) -> Result<()> {
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let summary = coordinator(cli, progress)?
        .convert_document(version_id)
        .await
        .context("Conversion failed")?;

    if cli.json {
        print_json(&summary)?;
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}ms  {}",
            green("✔"),
            summary.total_pages,
            summary.duration_ms,
            if summary.revalidated {
                dim("revalidated")
            } else {
                dim("not revalidated")
            },
        );
    }
    Ok(())
}

async fn pages(cli: &Cli, version_id: &str) -> Result<()> {
    let pages = open_store(cli)?
        .list_pages(version_id)
        .await
        .context("Failed to list pages")?;
    print_json(&pages)
}

async fn task(cli: &Cli, payload: &str) -> Result<()> {
    let json = if payload == "-" {
        let mut buf = String::new();
        io::Read::read_to_string(&mut io::stdin(), &mut buf).context("Failed to read stdin")?;
        buf
    } else {
        payload.to_string()
    };

    let output = TaskRunner::new(coordinator(cli, None)?)
        .run_json(&json)
        .await
        .context("Task failed")?;
    print_json(&output)
}

async fn inspect(cli: &Cli, pdf: &Path) -> Result<()> {
    let bytes = tokio::fs::read(pdf)
        .await
        .with_context(|| format!("Failed to read {:?}", pdf))?;
    let renderer = renderer(cli);
    let total = count_pages(Arc::clone(&renderer), bytes.clone())
        .await
        .context("Failed to open PDF")?;

    let bytes = Arc::new(bytes);
    let mut pages = Vec::with_capacity(total as usize);
    for index in 0..total {
        let renderer = Arc::clone(&renderer);
        let bytes = Arc::clone(&bytes);
        let rendered =
            tokio::task::spawn_blocking(move || renderer.render(&bytes, index, INSPECT_SCALE))
                .await
                .context("Render task panicked")?
                .with_context(|| format!("Failed to read page {}", index + 1))?;
        pages.push(InspectedPage {
            page_number: index + 1,
            embedded_links: rendered.embedded_links,
        });
    }

    if cli.json {
        return print_json(&pages);
    }
    println!("File:   {}", pdf.display());
    println!("Pages:  {}", total);
    for page in &pages {
        if page.embedded_links.is_empty() {
            continue;
        }
        println!("  Page {:>3}:", page.page_number);
        for link in &page.embedded_links {
            println!("    {}", cyan(link));
        }
    }
    Ok(())
}
