//! CLI binary for office2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig`, runs the batch and prints the summary.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use office2pdf::{
    convert_directory, BatchConfig, BatchProgressCallback, BatchSummary, FormatRegistry,
    ProgressCallback, UnoconvertService,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per finished
/// file. Files finish out of order, so lines carry the file name.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0); // length set in on_batch_start
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Looking for documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Starting conversion of {total} files…"))
        ));
    }

    fn on_item_start(&self, item: &str, _index: usize, _total: usize) {
        self.bar.set_message(item.to_string());
    }

    fn on_item_complete(&self, item: &str, _index: usize, _total: usize, elapsed: Duration) {
        self.bar.println(format!(
            "  {} {:<40}  {}",
            green("✓"),
            item,
            dim(&format!("{:.1}s", elapsed.as_secs_f64())),
        ));
        self.bar.inc(1);
    }

    fn on_item_error(&self, item: &str, _index: usize, _total: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg = match error.char_indices().nth(79) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };

        self.bar
            .println(format!("  {} {:<40}  {}", red("✗"), item, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let failed = total.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every .doc/.docx/.xls/.xlsx in ./inbox to ./out
  office2pdf --path inbox

  # Remote unoserver, 8 workers, 2 minutes per attempt
  office2pdf --path inbox --out pdf --host 10.0.0.5 --threads 8 --timeout-secs 120

  # Only spreadsheets, JSON summary on stdout
  office2pdf --path inbox --extensions xls,xlsx,ods --json > summary.json

SETUP:
  1. Start a conversion server:  unoserver --port 2003
  2. Convert:                    office2pdf --path inbox

  `unoconvert` (installed with unoserver) must be on PATH, or pass
  --unoconvert /path/to/unoconvert.

EXIT STATUS:
  0  every file converted
  2  at least one file failed
  1  fatal error (bad configuration, unreadable directory)
"#;

/// Convert office documents to PDF through a running LibreOffice unoserver.
#[derive(Parser, Debug)]
#[command(
    name = "office2pdf",
    version,
    about = "Convert office documents to PDF through a running LibreOffice unoserver",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the documents to convert.
    #[arg(long, env = "OFFICE2PDF_PATH")]
    path: PathBuf,

    /// Directory receiving the converted documents (created if missing).
    #[arg(long, env = "OFFICE2PDF_OUT", default_value = "./out")]
    out: PathBuf,

    /// Host of the unoserver instance.
    #[arg(long, env = "OFFICE2PDF_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port of the unoserver instance.
    #[arg(long, env = "OFFICE2PDF_PORT", default_value_t = 2003)]
    port: u16,

    /// Per-attempt timeout in seconds.
    #[arg(long, env = "OFFICE2PDF_TIMEOUT_SECS", default_value_t = 60)]
    timeout_secs: u64,

    /// Attempts per file, including the first.
    #[arg(long, env = "OFFICE2PDF_ATTEMPTS", default_value_t = 3)]
    attempts: u32,

    /// Files converted concurrently.
    #[arg(long, env = "OFFICE2PDF_THREADS", default_value_t = 4)]
    threads: usize,

    /// Conversion calls allowed in flight at once (default: --threads).
    #[arg(long, env = "OFFICE2PDF_ATTEMPT_SLOTS")]
    attempt_slots: Option<usize>,

    /// Path to the `unoconvert` client.
    #[arg(long, env = "OFFICE2PDF_UNOCONVERT", default_value = "unoconvert")]
    unoconvert: PathBuf,

    /// Comma-separated input extensions.
    #[arg(
        long,
        env = "OFFICE2PDF_EXTENSIONS",
        value_delimiter = ',',
        default_value = "xls,xlsx,doc,docx"
    )]
    extensions: Vec<String>,

    /// Base back-off between attempts in milliseconds, doubled each retry.
    #[arg(long, env = "OFFICE2PDF_RETRY_BACKOFF_MS", default_value_t = 0)]
    retry_backoff_ms: u64,

    /// Print the batch summary as JSON on stdout.
    #[arg(long, env = "OFFICE2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OFFICE2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OFFICE2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OFFICE2PDF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs unless -v is given.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new();
        Some(cb as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    let registry = Arc::new(FormatRegistry::office_defaults());
    let service = Arc::new(UnoconvertService::new(registry).with_program(&cli.unoconvert));

    let summary = convert_directory(&cli.path, &config, service)
        .await
        .with_context(|| format!("Conversion of '{}' failed", cli.path.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        print_summary(&summary);
    }

    Ok(if summary.all_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    })
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .host(cli.host.clone())
        .port(cli.port)
        .timeout_secs(cli.timeout_secs)
        .conversion_attempts(cli.attempts)
        .threads_count(cli.threads)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .extensions(cli.extensions.iter().map(|e| e.trim()).filter(|e| !e.is_empty()))
        .output_dir(cli.out.clone());

    if let Some(slots) = cli.attempt_slots {
        builder = builder.attempt_slots(slots);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(summary: &BatchSummary) {
    eprintln!(
        "{}  {}  {}ms",
        if summary.all_succeeded() {
            green("✔")
        } else {
            cyan("⚠")
        },
        summary,
        summary.duration_ms
    );
    for failure in summary.failures() {
        eprintln!(
            "  {} {}  {}",
            red("✗"),
            failure.name,
            dim(failure.error.as_deref().unwrap_or_default())
        );
    }
}
