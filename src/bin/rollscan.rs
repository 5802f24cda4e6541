//! CLI binary for edgequake-rollscan.
//!
//! A thin shim over the library crate that maps CLI flags to `RollConfig`,
//! wires Ctrl-C to the run's cancel token, and writes the result.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_rollscan::extract::write_atomic;
use edgequake_rollscan::{
    extract, inspect, CancelToken, DedupPolicy, OutputFormat, PageSelection, ProgressCallback,
    ProgressSink, RawRecord, RollConfig, RollOutput,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress sink using indicatif ────────────────────────────────────────

/// Live progress bar plus one log line per page. Pages arrive strictly in
/// order, so a single "current page" slot is enough.
struct CliProgress {
    bar: ProgressBar,
    current: Mutex<Option<(usize, Instant)>>,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening roll…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            current: Mutex::new(None),
        })
    }

    fn take_current(&self) -> (usize, f64) {
        self.current
            .lock()
            .ok()
            .and_then(|mut c| c.take())
            .map(|(page, t)| (page, t.elapsed().as_secs_f64()))
            .unwrap_or((0, 0.0))
    }
}

impl ProgressSink for CliProgress {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_length(total_pages as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>4}/{len} pages  {msg}  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Extracting");
        self.bar.set_message("");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut c) = self.current.lock() {
            *c = Some((page_num, Instant::now()));
        }
    }

    fn on_page_complete(&self, _processed: usize, total: usize, records: usize) {
        let (page, secs) = self.take_current();
        if page > 0 {
            self.bar.println(format!(
                "  {} Page {:>4}/{:<4}  {}  {}",
                if records == 0 { yellow("○") } else { green("✓") },
                page,
                total,
                dim(&format!("{records:>3} voters")),
                dim(&format!("{secs:.1}s")),
            ));
        }
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>4}/{:<4}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
    }

    fn on_preview_update(&self, _added: &[RawRecord], preview_total: usize) {
        self.bar.set_message(format!("{preview_total} voters"));
    }

    fn on_run_complete(&self, total_pages: usize, pages_processed: usize, cancelled: bool) {
        self.bar.finish_and_clear();
        if cancelled {
            eprintln!(
                "{} cancelled after {}/{} pages, keeping partial results",
                yellow("⚠"),
                bold(&pages_processed.to_string()),
                total_pages
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract a roll to JSON on stdout
  rollscan AC172_part3.pdf

  # CSV export (format inferred from extension)
  rollscan AC172_part3.pdf -o voters.csv

  # First ten pages only, with a stronger model
  rollscan --pages 1-10 --model gpt-4.1 AC172_part3.pdf -o sample.json

  # Roll published on the web
  rollscan https://ceo.example.gov.in/rolls/AC172/part3.pdf -o part3.csv

  # Inspect roll metadata (no API key needed)
  rollscan --inspect-only AC172_part3.pdf

  # Also merge unreadable-EPIC duplicates by name/parent/age/gender
  rollscan --dedup composite AC172_part3.pdf -o voters.csv

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY            OpenAI API key
  GEMINI_API_KEY            Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER    Override provider (openai, gemini, anthropic, ollama)
  EDGEQUAKE_MODEL           Override model ID
  PDFIUM_DYNAMIC_LIB_PATH   Path to libpdfium if it is not on the system library path
  ROLLSCAN_*                Every flag below, e.g. ROLLSCAN_PRIMARY_DPI=200

Press Ctrl-C to stop after the page in flight; records read so far are kept.
"#;

/// Extract voter records from scanned electoral-roll PDFs using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "rollscan",
    version,
    about = "Extract voter records from scanned electoral-roll PDFs using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the result to this file instead of stdout.
    #[arg(short, long, env = "ROLLSCAN_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format. Defaults to the output file's extension, else JSON.
    #[arg(long, env = "ROLLSCAN_FORMAT", value_enum)]
    format: Option<FormatArg>,

    /// Vision model ID (e.g. gpt-4.1-mini, gemini-2.0-flash).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, gemini, anthropic, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// First render resolution.
    #[arg(long, env = "ROLLSCAN_PRIMARY_DPI", default_value_t = 220,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    primary_dpi: u32,

    /// Re-render resolution for pages that under-yield.
    #[arg(long, env = "ROLLSCAN_FALLBACK_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    fallback_dpi: u32,

    /// Pages yielding fewer records than this are re-rendered (0 disables).
    #[arg(long, env = "ROLLSCAN_LOW_YIELD", default_value_t = 15)]
    low_yield: usize,

    /// Recognition attempts per render, first try included.
    #[arg(long, env = "ROLLSCAN_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Backoff base in milliseconds.
    #[arg(long, env = "ROLLSCAN_RETRY_DELAY_MS", default_value_t = 1200)]
    retry_delay_ms: u64,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "ROLLSCAN_PAGES", default_value = "all")]
    pages: String,

    /// Final de-duplication policy.
    #[arg(long, env = "ROLLSCAN_DEDUP", value_enum, default_value = "strong")]
    dedup: DedupArg,

    /// Skip the de-duplicated live preview.
    #[arg(long, env = "ROLLSCAN_NO_PREVIEW")]
    no_preview: bool,

    /// PDF user password for encrypted rolls.
    #[arg(long, env = "ROLLSCAN_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom extraction prompt.
    #[arg(long, env = "ROLLSCAN_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per page.
    #[arg(long, env = "ROLLSCAN_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ROLLSCAN_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Disable progress bar.
    #[arg(long, env = "ROLLSCAN_NO_PROGRESS")]
    no_progress: bool,

    /// Print roll metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ROLLSCAN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ROLLSCAN_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "ROLLSCAN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call recognition timeout in seconds.
    #[arg(long, env = "ROLLSCAN_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Json,
    Csv,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DedupArg {
    /// Merge only records sharing a voter id.
    Strong,
    /// Also merge id-less records on name/parent/age/gender.
    Composite,
}

impl From<DedupArg> for DedupPolicy {
    fn from(v: DedupArg) -> Self {
        match v {
            DedupArg::Strong => DedupPolicy::StrongKeyOnly,
            DedupArg::Composite => DedupPolicy::CompositeFallback,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let meta = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect roll")?;
        println!("File:         {}", cli.input);
        if let Some(ref t) = meta.title {
            println!("Title:        {t}");
        }
        if let Some(ref a) = meta.author {
            println!("Author:       {a}");
        }
        println!("Pages:        {}", meta.page_count);
        println!("PDF Version:  {}", meta.pdf_version);
        if let Some(ref p) = meta.producer {
            println!("Producer:     {p}");
        }
        if let Some(ref c) = meta.creator {
            println!("Creator:      {c}");
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgress::new() as Arc<dyn ProgressSink>)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;

    // ── Ctrl-C → cancel ──────────────────────────────────────────────────
    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // ── Run extraction ───────────────────────────────────────────────────
    let output = extract(&cli.input, &config, &cancel)
        .await
        .context("Extraction failed")?;

    let format = cli
        .format
        .map(OutputFormat::from)
        .or_else(|| cli.output.as_deref().map(OutputFormat::from_path))
        .unwrap_or_default();
    let rendered = format.render(&output).context("Failed to render output")?;

    if let Some(ref path) = cli.output {
        write_atomic(path, &rendered)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
        if !rendered.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        print_summary(&output, cli.output.as_ref());
    }

    Ok(())
}

fn print_summary(output: &RollOutput, path: Option<&PathBuf>) {
    let s = &output.stats;
    let mark = if s.cancelled || s.failed_pages > 0 {
        yellow("⚠")
    } else {
        green("✔")
    };
    eprintln!(
        "{}  {}/{} pages  {} voters  {} issues  {}ms{}",
        mark,
        s.processed_pages,
        s.selected_pages,
        bold(&s.final_records.to_string()),
        s.issue_count,
        s.total_duration_ms,
        path.map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default(),
    );
    if s.failed_pages > 0 || s.fallback_pages > 0 {
        eprintln!(
            "   {} failed pages  /  {} re-rendered at higher DPI  /  {} raw records",
            dim(&s.failed_pages.to_string()),
            dim(&s.fallback_pages.to_string()),
            dim(&s.raw_records.to_string()),
        );
    }
    for issue in output.issues.iter().take(10) {
        eprintln!("   {} {}", dim("·"), issue);
    }
    if output.issues.len() > 10 {
        eprintln!("   {}", dim(&format!("… and {} more", output.issues.len() - 10)));
    }
}

/// Map CLI args to `RollConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RollConfig> {
    let mut builder = RollConfig::builder()
        .primary_dpi(cli.primary_dpi)
        .fallback_dpi(cli.fallback_dpi)
        .low_yield_threshold(cli.low_yield)
        .max_attempts(cli.max_attempts)
        .retry_base_delay_ms(cli.retry_delay_ms)
        .pages(parse_pages(&cli.pages)?)
        .final_dedup(cli.dedup.into())
        .live_preview(!cli.no_preview)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {path:?}"))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    let page_number = |p: &str| -> Result<usize> {
        let n: usize = p
            .trim()
            .parse()
            .with_context(|| format!("Invalid page number: '{}'", p.trim()))?;
        if n < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {n})");
        }
        Ok(n)
    };

    if let Some((start, end)) = s.split_once('-') {
        let (start, end) = (page_number(start)?, page_number(end)?);
        if start > end {
            anyhow::bail!("Invalid page range '{start}-{end}': start must be <= end");
        }
        return Ok(PageSelection::Range(start, end));
    }

    if s.contains(',') {
        let pages = s.split(',').map(&page_number).collect::<Result<Vec<_>>>()?;
        return Ok(PageSelection::Set(pages));
    }

    Ok(PageSelection::Single(page_number(&s)?))
}
