//! CLI binary for edgequake-pdf-explain.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExplainConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf_explain::{
    explain, inspect, ExplainConfig, ExplainConfigBuilder, ExplainProgressCallback,
    ExplanationOutput, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────

/// Progress bar plus one log line per finished page.
///
/// Pages arrive strictly in order, so the bar message always names the page
/// currently in flight (including the pause before it).
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(SPINNER),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExplainProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(SPINNER),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Explaining");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        self.bar
            .set_message(format!("page {page_num} of {total_pages}…"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, provider: &str, text_len: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(provider),
            dim(&format!("{text_len:>5} chars")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, placeholder: &str) {
        let msg: String = if placeholder.chars().count() > 80 {
            format!("{}…", placeholder.chars().take(79).collect::<String>())
        } else {
            placeholder.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_pages: usize, explained: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(explained);
        if failed == 0 {
            eprintln!("{} {} pages explained", green("✔"), bold(&explained.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages explained  ({} placeholders)",
                if explained == 0 { red("✘") } else { yellow("⚠") },
                bold(&explained.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Explain every page (Markdown on stdout)
  pdf-explain lecture.pdf

  # Write to a file
  pdf-explain slides.pdf -o slides-explained.md

  # From a URL, JSON output
  pdf-explain --json https://arxiv.org/pdf/1706.03762 > attention.json

  # Gemini only, slower pacing for a free-tier key
  pdf-explain --gemini-key "$GEMINI_API_KEY" --page-delay-ms 6000 deck.pdf

  # Page count only (no API key needed)
  pdf-explain --inspect-only report.pdf

PROVIDERS:
  Groq (primary)     fast; request bodies capped, pages downscaled to
                     --byte-budget; one attempt per page
  Gemini (fallback)  quota-limited; rate limits retried up to 3 times per
                     model with the suggested delay (≤5s); unknown models
                     skipped

  The provider that answers a page is reused for the next one until it
  fails; then both are probed again, Groq first.

ENVIRONMENT VARIABLES:
  GROQ_API_KEY       Enables Groq
  GEMINI_API_KEY     Enables Gemini (GOOGLE_API_KEY also accepted)
  PDFIUM_LIB_PATH    Path to libpdfium
  RUST_LOG           Override log filter
"#;

/// Explain each page of a PDF with vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-explain",
    version,
    about = "Explain each page of a PDF with vision LLMs (Groq, Gemini fallback)",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write output to this file instead of stdout.
    #[arg(short, long, env = "PDF_EXPLAIN_OUTPUT")]
    output: Option<PathBuf>,

    /// Output structured JSON (ExplanationOutput) instead of Markdown.
    #[arg(long, env = "PDF_EXPLAIN_JSON")]
    json: bool,

    /// Print the page count only; no provider is contacted.
    #[arg(long)]
    inspect_only: bool,

    /// Groq API key.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_key: Option<String>,

    /// Gemini API key.
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_key: Option<String>,

    /// Groq vision model.
    #[arg(long, env = "PDF_EXPLAIN_GROQ_MODEL")]
    groq_model: Option<String>,

    /// Gemini models in priority order, comma-separated.
    #[arg(long, env = "PDF_EXPLAIN_GEMINI_MODELS", value_delimiter = ',')]
    gemini_models: Vec<String>,

    /// Pause between pages in milliseconds.
    #[arg(long, env = "PDF_EXPLAIN_PAGE_DELAY_MS", default_value_t = 3000)]
    page_delay_ms: u64,

    /// Render scale relative to the page's natural size.
    #[arg(long, env = "PDF_EXPLAIN_SCALE", default_value_t = 2.0)]
    scale: f32,

    /// Maximum image size sent to Groq, in bytes.
    #[arg(long, env = "PDF_EXPLAIN_BYTE_BUDGET", default_value_t = 3 * 1024 * 1024)]
    byte_budget: usize,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PDF_EXPLAIN_API_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF_EXPLAIN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF_EXPLAIN_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Text file with a custom prompt; `{page}` and `{total}` are substituted.
    #[arg(long, env = "PDF_EXPLAIN_PROMPT")]
    prompt: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long, env = "PDF_EXPLAIN_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF_EXPLAIN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF_EXPLAIN_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar carries the per-page feedback; keep library logs
    // quiet unless asked.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
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
        let pages = inspect(&cli.input, cli.password.as_deref())
            .await
            .context("Failed to inspect PDF")?;
        if cli.json {
            println!("{}", serde_json::json!({ "input": cli.input, "pages": pages }));
        } else {
            println!("File:   {}", cli.input);
            println!("Pages:  {}", pages);
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExplainProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = explain(&cli.input, &config)
        .await
        .context("Explanation failed")?;

    let rendered = if cli.json {
        serde_json::to_string_pretty(&output).context("Failed to serialise output")?
    } else {
        output.to_markdown()
    };

    match cli.output {
        Some(ref path) => {
            tokio::fs::write(path, rendered.as_bytes())
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!("   →  {}", bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet {
        print_summary(&output, show_progress);
    }
    Ok(())
}

fn print_summary(output: &ExplanationOutput, show_progress: bool) {
    let s = &output.stats;
    if !show_progress {
        eprintln!(
            "Explained {}/{} pages in {}ms",
            s.explained_pages, s.total_pages, s.total_duration_ms
        );
    }
    eprintln!(
        "   {} via Groq  /  {} via Gemini  —  {}ms total",
        dim(&s.primary_pages.to_string()),
        dim(&s.fallback_pages.to_string()),
        s.total_duration_ms,
    );

    let quota = output.quota_limited_pages();
    if !quota.is_empty() {
        let list = quota
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        eprintln!(
            "{} Pages {} hit a provider quota. Wait a minute and retry, \
             raise --page-delay-ms, or use a paid key.",
            yellow("⚠"),
            list
        );
    }
}

/// Map CLI args to `ExplainConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExplainConfig> {
    let mut builder = ExplainConfigBuilder::from_config(ExplainConfig::from_env())
        .page_delay_ms(cli.page_delay_ms)
        .render_scale(cli.scale)
        .byte_budget(cli.byte_budget)
        .request_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref key) = cli.groq_key {
        builder = builder.groq_api_key(key.trim());
    }
    if let Some(ref key) = cli.gemini_key {
        builder = builder.gemini_api_key(key.trim());
    }
    if let Some(ref model) = cli.groq_model {
        builder = builder.groq_model(model);
    }
    if !cli.gemini_models.is_empty() {
        builder = builder.gemini_models(cli.gemini_models.iter().map(|m| m.trim().to_string()));
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd);
    }
    if let Some(ref path) = cli.prompt {
        let template = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read prompt from {:?}", path))?;
        builder = builder.prompt_template(template);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
