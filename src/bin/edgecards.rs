//! CLI binary for edgequake-cards.
//!
//! A thin shim over the library crate that maps CLI flags to `StudioConfig`,
//! drives a `Studio` through analysis and the requested cards, and writes the
//! results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_cards::{
    sanitize_file_name, CardStyle, CardsError, CorsProbe, DesignBlueprint, ExportPipeline,
    GeneratedCard, HeadlessBrowser, Outcome, ProgressCallback, Studio, StudioConfig,
    StudioProgressCallback, StylePreference,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
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

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: one spinner line plus a log line per finished step.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Mutex<Option<Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&TICKS);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn mark_start(&self) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
    }

    fn elapsed(&self) -> String {
        let secs = self
            .started
            .lock()
            .ok()
            .and_then(|s| *s)
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        dim(&format!("{secs:.1}s"))
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl StudioProgressCallback for CliProgressCallback {
    fn on_analysis_start(&self, text_len: usize) {
        self.mark_start();
        self.bar.set_prefix("Analysing");
        self.bar.set_message(format!("{text_len} chars"));
    }

    fn on_blueprint_ready(&self, card_count: usize) {
        self.bar.println(format!(
            "  {} Blueprint ready  {}  {}",
            green("✓"),
            dim(&format!("{card_count} cards")),
            self.elapsed()
        ));
    }

    fn on_card_start(&self, index: usize, total: usize) {
        self.mark_start();
        self.bar.set_prefix("Rendering");
        self.bar.set_message(format!("card {}/{}", index + 1, total));
    }

    fn on_card_complete(&self, index: usize, total: usize, html_len: usize) {
        self.bar.println(format!(
            "  {} Card {:>2}/{:<2}  {:<12}  {}",
            green("✓"),
            index + 1,
            total,
            dim(&format!("{html_len:>6} bytes")),
            self.elapsed()
        ));
    }

    fn on_retry(&self, operation: &str, attempt: u32, delay: Duration) {
        self.bar.println(format!(
            "  {} {} rate limited, retry {} in {:.1}s",
            yellow("⟳"),
            operation,
            attempt,
            delay.as_secs_f64()
        ));
    }

    fn on_error(&self, message: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar
            .println(format!("  {} {}  {}", red("✗"), red(message), self.elapsed()));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Plan a deck and render the cover card into the current directory
  edgecards notes.md

  # Read from stdin, force a style, render every card into ./deck
  cat article.txt | edgecards - --style cyberpunk --all -o deck

  # Render cards 1 and 3 and export PNGs (needs Chromium)
  edgecards notes.md --cards 1,3 --export

  # Only print the design blueprint as JSON
  edgecards notes.md --blueprint-only --json

STYLES:
  auto (default), minimalist, corporate, vibrant, retro, cyberpunk, nature,
  elegant, hand-drawn

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Gemini API key (API_KEY is also accepted)
  CHROME_PATH             Chromium/Chrome executable for --export
  EDGECARDS_*             Fallback for every long flag (e.g. EDGECARDS_STYLE)
"#;

/// Turn documents into styled knowledge cards.
#[derive(Parser, Debug)]
#[command(
    name = "edgecards",
    version,
    about = "Turn documents into styled knowledge cards (HTML + PNG)",
    long_about = "Analyse a document into a design blueprint with a generative model, then \
render the requested cards as standalone HTML documents and optionally export them as PNG \
images through a headless browser.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Document to convert, or `-` for stdin.
    input: String,

    /// Visual style: auto or one of the listed styles.
    #[arg(long, env = "EDGECARDS_STYLE", default_value = "auto", value_parser = parse_style)]
    style: StylePreference,

    /// Cards to render, 1-indexed: 1, 2-4 or 1,3,5. Default: the cover card.
    #[arg(long, env = "EDGECARDS_CARDS", conflicts_with = "all")]
    cards: Option<String>,

    /// Render every card, walking "next" from the cover.
    #[arg(long, env = "EDGECARDS_ALL")]
    all: bool,

    /// Directory for .html / .png output.
    #[arg(short, long, env = "EDGECARDS_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Also export each rendered card as a PNG image.
    #[arg(long, env = "EDGECARDS_EXPORT")]
    export: bool,

    /// Copy the last rendered card's markup to the clipboard.
    #[arg(long, env = "EDGECARDS_COPY")]
    copy: bool,

    /// Stop after the analysis phase.
    #[arg(long, env = "EDGECARDS_BLUEPRINT_ONLY")]
    blueprint_only: bool,

    /// Print the blueprint as JSON on stdout.
    #[arg(long, env = "EDGECARDS_JSON")]
    json: bool,

    /// Model for the analysis call.
    #[arg(long, env = "EDGECARDS_ANALYSIS_MODEL")]
    analysis_model: Option<String>,

    /// Model for card rendering.
    #[arg(long, env = "EDGECARDS_RENDER_MODEL")]
    render_model: Option<String>,

    /// Retries after a rate-limit response.
    #[arg(long, env = "EDGECARDS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Delay before the first retry, doubled on each further retry.
    #[arg(long, env = "EDGECARDS_RETRY_BACKOFF_MS", default_value_t = 3000)]
    retry_backoff_ms: u64,

    /// Per-request timeout in seconds.
    #[arg(long, env = "EDGECARDS_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Browser executable for --export (default: CHROME_PATH or PATH lookup).
    #[arg(long, env = "EDGECARDS_CHROME")]
    chrome: Option<PathBuf>,

    /// Run the export browser with --no-sandbox.
    #[arg(long, env = "EDGECARDS_NO_SANDBOX")]
    no_sandbox: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "EDGECARDS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "EDGECARDS_QUIET")]
    quiet: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "EDGECARDS_NO_PROGRESS")]
    no_progress: bool,
}

fn parse_style(s: &str) -> Result<StylePreference, String> {
    s.parse::<StylePreference>().map_err(|_| {
        let names: Vec<&str> = CardStyle::ALL.iter().map(|c| c.as_str()).collect();
        format!("unknown style '{s}' (expected auto, {})", names.join(", "))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner provides the feedback that matters; keep INFO logs out of
    // its way unless asked for.
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

    // ── Input ────────────────────────────────────────────────────────────
    let text = read_input(&cli.input).await?;

    // ── Build studio ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn StudioProgressCallback>),
    )?;
    let studio = Studio::new(&config).context("Failed to initialise the studio")?;

    // ── Phase 1: analysis ────────────────────────────────────────────────
    let analysis = studio.analyze(&text, cli.style).await;
    let blueprint = match analysis {
        Ok(Outcome::Committed(bp)) => bp,
        Ok(_) => {
            finish_progress(&progress);
            anyhow::bail!("Analysis result was discarded");
        }
        Err(e) => {
            finish_progress(&progress);
            return Err(anyhow::Error::new(e).context("Analysis failed"));
        }
    };

    if cli.json {
        let json =
            serde_json::to_string_pretty(&*blueprint).context("Failed to serialise blueprint")?;
        println!("{json}");
    } else if !cli.quiet {
        print_blueprint(&blueprint, &progress);
    }
    if cli.blueprint_only {
        finish_progress(&progress);
        print_usage(&studio, &cli);
        return Ok(());
    }

    // ── Phase 2: cards ───────────────────────────────────────────────────
    let total = blueprint.card_count();
    let indices = if cli.all {
        (0..total).collect()
    } else {
        match &cli.cards {
            Some(spec) => parse_cards(spec, total)?,
            None => vec![0],
        }
    };

    std::fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;

    let exporter = if cli.export {
        Some(build_exporter(&cli, &config)?)
    } else {
        None
    };

    let mut last_card: Option<GeneratedCard> = None;
    let mut failed = 0usize;
    for index in indices {
        match render_one(&studio, index).await {
            Ok(Outcome::Committed(card)) => {
                let path = write_markup(&cli.output, &card)?;
                log_line(&progress, cli.quiet, format!("    {}", dim(&path.display().to_string())));

                if let Some(exporter) = &exporter {
                    match exporter.export_card(&card).await {
                        Ok(image) => match image.save(&cli.output) {
                            Ok(path) => log_line(
                                &progress,
                                cli.quiet,
                                format!("    {}", dim(&path.display().to_string())),
                            ),
                            Err(e) => log_line(&progress, false, format!("  {} {}", red("✗"), e)),
                        },
                        Err(e) => {
                            tracing::debug!("Export failed: {e}");
                            log_line(
                                &progress,
                                false,
                                format!("  {} {}", red("✗"), red(e.user_message())),
                            );
                        }
                    }
                }
                last_card = Some(card);
            }
            Ok(Outcome::Skipped) | Ok(Outcome::Discarded) => {}
            Err(e) => {
                failed += 1;
                // The callback already printed the user-facing message.
                if progress.is_none() {
                    eprintln!("{} card {}: {}", red("✗"), index + 1, e.user_message());
                }
            }
        }
    }

    finish_progress(&progress);

    if cli.copy {
        copy_last(last_card.as_ref());
    }

    if !cli.quiet {
        let ok = last_card.is_some();
        eprintln!(
            "{} cards written to {}{}",
            if failed == 0 && ok { green("✔") } else { cyan("⚠") },
            bold(&cli.output.display().to_string()),
            if failed > 0 {
                format!("  ({} failed)", red(&failed.to_string()))
            } else {
                String::new()
            }
        );
        print_usage(&studio, &cli);
    }

    Ok(())
}

/// Render `index`, using "next" when it directly follows the current card.
async fn render_one(studio: &Studio, index: usize) -> Result<Outcome<GeneratedCard>, CardsError> {
    let snapshot = studio.snapshot()?;
    let follows = snapshot.has_next
        && snapshot.current_card.as_ref().map(|c| c.index + 1) == Some(index);
    if follows {
        studio.next_card().await
    } else {
        studio.render_card(index).await
    }
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        return Ok(buf);
    }
    tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {input}"))
}

/// Map CLI args to `StudioConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<StudioConfig> {
    let mut builder = StudioConfig::builder()
        .max_retries(cli.max_retries)
        .retry_backoff_ms(cli.retry_backoff_ms)
        .request_timeout_secs(cli.api_timeout);

    if let Some(model) = &cli.analysis_model {
        builder = builder.analysis_model(model);
    }
    if let Some(model) = &cli.render_model {
        builder = builder.render_model(model);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn build_exporter(cli: &Cli, config: &StudioConfig) -> Result<ExportPipeline> {
    let browser = match &cli.chrome {
        Some(path) => HeadlessBrowser::new(path),
        None => HeadlessBrowser::detect().context("--export needs a headless browser")?,
    }
    .no_sandbox(cli.no_sandbox);

    let probe = CorsProbe::new(Duration::from_secs(config.request_timeout_secs.min(30)))
        .context("Failed to build the stylesheet probe")?;
    Ok(ExportPipeline::new(Arc::new(browser), Arc::new(probe)))
}

/// Parse `--cards` (1-indexed) into 0-based indices.
fn parse_cards(spec: &str, total: usize) -> Result<Vec<usize>> {
    let mut out = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => (
                a.trim().parse::<usize>().context("Invalid start card in range")?,
                b.trim().parse::<usize>().context("Invalid end card in range")?,
            ),
            None => {
                let n = part
                    .parse::<usize>()
                    .with_context(|| format!("Invalid card number: '{part}'"))?;
                (n, n)
            }
        };
        if start < 1 || start > end {
            anyhow::bail!("Invalid card selection '{part}' (cards are 1-indexed)");
        }
        if end > total {
            anyhow::bail!("Card {end} does not exist (the blueprint has {total} cards)");
        }
        out.extend((start - 1)..end);
    }
    if out.is_empty() {
        anyhow::bail!("--cards selected nothing");
    }
    Ok(out)
}

fn write_markup(dir: &Path, card: &GeneratedCard) -> Result<PathBuf> {
    let path = dir.join(format!("{}.html", sanitize_file_name(&card.title)));
    std::fs::write(&path, &card.html)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(feature = "clipboard")]
fn copy_last(card: Option<&GeneratedCard>) {
    match card {
        Some(card) => match edgequake_cards::clipboard::copy_card(card) {
            Ok(()) => eprintln!("{} markup of \"{}\" copied", green("✔"), card.title),
            Err(e) => eprintln!("{} {}", red("✗"), e),
        },
        None => eprintln!("{} nothing to copy", cyan("⚠")),
    }
}

#[cfg(not(feature = "clipboard"))]
fn copy_last(_card: Option<&GeneratedCard>) {
    eprintln!("{} built without clipboard support", cyan("⚠"));
}

fn print_blueprint(bp: &DesignBlueprint, progress: &Option<Arc<CliProgressCallback>>) {
    let mut lines = vec![
        format!(
            "{} {}  {} / {}  {} + {}",
            cyan("◆"),
            bold(bp.style.as_str()),
            bp.theme_color,
            bp.secondary_color,
            bp.font_pairing.heading,
            bp.font_pairing.body
        ),
        format!("  {}", dim(&bp.description)),
    ];
    for (i, outline) in bp.card_outlines.iter().enumerate() {
        lines.push(format!("  {:>2}. {}", i + 1, outline.title));
    }
    for line in lines {
        log_line(progress, false, line);
    }
}

fn print_usage(studio: &Studio, cli: &Cli) {
    if cli.quiet {
        return;
    }
    let usage = studio.usage();
    eprintln!(
        "   {} requests  /  {} tokens in  /  {} tokens out",
        usage.requests,
        dim(&usage.input_tokens.to_string()),
        dim(&usage.output_tokens.to_string()),
    );
}

fn log_line(progress: &Option<Arc<CliProgressCallback>>, quiet: bool, line: String) {
    if quiet {
        return;
    }
    match progress {
        Some(cb) => cb.bar.println(line),
        None => eprintln!("{line}"),
    }
}

fn finish_progress(progress: &Option<Arc<CliProgressCallback>>) {
    if let Some(cb) = progress {
        cb.finish();
        let errors = cb.errors.load(Ordering::SeqCst);
        if errors > 0 {
            eprintln!("{} {} step(s) failed", cyan("⚠"), errors);
        }
    }
}
