//! CLI binary for arxiv-figures.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use arxiv_figures::{
    extract_figures, ArtifactStore, ExtractionConfig, ExtractionProgressCallback,
    ExtractionStatus, FigureResponse, ImageArtifact, PaperId, ProgressCallback, ResultBundle,
    SampleStrategy, Stage,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
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

/// Terminal progress callback: one spinner naming the current stage, plus a
/// log line per saved or skipped figure.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    /// Stop the spinner when the run ends without `on_extraction_complete`.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::Download => "Downloading source and PDF…",
        Stage::Probe => "Inspecting source archive…",
        Stage::SourceText => "Reading LaTeX sources…",
        Stage::Captions => "Reading captions from the PDF…",
        Stage::Matching => "Matching figures to source files…",
        Stage::Materialize => "Saving images…",
        Stage::Assemble => "Writing metadata…",
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(stage_label(stage));
    }

    fn on_stage_complete(&self, stage: Stage, items: usize) {
        match stage {
            Stage::Captions => self
                .bar
                .println(format!("  {} {} figures listed", green("✓"), items)),
            Stage::Matching => self
                .bar
                .println(format!("  {} {} figures matched", green("✓"), items)),
            _ => {}
        }
    }

    fn on_figure_saved(&self, _index: usize, artifact: &ImageArtifact) {
        self.bar.println(format!(
            "  {} Figure {:<5} {}  {}",
            green("✓"),
            artifact.figure_number,
            artifact.stored_filename,
            dim(&artifact.original_path),
        ));
    }

    fn on_figure_skipped(&self, figure_number: &str, reason: &str) {
        self.bar.println(format!(
            "  {} Figure {:<5} {}",
            red("✗"),
            figure_number,
            red(reason)
        ));
    }

    fn on_extraction_complete(&self, status: ExtractionStatus, images: usize) {
        self.bar.finish_and_clear();
        match status {
            ExtractionStatus::Success => {
                eprintln!("{} {} images saved", green("✔"), bold(&images.to_string()))
            }
            _ => eprintln!("{} finished without images", yellow("⚠")),
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Extract figures into ./uploads
  arxiv-figures 1706.03762

  # Any arXiv link works
  arxiv-figures https://arxiv.org/abs/1706.03762 -o figures

  # Also build figures/1706.03762_images.zip
  arxiv-figures 1706.03762 -o figures --bundle

  # Response envelope as JSON (success / warning / error)
  arxiv-figures 1706.03762 --json

  # Show what a previous run stored (no API key needed)
  arxiv-figures 1706.03762 -o figures --show

  # Send figure environments to the matcher instead of the file prefix
  arxiv-figures 2301.00001 --sample-strategy figures --sample-chars 4000

OUTPUT LAYOUT:
  {dir}/{id}_data.json     metadata: arxiv_id + images[]
  {dir}/{id}_{n}.{ext}     one file per extracted figure
  {dir}/{id}_images.zip    with --bundle
  Old-style ids (hep-th/9901001) use '_' for '/'.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred: reads PDFs natively)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  ARXIV_FIGURES_*         Fallback for every flag, e.g. ARXIV_FIGURES_OUTPUT_DIR
"#;

/// Extract captioned figures from arXiv papers using an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "arxiv-figures",
    version,
    about = "Extract captioned figures from arXiv papers using an LLM",
    long_about = "Download an arXiv paper's LaTeX source and PDF, read the figure captions \
from the PDF with an LLM, match each caption to its image file in the source archive, and \
save the images with a JSON metadata record.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// arXiv id (1706.03762, arXiv:1706.03762v5, hep-th/9901001) or arxiv.org link.
    paper: String,

    /// Directory for images and metadata.
    #[arg(short, long, env = "ARXIV_FIGURES_OUTPUT_DIR", default_value = "uploads")]
    output_dir: PathBuf,

    /// LLM model ID (e.g. gemini-2.0-flash, gpt-4.1).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          The caption call attaches the PDF, so the model must accept application/pdf input."
    )]
    provider: Option<String>,

    /// Characters of LaTeX sent to the matching call.
    #[arg(long, env = "ARXIV_FIGURES_SAMPLE_CHARS", default_value_t = 1000)]
    sample_chars: usize,

    /// How the LaTeX excerpt is chosen: prefix or figures.
    #[arg(long, env = "ARXIV_FIGURES_SAMPLE_STRATEGY", value_enum, default_value = "prefix")]
    sample_strategy: SampleArg,

    /// Source file suffix treated as LaTeX (repeatable).
    #[arg(long = "suffix", env = "ARXIV_FIGURES_SUFFIXES", value_delimiter = ',', default_value = ".tex")]
    suffixes: Vec<String>,

    /// Also write {id}_images.zip after a successful run.
    #[arg(long, env = "ARXIV_FIGURES_BUNDLE")]
    bundle: bool,

    /// Print the stored metadata for this paper instead of extracting.
    #[arg(long)]
    show: bool,

    /// Output the JSON response envelope instead of a summary.
    #[arg(long, env = "ARXIV_FIGURES_JSON")]
    json: bool,

    /// Max LLM output tokens per call.
    #[arg(long, env = "ARXIV_FIGURES_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "ARXIV_FIGURES_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Base URL of the arXiv mirror.
    #[arg(long, env = "ARXIV_FIGURES_BASE_URL", default_value = "https://arxiv.org")]
    base_url: String,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "ARXIV_FIGURES_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "ARXIV_FIGURES_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable progress spinner.
    #[arg(long, env = "ARXIV_FIGURES_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ARXIV_FIGURES_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ARXIV_FIGURES_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SampleArg {
    Prefix,
    Figures,
}

impl From<SampleArg> for SampleStrategy {
    fn from(v: SampleArg) -> Self {
        match v {
            SampleArg::Prefix => SampleStrategy::Prefix,
            SampleArg::Figures => SampleStrategy::Figures,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active; the
    // per-figure lines carry everything the user needs.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.show;
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

    // ── Show mode ────────────────────────────────────────────────────────
    if cli.show {
        let id = PaperId::parse(&cli.paper)?;
        let store = ArtifactStore::new(&cli.output_dir);
        let bundle = store
            .load_metadata(&id)
            .await
            .with_context(|| format!("No stored results for {id}"))?;
        print_bundle(&bundle, cli.json)?;
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let spinner = show_progress.then(CliProgressCallback::new);
    let progress_cb: Option<ProgressCallback> = spinner
        .clone()
        .map(|s| s as Arc<dyn ExtractionProgressCallback>);
    let abandon_spinner = || {
        if let Some(s) = &spinner {
            s.abandon();
        }
    };
    let config = build_config(&cli, progress_cb).inspect_err(|_| abandon_spinner())?;

    // ── Run extraction ───────────────────────────────────────────────────
    let result = extract_figures(&cli.paper, &config).await;
    if result.is_err() {
        abandon_spinner();
    }

    if cli.json {
        let id = PaperId::parse(&cli.paper).ok().map(|id| id.to_string());
        let response = FigureResponse::from_result(id.as_deref(), &result);
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialise response")?
        );
        if result.is_err() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let outcome = result.context("Extraction failed")?;

    if cli.bundle && outcome.status == ExtractionStatus::Success {
        let id = PaperId::parse(&outcome.arxiv_id)?;
        let store = ArtifactStore::new(&config.output_dir);
        let zip_path = store
            .write_image_bundle(&id)
            .await
            .context("Failed to build image bundle")?;
        if !cli.quiet {
            eprintln!("   bundle  →  {}", bold(&zip_path.display().to_string()));
        }
    }

    if !cli.quiet {
        if !show_progress {
            eprintln!("{}", outcome.message);
            for image in &outcome.images {
                eprintln!(
                    "  Figure {:<5} {}  {}",
                    image.figure_number,
                    image.stored_filename,
                    dim(&image.original_path)
                );
            }
        } else if outcome.status.is_warning() {
            eprintln!("{} {}", yellow("⚠"), outcome.message);
        }
        for diagnostic in &outcome.diagnostics {
            eprintln!("  {} {}", yellow("!"), dim(&diagnostic.to_string()));
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out  —  {}ms total  →  {}",
            dim(&outcome.stats.total_input_tokens.to_string()),
            dim(&outcome.stats.total_output_tokens.to_string()),
            outcome.stats.total_duration_ms,
            bold(&config.output_dir.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .output_dir(&cli.output_dir)
        .source_sample_chars(cli.sample_chars)
        .sample_strategy(cli.sample_strategy.into())
        .source_suffixes(cli.suffixes.iter().cloned())
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .arxiv_base_url(&cli.base_url)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_bundle(bundle: &ResultBundle, json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(bundle).context("Failed to serialise metadata")?
        );
        return Ok(());
    }
    println!("Paper:   {}", bundle.arxiv_id);
    println!("Images:  {}", bundle.images.len());
    for image in &bundle.images {
        println!(
            "  Figure {:<5} {}  ({})",
            image.figure_number, image.stored_filename, image.original_path
        );
        println!("    {}", dim(&image.caption));
    }
    Ok(())
}
