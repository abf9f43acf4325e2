//! CLI binary for resume-review.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ReviewConfig` and prints results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use resume_review::{
    convert_to_file, format_file_size, AnalyzeRequest, ConversionPipeline, ConversionStage,
    LibraryLoader, PreviewRegistry, ProgressCallback, ReviewConfig, ReviewError,
    ReviewProgressCallback, ReviewService, SourceDocument, StaticAuth,
};
use serde_json::{json, Value};
use std::io;
use std::path::{Path, PathBuf};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner whose message follows the orchestrator's status line.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Working");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ReviewProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: ConversionStage) {
        let prefix = match stage {
            ConversionStage::Idle => "Idle",
            ConversionStage::LoadingLibrary => "PDF engine",
            ConversionStage::Decoding => "Decoding",
            ConversionStage::Rendering => "Rendering",
            ConversionStage::Encoding => "Encoding",
            ConversionStage::Done => "Converted",
            ConversionStage::Failed => "Failed",
        };
        self.bar.set_prefix(prefix);
    }

    fn on_status(&self, status: &str) {
        if status.starts_with("Error:") {
            self.bar.abandon_with_message(red(status));
        } else {
            self.bar.set_message(status.to_string());
        }
    }

    fn on_complete(&self, record_id: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} analysed {}", green("✔"), bold(record_id));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Render page 1 of a résumé to PNG
  resume-review convert cv.pdf -o cv.png

  # Analyse against a job posting
  resume-review analyze cv.pdf --company Acme --job-title "Backend Engineer" \
      --job-description "Rust, Postgres, Kubernetes"

  # List stored reviews, then show one
  resume-review list
  resume-review show 4f7c2c1e-…

  # Check the PDF engine (downloads it on first use)
  resume-review inspect-library

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY           OpenAI API key
  ANTHROPIC_API_KEY        Anthropic API key
  EDGEQUAKE_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL          Override model ID
  RESUME_REVIEW_DATA_DIR   Where uploads and records are kept
  RESUME_REVIEW_TOKEN      Access token when --require-auth is set
  PDFIUM_LIB_PATH          Path to an existing libpdfium; skips the download
  PDFIUM_FETCH_CACHE_DIR   Override the pdfium cache directory
"#;

/// Review résumés: render, store and analyse them with a vision LLM.
#[derive(Parser, Debug)]
#[command(
    name = "resume-review",
    version,
    about = "Render résumé PDFs and collect ATS feedback from a vision LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding uploaded files and the record store.
    #[arg(long, global = true, env = "RESUME_REVIEW_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Render scale (0.5–8.0). 4 turns a Letter page into 2448×3168 px.
    #[arg(long, global = true, env = "RESUME_REVIEW_SCALE", default_value_t = 4.0)]
    scale: f32,

    /// Refuse pages whose raster would exceed this many pixels.
    #[arg(long, global = true, env = "RESUME_REVIEW_MAX_PIXELS", default_value_t = 40_000_000)]
    max_pixels: u64,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, global = true, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Max LLM output tokens.
    #[arg(long, global = true, env = "RESUME_REVIEW_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "RESUME_REVIEW_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "RESUME_REVIEW_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// LLM call timeout in seconds.
    #[arg(long, global = true, env = "RESUME_REVIEW_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Refuse to run unless RESUME_REVIEW_TOKEN is set.
    #[arg(long, global = true, env = "RESUME_REVIEW_REQUIRE_AUTH")]
    require_auth: bool,

    /// Print JSON instead of text.
    #[arg(long, global = true, env = "RESUME_REVIEW_JSON")]
    json: bool,

    /// Disable the spinner.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one page of a PDF to PNG.
    Convert {
        /// Local PDF path or HTTP/HTTPS URL.
        input: String,
        /// Output file. Default: input name with `.png`.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// 1-indexed page to render.
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Upload, convert and analyse a résumé.
    Analyze {
        /// Local file path or HTTP/HTTPS URL.
        input: String,
        #[arg(long)]
        company: String,
        #[arg(long)]
        job_title: String,
        #[arg(long)]
        job_description: String,
    },
    /// List stored reviews.
    List,
    /// Show one stored review.
    Show {
        id: String,
        /// Also write the stored résumé and page image into this directory.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Load the PDF engine and report where it came from.
    InspectLibrary,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<Arc<CliProgressCallback>> = show_progress.then(CliProgressCallback::new);
    let config = build_config(&cli, progress.clone().map(|cb| cb as ProgressCallback))?;

    let outcome = match cli.command {
        Command::Convert {
            ref input,
            ref output,
            page,
        } => run_convert(&cli, config, input, output.as_deref(), page).await,
        Command::Analyze {
            ref input,
            ref company,
            ref job_title,
            ref job_description,
        } => {
            let service = open_service(&cli, config, true).await?;
            let file = SourceDocument::from_input(input, cli.download_timeout)
                .await
                .context("Failed to read input")?;
            let request = AnalyzeRequest {
                company_name: company.clone(),
                job_title: job_title.clone(),
                job_description: job_description.clone(),
                file,
            };
            run_analyze(&cli, &service, request).await
        }
        Command::List => {
            let service = open_service(&cli, config, false).await?;
            run_list(&cli, &service).await
        }
        Command::Show { ref id, ref export } => {
            let service = open_service(&cli, config, false).await?;
            run_show(&cli, &service, id, export.as_deref()).await
        }
        Command::InspectLibrary => run_inspect(&cli).await,
    };

    if let Some(cb) = progress {
        cb.bar.finish_and_clear();
    }
    outcome
}

/// Map CLI args to `ReviewConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ReviewConfig> {
    let mut builder = ReviewConfig::builder()
        .scale(cli.scale)
        .max_pixels(cli.max_pixels)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref dir) = cli.data_dir {
        builder = builder.data_dir(dir);
    }
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

async fn open_service(cli: &Cli, config: ReviewConfig, with_model: bool) -> Result<ReviewService> {
    let service = if with_model {
        ReviewService::local(config).await
    } else {
        ReviewService::local_read_only(config).await
    }
    .context("Failed to open review storage")?;

    Ok(if cli.require_auth {
        service.with_auth(Arc::new(StaticAuth::from_env()))
    } else {
        service
    })
}

/// Turn an auth failure into a sign-in hint.
fn explain(e: ReviewError) -> anyhow::Error {
    match e {
        ReviewError::NotAuthenticated { next } => anyhow::anyhow!(
            "Sign-in required: set RESUME_REVIEW_TOKEN and rerun (continue at {next})"
        ),
        other => anyhow::Error::new(other),
    }
}

async fn run_convert(
    cli: &Cli,
    config: ReviewConfig,
    input: &str,
    output: Option<&Path>,
    page: usize,
) -> Result<()> {
    let doc = SourceDocument::from_input(input, cli.download_timeout)
        .await
        .context("Failed to read input")?;

    let loader = Arc::new(LibraryLoader::pdfium(Duration::from_secs(cli.download_timeout)));
    let pipeline =
        ConversionPipeline::from_config(&config, loader, PreviewRegistry::new()).with_page(page);

    let output_path = match output {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(resume_review::pipeline::encode::output_name(&doc.name)),
    };

    let artifact = convert_to_file(&pipeline, &doc, &output_path)
        .await
        .context("Conversion failed")?;

    if cli.json {
        let report = json!({
            "output": output_path.display().to_string(),
            "name": artifact.name,
            "type": artifact.media_type,
            "width": artifact.width,
            "height": artifact.height,
            "size": artifact.size(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !cli.quiet {
        eprintln!(
            "{}  {}x{} px  {}  →  {}",
            green("✔"),
            artifact.width,
            artifact.height,
            dim(&format_file_size(artifact.size())),
            bold(&output_path.display().to_string()),
        );
    }
    Ok(())
}

async fn run_analyze(cli: &Cli, service: &ReviewService, request: AnalyzeRequest) -> Result<()> {
    let record = service.analyze(request).await.map_err(explain)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("Record:   {}", record.id);
        println!("Company:  {}", record.company_name);
        println!("Job:      {}", record.job_title);
        print_feedback(record.feedback.as_object());
    }
    Ok(())
}

async fn run_list(cli: &Cli, service: &ReviewService) -> Result<()> {
    let records = service.list_records().await.map_err(explain)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No resumes found. Run `resume-review analyze` to add one.");
        return Ok(());
    }
    for record in &records {
        let score = record
            .feedback
            .overall_score()
            .map(|s| format!("{s:>3}/100"))
            .unwrap_or_else(|| dim("pending"));
        println!(
            "{}  {}  {} — {}",
            record.id,
            score,
            bold(&record.company_name),
            record.job_title
        );
    }
    Ok(())
}

async fn run_show(cli: &Cli, service: &ReviewService, id: &str, export: Option<&Path>) -> Result<()> {
    let view = service.open_record(id).await.map_err(explain)?;

    let result = async {
        if let Some(dir) = export {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            for (url, name) in [
                (&view.resume_url, "resume.pdf"),
                (&view.image_url, "resume.png"),
            ] {
                if let Some(payload) = service.previews().resolve(url) {
                    let path = dir.join(name);
                    tokio::fs::write(&path, &payload.bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                }
            }
        }

        if cli.json {
            let value = json!({
                "record": view.record,
                "resumeUrl": view.resume_url,
                "imageUrl": view.image_url,
                "feedback": view.feedback,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("Record:   {}", view.record.id);
            println!("Company:  {}", view.record.company_name);
            println!("Job:      {}", view.record.job_title);
            print_feedback(view.feedback.as_ref());
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    service.close_record(&view);
    result
}

async fn run_inspect(cli: &Cli) -> Result<()> {
    // What is on disk before any download happens.
    let found = pdfium_fetch::locate();
    let loader = LibraryLoader::pdfium(Duration::from_secs(cli.download_timeout));
    let handle = loader
        .ensure_ready()
        .await
        .context("Failed to load the PDF engine")?;

    let cache = pdfium_fetch::cache_dir();
    if cli.json {
        let value = json!({
            "engine": handle.describe(),
            "pinnedVersion": pdfium_fetch::PDFIUM_VERSION,
            "cacheDir": cache.display().to_string(),
            "libPathOverride": std::env::var("PDFIUM_LIB_PATH").ok(),
            "foundBeforeLoad": found.as_ref().map(|loc| json!({
                "path": loc.path.display().to_string(),
                "source": format!("{:?}", loc.source),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("Engine:       {}", handle.describe());
        println!("Pinned:       pdfium {}", pdfium_fetch::PDFIUM_VERSION);
        println!("Cache:        {}", cache.display());
        match found {
            Some(loc) => println!("Found:        {} ({:?})", loc.path.display(), loc.source),
            None => println!("Found:        {}", dim("nothing on disk; downloaded during this run")),
        }
    }
    Ok(())
}

fn print_feedback(feedback: Option<&serde_json::Map<String, Value>>) {
    let Some(fb) = feedback else {
        println!("Feedback: {}", dim("pending"));
        return;
    };
    if let Some(score) = fb.get("overallScore") {
        println!("Score:    {}", bold(&format!("{score}/100")));
    }
    for section in ["ATS", "toneAndStyle", "content", "structure", "skills"] {
        let Some(obj) = fb.get(section) else { continue };
        let score = obj.get("score").map(|s| s.to_string()).unwrap_or_default();
        println!("  {:<14} {}", section, score);
        if let Some(tips) = obj.get("tips").and_then(Value::as_array) {
            for tip in tips {
                let text = tip.get("tip").and_then(Value::as_str).unwrap_or_default();
                let marker = match tip.get("type").and_then(Value::as_str) {
                    Some("good") => green("✓"),
                    _ => red("•"),
                };
                println!("    {marker} {text}");
            }
        }
    }
}
