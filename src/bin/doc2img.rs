//! CLI binary for edgequake-doc2img.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ConversionConfig` and either converts one file or runs the HTTP service.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_doc2img::output::archive_name;
use edgequake_doc2img::{
    convert_to_file, ConversionConfig, ConversionProgressCallback, ImageFormat, ProgressCallback,
    Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
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

/// Terminal progress: one spinner that names the running stage and a log
/// line per finished stage.
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
        bar.set_message("Creating workspace…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, file_name: &str) {
        self.bar.set_prefix("Converting");
        self.bar.set_message(file_name.to_string());
    }

    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_message(stage.describe().to_string());
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<24}  {}",
            green("✓"),
            stage.describe(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_conversion_complete(&self, page_count: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages rendered",
            green("✔"),
            bold(&page_count.to_string())
        );
    }

    fn on_conversion_failed(&self, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a document; writes report_images.zip next to it
  doc2img convert report.docx

  # Choose the output path and a higher resolution
  doc2img convert slides.odp -o out/slides.zip --dpi 200

  # JPEG pages, machine-readable summary on stdout
  doc2img convert memo.rtf --format jpeg --json

  # Run the HTTP service
  doc2img serve --listen 127.0.0.1:8000
  curl -F file=@report.docx http://127.0.0.1:8000/convert -o report_images.zip

REQUIREMENTS:
  libreoffice (or soffice) and pdftoppm (poppler-utils) on PATH, or point
  --office-binary / --rasterizer-binary at them.

ENVIRONMENT VARIABLES:
  DOC2IMG_OFFICE_BINARY      Office-suite executable (default: libreoffice)
  DOC2IMG_RASTERIZER_BINARY  Rasteriser executable (default: pdftoppm)
  DOC2IMG_SCRATCH_DIR        Parent directory for request workspaces
  DOC2IMG_TIMEOUT            Per-stage timeout in seconds (default: 300)
  DOC2IMG_NO_TIMEOUT         Disable the per-stage timeout (wins over DOC2IMG_TIMEOUT)
  DOC2IMG_LISTEN             Bind address for `serve`
  RUST_LOG                   Override the log filter (e.g. edgequake_doc2img=debug)
"#;

/// Convert office documents into a zip of page images.
#[derive(Parser, Debug)]
#[command(
    name = "doc2img",
    version,
    about = "Convert office documents into a zip of page images",
    long_about = "Convert office documents (DOCX, ODT, RTF, PPTX, …) into a zip archive with one \
image per page. LibreOffice renders the document to PDF, pdftoppm rasterises each page.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOC2IMG_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOC2IMG_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one document to a page-image archive.
    Convert(ConvertArgs),
    /// Serve `POST /convert` over HTTP.
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Document to convert.
    input: PathBuf,

    /// Archive path. Default: `<stem>_images.zip` in the current directory.
    #[arg(short, long, env = "DOC2IMG_OUTPUT")]
    output: Option<PathBuf>,

    /// Print a JSON summary (ConversionStats) on stdout.
    #[arg(long, env = "DOC2IMG_JSON")]
    json: bool,

    /// Disable progress spinner.
    #[arg(long, env = "DOC2IMG_NO_PROGRESS")]
    no_progress: bool,

    #[command(flatten)]
    conversion: ConversionArgs,
}

#[cfg(feature = "server")]
#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "DOC2IMG_LISTEN", default_value = "0.0.0.0:8000")]
    listen: std::net::SocketAddr,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "DOC2IMG_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    #[command(flatten)]
    conversion: ConversionArgs,
}

/// Flags shared by `convert` and `serve`.
#[derive(Args, Debug)]
struct ConversionArgs {
    /// Office-suite executable used for stage 1.
    #[arg(long, env = "DOC2IMG_OFFICE_BINARY", default_value = "libreoffice")]
    office_binary: String,

    /// PDF rasteriser executable used for stage 2.
    #[arg(long, env = "DOC2IMG_RASTERIZER_BINARY", default_value = "pdftoppm")]
    rasterizer_binary: String,

    /// Parent directory for per-request workspaces. Default: system temp dir.
    #[arg(long, env = "DOC2IMG_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,

    /// Page image format.
    #[arg(long, env = "DOC2IMG_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// Rendering DPI (36–600). Default: the rasteriser's own default.
    #[arg(long, env = "DOC2IMG_DPI",
          value_parser = clap::value_parser!(u32).range(36..=600))]
    dpi: Option<u32>,

    /// Per-stage timeout in seconds.
    #[arg(long, env = "DOC2IMG_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Let converters run without a time limit. Overrides --timeout and
    /// DOC2IMG_TIMEOUT.
    #[arg(long, env = "DOC2IMG_NO_TIMEOUT")]
    no_timeout: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum FormatArg {
    Png,
    Jpeg,
    Tiff,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Jpeg => ImageFormat::Jpeg,
            FormatArg::Tiff => ImageFormat::Tiff,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback a one-shot conversion needs, so
    // library INFO logs are only shown when it is off or when serving.
    let show_progress = match &cli.command {
        Command::Convert(args) => !cli.quiet && !args.no_progress && !args.json,
        #[cfg(feature = "server")]
        Command::Serve(_) => false,
    };
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
        Command::Convert(args) => run_convert(args, show_progress, cli.quiet).await,
        #[cfg(feature = "server")]
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_convert(args: ConvertArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&args.conversion, progress_cb)?;

    let output_path = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));

    let stats = convert_to_file(&args.input, &output_path, &config)
        .await
        .with_context(|| format!("Conversion of {} failed", args.input.display()))?;

    if args.json {
        let summary = serde_json::json!({
            "input": args.input,
            "output": output_path,
            "stats": stats,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !quiet {
        eprintln!(
            "{}  {} pages  {}ms  {}  →  {}",
            green("✔"),
            stats.page_count,
            stats.total_duration_ms,
            dim(&format!("{} bytes", stats.archive_bytes)),
            bold(&output_path.display().to_string()),
        );
    }

    Ok(())
}

#[cfg(feature = "server")]
async fn run_serve(args: ServeArgs) -> Result<()> {
    use edgequake_doc2img::server::{self, ServerConfig};

    let config = build_config(&args.conversion, None)?;
    let server_config = ServerConfig {
        listen: args.listen,
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
    };
    server::serve(server_config, config)
        .await
        .with_context(|| format!("Server on {} failed", args.listen))
}

/// Map CLI args to `ConversionConfig`.
fn build_config(args: &ConversionArgs, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .office_binary(args.office_binary.clone())
        .rasterizer_binary(args.rasterizer_binary.clone())
        .image_format(args.format.clone().into());

    if let Some(ref dir) = args.scratch_dir {
        builder = builder.scratch_dir(dir.clone());
    }
    if let Some(dpi) = args.dpi {
        builder = builder.dpi(dpi);
    }
    builder = if args.no_timeout {
        builder.no_stage_timeout()
    } else {
        builder.stage_timeout_secs(args.timeout)
    };
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// `<stem>_images.zip` in the current directory.
fn default_output(input: &Path) -> PathBuf {
    PathBuf::from(archive_name(input))
}
