//! CLI binary for edgequake-spool.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `SpoolConfig` and prints the prepared job.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_spool::{
    spool_to_dir, spool_with_cancel, CancelToken, JobArtifacts, PipelineProgressCallback,
    PipelineStats, ProcessCommand, ProgressCallback, SpoolConfig, SpoolError,
};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit status used when the job is interrupted by a signal.
const EXIT_CANCELLED: i32 = 130;

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress: a spinner with the running byte count, plus one log
/// line per finished stage or dropped sink.
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
        bar.set_prefix("Preparing");
        bar.set_message("Opening document…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_pipeline_start(&self, sinks: &[String]) {
        self.bar.set_prefix("Spooling");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Fanning out to {}", sinks.join(", ")))
        ));
    }

    fn on_chunk_distributed(&self, bytes_total: u64) {
        self.bar.set_message(format!("{} read", HumanBytes(bytes_total)));
    }

    fn on_sink_dropped(&self, sink: &str, error: &str) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            yellow("⚠"),
            sink,
            dim(&format!("dropped: {error}"))
        ));
    }

    fn on_stage_complete(&self, stage: &str, elapsed: Duration) {
        self.bar.println(format!(
            "  {} {:<10} {}",
            green("✓"),
            stage,
            dim(&format!("{:.1}s", elapsed.as_secs_f64()))
        ));
        if stage == "distribute" {
            self.bar.set_prefix("Waiting");
            self.bar.set_message("renderer / analyzer…");
        }
    }

    fn on_pipeline_complete(&self, _stats: &PipelineStats) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Prepare a job and write document.gz, preview.bin and job.json
  spool report.ps -o ./job

  # Read from stdin, print the manifest as JSON
  cat report.pdf | spool - --json

  # Fetch over HTTP, skip the preview
  spool https://example.com/flyer.pdf --no-preview -o ./job

  # Custom renderer with a tighter time budget
  spool report.ps --renderer "gs -q -dBATCH -dNOPAUSE -sDEVICE=png16m -r50 -sOutputFile=- -" \
        --render-timeout 60 -o ./job

OUTPUT FILES (with --out-dir):
  document.gz   gzip of the document, byte-for-byte what was read
  preview.bin   preview container (omitted when the renderer could not run)
  job.json      descriptor, attributes, stats and warnings

ENVIRONMENT VARIABLES:
  SPOOL_RENDERER          Renderer command line
  SPOOL_ANALYZER          Analyzer command line
  SPOOL_SEARCH_PATH       PATH used to locate the renderer and analyzer
  RUST_LOG                Override the log filter (e.g. edgequake_spool=debug)

EXIT STATUS:
  0    job prepared (possibly degraded, see warnings)
  1    fatal error (input, read, compression, or output failure)
  130  interrupted
"#;

/// Prepare a document for a remote print service in a single pass.
#[derive(Parser, Debug)]
#[command(
    name = "spool",
    version,
    about = "Compress, preview and ink-analyze a print document in one pass",
    long_about = "Read a document once (file, stdin, or URL) and fan it out to a gzip \
compressor, a preview renderer, and an ink coverage analyzer. Renderer and analyzer \
failures degrade the job instead of failing it.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path, `-` for stdin, or HTTP/HTTPS URL.
    input: String,

    /// Write the job artifacts into this directory.
    #[arg(short, long, env = "SPOOL_OUT_DIR")]
    out_dir: Option<PathBuf>,

    /// Print the job manifest as JSON on stdout.
    #[arg(long, env = "SPOOL_JSON")]
    json: bool,

    /// Renderer command line (program and arguments, whitespace separated).
    #[arg(long, env = "SPOOL_RENDERER")]
    renderer: Option<String>,

    /// Analyzer command line (program and arguments, whitespace separated).
    #[arg(long, env = "SPOOL_ANALYZER")]
    analyzer: Option<String>,

    /// Do not start the renderer; no preview is produced.
    #[arg(long, env = "SPOOL_NO_PREVIEW")]
    no_preview: bool,

    /// Do not start the analyzer; the job is described as one grayscale page.
    #[arg(long, env = "SPOOL_NO_INK")]
    no_ink: bool,

    /// Renderer time budget in seconds, counted after the document is fed.
    #[arg(long, env = "SPOOL_RENDER_TIMEOUT", default_value_t = 300)]
    render_timeout: u64,

    /// Analyzer time budget in seconds, counted after the document is fed.
    #[arg(long, env = "SPOOL_ANALYZE_TIMEOUT", default_value_t = 120)]
    analyze_timeout: u64,

    /// PATH used to locate the renderer and analyzer.
    #[arg(long, env = "SPOOL_SEARCH_PATH")]
    search_path: Option<String>,

    /// gzip level (0–9).
    #[arg(long, env = "SPOOL_COMPRESSION_LEVEL", default_value_t = 6,
          value_parser = clap::value_parser!(u32).range(0..=9))]
    compression_level: u32,

    /// Read size in bytes for the fan-out loop.
    #[arg(long, env = "SPOOL_CHUNK_SIZE", default_value_t = 65536)]
    chunk_size: usize,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SPOOL_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the progress spinner.
    #[arg(long, env = "SPOOL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SPOOL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SPOOL_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO-level library logs; warnings still show.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Signals ──────────────────────────────────────────────────────────
    let cancel = CancelToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    // ── Run pipeline ─────────────────────────────────────────────────────
    let result = match cli.out_dir {
        Some(ref dir) => spool_to_dir(&cli.input, dir, &config, &cancel).await,
        None => spool_with_cancel(&cli.input, &config, &cancel).await,
    };

    let job = match result {
        Ok(job) => job,
        Err(SpoolError::Cancelled) => {
            if let Some(cb) = &config.progress_callback {
                cb.on_pipeline_complete(&PipelineStats::default());
            }
            eprintln!("{} {}", red("✘"), bold("Interrupted"));
            std::process::exit(EXIT_CANCELLED);
        }
        Err(e) => return Err(e).context("Job preparation failed"),
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&job.manifest())
            .context("Failed to serialise manifest")?;
        println!("{json}");
    }

    if !cli.quiet && !cli.json {
        print_summary(&job, cli.out_dir.as_ref());
    }

    Ok(())
}

/// Map CLI args to `SpoolConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SpoolConfig> {
    let mut builder = SpoolConfig::builder()
        .chunk_size(cli.chunk_size)
        .compression_level(cli.compression_level)
        .render_timeout_secs(cli.render_timeout)
        .analyze_timeout_secs(cli.analyze_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref line) = cli.renderer {
        builder = builder.renderer(ProcessCommand::parse(line).context("Invalid --renderer")?);
    }
    if let Some(ref line) = cli.analyzer {
        builder = builder.analyzer(ProcessCommand::parse(line).context("Invalid --analyzer")?);
    }
    if cli.no_preview {
        builder = builder.disable_preview();
    }
    if cli.no_ink {
        builder = builder.disable_ink_analysis();
    }
    if let Some(ref path) = cli.search_path {
        builder = builder.search_path(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Resolve once Ctrl-C (or SIGTERM on Unix) arrives, then cancel the job.
async fn cancel_on_signal(cancel: CancelToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::warn!("Signal received, cancelling job");
    cancel.cancel();
}

fn print_summary(job: &JobArtifacts, out_dir: Option<&PathBuf>) {
    let d = &job.descriptor;
    let s = &job.stats;

    eprintln!(
        "{}  {} page(s)  {} color / {} gray  map {}",
        if job.is_degraded() {
            yellow("⚠")
        } else {
            green("✔")
        },
        bold(&d.total_pages.to_string()),
        d.color_pages,
        d.grayscale_pages,
        cyan(&d.color_map),
    );
    eprintln!(
        "   {} read  →  {} gzip  {}",
        dim(&HumanBytes(s.bytes_read).to_string()),
        dim(&HumanBytes(s.compressed_bytes as u64).to_string()),
        dim(&format!("{}ms total", s.total_ms)),
    );
    match (s.preview_pages, s.preview_bytes) {
        (Some(pages), Some(bytes)) => eprintln!(
            "   preview: {} page(s), {}",
            pages,
            dim(&HumanBytes(bytes as u64).to_string())
        ),
        _ => eprintln!("   preview: {}", dim("none")),
    }
    for w in &job.warnings {
        eprintln!("   {} {}", yellow("warning:"), w);
    }
    if let Some(dir) = out_dir {
        eprintln!("   →  {}", bold(&dir.display().to_string()));
    }
}
