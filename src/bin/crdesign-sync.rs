//! CLI binary for crdesign-sync.
//!
//! `serve` runs the HTTP service; `process` runs the pipeline once for a
//! single link and prints the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crdesign_sync::{
    process_bundle, AppState, BundleRequest, CallerId, Collaborators, CompressionReport, SvgExport,
    SyncConfig, SyncOutput, SyncProgressCallback, SyncStage, ToolReencoder,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::net::{IpAddr, SocketAddr};
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
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner with the current stage, plus one line per compressed asset.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }
}

impl SyncProgressCallback for CliProgressCallback {
    fn on_stage(&self, folder: &str, stage: SyncStage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message(folder.to_string());
    }

    fn on_asset_compressed(&self, _folder: &str, report: &CompressionReport) {
        let mark = if report.error.is_some() {
            red("✗")
        } else if report.within_budget {
            green("✓")
        } else {
            red("⚠")
        };
        self.bar.println(format!(
            "  {} {:<40} {:>6} KB → {:>6} KB  {}",
            mark,
            report.path.display(),
            report.original_bytes / 1024,
            report.final_bytes / 1024,
            dim(&format!("{} attempt(s)", report.attempts.len())),
        ));
    }

    fn on_complete(&self, output: &SyncOutput) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {}  {}ms  →  {}",
            green("✔"),
            bold(&output.folder_name),
            output.stats.total_ms,
            bold(&output.zip_path.display().to_string()),
        );
    }

    fn on_failed(&self, folder: &str, error: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}  {}", red("✘"), bold(folder), red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the service on the default port (4300)
  crdesign-sync serve

  # Process one design and print the published paths
  crdesign-sync process https://design.instrasoftsolutions.in/cards/design-p.jpg --img-no 1234

  # Keep everything under /srv/crdesign
  crdesign-sync --data-root /srv/crdesign serve --port 8080

ENVIRONMENT VARIABLES:
  PORT                        Port for `serve`
  CRDESIGN_DATA_ROOT          Root for downloads/, processed/ and output/
  CRDESIGN_CANONICAL_HOST     Host bundles are fetched from
  CRDESIGN_BUDGET_KB          Per-asset size budget in KiB
  CRDESIGN_SVGEXPORT          SVG → PNG converter program
  CRDESIGN_PNGQUANT           PNG quantiser program
  RUST_LOG                    Overrides --verbose / --quiet

REQUIREMENTS:
  svgexport and pngquant must be on PATH (or given explicitly).
"#;

/// Download CRDesign bundles, rework them, and serve the results.
#[derive(Parser, Debug)]
#[command(
    name = "crdesign-sync",
    version,
    about = "Download CRDesign bundles, rework them, and serve the repackaged archives",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Root directory for downloads, processed folders and output.
    #[arg(long, global = true, env = "CRDESIGN_DATA_ROOT", default_value = "downloads")]
    data_root: PathBuf,

    /// Host bundles are fetched from.
    #[arg(long, global = true, env = "CRDESIGN_CANONICAL_HOST")]
    canonical_host: Option<String>,

    /// Per-asset size budget in KiB.
    #[arg(long, global = true, env = "CRDESIGN_BUDGET_KB", default_value_t = 150,
          value_parser = clap::value_parser!(u64).range(1..))]
    budget_kb: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, global = true, env = "CRDESIGN_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// SVG → PNG converter program.
    #[arg(long, global = true, env = "CRDESIGN_SVGEXPORT", default_value = "svgexport")]
    svgexport: String,

    /// PNG quantiser program.
    #[arg(long, global = true, env = "CRDESIGN_PNGQUANT", default_value = "pngquant")]
    pngquant: String,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "CRDESIGN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "CRDESIGN_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to bind.
        #[arg(long, env = "CRDESIGN_HOST", default_value = "0.0.0.0")]
        host: IpAddr,

        /// Port to listen on.
        #[arg(short, long, env = "PORT", default_value_t = 4300)]
        port: u16,
    },
    /// Process a single link and print the result.
    Process {
        /// Catalog link to the design.
        link: String,

        /// Caller identifier used for the folder name.
        #[arg(long)]
        id: Option<String>,

        /// Catalog image number; preferred over --id.
        #[arg(long)]
        img_no: Option<u64>,

        /// Print the full result (including compression reports) as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // `process` shows a spinner; keep library logs to errors unless asked.
    let interactive = matches!(cli.command, Command::Process { json: false, .. });
    let filter = if cli.common.verbose {
        "debug"
    } else if cli.common.quiet || interactive {
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

    let config = build_config(&cli.common)?;
    config
        .ensure_dirs()
        .await
        .context("Failed to create data directories")?;

    let rasterizer = SvgExport::new(&config.rasterizer_program);
    let reencoder = ToolReencoder::new(&config.pngquant_program);

    match cli.command {
        Command::Serve { host, port } => {
            let state = AppState::new(config, Arc::new(rasterizer), Arc::new(reencoder));
            crdesign_sync::serve(SocketAddr::new(host, port), state)
                .await
                .context("Server failed")?;
        }
        Command::Process {
            link,
            id,
            img_no,
            json,
        } => {
            let request = BundleRequest {
                link: Some(link),
                id: id.map(CallerId::Text),
                img_no,
            };
            let show_progress = !cli.common.quiet && !json;
            let noop = crdesign_sync::NoopProgressCallback;
            let cli_progress = show_progress.then(CliProgressCallback::new);
            let progress: &dyn SyncProgressCallback = match &cli_progress {
                Some(cb) => cb,
                None => &noop,
            };

            let with = Collaborators {
                rasterizer: &rasterizer,
                reencoder: &reencoder,
                progress,
            };
            let output = process_bundle(&request, &config, with)
                .await
                .context("Sync failed")?;

            if json {
                let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
                println!("{json}");
            } else {
                println!("{}", output.zip_path.display());
                if let Some(preview) = &output.preview_path {
                    println!("{}", preview.display());
                }
                if !cli.common.quiet && output.stats.oversize_assets > 0 {
                    eprintln!(
                        "   {} asset(s) still above {} KB",
                        red(&output.stats.oversize_assets.to_string()),
                        cli.common.budget_kb
                    );
                }
            }
        }
    }

    Ok(())
}

/// Map CLI args to `SyncConfig`.
fn build_config(args: &CommonArgs) -> Result<SyncConfig> {
    let mut builder = SyncConfig::builder()
        .data_root(&args.data_root)
        .asset_budget_bytes(args.budget_kb * 1024)
        .download_timeout_secs(args.download_timeout)
        .rasterizer_program(&args.svgexport)
        .pngquant_program(&args.pngquant);
    if let Some(host) = &args.canonical_host {
        builder = builder.canonical_host(host);
    }
    builder.build().context("Invalid configuration")
}
