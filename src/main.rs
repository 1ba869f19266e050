mod channels;
mod classifier;
mod error;
mod fetcher;
mod output;
mod parser;
mod pipeline;
mod reclassify;
mod settings;

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use classifier::Classifier;
use fetcher::HttpFetcher;
use pipeline::Pipeline;
use settings::Settings;

#[derive(Parser)]
#[command(
    name = "channel_scraper",
    about = "Scrape public channel pages and keep the messages that carry proxy configs"
)]
struct Cli {
    /// Settings file (toml, json or yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch every channel, keep config messages, update <outdir>/<channel>.json
    Run {
        /// Channel list, one URL per line
        #[arg(short, long)]
        channels: Option<PathBuf>,
        /// Output directory
        #[arg(short, long)]
        outdir: Option<PathBuf>,
        /// Seconds between fetches
        #[arg(short, long)]
        delay: Option<f64>,
        /// Concurrent fetches (1 = strictly sequential)
        #[arg(short, long)]
        workers: Option<usize>,
    },
    /// Re-run classification over saved JSON arrays
    Reclassify {
        /// Directory of saved arrays (default: the run output directory)
        #[arg(long)]
        indir: Option<PathBuf>,
        /// Where <name>_config.json files go
        #[arg(long, default_value = "configs")]
        outdir: PathBuf,
    },
    /// Classify one message body (reads stdin when TEXT is omitted)
    Classify { text: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();
    let mut settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            channels: channels_file,
            outdir,
            delay,
            workers,
        } => {
            if let Some(c) = channels_file {
                settings.channels_file = c;
            }
            if let Some(o) = outdir {
                settings.out_dir = o;
            }
            if let Some(d) = delay {
                settings.delay_secs = d;
            }
            if let Some(w) = workers {
                settings.workers = w;
            }
            let settings = settings.validated()?;

            let targets = channels::load_channel_list(&settings.channels_file)?;
            let classifier =
                Classifier::new(&settings.classifier).context("Invalid classifier settings")?;
            let fetcher = HttpFetcher::new(&settings.user_agent, settings.timeout())
                .context("Failed to build HTTP client")?;
            std::fs::create_dir_all(&settings.out_dir).with_context(|| {
                format!("Failed to create {}", settings.out_dir.display())
            })?;

            println!(
                "Scraping {} channels into {} ({} worker(s))...",
                targets.len(),
                settings.out_dir.display(),
                settings.workers
            );
            let pipeline = Pipeline::new(
                Arc::new(fetcher),
                classifier,
                settings.out_dir.clone(),
                settings.delay(),
                settings.workers,
            );
            let s = pipeline.run(targets).await;
            println!(
                "Done: {} channels ({} fetch failures), {} messages, {} configs kept.",
                s.channels, s.fetch_failures, s.records, s.retained
            );
            println!(
                "Files: {} written, {} removed, {} failed.",
                s.written, s.removed, s.persistence_failures
            );
        }
        Commands::Reclassify { indir, outdir } => {
            let indir = indir.unwrap_or_else(|| settings.out_dir.clone());
            let classifier =
                Classifier::new(&settings.classifier).context("Invalid classifier settings")?;
            let s = reclassify::run(&indir, &outdir, &classifier)?;
            println!(
                "Reclassified {} files ({} skipped): {} configs, {} written, {} removed.",
                s.files, s.skipped, s.matches, s.written, s.removed
            );
        }
        Commands::Classify { text } => {
            let body = match text {
                Some(t) => t,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("Failed to read stdin")?;
                    buf
                }
            };
            let classifier =
                Classifier::new(&settings.classifier).context("Invalid classifier settings")?;
            match classifier.detect(&body) {
                Some(signal) => println!("config ({})", signal),
                None => println!("not a config"),
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", elapsed_label(elapsed));
    }
    Ok(())
}

/// `12.3s`, `4m 05s` or `1h 02m 03s`.
fn elapsed_label(d: Duration) -> String {
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, total / 60 % 60, total % 60);
    match (h, m) {
        (0, 0) => format!("{:.1}s", d.as_secs_f64()),
        (0, _) => format!("{m}m {s:02}s"),
        _ => format!("{h}h {m:02}m {s:02}s"),
    }
}

// ── Tests ──
