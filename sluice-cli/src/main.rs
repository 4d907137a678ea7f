use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::info;

mod drain;
mod duration;
mod settings;

use drain::Drain;
use settings::{BatchMode, Disposition, Order, Overrides, Settings};

#[derive(Parser, Debug)]
#[command(name = "sluice")]
#[command(about = "Drain a directory one file at a time")]
struct Args {
    /// Path to a TOML config file (SLUICE_* environment variables also apply)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory to take files from
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory handled files are moved to (with --disposition archive)
    #[arg(short, long)]
    archive: Option<PathBuf>,

    /// What to do with a file once handled
    #[arg(long, value_enum)]
    disposition: Option<Disposition>,

    /// File selection order
    #[arg(long, value_enum)]
    order: Option<Order>,

    /// Pause after an idle poll (e.g., "5s", "250ms"; "0s" disables)
    #[arg(long)]
    backoff: Option<String>,

    /// How often the pipeline is polled (e.g., "1s")
    #[arg(long)]
    poll_interval: Option<String>,

    /// Suspend polling while this file exists
    #[arg(long)]
    pause_file: Option<PathBuf>,

    /// Program and arguments to run per file, after `--`; the file path is
    /// appended as last argument
    #[arg(last = true, value_name = "COMMAND")]
    command: Vec<String>,

    /// How the end-of-batch summary runs
    #[arg(long, value_enum)]
    batch_action: Option<BatchMode>,

    /// Drain until idle once, then exit
    #[arg(long)]
    once: bool,

    /// Print the source state as JSON and exit
    #[arg(long, conflicts_with = "once")]
    status: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            input_dir: self.input.clone(),
            archive_dir: self.archive.clone(),
            order: self.order,
            backoff: self.backoff.clone(),
            poll_interval: self.poll_interval.clone(),
            pause_file: self.pause_file.clone(),
            disposition: self.disposition,
            command: (!self.command.is_empty()).then(|| self.command.clone()),
            batch_action: self.batch_action,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref())?.apply(args.overrides());
    let drain = Arc::new(Drain::new(&settings)?);

    if args.status {
        let json = serde_json::to_string_pretty(&drain.state())?;
        println!("{}", json);
        return Ok(());
    }

    run(drain, &settings, args.once).await
}

/// Drain on every tick until interrupted, or after the first tick with `once`.
async fn run(drain: Arc<Drain>, settings: &Settings, once: bool) -> Result<()> {
    let mut ticker = tokio::time::interval(settings.poll_interval()?);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("interrupted, stopping");
                break;
            }
            _ = ticker.tick() => {
                let worker = Arc::clone(&drain);
                let mut job = tokio::task::spawn_blocking(move || worker.run_until_idle());
                let taken = tokio::select! {
                    taken = &mut job => taken.context("Drain worker failed")?,
                    _ = &mut shutdown => {
                        info!("interrupted, finishing the current file");
                        drain.stop();
                        job.await.context("Drain worker failed")?;
                        break;
                    }
                };
                if taken > 0 {
                    info!(files = taken, "drained");
                }
                if once {
                    break;
                }
            }
        }
    }

    let stats = drain.stats();
    info!(
        handled = stats.handled,
        failed = stats.failed,
        batches = stats.batches,
        "stopped"
    );
    Ok(())
}
