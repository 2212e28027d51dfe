use anyhow::Context;
use clap::Parser;
use futures::StreamExt;
use reprow::bootstrap;
use reprow::config::Config;
use reprow::infrastructure::observability;
use reprow::infrastructure::registry::Registry;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::process::ExitCode;

/// Feed jobs from a pull queue to an HTTP worker.
#[derive(Debug, Parser)]
#[command(name = "reprow", version, about)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "REPROW_CONFIG", default_value = "reprow.yaml")]
    config: PathBuf,

    /// Validate the configuration and build the backends, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("reprow: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    // Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let _guard = observability::init(&config.observability)
        .map_err(|e| anyhow::anyhow!("initializing observability: {}", e))?;
    tracing::info!("Configuration loaded from {}", args.config.display());

    let registry = Registry::with_builtin()?;
    let dispatcher = bootstrap::build_dispatcher(&registry, &config)?;

    if args.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    let signals = Signals::new([SIGHUP, SIGINT, SIGTERM, SIGQUIT])
        .context("registering signal handlers")?;
    let handle = signals.handle();

    dispatcher.run(wait_for_signal(signals)).await?;

    handle.close();
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn wait_for_signal(mut signals: Signals) {
    if let Some(signal) = signals.next().await {
        tracing::info!(signal, "Received stop signal, draining jobs");
    }
}
