use clap::Parser;
use cleaners_config::{CleanersConfig, ConfigLoader, ConfigSource};
use cleaners_registry::CleanupRegistry;
use std::path::PathBuf;
use std::time::Duration;

mod commands;

use commands::{Commands, Context};

#[derive(Parser)]
#[command(name = "cleaners")]
#[command(about = "Replay cleanup scenarios for counted resources and worker pools", long_about = None)]
#[command(version)]
struct Cli {
    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Worker threads per pool
    #[arg(long)]
    threads: Option<usize>,

    /// How long a pool shutdown waits for running tasks
    #[arg(long, value_name = "MS")]
    drain_timeout_ms: Option<u64>,

    /// Tasks submitted to each pool [default: one per pool worker]
    #[arg(long)]
    tasks: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl Cli {
    fn load_config(&self) -> cleaners_core::Result<CleanersConfig> {
        let mut loader = ConfigLoader::new().with_env();
        if let Some(path) = &self.config {
            loader = loader.with_file(path);
        }
        let mut config = loader.load()?;

        if let Some(threads) = self.threads {
            config.pool.threads = Some(threads);
            config.source = ConfigSource::CommandLine;
        }
        if let Some(ms) = self.drain_timeout_ms {
            config.pool.drain_timeout_ms = ms;
            config.source = ConfigSource::CommandLine;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    cleaners_utils::tracing::init()
        .map_err(|e| eyre::eyre!("failed to initialise logging: {e}"))?;

    let config = cli.load_config()?;
    tracing::debug!(?config, "using configuration");

    let context = Context {
        registry: CleanupRegistry::with_config(&config.registry),
        tasks: cli.tasks.unwrap_or_else(|| config.pool.worker_count()),
        config,
    };

    cli.command.unwrap_or(Commands::All).execute(&context)?;

    // Abandoned owners are released by the watcher; let it finish before exiting
    let grace = context.config.pool.drain_timeout() + Duration::from_secs(1);
    if !context.registry.await_reclaimed(grace) {
        tracing::warn!(
            pending = context.registry.pending(),
            "exiting with unreleased resources"
        );
    }

    let stats = context.registry.stats();
    println!(
        "registered {}, released {} explicitly and {} in the background, {} failed",
        stats.registered, stats.explicit_releases, stats.background_releases, stats.failures
    );
    Ok(())
}
