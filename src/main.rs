use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use sirfit::data::Compartment;
use sirfit::sweep::{self, SweepConfig};

/// Compartment of the simulated SIR model to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TargetVar {
    S,
    I,
    R,
}

impl From<TargetVar> for Compartment {
    fn from(target: TargetVar) -> Self {
        match target {
            TargetVar::S => Compartment::S,
            TargetVar::I => Compartment::I,
            TargetVar::R => Compartment::R,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "sir_demo",
    version,
    about = "Fit symbolic expressions to simulated SIR dynamics"
)]
struct Cli {
    /// Target data to be fitted
    #[arg(long = "target_var", value_enum, default_value = "s")]
    target_var: TargetVar,

    /// JSON file overriding the default hyperparameters
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory the results CSV is written to (must exist)
    #[arg(long, default_value = "results")]
    results_dir: PathBuf,

    /// Seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Verbose mode (debug logging)
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only, no progress bar)
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() {
    if let Err(error) = run() {
        eprintln!("sir_demo error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let mut config = match &cli.config {
        Some(path) => SweepConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SweepConfig::default(),
    };
    if cli.seed.is_some() {
        config.training.seed = cli.seed;
    }
    config.training.progress = !cli.quiet;

    let (log, records) = sweep::run(&config, cli.target_var.into(), &cli.results_dir)?;
    tracing::info!(
        "Wrote {} result rows to {}",
        records.len(),
        log.path().display()
    );
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("SIRFIT_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
