use std::path::PathBuf;

use _model::Stage;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::config::MatchConfig;

mod config;
mod error;
mod export;
mod merge;
mod sources;
mod stores;
mod utils;

#[derive(Debug, Parser)]
#[command(about = "Merges store observations from many sources into one deduplicated dataset")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Merge search results, brand locator scrapes and an earlier output.
    Merge(MergeArgs),
    /// Print the effective matcher configuration as YAML.
    Config {
        #[arg(long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        overrides: Overrides,
    },
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    /// Search result document, repeatable.
    #[arg(long)]
    pub search: Vec<PathBuf>,
    /// Brand locator document, repeatable.
    #[arg(long)]
    pub brand: Vec<PathBuf>,
    /// Output of an earlier run to merge into.
    #[arg(long)]
    pub previous: Option<PathBuf>,
    #[arg(long, short)]
    pub output: PathBuf,
    /// YAML matcher configuration.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub overrides: Overrides,
    /// Skip unreadable inputs instead of aborting.
    #[arg(long)]
    pub allow_partial: bool,
}

#[derive(Clone, Debug, Default, Args)]
pub struct Overrides {
    #[arg(long)]
    pub threshold: Option<f64>,
    /// Metres.
    #[arg(long)]
    pub geo_veto: Option<f64>,
    /// Metres.
    #[arg(long)]
    pub cell_size: Option<f64>,
    /// Stages best first, comma separated.
    #[arg(long, value_enum, value_delimiter = ',')]
    pub precedence: Option<Vec<Stage>>,
}

impl Overrides {
    /// Loads the file (or the defaults), applies the flags and validates.
    pub fn config(self, path: Option<&PathBuf>) -> Result<MatchConfig> {
        let mut config = match path {
            Some(x) => MatchConfig::load(x)?,
            None => MatchConfig::default(),
        };
        if let Some(x) = self.threshold {
            config.threshold = x;
        }
        if let Some(x) = self.geo_veto {
            config.geo_veto_m = x;
        }
        if let Some(x) = self.cell_size {
            config.cell_size_m = x;
        }
        if let Some(x) = self.precedence {
            config.precedence = x;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Merge(args) => merge::run(args),
        Command::Config { config, overrides } => {
            let config = overrides.config(config.as_ref())?;
            print!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
