//! The command line interface.
use crate::aggregate::Aggregator;
use crate::eio::Eio;
use crate::input::Config;
use crate::log;
use crate::output::{
    create_output_directory, get_output_dir, write_production, write_production_by_group,
    write_spatial_refs,
};
use crate::settings::Settings;
use crate::spatial_ref::nei_spatial_refs;
use crate::year::Year;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for eieio.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for commands which write output files
#[derive(Args)]
pub struct OutputOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Load a model and check its tables are consistent.
    Validate {
        /// Path to the model configuration file.
        config: PathBuf,
    },
    /// Write domestic production by industry for a year.
    Production {
        /// Path to the model configuration file.
        config: PathBuf,
        /// The year to calculate production for.
        year: Year,
        /// Sector aggregation workbook; production is also written summed by aggregate group.
        #[arg(long)]
        aggregates: Option<PathBuf>,
        /// Output options
        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Write the SCCs and SCC shares of each industry for a year.
    SpatialRefs {
        /// Path to the model configuration file.
        config: PathBuf,
        /// The year to allocate SCCs for.
        year: Year,
        /// Output options
        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Manage program settings.
    Settings {
        /// The available subcommands for managing settings.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Validate { config } => handle_validate_command(&config, None),
            Self::Production {
                config,
                year,
                aggregates,
                opts,
            } => handle_production_command(&config, year, aggregates.as_deref(), &opts, None),
            Self::SpatialRefs { config, year, opts } => {
                handle_spatial_refs_command(&config, year, &opts, None)
            }
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and run the requested command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Create the output folder and start logging to it
fn prepare_output(config_path: &Path, opts: &OutputOpts, settings: &Settings) -> Result<PathBuf> {
    let output_path = match &opts.output_dir {
        Some(p) => p.clone(),
        None => get_output_dir(config_path)?,
    };
    let overwrite = create_output_directory(&output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    log::init(&settings.log_level, Some(&output_path))
        .context("Failed to initialise logging.")?;
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    Ok(output_path)
}

fn load_model(config_path: &Path) -> Result<(Config, Eio)> {
    let config = Config::load(config_path).context("Failed to load model configuration.")?;
    let eio = Eio::new(&config).context("Failed to load model.")?;
    info!("Loaded model from {}", config_path.display());
    Ok((config, eio))
}

/// Handle the `validate` command.
pub fn handle_validate_command(config_path: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // We don't save log files when validating
    log::init(&settings.log_level, None).context("Failed to initialise logging.")?;

    load_model(config_path)?;
    info!("Model validation successful!");

    Ok(())
}

/// Handle the `production` command.
pub fn handle_production_command(
    config_path: &Path,
    year: Year,
    aggregates: Option<&Path>,
    opts: &OutputOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    let output_path = prepare_output(config_path, opts, &settings)?;
    let (_, eio) = load_model(config_path)?;

    let production = eio.domestic_production(year)?;
    let file_path = write_production(&output_path, eio.industries(), year, &production)?;
    info!("Wrote domestic production to {}", file_path.display());

    if let Some(aggregates) = aggregates {
        let aggregator = Aggregator::new(&eio, aggregates)?;
        let totals = aggregator.industry_totals(&production)?;
        let file_path =
            write_production_by_group(&output_path, aggregator.groups(), year, &totals)?;
        info!("Wrote production by aggregate group to {}", file_path.display());
    }

    Ok(())
}

/// Handle the `spatial-refs` command.
pub fn handle_spatial_refs_command(
    config_path: &Path,
    year: Year,
    opts: &OutputOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    let output_path = prepare_output(config_path, opts, &settings)?;
    let (config, eio) = load_model(config_path)?;
    let spatial = config
        .spatial
        .as_ref()
        .context("The model configuration has no [spatial] section")?;

    let refs = nei_spatial_refs(
        eio.loader(),
        &spatial.scc_map,
        &eio.layout().scc_map,
        year,
        &eio,
    )?;
    let file_path = write_spatial_refs(&output_path, eio.industries(), &refs)?;
    info!("Wrote spatial references to {}", file_path.display());

    Ok(())
}
