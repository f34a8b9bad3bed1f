//! Command-line interface.

mod simulate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging;

/// Thermostat group reconciliation engine.
#[derive(Parser)]
#[command(name = "thermoflock", version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file.
    Validate {
        /// Path to the group configuration YAML.
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run the engine against a scripted in-memory fleet.
    Simulate {
        /// Path to the group configuration YAML.
        #[arg(short, long)]
        config: PathBuf,
        /// Path to the simulation script YAML.
        #[arg(short, long)]
        script: PathBuf,
    },
}

/// Run the parsed CLI command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Validate { config } => {
            let config = ConfigLoader::load(&config)?;
            println!(
                "configuration ok: group '{}' with {} members",
                config.name,
                config.members.len()
            );
            Ok(())
        }
        Commands::Simulate { config, script } => {
            let config = ConfigLoader::load(&config)?;
            let _guard = logging::init(&config.logging);
            simulate::run(config, &script).await
        }
    }
}
