use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use conveyor::config::ManagerConfig;

#[derive(Parser)]
#[command(name = "conveyor")]
#[command(about = "Gating CI/CD pipeline manager core", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a manager configuration file
    Validate {
        /// Path to the TOML configuration file
        config_path: PathBuf,
    },
    /// Parse a configuration file and print a summary of its pipelines
    Show {
        config_path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    conveyor::logging::init(cli.verbose);

    match cli.command {
        Commands::Validate { config_path } => {
            ManagerConfig::load(&config_path)
                .with_context(|| format!("loading configuration from {}", config_path.display()))?;
            println!("configuration is valid: {}", config_path.display());
            Ok(())
        }
        Commands::Show { config_path } => {
            let config = ManagerConfig::load(&config_path)
                .with_context(|| format!("loading configuration from {}", config_path.display()))?;
            for pipeline in &config.pipelines {
                println!("pipeline {} (tenant {})", pipeline.name, pipeline.tenant);
                for queue in &pipeline.queues {
                    println!("  queue {} window={} dynamic={}", queue.name, queue.window, queue.dynamic);
                }
            }
            for semaphore in &config.semaphores {
                println!("semaphore {} max={}", semaphore.name, semaphore.max);
            }
            Ok(())
        }
    }
}
