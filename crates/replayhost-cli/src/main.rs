mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "replayhost",
    version,
    about = "Drive a sandboxed replay parser module over a directory of replays"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse every replay under the root with one module instance
    Run {
        /// Path to harness YAML file
        harness: PathBuf,
        /// Passes over the batch (overrides `iterations`)
        #[arg(long)]
        iterations: Option<u32>,
        /// Parse mode passed to the module (overrides `mode`)
        #[arg(long)]
        mode: Option<u32>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compile, instantiate and start the module, then report its contract
    Check {
        /// Path to harness YAML file
        harness: PathBuf,
    },
    /// Parse a single replay and print the module's JSON output
    Parse {
        /// Path to harness YAML file
        harness: PathBuf,
        /// File name under the configured root
        file: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    match cli.command {
        Commands::Run {
            harness,
            iterations,
            mode,
            json,
        } => commands::run::execute(&harness, iterations, mode, json).await,
        Commands::Check { harness } => commands::check::execute(&harness).await,
        Commands::Parse { harness, file } => commands::parse::execute(&harness, &file).await,
    }
}
