use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pulsekeeper_infrastructure::PulsePaths;
use std::path::PathBuf;

mod api;
mod bootstrap;

#[derive(Parser)]
#[command(name = "pulsekeeper")]
#[command(about = "Keeps Roblox accounts online by sending periodic heartbeat pulses", long_about = None)]
struct Cli {
    /// Directory holding config.json and the activity log
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `pulsekeeper_application=trace` (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every account monitor and the local dashboard API (default)
    Serve {
        /// First port to try for the dashboard
        #[arg(long, default_value_t = bootstrap::DEFAULT_PORT)]
        port: u16,
    },
    /// Write a default configuration with a placeholder account
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
    /// Print the resolved settings of every configured account
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    bootstrap::init_tracing(cli.log_level.as_deref());

    let paths = PulsePaths::resolve(cli.data_dir).context("Failed to resolve data directory")?;

    match cli.command.unwrap_or(Commands::Serve {
        port: bootstrap::DEFAULT_PORT,
    }) {
        Commands::Serve { port } => bootstrap::serve(&paths, port).await?,
        Commands::Init { force } => bootstrap::init(&paths, force)?,
        Commands::Status => bootstrap::print_status(&paths)?,
    }

    Ok(())
}
