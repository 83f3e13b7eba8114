//! Trellis CLI - provision agent stacks from declarative manifests.
//!
//! The main entry point for the `trellis` binary.

use anyhow::Result;
use clap::Parser;

use trellis_cli::{Cli, Commands};
use trellis_core::{init_logging, LogFormat};

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let log_format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(log_format);

    let config = cli.config();

    // Create runtime and execute
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Init(args) => trellis_cli::commands::init::execute(&args, &config),
            Commands::Plan(args) => trellis_cli::commands::plan::execute(&args, &config),
            Commands::Simulate(args) => {
                trellis_cli::commands::simulate::execute(args, &config).await
            }
        }
    })
}
