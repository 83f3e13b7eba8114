//! # trellis-cli
//!
//! Command-line interface for trellis provisioning.
//!
//! ## Commands
//!
//! - `trellis init` - Write a starter manifest for a small agent stack
//! - `trellis plan` - Validate a manifest and show its creation order
//! - `trellis simulate` - Deploy a manifest against an in-memory remote
//!
//! ## Configuration
//!
//! The CLI uses environment variables or command-line flags for settings:
//!
//! - `TRELLIS_LOG_JSON` - Emit logs as JSON instead of human-readable text
//! - `RUST_LOG` - Log filter (default: `info`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod blueprint;
pub mod commands;
pub mod manifest;

use clap::{Parser, Subcommand};

/// Trellis CLI - idempotent provisioning for agent stacks.
#[derive(Debug, Parser)]
#[command(name = "trellis")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Emit logs as JSON.
    #[arg(long, env = "TRELLIS_LOG_JSON")]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            format: self.format.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a starter manifest.
    Init(commands::init::InitArgs),
    /// Validate a manifest and show its creation order.
    Plan(commands::plan::PlanArgs),
    /// Deploy a manifest against an in-memory remote.
    Simulate(commands::simulate::SimulateArgs),
}

/// Output format.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
    /// Table output.
    Table,
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Output format.
    pub format: OutputFormat,
}
