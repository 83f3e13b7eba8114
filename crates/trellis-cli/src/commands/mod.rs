//! CLI subcommands.

pub mod init;
pub mod plan;
pub mod simulate;
