//! Init command - write a starter manifest to disk.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::blueprint::starter_manifest;
use crate::{Config, OutputFormat};

/// Arguments for the init command.
#[derive(Debug, Args)]
pub struct InitArgs {
    /// Where to write the manifest.
    #[arg(long, short = 'o', default_value = "trellis.json")]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns an error if the target file already exists (without `--force`)
/// or cannot be written.
pub fn execute(args: &InitArgs, config: &Config) -> Result<()> {
    if args.output.exists() && !args.force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            args.output.display()
        );
    }

    let manifest = starter_manifest();
    manifest.save(&args.output)?;

    match config.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "manifest": args.output.display().to_string(),
                    "resourceCount": manifest.resources.len(),
                }))?
            );
        }
        OutputFormat::Text => {
            println!("Wrote starter manifest to {}", args.output.display());
            println!();
            println!(
                "  {} resources across every supported kind. Edit the file,",
                manifest.resources.len()
            );
            println!("  then check the creation order with:");
            println!();
            println!("    trellis plan -f {}", args.output.display());
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct Row {
                #[tabled(rename = "Resource")]
                name: String,
                #[tabled(rename = "Kind")]
                kind: String,
            }

            let rows: Vec<Row> = manifest
                .resources
                .iter()
                .map(|d| Row {
                    name: d.name.clone(),
                    kind: d.kind.to_string(),
                })
                .collect();

            println!("{}", Table::new(rows));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_init_args_defaults() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: InitArgs,
        }

        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.args.output, PathBuf::from("trellis.json"));
        assert!(!cli.args.force);
    }

    #[test]
    fn test_init_args_custom_output() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: InitArgs,
        }

        let cli = TestCli::parse_from(["test", "-o", "stack.json", "--force"]);
        assert_eq!(cli.args.output, PathBuf::from("stack.json"));
        assert!(cli.args.force);
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.json");
        std::fs::write(&path, "{}").unwrap();

        let args = InitArgs {
            output: path.clone(),
            force: false,
        };
        let config = Config {
            format: OutputFormat::Text,
        };
        let err = execute(&args, &config).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn test_init_writes_a_loadable_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.json");

        let args = InitArgs {
            output: path.clone(),
            force: false,
        };
        let config = Config {
            format: OutputFormat::Text,
        };
        execute(&args, &config).unwrap();

        let manifest = crate::manifest::Manifest::load(&path).unwrap();
        assert!(manifest.plan().is_ok());
    }
}
