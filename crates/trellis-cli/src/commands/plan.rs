//! Plan command - validate a manifest and show its creation order.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::manifest::Manifest;
use crate::{Config, OutputFormat};

/// Arguments for the plan command.
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Path to the manifest file (JSON).
    #[arg(long, short = 'f', default_value = "trellis.json")]
    pub manifest_file: PathBuf,
}

/// Execute the plan command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be read or its dependency
/// graph is invalid (duplicate names, unknown dependencies, cycles).
pub fn execute(args: &PlanArgs, config: &Config) -> Result<()> {
    let manifest = Manifest::load(&args.manifest_file)?;
    let plan = manifest.plan()?;

    match config.format {
        OutputFormat::Json => {
            let mut teardown_order = plan.creation_order();
            teardown_order.reverse();
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "name": manifest.name,
                    "creationOrder": plan.descriptors(),
                    "teardownOrder": teardown_order,
                }))?
            );
        }
        OutputFormat::Text => {
            match &manifest.name {
                Some(name) => println!("Plan for {name} ({} resources):", plan.len()),
                None => println!("Plan ({} resources):", plan.len()),
            }
            println!();
            for (position, descriptor) in plan.descriptors().iter().enumerate() {
                let deps = if descriptor.depends_on.is_empty() {
                    String::new()
                } else {
                    format!("  (depends on: {})", descriptor.depends_on.join(", "))
                };
                println!(
                    "  {:>2}. {:<28} {}{deps}",
                    position + 1,
                    descriptor.name,
                    descriptor.kind
                );
            }
            let mut teardown_order = plan.creation_order();
            teardown_order.reverse();
            println!();
            println!("Teardown order: {}", teardown_order.join(", "));
        }
        OutputFormat::Table => {
            use tabled::{Table, Tabled};

            #[derive(Tabled)]
            struct Row {
                #[tabled(rename = "Order")]
                order: usize,
                #[tabled(rename = "Resource")]
                name: String,
                #[tabled(rename = "Kind")]
                kind: String,
                #[tabled(rename = "Depends On")]
                depends_on: String,
            }

            let rows: Vec<Row> = plan
                .descriptors()
                .iter()
                .enumerate()
                .map(|(position, d)| Row {
                    order: position + 1,
                    name: d.name.clone(),
                    kind: d.kind.to_string(),
                    depends_on: d.depends_on.join(", "),
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
    fn test_plan_args_default_manifest() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: PlanArgs,
        }

        let cli = TestCli::parse_from(["test"]);
        assert_eq!(cli.args.manifest_file, PathBuf::from("trellis.json"));
    }

    #[test]
    fn test_plan_args_custom_manifest() {
        #[derive(Parser)]
        struct TestCli {
            #[command(flatten)]
            args: PlanArgs,
        }

        let cli = TestCli::parse_from(["test", "-f", "stack.json"]);
        assert_eq!(cli.args.manifest_file, PathBuf::from("stack.json"));
    }

    #[test]
    fn test_plan_rejects_a_cyclic_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cyclic.json");
        std::fs::write(
            &path,
            r#"{"resources":[
                {"name":"a","kind":"role","dependsOn":["b"]},
                {"name":"b","kind":"bucket","dependsOn":["a"]}
            ]}"#,
        )
        .unwrap();

        let args = PlanArgs {
            manifest_file: path,
        };
        let config = Config {
            format: OutputFormat::Text,
        };
        let err = execute(&args, &config).unwrap_err();
        assert!(format!("{err:#}").contains("cycle"));
    }
}
