//! Command layer shared by the two repair binaries.
//!
//! Usage errors are left to clap, which exits with status 2. Any failure of
//! the repair itself prints the error chain and exits with status 1.

use crate::repair::{RepairConfig, RepairMode, RepairReport, patch_descriptor, sanitize_container};
use anyhow::Context;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

pub type Result<T> = anyhow::Result<T>;

#[derive(Debug, clap::Args)]
pub struct RepairArgs {
    /// Container to repair. Opened read-only.
    pub input_path: PathBuf,

    /// Destination for the repaired container.
    pub output_path: PathBuf,
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // A subscriber may already be installed (tests); keep it.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .ok();
}

pub fn run(mode: RepairMode, args: &RepairArgs) -> ExitCode {
    init_tracing();
    match execute(mode, args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn execute(mode: RepairMode, args: &RepairArgs) -> Result<()> {
    let config = RepairConfig::default();
    let input = args.input_path.as_path();
    let output = args.output_path.as_path();

    match mode {
        RepairMode::DescriptorPatch => {
            println!("Reading model from: {}", input.display());
            let report = patch_descriptor(input, output, &config)
                .with_context(|| format!("patch {} into {}", input.display(), output.display()))?;
            print_descriptor_summary(&config, &report);
            print_warnings(&report);
            println!("Wrote patched model to: {}", output.display());
        }
        RepairMode::FullSanitize => {
            println!("Sanitizing {} -> {} ...", input.display(), output.display());
            let report = sanitize_container(input, output, &config).with_context(|| {
                format!("sanitize {} into {}", input.display(), output.display())
            })?;
            println!(
                "Copied {} groups, {} datasets, {} attributes ({} names and {} attribute values rewritten)",
                report.copy.groups,
                report.copy.datasets,
                report.copy.attributes,
                report.copy.renamed_nodes,
                report.copy.rewritten_attributes
            );
            print_warnings(&report);
            println!("Done.");
        }
    }
    Ok(())
}

fn print_descriptor_summary(config: &RepairConfig, report: &RepairReport) {
    let Some(stats) = &report.descriptor else {
        return;
    };
    println!(
        "Found {} attribute ({} chars)",
        config.descriptor_key, stats.input_len
    );
    println!(
        "Parsed model config: {} model",
        stats.class_name.as_deref().unwrap_or("Unknown")
    );
    println!(
        "Renamed {} layer definitions and {} references",
        stats.definitions, stats.references
    );
    println!(
        "Sanitized {} ({} chars)",
        config.descriptor_key, stats.output_len
    );
}

fn print_warnings(report: &RepairReport) {
    if report.warnings.is_empty() {
        return;
    }
    println!("{} node(s) copied raw:", report.warnings.len());
    for w in &report.warnings {
        println!("  {}", w);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_can_be_initialized_more_than_once() {
        init_tracing();
        init_tracing();
        tracing::debug!("still logging");
    }
}
