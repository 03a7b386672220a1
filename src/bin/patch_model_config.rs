use clap::Parser;
use h5_sanitizer::cli::{self, RepairArgs};
use h5_sanitizer::repair::RepairMode;
use std::process::ExitCode;

/// Rewrite layer names in a model container's `model_config` descriptor,
/// replacing '/' with '_' in every layer definition and reference. All other
/// content is copied unchanged.
#[derive(Parser)]
#[command(name = "patch-model-config")]
struct Cli {
    #[command(flatten)]
    args: RepairArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::run(RepairMode::DescriptorPatch, &cli.args)
}
