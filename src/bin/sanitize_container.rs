use clap::Parser;
use h5_sanitizer::cli::{self, RepairArgs};
use h5_sanitizer::repair::RepairMode;
use std::process::ExitCode;

/// Copy a model container, replacing '/' with '_' in every group and dataset
/// name and in every text attribute. Keep a backup of the original.
#[derive(Parser)]
#[command(name = "sanitize-container")]
struct Cli {
    #[command(flatten)]
    args: RepairArgs,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    cli::run(RepairMode::FullSanitize, &cli.args)
}
