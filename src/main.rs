//! Despejar CLI
//!
//! Reflection removal training and evaluation entry point.
//!
//! # Usage
//!
//! ```bash
//! # Train from an options file
//! despejar train -c options.yml
//!
//! # Evaluate a checkpoint on the configured test sets
//! despejar test -c options.yml --weights net_g.safetensors
//! ```

use clap::Parser;
use despejar::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
