#![warn(missing_docs)]
//! # pepper binary
//!
//! Command-line entry point for the CoovaChilli JSON API client.

use std::process::ExitCode;

use clap::Parser;
use pepper_app::{Args, app_version, build_driver, init_tracing, log_failure, run};
use tracing::debug;

/// CLI entry point.
fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(error) = init_tracing(&args.log_level) {
        eprintln!("pepper: {error}");
        return ExitCode::FAILURE;
    }
    debug!(version = app_version(), "starting");

    let outcome = build_driver(args.to_options())
        .and_then(|mut pepper| run(&mut pepper, &args.command, |line| println!("{line}")));

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            log_failure(&error);
            eprintln!("pepper: {error}");
            ExitCode::FAILURE
        }
    }
}
