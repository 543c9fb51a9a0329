//! Shared plumbing for the driver binaries: argument parsing, logging setup
//! and error reporting.

use crate::error::{OffloadError, Result};
use clap::Parser;
use clap::error::ErrorKind;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Command line accepted by every driver.
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(version)]
pub struct DriverArgs {
    /// Problem size; each driver has its own default
    pub problem_size: Option<u64>,
}

/// Parse the process arguments. Help and version exit with 0, anything
/// unparsable exits with 1.
pub fn parse_args() -> DriverArgs {
    match DriverArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            std::process::exit(1)
        }
    }
}

/// Convert a command-line problem size to the host's index type.
pub fn problem_size(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| {
        OffloadError::geometry(format!("problem size {value} does not fit in this platform's usize"))
    })
}

/// Install a stderr `fmt` subscriber filtered by `RUST_LOG`, then
/// `OFFLOAD_LOG`, then `warn`.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("OFFLOAD_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// The error message followed by each of its sources, one per line.
pub fn error_chain(err: &OffloadError) -> String {
    let mut text = format!("error: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(&format!("\n  caused by: {cause}"));
        source = cause.source();
    }
    text
}

/// Map a driver outcome to the process exit code, reporting failures on
/// stderr.
pub fn finish(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!(error = ?e, "driver failed");
            eprintln!("{}", error_chain(&e));
            ExitCode::from(1)
        }
    }
}
