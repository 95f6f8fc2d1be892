//! Flight School command-line entry point.
//!
//! # Responsibility
//! - Parse arguments, run one command, and map failures to a non-zero exit.

use std::process::ExitCode;

mod app;
mod commands;

fn main() -> ExitCode {
    if let Err(e) = app::run() {
        eprintln!("Error: {:#}", e);
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
