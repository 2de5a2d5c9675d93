//! Jobflow CLI entry point
//!
//! Runs command operations declared in the project file.

use color_eyre::Result;
use jobflow_plan::Registry;
use std::process::ExitCode;

fn main() -> Result<ExitCode> {
    jobflow_cli::main_with(Registry::builder())
}
