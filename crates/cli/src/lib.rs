//! backplane-tools command-line interface.
//!
//! Parses arguments, loads configuration, and dispatches to the command
//! handlers. The binary in `main.rs` owns the runtime and process exit.

// CLI output goes to stdout/stderr by design
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// User configuration file.
pub mod config;
/// Tracing setup.
pub mod tracing;

use std::ffi::OsString;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, CliError, Commands, EXIT_OK};
use crate::commands::{Context, finish, upgrade::Upgraded};
use crate::config::Config;

/// Run one parsed invocation and return the process exit code.
///
/// # Errors
///
/// Configuration, usage and (with `--strict`) batch failures.
pub async fn run(cli: Cli, args: &[OsString], cancel: CancellationToken) -> Result<i32, CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let ctx = Context::new(&config, cancel)?;

    let report = match &cli.command {
        Commands::Install { tools } => commands::install::execute(&ctx, tools).await?,
        Commands::Upgrade { tools } => match commands::upgrade::execute(&ctx, tools).await? {
            Upgraded::Done(report) => report,
            Upgraded::Reexec => return commands::upgrade::reexec(args),
        },
        Commands::Remove { tools } => commands::remove::execute(&ctx, tools)?,
        Commands::List { which } => {
            commands::list::execute(&ctx, *which);
            return Ok(EXIT_OK);
        }
    };
    finish(&report, cli.strict)?;
    Ok(EXIT_OK)
}
