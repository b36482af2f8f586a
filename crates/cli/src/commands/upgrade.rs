//! `upgrade [all|TOOL...]`
//!
//! A full upgrade updates backplane-tools itself first. When that produces a
//! new version, the new binary is re-executed with the same arguments so the
//! remaining tools are upgraded by the new catalog.

use backplane_catalog::SELF_TOOL;
use backplane_core::{BatchReport, ToolOutcome, ToolSpec};
use std::ffi::OsString;
use tracing::info;

use super::{ConsoleProgress, Context, Selection, select};
use crate::cli::CliError;

/// What the caller should do after [`execute`].
#[derive(Debug)]
pub enum Upgraded {
    /// Every requested tool was handled.
    Done(BatchReport),
    /// backplane-tools was upgraded; re-run the new binary.
    Reexec,
}

/// Upgrade the named tools, or backplane-tools and then every installed tool.
///
/// # Errors
///
/// Unknown tool names, or an install root that cannot be created.
pub async fn execute(ctx: &Context, names: &[String]) -> Result<Upgraded, CliError> {
    let progress = ConsoleProgress::installing();
    let tools: Vec<&ToolSpec> = match select(&ctx.registry, names)? {
        Selection::Tools(tools) => tools,
        Selection::All => {
            if let Some(this) = ctx.registry.get(SELF_TOOL) {
                let report = ctx
                    .registry
                    .bulk_upgrade(&[this], &ctx.installer, &ctx.cache, &progress)
                    .await?;
                if matches!(report.get(SELF_TOOL), Some(ToolOutcome::Upgraded { .. })) {
                    return Ok(Upgraded::Reexec);
                }
            }
            ctx.registry
                .list_installed(ctx.layout())
                .into_iter()
                .filter(|t| t.name != SELF_TOOL)
                .collect()
        }
    };

    if tools.is_empty() {
        println!("No installed tools to upgrade");
        return Ok(Upgraded::Done(BatchReport::default()));
    }
    let report = ctx
        .registry
        .bulk_upgrade(&tools, &ctx.installer, &ctx.cache, &progress)
        .await?;
    Ok(Upgraded::Done(report))
}

/// Replace this process with `argv[0]` run on the same arguments.
///
/// Only returns on failure.
///
/// # Errors
///
/// The new binary could not be started.
pub fn reexec(args: &[OsString]) -> Result<i32, CliError> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| CliError::failed("cannot re-run backplane-tools: no program name"))?;
    println!();
    println!("re-running {}", display_args(args));
    info!(program = ?program, "Re-executing upgraded backplane-tools");

    let mut command = std::process::Command::new(program);
    command.args(rest);
    run(command, program)
}

#[cfg(unix)]
fn run(mut command: std::process::Command, program: &OsString) -> Result<i32, CliError> {
    use std::os::unix::process::CommandExt;
    let err = command.exec();
    Err(CliError::failed(format!(
        "failed to re-run {}: {err}",
        program.to_string_lossy()
    )))
}

#[cfg(not(unix))]
fn run(mut command: std::process::Command, program: &OsString) -> Result<i32, CliError> {
    let status = command
        .status()
        .map_err(|e| CliError::failed(format!("failed to re-run {}: {e}", program.to_string_lossy())))?;
    Ok(status.code().unwrap_or(1))
}

fn display_args(args: &[OsString]) -> String {
    args.iter()
        .map(|a| a.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
