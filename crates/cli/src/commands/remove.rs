//! `remove all|TOOL...`

use backplane_core::{BatchReport, RemoveTarget};

use super::{ALL, ConsoleProgress, Context, Selection, select};
use crate::cli::CliError;

/// Remove the named tools, or the whole installation for `all`.
///
/// Without arguments nothing is removed; `all` must be explicit.
///
/// # Errors
///
/// Unknown tool names, or a failed recursive delete of the install root.
pub fn execute(ctx: &Context, names: &[String]) -> Result<BatchReport, CliError> {
    if names.is_empty() {
        println!("No tools specified to be removed. In order to remove all tools, explicitly specify '{ALL}'");
        return Ok(BatchReport::default());
    }

    let target = match select(&ctx.registry, names)? {
        Selection::All => {
            println!("Removing all tools from {}", ctx.layout().root_dir().display());
            RemoveTarget::All
        }
        Selection::Tools(tools) => RemoveTarget::Tools(tools),
    };
    let report = ctx
        .registry
        .remove(target, ctx.layout(), &ConsoleProgress::removing())?;
    Ok(report)
}
