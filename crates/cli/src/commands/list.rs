//! `list available|installed`

use backplane_core::ToolSpec;
use tracing::debug;

use super::Context;
use crate::cli::ListCommands;

/// Print the requested tool list.
pub fn execute(ctx: &Context, which: ListCommands) {
    for line in lines(ctx, which) {
        println!("{line}");
    }
}

fn lines(ctx: &Context, which: ListCommands) -> Vec<String> {
    match which {
        ListCommands::Available => {
            let mut out = vec!["Available tools:".to_string()];
            out.extend(ctx.registry.iter().map(|t| format!("- {}", t.name)));
            out
        }
        ListCommands::Installed => {
            let installed = ctx.registry.list_installed(ctx.layout());
            if installed.is_empty() {
                return vec!["No tools installed".to_string()];
            }
            let mut out = vec!["Installed tools:".to_string()];
            out.extend(installed.into_iter().map(|t| installed_line(ctx, t)));
            out
        }
    }
}

fn installed_line(ctx: &Context, tool: &ToolSpec) -> String {
    match ctx.registry.installed_version(tool, ctx.layout()) {
        Ok(Some(version)) => format!("- {} ({version})", tool.name),
        Ok(None) => format!("- {} (not linked)", tool.name),
        Err(e) => {
            debug!(tool = %tool.name, error = %e, "Could not resolve installed version");
            format!("- {}", tool.name)
        }
    }
}
