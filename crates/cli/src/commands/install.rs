//! `install [all|TOOL...]`

use backplane_core::{BatchReport, Layout, ToolSpec};
use tracing::warn;

use super::{ConsoleProgress, Context, Selection, select};
use crate::cli::CliError;

/// Install the named tools, or every tool.
///
/// # Errors
///
/// Unknown tool names, or an install root that cannot be created.
pub async fn execute(ctx: &Context, names: &[String]) -> Result<BatchReport, CliError> {
    let tools: Vec<&ToolSpec> = match select(&ctx.registry, names)? {
        Selection::All => ctx.registry.iter().collect(),
        Selection::Tools(tools) => tools,
    };

    println!("Latest versions:");
    for tool in &tools {
        match ctx.registry.latest_version(tool, &ctx.cache).await {
            Ok(version) => println!("- {}: {version}", tool.name),
            Err(e) => println!("- {}: unable to determine ({e})", tool.name),
        }
    }

    let report = ctx
        .registry
        .bulk_install(&tools, &ctx.installer, &ctx.cache, &ConsoleProgress::installing())
        .await?;

    path_advisory(ctx.layout(), std::env::var_os("PATH").as_deref());
    Ok(report)
}

fn path_advisory(layout: &Layout, path_var: Option<&std::ffi::OsStr>) {
    let latest = layout.latest_dir();
    match path_var {
        None => {
            warn!("PATH is not set");
            println!();
            println!(
                "WARNING: Couldn't determine current $PATH: it's recommended '{}' is added to your $PATH to utilize the tools provided by this application",
                latest.display()
            );
        }
        Some(path) if !layout.latest_on_path(path) => {
            warn!(latest = ?latest, "latest directory is not on PATH");
            println!();
            println!(
                "WARNING: Detected that '{}' is not present in $PATH: it's recommended '{}' is added to your $PATH to utilize the tools provided by this application",
                latest.display(),
                latest.display()
            );
        }
        Some(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::{context, tool};
    use backplane_core::ToolOutcome;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_install_all_links_every_tool() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path(), vec![tool("oc", "4.15.2"), tool("yq", "v4.40.5")]);

        let report = execute(&ctx, &[]).await.unwrap();

        assert_eq!(report.len(), 2);
        assert!(report.is_success());
        assert_eq!(ctx.layout().installed_version("oc").unwrap().as_deref(), Some("4.15.2"));
        assert_eq!(ctx.layout().installed_version("yq").unwrap().as_deref(), Some("v4.40.5"));
    }

    #[tokio::test]
    async fn test_install_named_tool_only() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path(), vec![tool("oc", "4.15.2"), tool("yq", "v4.40.5")]);

        let report = execute(&ctx, &["yq".to_string()]).await.unwrap();

        assert!(matches!(report.get("yq"), Some(ToolOutcome::Installed { .. })));
        assert!(report.get("oc").is_none());
        assert!(!ctx.layout().symlink_path("oc").exists());
    }

    #[tokio::test]
    async fn test_unknown_tool_installs_nothing() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(tmp.path(), vec![tool("oc", "4.15.2")]);

        assert!(execute(&ctx, &["oc".into(), "nope".into()]).await.is_err());
        assert!(!ctx.layout().tool_dir("oc").exists());
    }
}
