//! Command handlers.
//!
//! Handlers print user-facing progress on stdout and return the batch report
//! so the caller can decide the exit code.

pub mod install;
pub mod list;
pub mod remove;
pub mod upgrade;

use backplane_catalog::{CatalogConfig, default_registry};
use backplane_core::{
    BatchReport, HttpClient, Installer, Layout, Progress, Registry, ReleaseCache, ToolOutcome, ToolSpec,
};
use tokio_util::sync::CancellationToken;

use crate::cli::CliError;
use crate::config::Config;

/// Argument selecting every tool.
pub const ALL: &str = "all";

/// Everything a command needs for one run.
#[derive(Debug)]
pub struct Context {
    /// The tool catalog.
    pub registry: Registry,
    /// Installer bound to the install root.
    pub installer: Installer,
    /// Latest releases resolved during this run.
    pub cache: ReleaseCache,
}

impl Context {
    /// Build the catalog and installer from `config`.
    ///
    /// # Errors
    ///
    /// Configuration problems (install root, HTTP client, catalog).
    pub fn new(config: &Config, cancel: CancellationToken) -> Result<Self, CliError> {
        let http = HttpClient::new(config.http_timeout(), cancel)?;
        let mut catalog = CatalogConfig::new(http.clone());
        catalog.github_token = config.github_token();
        if let Some(url) = &config.mirror_base_url {
            catalog.mirror_base_url.clone_from(url);
        }
        if let Some(proxy) = &config.aws_proxy {
            catalog.aws_proxy.clone_from(proxy);
        }
        let registry = default_registry(&catalog)?;
        let layout = Layout::new(config.install_root()?);
        Ok(Self::from_parts(registry, layout, http).with_mismatch_override(config))
    }

    /// Assemble a context from prebuilt parts.
    #[must_use]
    pub fn from_parts(registry: Registry, layout: Layout, http: HttpClient) -> Self {
        Self {
            registry,
            installer: Installer::new(layout, http),
            cache: ReleaseCache::new(),
        }
    }

    fn with_mismatch_override(mut self, config: &Config) -> Self {
        self.installer = self.installer.with_mismatch_override(config.mismatch_override());
        self
    }

    /// The install layout.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        self.installer.layout()
    }
}

/// Tools named on the command line.
#[derive(Debug)]
pub enum Selection<'a> {
    /// No names, or `all`.
    All,
    /// Specific tools, deduplicated, in argument order.
    Tools(Vec<&'a ToolSpec>),
}

/// Resolve command-line tool names.
///
/// # Errors
///
/// A usage error naming every unknown tool.
pub fn select<'a>(registry: &'a Registry, names: &[String]) -> Result<Selection<'a>, CliError> {
    if names.is_empty() || names.iter().any(|n| n == ALL) {
        return Ok(Selection::All);
    }
    registry.resolve(names).map(Selection::Tools).map_err(|e| {
        let message = match e {
            backplane_core::Error::Configuration { message } => message,
            other => other.to_string(),
        };
        CliError::usage_with_help(message, "run 'backplane-tools list available' to see every tool")
    })
}

/// Prints one line per tool as a batch progresses.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleProgress {
    verb: &'static str,
    past: &'static str,
}

impl ConsoleProgress {
    /// Progress for installs and upgrades.
    #[must_use]
    pub const fn installing() -> Self {
        Self {
            verb: "Installing",
            past: "installed",
        }
    }

    /// Progress for removals.
    #[must_use]
    pub const fn removing() -> Self {
        Self {
            verb: "Removing",
            past: "removed",
        }
    }
}

impl Progress for ConsoleProgress {
    fn planned(&self, tool: &ToolSpec, check: &backplane_core::UpgradeCheck) {
        if check.needs_upgrade() {
            let from = check.installed.as_deref().unwrap_or("(not linked)");
            println!("- {} {from} -> {}", tool.name, check.latest);
        } else {
            println!(
                "- {} is already installed with latest version {} and will not be upgraded",
                tool.name, check.latest
            );
        }
    }

    fn started(&self, tool: &ToolSpec) {
        println!();
        println!("{} {}", self.verb, tool.name);
    }

    fn finished(&self, tool: &ToolSpec, outcome: &ToolOutcome) {
        match outcome {
            ToolOutcome::Installed { version } => println!("Successfully {} {} {version}", self.past, tool.name),
            ToolOutcome::Upgraded { from, to } => println!("Successfully upgraded {} {from} -> {to}", tool.name),
            ToolOutcome::Removed => println!("Successfully {} {}", self.past, tool.name),
            ToolOutcome::MismatchSkipped {
                version,
                manual_download,
            } => {
                println!(
                    "Checksum for {} {version} does not match; keeping the current version",
                    tool.name
                );
                println!("If the issue persists, download it manually from {manual_download}");
            }
            ToolOutcome::Failed(e) => {
                println!("Encountered error while {} {}: {e}", self.verb.to_lowercase(), tool.name);
                println!("Skipping...");
            }
            ToolOutcome::UpToDate { .. } | ToolOutcome::NotAttempted => {}
        }
    }
}

/// Print the failures of `report` and apply `--strict`.
///
/// # Errors
///
/// With `strict`, a failure error when any tool did not succeed.
pub fn finish(report: &BatchReport, strict: bool) -> Result<(), CliError> {
    let failures: Vec<&str> = report.failures().map(|(name, _)| name).collect();
    if failures.is_empty() {
        return Ok(());
    }
    let skipped: Vec<&str> = report
        .iter()
        .filter(|(_, o)| matches!(o, ToolOutcome::NotAttempted))
        .map(|(name, _)| name)
        .collect();
    if !skipped.is_empty() {
        println!();
        println!("Interrupted before: {}", skipped.join(", "));
    }
    println!();
    println!("Failed: {}", failures.join(", "));
    if strict {
        Err(CliError::failed(format!("{} of {} tools failed", failures.len(), report.len())))
    } else {
        Ok(())
    }
}
