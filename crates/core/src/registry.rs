//! Tool registry and version tracker.
//!
//! The [`Registry`] is the static catalog, built once at startup. Batch
//! operations run tools strictly in order and isolate failures: one tool's
//! error is recorded in the [`BatchReport`] and the batch moves on.

use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::{info, warn};

use crate::asset::Release;
use crate::installer::{InstallOutcome, Installer};
use crate::layout::Layout;
use crate::tool::ToolSpec;
use crate::{Error, Result};

/// Request-scoped memo of latest releases, keyed by tool name.
///
/// Create one per command run; it is never persisted.
#[derive(Debug, Default)]
pub struct ReleaseCache {
    releases: Mutex<HashMap<String, Release>>,
}

impl ReleaseCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest release of `tool`, fetched at most once per cache.
    ///
    /// # Errors
    ///
    /// Propagates the source's error; failures are not cached.
    pub async fn latest_release(&self, tool: &ToolSpec) -> Result<Release> {
        if let Some(release) = self.lock().get(&tool.name) {
            return Ok(release.clone());
        }
        let release = tool.source.latest_release().await?;
        self.lock().insert(tool.name.clone(), release.clone());
        Ok(release)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Release>> {
        self.releases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// What happened to one tool in a batch.
#[derive(Debug)]
pub enum ToolOutcome {
    /// Installed for the first time (or re-installed) at `version`.
    Installed {
        /// Linked version.
        version: String,
    },
    /// Moved from one version to another.
    Upgraded {
        /// Previously linked version.
        from: String,
        /// Newly linked version.
        to: String,
    },
    /// Already at the latest version; nothing done.
    UpToDate {
        /// Current version.
        version: String,
    },
    /// Checksum mismatch tolerated by policy; `latest/` untouched.
    MismatchSkipped {
        /// Version that failed verification.
        version: String,
        /// Manual download location.
        manual_download: String,
    },
    /// Tool directory and links deleted.
    Removed,
    /// The tool failed; the batch continued.
    Failed(Error),
    /// The batch was cancelled before reaching this tool.
    NotAttempted,
}

impl ToolOutcome {
    /// Whether this outcome counts as a failure for exit-code purposes.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::MismatchSkipped { .. } | Self::NotAttempted)
    }
}

/// Per-tool outcomes of a batch, in processing order.
#[derive(Debug, Default)]
pub struct BatchReport {
    entries: Vec<(String, ToolOutcome)>,
}

impl BatchReport {
    fn push(&mut self, tool: &str, outcome: ToolOutcome) {
        self.entries.push((tool.to_string(), outcome));
    }

    /// Every entry in processing order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ToolOutcome)> {
        self.entries.iter().map(|(name, outcome)| (name.as_str(), outcome))
    }

    /// Outcome recorded for `tool`.
    #[must_use]
    pub fn get(&self, tool: &str) -> Option<&ToolOutcome> {
        self.entries
            .iter()
            .find(|(name, _)| name == tool)
            .map(|(_, outcome)| outcome)
    }

    /// Entries that did not succeed.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &ToolOutcome)> {
        self.iter().filter(|(_, outcome)| outcome.is_failure())
    }

    /// Whether every tool succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch processed no tools.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Installed-vs-latest comparison for one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeCheck {
    /// Linked version, `None` when not installed.
    pub installed: Option<String>,
    /// Latest available version.
    pub latest: String,
}

impl UpgradeCheck {
    /// Whether installing would change the linked version.
    #[must_use]
    pub fn needs_upgrade(&self) -> bool {
        self.installed.as_deref() != Some(self.latest.as_str())
    }
}

/// Hooks for reporting batch progress. Every method defaults to a no-op.
pub trait Progress {
    /// An upgrade comparison was computed.
    fn planned(&self, _tool: &ToolSpec, _check: &UpgradeCheck) {}
    /// Work on `tool` is starting.
    fn started(&self, _tool: &ToolSpec) {}
    /// Work on `tool` finished.
    fn finished(&self, _tool: &ToolSpec, _outcome: &ToolOutcome) {}
}

/// Progress sink that reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl Progress for Silent {}

/// What to remove.
#[derive(Debug)]
pub enum RemoveTarget<'a> {
    /// The whole install root, in one recursive delete.
    All,
    /// These tools, one at a time.
    Tools(Vec<&'a ToolSpec>),
}

/// The static tool catalog.
#[derive(Debug, Default)]
pub struct Registry {
    tools: IndexMap<String, ToolSpec>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool to the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the name or any of its `latest/`
    /// link names is already taken.
    pub fn register(&mut self, tool: ToolSpec) -> Result<()> {
        if self.tools.contains_key(&tool.name) {
            return Err(Error::configuration(format!(
                "tool '{}' is registered twice",
                tool.name
            )));
        }
        for link in tool.link_names() {
            if let Some(owner) = self.tools.values().find(|t| t.link_names().any(|l| l == link)) {
                return Err(Error::configuration(format!(
                    "tools '{}' and '{}' both link 'latest/{link}'",
                    owner.name, tool.name
                )));
            }
        }
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }

    /// Tool names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.keys().map(String::as_str)
    }

    /// Every tool in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools.values()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Resolve user-supplied names, preserving their order and dropping repeats.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] naming every unknown tool.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<&ToolSpec>> {
        let mut unknown = Vec::new();
        let mut resolved: Vec<&ToolSpec> = Vec::new();
        for name in names {
            let name = name.as_ref();
            match self.tools.get(name) {
                Some(tool) if !resolved.iter().any(|t| t.name == tool.name) => resolved.push(tool),
                Some(_) => {}
                None => unknown.push(name.to_string()),
            }
        }
        if unknown.is_empty() {
            Ok(resolved)
        } else {
            Err(Error::configuration(format!(
                "unknown tool(s): {}; supported: {}",
                unknown.join(", "),
                self.names().collect::<Vec<_>>().join(", ")
            )))
        }
    }

    /// Latest available version of `tool`, memoized in `cache`.
    ///
    /// # Errors
    ///
    /// Propagates the source's error.
    pub async fn latest_version(&self, tool: &ToolSpec, cache: &ReleaseCache) -> Result<String> {
        Ok(cache.latest_release(tool).await?.tag)
    }

    /// Version currently linked in `latest/`, or `None` if not installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the link exists but cannot be resolved.
    pub fn installed_version(&self, tool: &ToolSpec, layout: &Layout) -> Result<Option<String>> {
        layout.installed_version(&tool.executable_name)
    }

    /// Tools with a directory under the install root.
    #[must_use]
    pub fn list_installed(&self, layout: &Layout) -> Vec<&ToolSpec> {
        self.iter().filter(|t| layout.is_tool_present(&t.name)).collect()
    }

    /// Compare installed and latest versions of `tool`.
    ///
    /// # Errors
    ///
    /// Propagates source and filesystem errors.
    pub async fn check_upgrade(
        &self,
        tool: &ToolSpec,
        installer: &Installer,
        cache: &ReleaseCache,
    ) -> Result<UpgradeCheck> {
        let latest = installer
            .http()
            .cancellable(self.latest_version(tool, cache))
            .await?;
        let installed = self.installed_version(tool, installer.layout())?;
        Ok(UpgradeCheck { installed, latest })
    }

    /// Install each tool in order, isolating failures.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] only if the install root itself cannot
    /// be created; per-tool failures are recorded in the report.
    pub async fn bulk_install(
        &self,
        tools: &[&ToolSpec],
        installer: &Installer,
        cache: &ReleaseCache,
        progress: &dyn Progress,
    ) -> Result<BatchReport> {
        installer.layout().ensure_dirs()?;
        let mut report = BatchReport::default();
        for tool in tools {
            if self.cancelled(installer, tool, &mut report) {
                continue;
            }
            progress.started(tool);
            let outcome = match self.install_one(tool, installer, cache).await {
                Ok(InstallOutcome::Installed { version, .. }) => ToolOutcome::Installed { version },
                Ok(InstallOutcome::MismatchSkipped {
                    version,
                    manual_download,
                    ..
                }) => ToolOutcome::MismatchSkipped {
                    version,
                    manual_download,
                },
                Err(e) => {
                    warn!(tool = %tool.name, error = %e, "Install failed; continuing");
                    ToolOutcome::Failed(e)
                }
            };
            progress.finished(tool, &outcome);
            report.push(&tool.name, outcome);
        }
        Ok(report)
    }

    /// Upgrade each tool whose linked version differs from the latest.
    ///
    /// Tools already at the latest version are reported as
    /// [`ToolOutcome::UpToDate`]; tools not yet installed are installed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::bulk_install`].
    pub async fn bulk_upgrade(
        &self,
        tools: &[&ToolSpec],
        installer: &Installer,
        cache: &ReleaseCache,
        progress: &dyn Progress,
    ) -> Result<BatchReport> {
        installer.layout().ensure_dirs()?;
        // one slot per requested tool so the report keeps the caller's order
        let mut slots: Vec<Option<ToolOutcome>> = Vec::with_capacity(tools.len());
        let mut pending = Vec::new();

        for (index, tool) in tools.iter().enumerate() {
            if installer.http().cancellation().is_cancelled() {
                slots.push(Some(ToolOutcome::NotAttempted));
                continue;
            }
            match self.check_upgrade(tool, installer, cache).await {
                Ok(check) => {
                    progress.planned(tool, &check);
                    if check.needs_upgrade() {
                        pending.push((index, check.installed));
                        slots.push(None);
                    } else {
                        slots.push(Some(ToolOutcome::UpToDate { version: check.latest }));
                    }
                }
                Err(e) => {
                    warn!(tool = %tool.name, error = %e, "Could not determine versions; continuing");
                    let outcome = ToolOutcome::Failed(e);
                    progress.finished(tool, &outcome);
                    slots.push(Some(outcome));
                }
            }
        }

        let targets: Vec<&ToolSpec> = pending.iter().map(|(index, _)| tools[*index]).collect();
        let installed = self.bulk_install(&targets, installer, cache, &Relay(progress)).await?;
        for ((index, from), (_, outcome)) in pending.into_iter().zip(installed.entries) {
            let outcome = match (from, outcome) {
                (Some(from), ToolOutcome::Installed { version }) => ToolOutcome::Upgraded { from, to: version },
                (_, other) => other,
            };
            progress.finished(tools[index], &outcome);
            slots[index] = Some(outcome);
        }

        let mut report = BatchReport::default();
        for (tool, outcome) in tools.iter().zip(slots) {
            report.push(&tool.name, outcome.unwrap_or(ToolOutcome::NotAttempted));
        }
        Ok(report)
    }

    /// Remove tools, or the whole install root.
    ///
    /// # Errors
    ///
    /// For [`RemoveTarget::All`], returns the filesystem error of the single
    /// recursive delete. Per-tool failures are recorded in the report.
    pub fn remove(&self, target: RemoveTarget<'_>, layout: &Layout, progress: &dyn Progress) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        match target {
            RemoveTarget::All => {
                info!(root = ?layout.root_dir(), "Removing install root");
                layout.remove_all()?;
            }
            RemoveTarget::Tools(tools) => {
                for tool in tools {
                    progress.started(tool);
                    let outcome = match remove_tool(tool, layout) {
                        Ok(()) => ToolOutcome::Removed,
                        Err(e) => {
                            warn!(tool = %tool.name, error = %e, "Remove failed; continuing");
                            ToolOutcome::Failed(e)
                        }
                    };
                    progress.finished(tool, &outcome);
                    report.push(&tool.name, outcome);
                }
            }
        }
        Ok(report)
    }

    async fn install_one(&self, tool: &ToolSpec, installer: &Installer, cache: &ReleaseCache) -> Result<InstallOutcome> {
        let release = installer.http().cancellable(cache.latest_release(tool)).await?;
        installer.install(tool, &release).await
    }

    fn cancelled(&self, installer: &Installer, tool: &ToolSpec, report: &mut BatchReport) -> bool {
        if installer.http().cancellation().is_cancelled() {
            report.push(&tool.name, ToolOutcome::NotAttempted);
            true
        } else {
            false
        }
    }
}

fn remove_tool(tool: &ToolSpec, layout: &Layout) -> Result<()> {
    layout.remove_tool_dir(&tool.name)?;
    for link in tool.link_names() {
        layout.unlink(link)?;
    }
    info!(tool = %tool.name, "Removed");
    Ok(())
}

/// Forwards start events only; upgrade reports completion itself.
struct Relay<'a>(&'a dyn Progress);

impl Progress for Relay<'_> {
    fn started(&self, tool: &ToolSpec) {
        self.0.started(tool);
    }
}
