//! User configuration.
//!
//! Read from `$XDG_CONFIG_HOME/backplane-tools/config.toml` (or `--config`).
//! A missing default file is not an error; every key has a default.

use backplane_core::{Layout, MismatchPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cli::CliError;

/// Overrides the install root.
pub const ROOT_ENV: &str = "BACKPLANE_TOOLS_ROOT";

/// Environment variables consulted for a GitHub token, in order.
pub const TOKEN_ENVS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Global checksum mismatch override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MismatchSetting {
    /// Abort the tool's install.
    Fail,
    /// Warn and keep the current link.
    Warn,
}

impl From<MismatchSetting> for MismatchPolicy {
    fn from(setting: MismatchSetting) -> Self {
        match setting {
            MismatchSetting::Fail => Self::Fail,
            MismatchSetting::Warn => Self::WarnAndSkip,
        }
    }
}

/// Contents of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Where tools are installed.
    pub install_root: Option<PathBuf>,
    /// Per-request HTTP timeout.
    pub http_timeout_secs: Option<u64>,
    /// Overrides every tool's mismatch policy.
    pub checksum_mismatch: Option<MismatchSetting>,
    /// Token for GitHub API calls.
    pub github_token: Option<String>,
    /// `host:port` of the proxy used by the aws wrapper.
    pub aws_proxy: Option<String>,
    /// Root of the OpenShift client mirror.
    pub mirror_base_url: Option<String>,
}

impl Config {
    /// Default location of the config file.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("backplane-tools").join("config.toml"))
    }

    /// Load `explicit`, or the default file if it exists.
    ///
    /// # Errors
    ///
    /// An explicit path that cannot be read, or any file that does not parse.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.is_file() => path,
                _ => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)
            .map_err(|e| CliError::config(format!("failed to read {}: {e}", path.display())))?;
        Self::parse(&text).map_err(|e| e.with_help(format!("in {}", path.display())))
    }

    /// Parse config file contents.
    ///
    /// # Errors
    ///
    /// Invalid TOML, unknown keys or bad values.
    pub fn parse(text: &str) -> Result<Self, CliError> {
        toml::from_str(text).map_err(|e| CliError::config(format!("invalid configuration: {e}")))
    }

    /// Install root: `BACKPLANE_TOOLS_ROOT`, then the file, then `~/.local/bin/backplane`.
    ///
    /// # Errors
    ///
    /// No home directory to derive the default from.
    pub fn install_root(&self) -> Result<PathBuf, CliError> {
        let root = match std::env::var_os(ROOT_ENV).filter(|v| !v.is_empty()) {
            Some(root) => PathBuf::from(root),
            None => match &self.install_root {
                Some(root) => root.clone(),
                None => Layout::default_root()?,
            },
        };
        // link targets and version lookups must not depend on the working directory
        std::path::absolute(&root).map_err(|e| {
            CliError::config(format!("cannot resolve install root '{}': {e}", root.display()))
        })
    }

    /// Per-request HTTP timeout.
    #[must_use]
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS))
    }

    /// GitHub token from the file, then `GITHUB_TOKEN`, then `GH_TOKEN`.
    #[must_use]
    pub fn github_token(&self) -> Option<String> {
        self.github_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| {
                TOKEN_ENVS
                    .iter()
                    .find_map(|var| std::env::var(var).ok().filter(|t| !t.is_empty()))
            })
    }

    /// Global mismatch override, if configured.
    #[must_use]
    pub fn mismatch_override(&self) -> Option<MismatchPolicy> {
        self.checksum_mismatch.map(MismatchPolicy::from)
    }
}
