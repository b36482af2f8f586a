//! The tools managed by backplane-tools.
//!
//! Each vendor module knows how its project publishes releases and turns
//! that into a [`ToolSpec`]. [`default_registry`] assembles them.

mod aws;
mod gcloud;
mod github;
mod oc;

use backplane_core::{HttpClient, Platform, Registry, Result};
use tracing::debug;

/// Name under which backplane-tools manages itself.
pub const SELF_TOOL: &str = "backplane-tools";

/// Proxy the aws wrapper routes traffic through.
pub const DEFAULT_AWS_PROXY: &str = "squid.corp.redhat.com:3128";

/// Settings shared by every catalog entry.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Client used by every source.
    pub http: HttpClient,
    /// Token for GitHub API calls.
    pub github_token: Option<String>,
    /// Root of the OpenShift client mirror.
    pub mirror_base_url: String,
    /// `host:port` of the proxy used by the aws wrapper.
    pub aws_proxy: String,
    /// Platform assets are selected for.
    pub platform: Platform,
}

impl CatalogConfig {
    /// Defaults for the host platform.
    #[must_use]
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            github_token: None,
            mirror_base_url: backplane_source_mirror::DEFAULT_MIRROR.to_string(),
            aws_proxy: DEFAULT_AWS_PROXY.to_string(),
            platform: Platform::current(),
        }
    }
}

/// Every supported tool, in alphabetical order.
///
/// # Errors
///
/// Returns [`backplane_core::Error::Configuration`] if two entries collide.
pub fn default_registry(config: &CatalogConfig) -> Result<Registry> {
    let mut registry = Registry::new();
    registry.register(aws::aws(config))?;
    registry.register(github::backplane_cli(config))?;
    registry.register(github::backplane_tools(config))?;
    registry.register(github::butane(config))?;
    registry.register(gcloud::gcloud(config))?;
    registry.register(github::golangci_lint(config))?;
    registry.register(oc::oc(config))?;
    registry.register(github::ocm(config))?;
    registry.register(github::ocm_addons(config))?;
    registry.register(github::osdctl(config))?;
    registry.register(github::rosa(config))?;
    registry.register(github::servicelogger(config))?;
    registry.register(github::yq(config))?;
    debug!(tools = registry.len(), platform = %config.platform, "Catalog assembled");
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod test_support {
    use backplane_core::http::DEFAULT_TIMEOUT;
    use backplane_core::{Arch, HttpClient, Os, Platform, ReleaseAsset};
    use tokio_util::sync::CancellationToken;

    use crate::CatalogConfig;

    pub const LINUX_AMD64: Platform = Platform {
        os: Os::Linux,
        arch: Arch::Amd64,
    };

    pub fn config() -> CatalogConfig {
        let http = HttpClient::new(DEFAULT_TIMEOUT, CancellationToken::new()).unwrap();
        CatalogConfig {
            platform: LINUX_AMD64,
            ..CatalogConfig::new(http)
        }
    }

    pub fn assets(names: &[&str]) -> Vec<ReleaseAsset> {
        names
            .iter()
            .map(|n| ReleaseAsset::new(*n, format!("https://example.invalid/{n}")))
            .collect()
    }
}
