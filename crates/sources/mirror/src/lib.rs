//! HTTP mirror source for backplane-tools.
//!
//! A mirror directory publishes a `release.txt` manifest whose `Version:`
//! line names the current release, next to the release artifacts. Asset
//! names are not listed anywhere, so they are derived from templates.

use async_trait::async_trait;
use backplane_core::source::asset_path;
use backplane_core::{Error, HttpClient, Platform, Release, ReleaseAsset, ReleaseSource, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Public OpenShift mirror.
pub const DEFAULT_MIRROR: &str = "http://mirror.openshift.com";

/// Manifest naming the current release.
pub const RELEASE_MANIFEST: &str = "release.txt";

/// Directory on an HTTP mirror.
#[derive(Debug, Clone)]
pub struct MirrorSource {
    http: HttpClient,
    base_url: String,
    slug: String,
    templates: Vec<String>,
    platform: Platform,
}

impl MirrorSource {
    /// Source rooted at `base_url` + `slug`.
    ///
    /// `slug` and `templates` may use the placeholders of [`Platform::expand`];
    /// the slug is expanded without a version.
    #[must_use]
    pub fn new(
        http: HttpClient,
        base_url: impl Into<String>,
        slug: impl Into<String>,
        templates: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            slug: slug.into(),
            templates: templates.into_iter().map(Into::into).collect(),
            platform: Platform::current(),
        }
    }

    /// Expand the slug and templates for another platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Absolute URL of `path` inside the mirror directory.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] when the base URL or slug is malformed.
    pub fn build_url(&self, path: &str) -> Result<Url> {
        let mut dir = self.platform.expand(&self.slug, "");
        if !dir.ends_with('/') {
            dir.push('/');
        }
        let base = Url::parse(&self.base_url)
            .map_err(|e| Error::configuration(format!("invalid mirror URL '{}': {e}", self.base_url)))?;
        base.join(&dir)
            .and_then(|d| d.join(path))
            .map_err(|e| Error::configuration(format!("invalid mirror path '{dir}{path}': {e}")))
    }

    /// Text of a file in the mirror directory.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] on transport or status failure.
    pub async fn get_file_contents(&self, path: &str) -> Result<String> {
        let url = self.build_url(path)?;
        self.http.get_text(url.as_str(), &self.name()).await
    }

    /// Download a file from the mirror directory into `dir`.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::download`].
    pub async fn download_file(&self, path: &str, dir: &Path) -> Result<PathBuf> {
        let asset = ReleaseAsset::new(path, self.build_url(path)?.to_string());
        self.download(&asset, dir).await
    }

    /// Version named by the mirror's release manifest.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] when the manifest cannot be fetched or has
    /// no well-formed `Version:` line.
    pub async fn latest_version(&self) -> Result<String> {
        let manifest = self.get_file_contents(RELEASE_MANIFEST).await?;
        parse_version(&manifest).ok_or_else(|| {
            Error::source_unavailable(
                self.name(),
                format!("{RELEASE_MANIFEST} has no 'Version: <version>' line"),
            )
        })
    }
}

/// Extract the version from a `release.txt` body.
///
/// The line must consist of exactly `Version:` and one value.
#[must_use]
pub fn parse_version(manifest: &str) -> Option<String> {
    manifest.lines().find_map(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["Version:", version] => Some((*version).to_string()),
            _ => None,
        }
    })
}

#[async_trait]
impl ReleaseSource for MirrorSource {
    fn name(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            self.platform.expand(&self.slug, "")
        )
    }

    async fn latest_release(&self) -> Result<Release> {
        let version = self.latest_version().await?;
        info!(source = %self.name(), %version, "Resolved mirror release");
        let assets = self
            .templates
            .iter()
            .map(|t| {
                let name = self.platform.expand(t, &version);
                let url = self.build_url(&name)?;
                Ok(ReleaseAsset::new(name, url.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Release { tag: version, assets })
    }

    async fn download(&self, asset: &ReleaseAsset, dir: &Path) -> Result<PathBuf> {
        let dest = asset_path(dir, asset)?;
        debug!(url = %asset.download_url, "Downloading from mirror");
        self.http.download(&asset.download_url, &dest, &self.name()).await
    }
}
