//! GitHub Releases source for backplane-tools.
//!
//! Two flavours:
//! - [`GitHubSource`]: releases and their attached assets.
//! - [`TaggedUrlSource`]: the version is the repository's newest tag and the
//!   artifacts live on a vendor host, addressed by URL templates (aws-cli).

use async_trait::async_trait;
use backplane_core::source::asset_path;
use backplane_core::{Error, HttpClient, Platform, Release, ReleaseAsset, ReleaseSource, Result};
use reqwest::RequestBuilder;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Public GitHub REST API endpoint.
pub const GITHUB_API: &str = "https://api.github.com";

/// Release metadata from the API.
#[derive(Debug, Deserialize)]
struct ApiRelease {
    tag_name: String,
    assets: Vec<ApiAsset>,
}

/// Release asset from the API.
#[derive(Debug, Deserialize)]
struct ApiAsset {
    id: u64,
    name: String,
    size: u64,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
    name: String,
}

impl From<ApiRelease> for Release {
    fn from(r: ApiRelease) -> Self {
        Self {
            tag: r.tag_name,
            assets: r
                .assets
                .into_iter()
                .map(|a| ReleaseAsset {
                    name: a.name,
                    id: a.id.to_string(),
                    size: Some(a.size),
                    download_url: a.browser_download_url,
                })
                .collect(),
        }
    }
}

/// Releases of one GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubSource {
    owner: String,
    repo: String,
    http: HttpClient,
    api_base: String,
    token: Option<String>,
}

impl GitHubSource {
    /// Source for `owner/repo` on github.com.
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, http: HttpClient) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            http,
            api_base: GITHUB_API.to_string(),
            token: None,
        }
    }

    /// Use another API endpoint (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Authenticate API calls and downloads with `token`.
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }

    /// `owner/repo`.
    #[must_use]
    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let mut request = self
            .http
            .client()
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        debug!(%url, "Querying GitHub");
        let source = self.name();
        let response = self.http.send(self.request(url), &source).await?;
        self.http
            .cancellable(async {
                response
                    .json::<T>()
                    .await
                    .map_err(|e| Error::source_unavailable(&source, format!("unexpected response from {url}: {e}")))
            })
            .await
    }

    /// One page of releases, newest first.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] on transport, status or decode failure.
    pub async fn list_releases(&self, per_page: u8, page: u32) -> Result<Vec<Release>> {
        let url = format!(
            "{}/repos/{}/releases?per_page={per_page}&page={page}",
            self.api_base,
            self.slug()
        );
        let releases: Vec<ApiRelease> = self.get_json(&url).await?;
        Ok(releases.into_iter().map(Release::from).collect())
    }

    /// The release GitHub marks as latest.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] on transport, status or decode failure.
    pub async fn fetch_latest_release(&self) -> Result<Release> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, self.slug());
        let release: ApiRelease = self.get_json(&url).await?;
        info!(repo = %self.slug(), tag = %release.tag_name, "Fetched latest release");
        Ok(release.into())
    }

    /// The newest tag of the repository.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] on failure or when the repository has no tags.
    pub async fn fetch_latest_tag(&self) -> Result<String> {
        let url = format!("{}/repos/{}/tags?per_page=1", self.api_base, self.slug());
        let tags: Vec<ApiTag> = self.get_json(&url).await?;
        tags.into_iter()
            .next()
            .map(|t| t.name)
            .ok_or_else(|| Error::source_unavailable(self.name(), "repository has no tags"))
    }
}

#[async_trait]
impl ReleaseSource for GitHubSource {
    fn name(&self) -> String {
        format!("github.com/{}", self.slug())
    }

    async fn latest_release(&self) -> Result<Release> {
        self.fetch_latest_release().await
    }

    async fn download(&self, asset: &ReleaseAsset, dir: &Path) -> Result<PathBuf> {
        let dest = asset_path(dir, asset)?;
        self.http
            .download_request(self.request(&asset.download_url), &dest, &self.name())
            .await
    }
}

/// Versioned by a repository's newest tag, downloaded from URL templates.
///
/// Templates accept the placeholders of [`Platform::expand`]. The asset name
/// is the last path segment of the expanded URL.
#[derive(Debug, Clone)]
pub struct TaggedUrlSource {
    tags: GitHubSource,
    templates: Vec<String>,
    platform: Platform,
}

impl TaggedUrlSource {
    /// Source versioned by `tags`, serving `templates` for the host platform.
    #[must_use]
    pub fn new(tags: GitHubSource, templates: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            tags,
            templates: templates.into_iter().map(Into::into).collect(),
            platform: Platform::current(),
        }
    }

    /// Expand templates for another platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    fn assets_for(&self, version: &str) -> Vec<ReleaseAsset> {
        self.templates
            .iter()
            .map(|t| {
                let url = self.platform.expand(t, version);
                let name = url.rsplit('/').next().unwrap_or(url.as_str()).to_string();
                ReleaseAsset::new(name, url)
            })
            .collect()
    }
}

#[async_trait]
impl ReleaseSource for TaggedUrlSource {
    fn name(&self) -> String {
        format!("{} (tags)", self.tags.name())
    }

    async fn latest_release(&self) -> Result<Release> {
        let tag = self.tags.fetch_latest_tag().await?;
        Ok(Release {
            assets: self.assets_for(&tag),
            tag,
        })
    }

    async fn download(&self, asset: &ReleaseAsset, dir: &Path) -> Result<PathBuf> {
        let dest = asset_path(dir, asset)?;
        self.tags.http.download(&asset.download_url, &dest, &self.name()).await
    }
}
