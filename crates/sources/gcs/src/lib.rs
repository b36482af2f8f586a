//! Public object-storage bucket source for backplane-tools.
//!
//! Buckets have no notion of a release: every object under a prefix is a
//! candidate, and the newest build for the host is the lexicographically
//! greatest object name matching its OS and architecture.

use async_trait::async_trait;
use backplane_core::asset::match_arch_and_os;
use backplane_core::source::asset_path;
use backplane_core::{Error, HttpClient, Platform, Release, ReleaseAsset, ReleaseSource, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use url::Url;

/// Public storage endpoint.
pub const STORAGE_API: &str = "https://storage.googleapis.com";

const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// One page of the JSON object listing.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectAttrs>,
    next_page_token: Option<String>,
}

/// Object metadata. Only the name is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectAttrs {
    /// Full object name within the bucket.
    pub name: String,
    /// Object size as reported by the listing (a decimal string).
    #[serde(default)]
    pub size: Option<String>,
}

impl ObjectAttrs {
    fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

impl backplane_core::asset::Named for ObjectAttrs {
    fn name(&self) -> &str {
        self.file_name()
    }
}

/// Objects under a prefix of a public bucket.
#[derive(Debug, Clone)]
pub struct BucketSource {
    http: HttpClient,
    bucket: String,
    prefix: String,
    api_base: String,
    platform: Platform,
}

impl BucketSource {
    /// Source listing `prefix` in `bucket`.
    #[must_use]
    pub fn new(http: HttpClient, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            http,
            bucket: bucket.into(),
            prefix: prefix.into(),
            api_base: STORAGE_API.to_string(),
            platform: Platform::current(),
        }
    }

    /// Use another storage endpoint.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Match objects against another platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| Error::configuration(format!("invalid storage URL '{}': {e}", self.api_base)))?;
        url.path_segments_mut()
            .map_err(|()| Error::configuration(format!("storage URL '{}' cannot be a base", self.api_base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Every object whose name starts with `prefix`, following pagination.
    ///
    /// # Errors
    ///
    /// [`Error::SourceUnavailable`] on transport, status or decode failure.
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectAttrs>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            debug!(%url, "Listing bucket objects");
            let body = self.http.get_text(url.as_str(), &self.name()).await?;
            let page: ObjectList = serde_json::from_str(&body).map_err(|e| {
                Error::source_unavailable(self.name(), format!("unexpected listing from {url}: {e}"))
            })?;
            objects.extend(page.items);
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(objects)
    }

    /// Objects built for the configured platform.
    #[must_use]
    pub fn find_objects_for_platform<'a>(&self, objects: &'a [ObjectAttrs]) -> Vec<&'a ObjectAttrs> {
        match_arch_and_os(objects, self.platform)
    }

    /// Download `object` into `dir`, named after its last path segment.
    ///
    /// # Errors
    ///
    /// See [`HttpClient::download`].
    pub async fn download_object(&self, object: &ObjectAttrs, dir: &Path) -> Result<PathBuf> {
        let asset = self.to_asset(object)?;
        self.download(&asset, dir).await
    }

    fn to_asset(&self, object: &ObjectAttrs) -> Result<ReleaseAsset> {
        let mut segments = vec![self.bucket.as_str()];
        segments.extend(object.name.split('/'));
        let url = self.url(&segments)?;
        Ok(ReleaseAsset {
            size: object.size.as_deref().and_then(|s| s.parse().ok()),
            ..ReleaseAsset::new(object.file_name(), url.to_string())
        })
    }
}

/// Lexicographically greatest object.
#[must_use]
pub fn find_latest<'a>(objects: &[&'a ObjectAttrs]) -> Option<&'a ObjectAttrs> {
    objects.iter().copied().max_by(|a, b| a.name.cmp(&b.name))
}

#[async_trait]
impl ReleaseSource for BucketSource {
    fn name(&self) -> String {
        format!("gs://{}/{}", self.bucket, self.prefix)
    }

    async fn latest_release(&self) -> Result<Release> {
        let objects = self.list_objects(&self.prefix).await?;
        let matches = self.find_objects_for_platform(&objects);
        let latest = find_latest(&matches).ok_or_else(|| {
            Error::source_unavailable(
                self.name(),
                format!("no object for {} among {} listed", self.platform, objects.len()),
            )
        })?;
        let tag = latest
            .file_name()
            .strip_suffix(ARCHIVE_SUFFIX)
            .unwrap_or(latest.file_name())
            .to_string();
        info!(source = %self.name(), object = %latest.name, "Resolved latest bucket object");
        Ok(Release {
            tag,
            assets: vec![self.to_asset(latest)?],
        })
    }

    async fn download(&self, asset: &ReleaseAsset, dir: &Path) -> Result<PathBuf> {
        let dest = asset_path(dir, asset)?;
        self.http.download(&asset.download_url, &dest, &self.name()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backplane_core::http::DEFAULT_TIMEOUT;
    use backplane_core::{Arch, Os};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn object(name: &str) -> ObjectAttrs {
        ObjectAttrs {
            name: name.to_string(),
            size: None,
        }
    }

    fn gcloud(server: &MockServer) -> BucketSource {
        let http = HttpClient::new(DEFAULT_TIMEOUT, CancellationToken::new()).unwrap();
        BucketSource::new(http, "cloud-sdk-release", "google-cloud-cli")
            .with_api_base(server.uri())
            .with_platform(Platform::new(Os::Linux, Arch::Amd64))
    }

    #[test]
    fn test_find_latest_is_lexicographic() {
        let objects = [
            object("google-cloud-cli-470.0.0-linux-x86_64.tar.gz"),
            object("google-cloud-cli-471.0.0-linux-x86_64.tar.gz"),
            object("google-cloud-cli-469.0.0-linux-x86_64.tar.gz"),
        ];
        let refs: Vec<&ObjectAttrs> = objects.iter().collect();
        assert_eq!(
            find_latest(&refs).map(|o| o.name.as_str()),
            Some("google-cloud-cli-471.0.0-linux-x86_64.tar.gz")
        );
        assert!(find_latest(&[]).is_none());
    }

    #[tokio::test]
    async fn test_latest_release_follows_pages_and_filters_platform() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cloud-sdk-release/o"))
            .and(query_param("prefix", "google-cloud-cli"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items":[
                    {"name":"google-cloud-cli-470.0.0-linux-x86_64.tar.gz","size":"10"},
                    {"name":"google-cloud-cli-471.0.0-darwin-arm64.tar.gz"}
                ],"nextPageToken":"p2"}"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cloud-sdk-release/o"))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items":[
                    {"name":"google-cloud-cli-471.0.0-linux-x86_64.tar.gz","size":"12"},
                    {"name":"google-cloud-cli-471.0.0-linux-arm.tar.gz"}
                ]}"#,
            ))
            .mount(&server)
            .await;

        let release = gcloud(&server).latest_release().await.unwrap();
        assert_eq!(release.tag, "google-cloud-cli-471.0.0-linux-x86_64");
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].size, Some(12));
        assert_eq!(
            release.assets[0].download_url,
            format!(
                "{}/cloud-sdk-release/google-cloud-cli-471.0.0-linux-x86_64.tar.gz",
                server.uri()
            )
        );
    }

    #[tokio::test]
    async fn test_no_matching_object_is_source_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/storage/v1/b/cloud-sdk-release/o"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"items":[{"name":"google-cloud-cli-471.0.0-windows-x86_64.zip"}]}"#,
            ))
            .mount(&server)
            .await;

        let err = gcloud(&server).latest_release().await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_download_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cloud-sdk-release/nested/sdk.tar.gz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tgz".to_vec()))
            .mount(&server)
            .await;

        let tmp = TempDir::new().unwrap();
        let file = gcloud(&server)
            .download_object(&object("nested/sdk.tar.gz"), tmp.path())
            .await
            .unwrap();
        assert_eq!(file, tmp.path().join("sdk.tar.gz"));
    }
}
