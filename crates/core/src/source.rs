//! Release source trait.
//!
//! A source answers two questions for one tool: what is the latest release,
//! and how do I fetch one of its assets. Backends live in their own crates.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::asset::{Release, ReleaseAsset};
use crate::{Error, Result};

/// A backend publishing releases (GitHub, an HTTP mirror, a bucket).
#[async_trait]
pub trait ReleaseSource: Send + Sync + std::fmt::Debug {
    /// Identity used in logs and errors, e.g. `github.com/openshift/rosa`.
    fn name(&self) -> String;

    /// Fetch metadata of the newest release. Never cached across runs.
    ///
    /// The tag names the version directory and is what version comparisons
    /// use.
    async fn latest_release(&self) -> Result<Release>;

    /// Download `asset` into `dir`, keeping its published file name.
    async fn download(&self, asset: &ReleaseAsset, dir: &Path) -> Result<PathBuf>;

    /// Where a human can fetch `asset` manually.
    fn manual_download_url(&self, asset: &ReleaseAsset) -> String {
        asset.download_url.clone()
    }

    /// Download every asset into `dir`.
    ///
    /// All downloads are attempted; failures are collected into a single
    /// [`Error::Download`]. Cancellation stops immediately.
    async fn download_all(&self, assets: &[&ReleaseAsset], dir: &Path) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::with_capacity(assets.len());
        let mut failures = Vec::new();
        for asset in assets {
            match self.download(asset, dir).await {
                Ok(path) => paths.push(path),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    warn!(asset = %asset.name, error = %e, "Download failed");
                    failures.push(e);
                }
            }
        }
        if failures.is_empty() {
            Ok(paths)
        } else {
            Err(Error::Download { failures })
        }
    }
}

/// Local file path for `asset` inside `dir`.
///
/// # Errors
///
/// Returns [`Error::Configuration`] if the asset name is not a plain file name.
pub fn asset_path(dir: &Path, asset: &ReleaseAsset) -> Result<PathBuf> {
    let name = Path::new(&asset.name);
    match name.file_name() {
        Some(file) if file == name.as_os_str() => Ok(dir.join(file)),
        _ => Err(Error::configuration(format!(
            "asset name '{}' is not a plain file name",
            asset.name
        ))),
    }
}
