//! Verified installer.
//!
//! Installs one resolved release of one tool:
//!
//! 1. select exactly one primary asset and, per the verification strategy,
//!    exactly one companion (checksum file or signature)
//! 2. download the primary and companion into a staging directory
//! 3. verify the digest or signature
//! 4. unpack archives and write any wrapper script, still staged
//! 5. move the staged files into `<tool>/<tag>/`, reusing it if present
//! 6. relink `latest/`
//!
//! Nothing under `<tool>/<tag>/` or `latest/` changes until verification has
//! succeeded, so a working install is never replaced by an unverified one,
//! even when the same tag is installed again.

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::archive::{self, ArchiveKind};
use crate::asset::{Release, ReleaseAsset};
use crate::checksum;
use crate::http::HttpClient;
use crate::layout::Layout;
use crate::platform::Platform;
use crate::signature::Keyring;
use crate::tool::{Executable, MismatchPolicy, ToolSpec, Verification};
use crate::{Error, Result};

/// Result of a single install that did not error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// `latest/` now points at the new version.
    Installed {
        /// Installed release tag.
        version: String,
        /// File the `latest` symlink targets.
        target: PathBuf,
    },
    /// The digest did not match and the tool's policy is to warn; the
    /// downloaded files are kept aside and `latest/` is untouched.
    MismatchSkipped {
        /// Release tag that failed verification.
        version: String,
        /// Manual download location.
        manual_download: String,
        /// Directory holding the unverified files.
        kept: PathBuf,
    },
}

/// Installs releases into a [`Layout`].
#[derive(Debug, Clone)]
pub struct Installer {
    layout: Layout,
    platform: Platform,
    http: HttpClient,
    mismatch_override: Option<MismatchPolicy>,
}

impl Installer {
    /// Create an installer for the host platform.
    #[must_use]
    pub fn new(layout: Layout, http: HttpClient) -> Self {
        Self {
            layout,
            platform: Platform::current(),
            http,
            mismatch_override: None,
        }
    }

    /// Install for a platform other than the host's.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Apply `policy` to every tool, ignoring per-tool settings.
    #[must_use]
    pub fn with_mismatch_override(mut self, policy: Option<MismatchPolicy>) -> Self {
        self.mismatch_override = policy;
        self
    }

    /// The layout being installed into.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The target platform.
    #[must_use]
    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// The shared HTTP client.
    #[must_use]
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.http.cancellation().is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Install `release` of `tool`.
    ///
    /// # Errors
    ///
    /// Any error of the taxonomy; all are terminal for this tool.
    pub async fn install(&self, tool: &ToolSpec, release: &Release) -> Result<InstallOutcome> {
        let version = release.tag.as_str();
        info!(tool = %tool.name, %version, "Installing");

        let primary = tool
            .primary
            .select_one(&release.assets, self.platform, &tool.name, "primary")?;
        let companion = self.select_companion(tool, release)?;
        debug!(
            tool = %tool.name,
            primary = %primary.name,
            companion = ?companion.map(|c| &c.name),
            "Selected assets"
        );

        Layout::check_version(version)?;
        self.check_cancelled()?;
        let staging = self.layout.staging_dir(&tool.name)?;
        let staged = staging.path();

        let mut wanted = vec![primary];
        wanted.extend(companion);
        let paths = tool.source.download_all(&wanted, staged).await?;
        let primary_path = paths
            .first()
            .cloned()
            .ok_or_else(|| Error::asset_not_found(&tool.name, "primary", "download result"))?;
        let companion_path = paths.get(1).cloned();

        if let (Some(asset), Some(path)) = (companion, companion_path.as_deref()) {
            if let Some(manual_download) = self
                .verify(tool, primary, &primary_path, asset, path)
                .await?
            {
                let kept = self.layout.quarantine(staging, &tool.name, version)?;
                return Ok(InstallOutcome::MismatchSkipped {
                    version: version.to_string(),
                    manual_download,
                    kept,
                });
            }
        }

        if let Some(kind) = ArchiveKind::detect(&primary.name) {
            let dest = match &tool.unpack_into {
                Some(sub) => staged.join(sub),
                None => staged.to_path_buf(),
            };
            unpack_blocking(primary_path.clone(), kind, dest).await?;
        }

        // paths inside the staging directory, rebased onto the version directory
        let version_dir = self.layout.version_dir(&tool.name, version);
        let rebase = |path: &Path| -> PathBuf {
            path.strip_prefix(staged)
                .map_or_else(|_| path.to_path_buf(), |rel| version_dir.join(rel))
        };
        let executable = rebase(&self.resolve_executable(tool, staged, &primary_path)?);
        let target = match &tool.wrapper {
            Some(wrapper) => rebase(&write_wrapper(staged, &wrapper.file_name, &wrapper.template, &executable)?),
            None => executable,
        };

        self.check_cancelled()?;
        self.layout.promote(staged, &tool.name, version)?;
        drop(staging);

        let mut links = vec![(tool.executable_name.as_str(), target.clone())];
        links.extend(
            tool.extra_links
                .iter()
                .map(|extra| (extra.name.as_str(), version_dir.join(&extra.target))),
        );
        self.layout.relink_all(&links)?;

        info!(tool = %tool.name, %version, "Installed");
        Ok(InstallOutcome::Installed {
            version: version.to_string(),
            target,
        })
    }

    fn select_companion<'a>(&self, tool: &ToolSpec, release: &'a Release) -> Result<Option<&'a ReleaseAsset>> {
        let (selector, role) = match &tool.verification {
            Verification::None => return Ok(None),
            Verification::InlineFile { selector } | Verification::SharedManifest { selector, .. } => {
                (selector, "checksum")
            }
            Verification::GpgSignature { selector, .. } => (selector, "signature"),
        };
        selector
            .select_one(&release.assets, self.platform, &tool.name, role)
            .map(Some)
    }

    /// Verify the primary asset. `Ok(Some(url))` means a tolerated mismatch.
    async fn verify(
        &self,
        tool: &ToolSpec,
        primary: &ReleaseAsset,
        primary_path: &Path,
        companion: &ReleaseAsset,
        companion_path: &Path,
    ) -> Result<Option<String>> {
        let expected = match &tool.verification {
            Verification::None => return Ok(None),
            Verification::GpgSignature { keyring_url, .. } => {
                self.verify_signature(tool, primary, primary_path, companion_path, keyring_url)
                    .await?;
                return Ok(None);
            }
            Verification::InlineFile { .. } => {
                let text = read_text(companion_path).await?;
                checksum::inline_digest(&text).map(|d| vec![d])
            }
            Verification::SharedManifest { format, .. } => {
                let text = read_text(companion_path).await?;
                checksum::manifest_digests(&text, &primary.name, *format)
            }
        };
        let expected = expected.ok_or_else(|| {
            Error::asset_not_found(
                &tool.name,
                "checksum",
                format!("entry for '{}' in '{}'", primary.name, companion.name),
            )
        })?;

        let actual = checksum::sha256_file(primary_path).await?;
        if expected.iter().any(|e| checksum::digest_matches(e, &actual)) {
            info!(tool = %tool.name, asset = %primary.name, "Checksum verified");
            return Ok(None);
        }

        let manual_download = tool.source.manual_download_url(primary);
        match self.mismatch_override.unwrap_or(tool.on_mismatch) {
            MismatchPolicy::WarnAndSkip => {
                warn!(
                    tool = %tool.name,
                    asset = %primary.name,
                    url = %manual_download,
                    "Checksum does not match; leaving the current version linked"
                );
                Ok(Some(manual_download))
            }
            MismatchPolicy::Fail => Err(Error::ChecksumMismatch {
                tool: tool.name.clone(),
                asset: primary.name.clone(),
                expected: describe_expected(&expected),
                actual,
                manual_download: Some(format!(
                    "retry the installation; if the problem persists, download manually from {manual_download}"
                )),
            }),
        }
    }

    async fn verify_signature(
        &self,
        tool: &ToolSpec,
        primary: &ReleaseAsset,
        primary_path: &Path,
        signature_path: &Path,
        keyring_url: &str,
    ) -> Result<()> {
        let keyring_bytes = self.http.get_bytes(keyring_url, keyring_url).await?;
        let keyring = Keyring::parse(&keyring_bytes)?;
        let content = tokio::fs::read(primary_path)
            .await
            .map_err(|e| Error::filesystem("read", primary_path, e))?;
        let signature = read_text(signature_path).await?;
        keyring.verify_detached(&content, &signature, &tool.name, &primary.name)?;
        info!(tool = %tool.name, asset = %primary.name, keys = keyring.len(), "Signature verified");
        Ok(())
    }

    fn resolve_executable(&self, tool: &ToolSpec, version_dir: &Path, primary_path: &Path) -> Result<PathBuf> {
        match &tool.executable {
            Executable::Asset => Ok(primary_path.to_path_buf()),
            Executable::Path(rel) => {
                let path = version_dir.join(rel);
                if path.is_file() {
                    Ok(path)
                } else {
                    Err(Error::asset_not_found(
                        &tool.name,
                        "executable",
                        format!("'{}' in {}", rel, version_dir.display()),
                    ))
                }
            }
            Executable::Find(file_name) => archive::find_file(version_dir, file_name, &tool.name),
        }
    }
}

fn describe_expected(expected: &[String]) -> String {
    match expected {
        [single] => single.clone(),
        many => format!("one of [{}]", many.join(", ")),
    }
}

async fn read_text(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::filesystem("read", path, e))
}

async fn unpack_blocking(archive_path: PathBuf, kind: ArchiveKind, dest: PathBuf) -> Result<()> {
    let for_error = archive_path.clone();
    tokio::task::spawn_blocking(move || archive::unpack(&archive_path, kind, &dest))
        .await
        .map_err(|e| Error::unarchive(for_error, e.to_string()))?
}

fn write_wrapper(version_dir: &Path, file_name: &str, template: &str, executable: &Path) -> Result<PathBuf> {
    let path = version_dir.join(file_name);
    let body = template.replace("{exec}", &executable.display().to_string());
    std::fs::write(&path, body).map_err(|e| Error::filesystem("write wrapper script", &path, e))?;
    archive::set_mode(&path, 0o755)?;
    debug!(path = ?path, "Wrote wrapper script");
    Ok(path)
}
