//! Declarative per-tool install recipe.
//!
//! A [`ToolSpec`] captures how a vendor publishes one tool: where releases
//! come from, which asset is the payload, how it is verified, and which file
//! inside the version directory the `latest` symlink should target.

use std::fmt;
use std::sync::Arc;

use crate::asset::AssetSelector;
use crate::checksum::ManifestFormat;
use crate::source::ReleaseSource;

/// How the primary asset's integrity is established.
#[derive(Debug, Clone)]
pub enum Verification {
    /// Nothing to verify against.
    None,
    /// A companion file per asset whose first token is the digest.
    InlineFile {
        /// Selects the companion checksum asset.
        selector: AssetSelector,
    },
    /// One checksum file listing every asset of the release.
    SharedManifest {
        /// Selects the manifest asset.
        selector: AssetSelector,
        /// Line layout of the manifest.
        format: ManifestFormat,
    },
    /// A detached ASCII-armored signature checked against a keyring.
    GpgSignature {
        /// Selects the signature asset.
        selector: AssetSelector,
        /// Where the trusted keyring is published.
        keyring_url: String,
    },
}

impl Verification {
    /// Short label for logs.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::InlineFile { .. } => "inline checksum",
            Self::SharedManifest { .. } => "checksum manifest",
            Self::GpgSignature { .. } => "gpg signature",
        }
    }
}

/// What to do when a digest does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Abort before relinking and report an error.
    #[default]
    Fail,
    /// Warn, leave the downloaded files in place, and skip relinking.
    WarnAndSkip,
}

/// Which file the `latest` symlink targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Executable {
    /// The downloaded primary asset itself (raw binary releases).
    #[default]
    Asset,
    /// A fixed path relative to the version directory.
    Path(String),
    /// The single file with this name anywhere in the version directory.
    Find(String),
}

/// An additional `latest/` symlink owned by a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraLink {
    /// Name under `latest/`.
    pub name: String,
    /// Target relative to the version directory.
    pub target: String,
}

/// A generated launcher placed in the version directory.
///
/// `{exec}` in the template is replaced with the absolute path of the real
/// executable; the `latest` symlink then targets the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrapperScript {
    /// File name of the script within the version directory.
    pub file_name: String,
    /// Script body.
    pub template: String,
}

/// Static description of one installable tool.
#[derive(Clone)]
pub struct ToolSpec {
    /// Registry key, shown to users.
    pub name: String,
    /// Name of the `latest/` symlink. Defaults to `name`.
    pub executable_name: String,
    /// Where releases are published.
    pub source: Arc<dyn ReleaseSource>,
    /// Selects the binary or archive to install.
    pub primary: AssetSelector,
    /// How the primary asset is verified.
    pub verification: Verification,
    /// Behaviour on digest mismatch.
    pub on_mismatch: MismatchPolicy,
    /// What the symlink targets.
    pub executable: Executable,
    /// Extract archives into this sub-directory of the version directory.
    pub unpack_into: Option<String>,
    /// Additional symlinks.
    pub extra_links: Vec<ExtraLink>,
    /// Optional launcher script.
    pub wrapper: Option<WrapperScript>,
}

impl ToolSpec {
    /// A tool installing the platform-matching raw binary from `source`, unverified.
    #[must_use]
    pub fn new(name: impl Into<String>, source: Arc<dyn ReleaseSource>) -> Self {
        let name = name.into();
        Self {
            executable_name: name.clone(),
            name,
            source,
            primary: AssetSelector::for_platform(),
            verification: Verification::None,
            on_mismatch: MismatchPolicy::Fail,
            executable: Executable::Asset,
            unpack_into: None,
            extra_links: Vec::new(),
            wrapper: None,
        }
    }

    /// Override the symlink name.
    #[must_use]
    pub fn with_executable_name(mut self, name: impl Into<String>) -> Self {
        self.executable_name = name.into();
        self
    }

    /// Set the primary asset selector.
    #[must_use]
    pub fn with_primary(mut self, selector: AssetSelector) -> Self {
        self.primary = selector;
        self
    }

    /// Set the verification strategy.
    #[must_use]
    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    /// Set the mismatch policy.
    #[must_use]
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.on_mismatch = policy;
        self
    }

    /// Set what the symlink targets.
    #[must_use]
    pub fn with_executable(mut self, executable: Executable) -> Self {
        self.executable = executable;
        self
    }

    /// Extract archives into a sub-directory.
    #[must_use]
    pub fn with_unpack_into(mut self, dir: impl Into<String>) -> Self {
        self.unpack_into = Some(dir.into());
        self
    }

    /// Add an extra `latest/` symlink.
    #[must_use]
    pub fn with_extra_link(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.extra_links.push(ExtraLink {
            name: name.into(),
            target: target.into(),
        });
        self
    }

    /// Launch through a generated wrapper script.
    #[must_use]
    pub fn with_wrapper(mut self, file_name: impl Into<String>, template: impl Into<String>) -> Self {
        self.wrapper = Some(WrapperScript {
            file_name: file_name.into(),
            template: template.into(),
        });
        self
    }

    /// Every `latest/` entry this tool owns.
    pub fn link_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.executable_name.as_str())
            .chain(self.extra_links.iter().map(|l| l.name.as_str()))
    }
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("executable_name", &self.executable_name)
            .field("source", &self.source.name())
            .field("verification", &self.verification.label())
            .field("on_mismatch", &self.on_mismatch)
            .field("executable", &self.executable)
            .finish_non_exhaustive()
    }
}
