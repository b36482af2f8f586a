//! Error taxonomy for tool resolution and installation.
//!
//! Every variant is terminal for the single tool being processed. Batch
//! operations in [`crate::Registry`] catch these per tool and keep going.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for backplane-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the asset matcher, verified installer and registry.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The release source could not be reached or answered with an error.
    #[error("source '{source_name}' unavailable: {message}")]
    #[diagnostic(code(backplane::source::unavailable))]
    SourceUnavailable {
        /// Human readable source identity (e.g. `openshift/rosa`).
        source_name: String,
        /// What went wrong.
        message: String,
    },

    /// No asset matched the selection criteria.
    #[error("no {role} asset found for '{tool}' ({criteria})")]
    #[diagnostic(
        code(backplane::asset::not_found),
        help("the release may not publish a build for this OS/architecture")
    )]
    AssetNotFound {
        /// Tool being installed.
        tool: String,
        /// `primary`, `checksum` or `signature`.
        role: String,
        /// Description of the selector that found nothing.
        criteria: String,
    },

    /// More than one asset matched where exactly one was expected.
    #[error("ambiguous {role} asset for '{tool}': expected 1 match, got {}: {}", matches.len(), matches.join(", "))]
    #[diagnostic(code(backplane::asset::ambiguous))]
    AmbiguousAsset {
        /// Tool being installed.
        tool: String,
        /// `primary`, `checksum` or `signature`.
        role: String,
        /// Names of every matching asset.
        matches: Vec<String>,
    },

    /// The computed digest does not equal the published one.
    #[error("checksum for '{asset}' does not match: expected '{expected}', got '{actual}'")]
    #[diagnostic(code(backplane::verify::checksum_mismatch))]
    ChecksumMismatch {
        /// Tool being installed.
        tool: String,
        /// Asset file name.
        asset: String,
        /// Digest published by the vendor.
        expected: String,
        /// Digest computed locally.
        actual: String,
        /// Manual download location offered as a recovery hint.
        #[help]
        manual_download: Option<String>,
    },

    /// The detached signature does not verify against the trusted keyring.
    #[error("signature verification failed for '{asset}': {message}")]
    #[diagnostic(code(backplane::verify::signature_invalid))]
    SignatureInvalid {
        /// Tool being installed.
        tool: String,
        /// Asset file name.
        asset: String,
        /// Underlying verifier message.
        message: String,
    },

    /// A filesystem operation failed.
    #[error("failed to {operation} '{}': {source}", path.display())]
    #[diagnostic(
        code(backplane::fs),
        help("check file permissions and available disk space")
    )]
    Filesystem {
        /// Operation that failed (e.g. `create directory`).
        operation: String,
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An archive could not be unpacked.
    #[error("failed to unpack '{}': {message}", archive.display())]
    #[diagnostic(code(backplane::unarchive))]
    Unarchive {
        /// Archive being unpacked.
        archive: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// Invalid static configuration (duplicate tool, bad regex, bad config file).
    #[error("configuration error: {message}")]
    #[diagnostic(code(backplane::config))]
    Configuration {
        /// What is wrong.
        message: String,
    },

    /// One or more assets failed to download. All assets were attempted.
    #[error("failed to download one or more assets: {}", failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    #[diagnostic(code(backplane::source::download))]
    Download {
        /// Every per-asset failure, in download order.
        failures: Vec<Error>,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    #[diagnostic(code(backplane::cancelled))]
    Cancelled,
}

impl Error {
    /// Create a source-unavailable error.
    #[must_use]
    pub fn source_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create an asset-not-found error.
    #[must_use]
    pub fn asset_not_found(
        tool: impl Into<String>,
        role: impl Into<String>,
        criteria: impl Into<String>,
    ) -> Self {
        Self::AssetNotFound {
            tool: tool.into(),
            role: role.into(),
            criteria: criteria.into(),
        }
    }

    /// Create an ambiguous-asset error.
    #[must_use]
    pub fn ambiguous_asset(tool: impl Into<String>, role: impl Into<String>, matches: Vec<String>) -> Self {
        Self::AmbiguousAsset {
            tool: tool.into(),
            role: role.into(),
            matches,
        }
    }

    /// Wrap an I/O error with the operation and path it came from.
    #[must_use]
    pub fn filesystem(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an unarchive error.
    #[must_use]
    pub fn unarchive(archive: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Unarchive {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a signature-invalid error.
    #[must_use]
    pub fn signature_invalid(
        tool: impl Into<String>,
        asset: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SignatureInvalid {
            tool: tool.into(),
            asset: asset.into(),
            message: message.into(),
        }
    }

    /// Short machine-friendly kind, used in batch reports and JSON output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::AssetNotFound { .. } => "asset_not_found",
            Self::AmbiguousAsset { .. } => "ambiguous_asset",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::SignatureInvalid { .. } => "signature_invalid",
            Self::Filesystem { .. } => "filesystem",
            Self::Unarchive { .. } => "unarchive",
            Self::Configuration { .. } => "configuration",
            Self::Download { .. } => "download",
            Self::Cancelled => "cancelled",
        }
    }
}
