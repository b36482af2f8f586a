//! Core of backplane-tools.
//!
//! Selects release assets for the host platform, verifies and installs them
//! into versioned directories, and tracks which version each tool has linked
//! in the shared `latest/` directory.
//!
//! Release backends implement [`ReleaseSource`] in their own crates; the tool
//! catalog is assembled from [`ToolSpec`] values into a [`Registry`].

pub mod archive;
pub mod asset;
pub mod checksum;
pub mod error;
pub mod http;
pub mod installer;
pub mod layout;
pub mod platform;
pub mod registry;
pub mod signature;
pub mod source;
pub mod tool;

pub use asset::{AssetSelector, PlatformMatch, Release, ReleaseAsset};
pub use checksum::ManifestFormat;
pub use error::{Error, Result};
pub use http::HttpClient;
pub use installer::{InstallOutcome, Installer};
pub use layout::Layout;
pub use platform::{Arch, Os, Platform};
pub use registry::{BatchReport, Progress, Registry, ReleaseCache, RemoveTarget, Silent, ToolOutcome, UpgradeCheck};
pub use source::ReleaseSource;
pub use tool::{Executable, MismatchPolicy, ToolSpec, Verification};
