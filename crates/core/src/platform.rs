//! Host platform detection and vendor naming aliases.
//!
//! Vendors disagree on how to spell an OS or CPU architecture in asset names
//! (`amd64` vs `x86_64`, `darwin` vs `mac`). Each canonical value carries its
//! alias table so matching is symmetric regardless of which spelling a
//! release uses.

use serde::{Deserialize, Serialize};

/// Platform identifier combining OS and architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
}

impl Platform {
    /// Create a new platform.
    #[must_use]
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Get the current platform.
    #[must_use]
    pub fn current() -> Self {
        Self {
            os: Os::current(),
            arch: Arch::current(),
        }
    }

    /// Parse from string like "darwin-arm64" or "linux/amd64".
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let (os, arch) = s.split_once(['-', '/'])?;
        Some(Self {
            os: Os::parse(os)?,
            arch: Arch::parse(arch)?,
        })
    }

    /// Expand `{version}`, `{os}`, `{mirror_os}`, `{arch}` and `{uname_arch}`
    /// placeholders in an asset name or URL template.
    #[must_use]
    pub fn expand(&self, template: &str, version: &str) -> String {
        template
            .replace("{version}", version)
            .replace("{mirror_os}", self.os.mirror_name())
            .replace("{os}", self.os.canonical())
            .replace("{uname_arch}", self.arch.uname())
            .replace("{arch}", self.arch.canonical())
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.arch)
    }
}

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// macOS.
    Darwin,
    /// Linux.
    Linux,
}

impl Os {
    /// Get the current OS.
    #[must_use]
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        return Self::Darwin;
        #[cfg(target_os = "linux")]
        return Self::Linux;
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        compile_error!("Unsupported OS");
    }

    /// Parse from string, accepting any alias.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "darwin" | "mac" | "macos" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            _ => None,
        }
    }

    /// Canonical name, as used by Go-style release assets.
    #[must_use]
    pub fn canonical(self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
        }
    }

    /// Canonical name followed by every known alias.
    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Darwin => &["darwin", "mac"],
            Self::Linux => &["linux"],
        }
    }

    /// Name used by mirror.openshift.com.
    #[must_use]
    pub fn mirror_name(self) -> &'static str {
        match self {
            Self::Darwin => "mac",
            Self::Linux => "linux",
        }
    }
}

impl std::fmt::Display for Os {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical())
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit ARM.
    Arm64,
    /// 64-bit x86.
    Amd64,
}

impl Arch {
    /// Get the current architecture.
    #[must_use]
    pub fn current() -> Self {
        #[cfg(target_arch = "aarch64")]
        return Self::Arm64;
        #[cfg(target_arch = "x86_64")]
        return Self::Amd64;
        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        compile_error!("Unsupported architecture");
    }

    /// Parse from string, accepting any alias.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Some(Self::Arm64),
            "amd64" | "x86_64" => Some(Self::Amd64),
            _ => None,
        }
    }

    /// Canonical name, as used by Go-style release assets.
    #[must_use]
    pub fn canonical(self) -> &'static str {
        match self {
            Self::Arm64 => "arm64",
            Self::Amd64 => "amd64",
        }
    }

    /// Canonical name followed by every known alias.
    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Arm64 => &["arm64", "aarch64"],
            Self::Amd64 => &["amd64", "x86_64"],
        }
    }

    /// Name reported by `uname -m`.
    #[must_use]
    pub fn uname(self) -> &'static str {
        match self {
            Self::Arm64 => "aarch64",
            Self::Amd64 => "x86_64",
        }
    }
}

impl std::fmt::Display for Arch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.canonical())
    }
}
