//! Tools published as GitHub release assets.

use backplane_core::signature::FEDORA_KEYRING_URL;
use backplane_core::{
    AssetSelector, Executable, ManifestFormat, MismatchPolicy, PlatformMatch, ToolSpec, Verification,
};
use backplane_source_github::GitHubSource;
use std::sync::Arc;

use crate::{CatalogConfig, SELF_TOOL};

fn repo(config: &CatalogConfig, owner: &str, name: &str) -> Arc<GitHubSource> {
    Arc::new(GitHubSource::new(owner, name, config.http.clone()).with_token(config.github_token.clone()))
}

/// A goreleaser-style project: one platform tarball plus a shared manifest.
fn tarball_with_manifest(
    name: &str,
    source: Arc<GitHubSource>,
    manifest: AssetSelector,
    executable: Executable,
) -> ToolSpec {
    ToolSpec::new(name, source)
        .with_primary(AssetSelector::for_platform().containing([".tar.gz"]))
        .with_verification(Verification::SharedManifest {
            selector: manifest,
            format: ManifestFormat::DigestThenName,
        })
        .with_executable(executable)
}

pub fn backplane_tools(config: &CatalogConfig) -> ToolSpec {
    tarball_with_manifest(
        SELF_TOOL,
        repo(config, "openshift", "backplane-tools"),
        AssetSelector::exact("checksums.txt"),
        Executable::Path("backplane-tools".into()),
    )
}

pub fn backplane_cli(config: &CatalogConfig) -> ToolSpec {
    tarball_with_manifest(
        "backplane-cli",
        repo(config, "openshift", "backplane-cli"),
        AssetSelector::exact("checksums.txt"),
        Executable::Path("ocm-backplane".into()),
    )
    .with_executable_name("ocm-backplane")
}

pub fn golangci_lint(config: &CatalogConfig) -> ToolSpec {
    // the archive holds a versioned top-level directory
    tarball_with_manifest(
        "golangci-lint",
        repo(config, "golangci", "golangci-lint"),
        AssetSelector::for_platform()
            .with_platform(PlatformMatch::None)
            .containing(["checksums.txt"]),
        Executable::Find("golangci-lint".into()),
    )
}

pub fn ocm_addons(config: &CatalogConfig) -> ToolSpec {
    tarball_with_manifest(
        "ocm-addons",
        repo(config, "mt-sre", "ocm-addons"),
        AssetSelector::exact("checksums.txt"),
        Executable::Path("ocm-addons".into()),
    )
}

pub fn osdctl(config: &CatalogConfig) -> ToolSpec {
    tarball_with_manifest(
        "osdctl",
        repo(config, "openshift", "osdctl"),
        AssetSelector::exact("sha256sum.txt"),
        Executable::Path("osdctl".into()),
    )
}

pub fn servicelogger(config: &CatalogConfig) -> ToolSpec {
    tarball_with_manifest(
        "servicelogger",
        repo(config, "geowa4", "servicelogger"),
        AssetSelector::exact("checksums.txt"),
        Executable::Find("servicelogger".into()),
    )
}

pub fn ocm(config: &CatalogConfig) -> ToolSpec {
    ToolSpec::new("ocm", repo(config, "openshift-online", "ocm-cli"))
        .with_primary(AssetSelector::for_platform().excluding(["sha256"]))
        .with_verification(Verification::InlineFile {
            selector: AssetSelector::for_platform().containing(["sha256"]),
        })
        .with_mismatch_policy(MismatchPolicy::WarnAndSkip)
}

pub fn rosa(config: &CatalogConfig) -> ToolSpec {
    // rosa also ships per-platform tarballs next to the raw binaries
    ToolSpec::new("rosa", repo(config, "openshift", "rosa"))
        .with_primary(AssetSelector::for_platform().excluding(["sha256", ".tar.gz", ".zip"]))
        .with_verification(Verification::InlineFile {
            selector: AssetSelector::for_platform()
                .containing(["sha256"])
                .excluding([".tar.gz", ".zip"]),
        })
}

pub fn yq(config: &CatalogConfig) -> ToolSpec {
    ToolSpec::new("yq", repo(config, "mikefarah", "yq"))
        .with_primary(AssetSelector::for_platform().excluding([".tar.gz", ".zip", "checksums"]))
        .with_verification(Verification::SharedManifest {
            selector: AssetSelector::exact("checksums"),
            format: ManifestFormat::NameThenDigests,
        })
}

pub fn butane(config: &CatalogConfig) -> ToolSpec {
    ToolSpec::new("butane", repo(config, "coreos", "butane"))
        .with_primary(AssetSelector::for_platform().excluding([".asc"]))
        .with_verification(Verification::GpgSignature {
            selector: AssetSelector::for_platform().containing([".asc"]),
            keyring_url: FEDORA_KEYRING_URL.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{LINUX_AMD64, assets, config};
    use backplane_core::{Arch, Os, Platform};

    fn primary(tool: &ToolSpec, names: &[&str], platform: Platform) -> String {
        tool.primary
            .select_one(&assets(names), platform, &tool.name, "primary")
            .unwrap()
            .name
            .clone()
    }

    fn companion(tool: &ToolSpec, names: &[&str], platform: Platform) -> String {
        let selector = match &tool.verification {
            Verification::InlineFile { selector }
            | Verification::SharedManifest { selector, .. }
            | Verification::GpgSignature { selector, .. } => selector,
            Verification::None => panic!("{} has no companion", tool.name),
        };
        selector
            .select_one(&assets(names), platform, &tool.name, "companion")
            .unwrap()
            .name
            .clone()
    }

    #[test]
    fn test_rosa_prefers_raw_binary_over_tarball() {
        let names = [
            "rosa-darwin-amd64",
            "rosa-darwin-amd64.sha256",
            "rosa-linux-amd64",
            "rosa-linux-amd64.sha256",
            "rosa_Linux_x86_64.tar.gz",
            "rosa_Linux_x86_64.tar.gz.sha256",
        ];
        let tool = rosa(&config());
        assert_eq!(primary(&tool, &names, LINUX_AMD64), "rosa-linux-amd64");
        assert_eq!(companion(&tool, &names, LINUX_AMD64), "rosa-linux-amd64.sha256");
    }

    #[test]
    fn test_yq_skips_archives_and_reads_name_keyed_manifest() {
        let names = [
            "checksums",
            "checksums_hashes_order",
            "yq_darwin_arm64",
            "yq_linux_amd64",
            "yq_linux_amd64.tar.gz",
            "yq_man_page_only.tar.gz",
        ];
        let tool = yq(&config());
        assert_eq!(primary(&tool, &names, LINUX_AMD64), "yq_linux_amd64");
        assert_eq!(
            primary(&tool, &names, Platform::new(Os::Darwin, Arch::Arm64)),
            "yq_darwin_arm64"
        );
        assert_eq!(companion(&tool, &names, LINUX_AMD64), "checksums");
        assert!(matches!(
            tool.verification,
            Verification::SharedManifest {
                format: ManifestFormat::NameThenDigests,
                ..
            }
        ));
    }

    #[test]
    fn test_butane_pairs_binary_with_signature() {
        let names = [
            "butane-aarch64-apple-darwin",
            "butane-aarch64-apple-darwin.asc",
            "butane-x86_64-unknown-linux-gnu",
            "butane-x86_64-unknown-linux-gnu.asc",
        ];
        let tool = butane(&config());
        assert_eq!(primary(&tool, &names, LINUX_AMD64), "butane-x86_64-unknown-linux-gnu");
        assert_eq!(
            companion(&tool, &names, LINUX_AMD64),
            "butane-x86_64-unknown-linux-gnu.asc"
        );
        assert_eq!(
            primary(&tool, &names, Platform::new(Os::Darwin, Arch::Arm64)),
            "butane-aarch64-apple-darwin"
        );
    }

    #[test]
    fn test_goreleaser_tools_pick_tarball_and_manifest() {
        let names = [
            "checksums.txt",
            "ocm-backplane_0.1.30_Darwin_arm64.tar.gz",
            "ocm-backplane_0.1.30_Linux_arm64.tar.gz",
            "ocm-backplane_0.1.30_Linux_x86_64.tar.gz",
        ];
        let tool = backplane_cli(&config());
        assert_eq!(tool.executable_name, "ocm-backplane");
        assert_eq!(
            primary(&tool, &names, LINUX_AMD64),
            "ocm-backplane_0.1.30_Linux_x86_64.tar.gz"
        );
        assert_eq!(companion(&tool, &names, LINUX_AMD64), "checksums.txt");
    }

    #[test]
    fn test_golangci_lint_ignores_packages() {
        let names = [
            "golangci-lint-1.57.2-checksums.txt",
            "golangci-lint-1.57.2-linux-amd64.deb",
            "golangci-lint-1.57.2-linux-amd64.rpm",
            "golangci-lint-1.57.2-linux-amd64.tar.gz",
            "golangci-lint-1.57.2-darwin-amd64.tar.gz",
        ];
        let tool = golangci_lint(&config());
        assert_eq!(
            primary(&tool, &names, LINUX_AMD64),
            "golangci-lint-1.57.2-linux-amd64.tar.gz"
        );
        assert_eq!(
            companion(&tool, &names, LINUX_AMD64),
            "golangci-lint-1.57.2-checksums.txt"
        );
        assert_eq!(tool.executable, Executable::Find("golangci-lint".into()));
    }

    #[test]
    fn test_servicelogger_picks_platform_tarball() {
        let names = [
            "checksums.txt",
            "servicelogger_Darwin_arm64.tar.gz",
            "servicelogger_Linux_arm64.tar.gz",
            "servicelogger_Linux_x86_64.tar.gz",
        ];
        let tool = servicelogger(&config());
        assert_eq!(primary(&tool, &names, LINUX_AMD64), "servicelogger_Linux_x86_64.tar.gz");
        assert_eq!(
            primary(&tool, &names, Platform::new(Os::Darwin, Arch::Arm64)),
            "servicelogger_Darwin_arm64.tar.gz"
        );
        assert_eq!(companion(&tool, &names, LINUX_AMD64), "checksums.txt");
    }

    #[test]
    fn test_ocm_tolerates_mismatch() {
        let tool = ocm(&config());
        assert_eq!(tool.on_mismatch, MismatchPolicy::WarnAndSkip);
        let names = ["ocm-linux-amd64", "ocm-linux-amd64.sha256", "ocm-linux-arm64"];
        assert_eq!(primary(&tool, &names, LINUX_AMD64), "ocm-linux-amd64");
    }
}
