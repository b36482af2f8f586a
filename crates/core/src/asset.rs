//! Asset matcher: pure filtering over release asset names.
//!
//! Every filter is side-effect free and returns the matching subset in the
//! order the release listed it. Picking "the one" asset for a role always goes
//! through [`exactly_one`], which refuses to guess when zero or several assets
//! survive filtering.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::platform::{Arch, Os, Platform};
use crate::{Error, Result};

/// A single named downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name as published by the source.
    pub name: String,
    /// Source-specific identifier.
    pub id: String,
    /// Size in bytes, when the source reports it.
    pub size: Option<u64>,
    /// Where the asset can be fetched from.
    pub download_url: String,
}

impl ReleaseAsset {
    /// Create an asset whose identifier is its name.
    #[must_use]
    pub fn new(name: impl Into<String>, download_url: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            size: None,
            download_url: download_url.into(),
        }
    }
}

/// A tagged publication point bundling named assets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Version identifier; names the version directory.
    pub tag: String,
    /// Assets in source order.
    pub assets: Vec<ReleaseAsset>,
}

/// Anything with a name the matcher can test.
pub trait Named {
    /// The name to match against.
    fn name(&self) -> &str;
}

impl Named for ReleaseAsset {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for String {
    fn name(&self) -> &str {
        self
    }
}

impl Named for &str {
    fn name(&self) -> &str {
        self
    }
}

fn contains_any_ci(name: &str, terms: &[&str]) -> bool {
    let lower = name.to_lowercase();
    terms.iter().any(|t| lower.contains(&t.to_lowercase()))
}

/// Keep assets whose name contains `arch` or one of its aliases (case-insensitive).
pub fn match_arch<'a, T, I>(assets: I, arch: Arch) -> Vec<&'a T>
where
    T: Named + 'a,
    I: IntoIterator<Item = &'a T>,
{
    assets
        .into_iter()
        .filter(|a| contains_any_ci(a.name(), arch.aliases()))
        .collect()
}

/// Keep assets whose name contains `os` or one of its aliases (case-insensitive).
pub fn match_os<'a, T, I>(assets: I, os: Os) -> Vec<&'a T>
where
    T: Named + 'a,
    I: IntoIterator<Item = &'a T>,
{
    assets
        .into_iter()
        .filter(|a| contains_any_ci(a.name(), os.aliases()))
        .collect()
}

/// Keep assets matching both the architecture and the OS of `platform`.
pub fn match_arch_and_os<'a, T, I>(assets: I, platform: Platform) -> Vec<&'a T>
where
    T: Named + 'a,
    I: IntoIterator<Item = &'a T>,
{
    match_os(match_arch(assets, platform.arch), platform.os)
}

/// Keep assets containing every term.
pub fn containing<'a, T, I, S>(assets: I, terms: &[S]) -> Vec<&'a T>
where
    T: Named + 'a,
    I: IntoIterator<Item = &'a T>,
    S: AsRef<str>,
{
    assets
        .into_iter()
        .filter(|a| terms.iter().all(|t| a.name().contains(t.as_ref())))
        .collect()
}

/// Keep assets containing none of the terms.
pub fn excluding_any<'a, T, I, S>(assets: I, terms: &[S]) -> Vec<&'a T>
where
    T: Named + 'a,
    I: IntoIterator<Item = &'a T>,
    S: AsRef<str>,
{
    assets
        .into_iter()
        .filter(|a| !terms.iter().any(|t| a.name().contains(t.as_ref())))
        .collect()
}

/// Keep assets whose name matches `pattern`.
///
/// # Errors
///
/// Returns a [`Error::Configuration`] if `pattern` is not a valid regex.
pub fn matching_pattern<'a, T, I>(assets: I, pattern: &str) -> Result<Vec<&'a T>>
where
    T: Named + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let re = compile_pattern(pattern)?;
    Ok(assets.into_iter().filter(|a| re.is_match(a.name())).collect())
}

fn compile_pattern(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| Error::configuration(format!("invalid asset pattern '{pattern}': {e}")))
}

/// Require exactly one candidate.
///
/// # Errors
///
/// [`Error::AssetNotFound`] for zero candidates and [`Error::AmbiguousAsset`]
/// for more than one.
pub fn exactly_one<'a, T: Named>(
    candidates: Vec<&'a T>,
    tool: &str,
    role: &str,
    criteria: &str,
) -> Result<&'a T> {
    match candidates.as_slice() {
        [one] => Ok(*one),
        [] => Err(Error::asset_not_found(tool, role, criteria)),
        many => Err(Error::ambiguous_asset(
            tool,
            role,
            many.iter().map(|a| a.name().to_string()).collect(),
        )),
    }
}

/// How an asset name must reference the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlatformMatch {
    /// Both OS and architecture must appear.
    #[default]
    Platform,
    /// Only the OS must appear (universal macOS binaries, manifests per OS).
    OsOnly,
    /// No platform filtering; the source already resolved the platform.
    None,
}

/// Declarative predicate selecting one asset role out of a release.
#[derive(Debug, Clone, Default)]
pub struct AssetSelector {
    platform: PlatformMatch,
    contains: Vec<String>,
    excludes: Vec<String>,
    pattern: Option<Regex>,
    exact: Option<String>,
}

impl AssetSelector {
    /// Selector matching the host OS and architecture.
    #[must_use]
    pub fn for_platform() -> Self {
        Self::default()
    }

    /// Selector for a single asset with a fixed name.
    #[must_use]
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            platform: PlatformMatch::None,
            exact: Some(name.into()),
            ..Self::default()
        }
    }

    /// Override how the platform is matched.
    #[must_use]
    pub fn with_platform(mut self, platform: PlatformMatch) -> Self {
        self.platform = platform;
        self
    }

    /// Require every one of `terms`.
    #[must_use]
    pub fn containing<S: Into<String>>(mut self, terms: impl IntoIterator<Item = S>) -> Self {
        self.contains.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Reject names carrying any of `terms`.
    #[must_use]
    pub fn excluding<S: Into<String>>(mut self, terms: impl IntoIterator<Item = S>) -> Self {
        self.excludes.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Require a regex match against the full name.
    ///
    /// # Errors
    ///
    /// Returns a [`Error::Configuration`] if `pattern` is not a valid regex.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        self.pattern = Some(compile_pattern(pattern)?);
        Ok(self)
    }

    /// Every asset satisfying this selector, in release order.
    #[must_use]
    pub fn select<'a>(&self, assets: &'a [ReleaseAsset], platform: Platform) -> Vec<&'a ReleaseAsset> {
        if let Some(exact) = &self.exact {
            return assets.iter().filter(|a| &a.name == exact).collect();
        }
        let mut matched = match self.platform {
            PlatformMatch::Platform => match_arch_and_os(assets, platform),
            PlatformMatch::OsOnly => match_os(assets, platform.os),
            PlatformMatch::None => assets.iter().collect(),
        };
        if !self.contains.is_empty() {
            matched = containing(matched, &self.contains);
        }
        if !self.excludes.is_empty() {
            matched = excluding_any(matched, &self.excludes);
        }
        if let Some(re) = &self.pattern {
            matched.retain(|a| re.is_match(&a.name));
        }
        matched
    }

    /// The single asset satisfying this selector.
    ///
    /// # Errors
    ///
    /// [`Error::AssetNotFound`] or [`Error::AmbiguousAsset`] when the
    /// selection does not have exactly one member.
    pub fn select_one<'a>(
        &self,
        assets: &'a [ReleaseAsset],
        platform: Platform,
        tool: &str,
        role: &str,
    ) -> Result<&'a ReleaseAsset> {
        exactly_one(self.select(assets, platform), tool, role, &self.describe(platform))
    }

    /// Human readable summary of the criteria, used in error messages.
    #[must_use]
    pub fn describe(&self, platform: Platform) -> String {
        if let Some(exact) = &self.exact {
            return format!("named '{exact}'");
        }
        let mut parts = Vec::new();
        match self.platform {
            PlatformMatch::Platform => parts.push(format!("platform {platform}")),
            PlatformMatch::OsOnly => parts.push(format!("os {}", platform.os)),
            PlatformMatch::None => {}
        }
        if !self.contains.is_empty() {
            parts.push(format!("containing {:?}", self.contains));
        }
        if !self.excludes.is_empty() {
            parts.push(format!("excluding {:?}", self.excludes));
        }
        if let Some(re) = &self.pattern {
            parts.push(format!("matching /{}/", re.as_str()));
        }
        if parts.is_empty() {
            "any asset".to_string()
        } else {
            parts.join(", ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assets(names: &[&str]) -> Vec<ReleaseAsset> {
        names
            .iter()
            .map(|n| ReleaseAsset::new(*n, format!("https://example.com/{n}")))
            .collect()
    }

    fn names(selected: &[&ReleaseAsset]) -> Vec<String> {
        selected.iter().map(|a| a.name.clone()).collect()
    }

    const LINUX_AMD64: Platform = Platform {
        os: Os::Linux,
        arch: Arch::Amd64,
    };

    #[test]
    fn test_match_arch_aliases_are_symmetric() {
        let x86 = ["tool-x86_64"];
        let amd = ["tool-amd64"];
        assert_eq!(match_arch(&x86, Arch::Amd64).len(), 1);
        assert_eq!(match_arch(&amd, Arch::Amd64).len(), 1);

        let aarch = ["tool-aarch64"];
        assert_eq!(match_arch(&aarch, Arch::Arm64).len(), 1);
        assert!(match_arch(&aarch, Arch::Amd64).is_empty());
    }

    #[test]
    fn test_match_os_mac_alias() {
        let list = ["tool-mac", "tool-Linux"];
        let darwin = match_os(&list, Os::Darwin);
        assert_eq!(darwin, vec![&"tool-mac"]);
        // case-insensitive
        let linux = match_os(&list, Os::Linux);
        assert_eq!(linux, vec![&"tool-Linux"]);
    }

    #[test]
    fn test_match_arch_and_os_is_intersection() {
        let list = ["a-linux-arm64", "a-darwin-amd64", "a-linux-amd64"];
        let out = match_arch_and_os(&list, LINUX_AMD64);
        assert_eq!(out, vec![&"a-linux-amd64"]);
    }

    #[test]
    fn test_containing_requires_all_terms() {
        let list = ["yq_linux_amd64", "yq_linux_amd64.tar.gz", "checksums"];
        let out = containing(&list, &["linux", ".tar.gz"]);
        assert_eq!(out, vec![&"yq_linux_amd64.tar.gz"]);
    }

    #[test]
    fn test_excluding_any_rejects_each_term() {
        let list = ["yq_linux_amd64", "yq_linux_amd64.tar.gz", "yq_linux_amd64.zip"];
        let out = excluding_any(&list, &[".tar.gz", ".zip"]);
        assert_eq!(out, vec![&"yq_linux_amd64"]);
    }

    #[test]
    fn test_matching_pattern_invalid_regex_is_configuration_error() {
        let list = ["a"];
        let err = matching_pattern(&list, "(").unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));

        let ok = matching_pattern(&list, "^a$").unwrap();
        assert_eq!(ok.len(), 1);
    }

    #[test]
    fn test_exactly_one_rejects_zero_and_many() {
        let list = ["a-linux-amd64", "b-linux-amd64"];
        let none = exactly_one(containing(&list, &["c"]), "t", "primary", "c");
        assert!(matches!(none, Err(Error::AssetNotFound { .. })));

        let many = exactly_one(match_arch(&list, Arch::Amd64), "t", "primary", "amd64");
        match many {
            Err(Error::AmbiguousAsset { matches, .. }) => assert_eq!(matches.len(), 2),
            other => panic!("expected ambiguous asset, got {other:?}"),
        }
    }

    #[test]
    fn test_widget_release_selects_linux_pair() {
        let release = assets(&[
            "widget-linux-amd64",
            "widget-linux-amd64.sha256",
            "widget-darwin-arm64",
            "widget-darwin-arm64.sha256",
        ]);
        let primary = AssetSelector::for_platform().excluding([".sha256"]);
        let checksum = AssetSelector::for_platform().containing([".sha256"]);

        let p = primary.select_one(&release, LINUX_AMD64, "widget", "primary").unwrap();
        let c = checksum.select_one(&release, LINUX_AMD64, "widget", "checksum").unwrap();
        assert_eq!(p.name, "widget-linux-amd64");
        assert_eq!(c.name, "widget-linux-amd64.sha256");
    }

    #[test]
    fn test_selector_pattern_and_exact() {
        let release = assets(&["checksums.txt", "checksums", "yq_linux_amd64"]);
        let exact = AssetSelector::exact("checksums");
        assert_eq!(names(&exact.select(&release, LINUX_AMD64)), vec!["checksums"]);

        let pattern = AssetSelector::for_platform()
            .with_platform(PlatformMatch::None)
            .with_pattern(r"^checksums\.txt$")
            .unwrap();
        assert_eq!(names(&pattern.select(&release, LINUX_AMD64)), vec!["checksums.txt"]);
    }

    #[test]
    fn test_selector_describe_mentions_criteria() {
        let sel = AssetSelector::for_platform().excluding([".asc"]);
        let text = sel.describe(LINUX_AMD64);
        assert!(text.contains("linux/amd64"));
        assert!(text.contains(".asc"));
    }
}
