//! SHA-256 digests and checksum-file parsing.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

use crate::{Error, Result};

/// Layout of a checksum file shared by every asset of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManifestFormat {
    /// `sha256sum` style: `<digest>  <file name>`, one asset per line.
    #[default]
    DigestThenName,
    /// `<file name>  <digest> <digest> ...`: several digest algorithms per
    /// line, any column may hold the SHA-256.
    NameThenDigests,
}

/// Compute the hex-encoded SHA-256 of a file.
///
/// # Errors
///
/// Returns a [`Error::Filesystem`] if the file cannot be read.
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| Error::filesystem("open", path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];

    loop {
        let n = file
            .read(&mut buffer)
            .await
            .map_err(|e| Error::filesystem("read", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Digest published in a per-asset checksum file: its first token.
#[must_use]
pub fn inline_digest(contents: &str) -> Option<String> {
    contents.split_whitespace().next().map(str::to_string)
}

/// Candidate digests for `file_name` in a shared manifest.
///
/// The line is located by exact token equality on its key column, so
/// `tool-linux-amd64` never matches a `tool-linux-amd64.tar.gz` line.
#[must_use]
pub fn manifest_digests(contents: &str, file_name: &str, format: ManifestFormat) -> Option<Vec<String>> {
    contents.lines().find_map(|line| {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match format {
            ManifestFormat::DigestThenName => match tokens.as_slice() {
                // `*` marks binary mode in sha256sum output
                [digest, name] if name.trim_start_matches('*') == file_name => {
                    Some(vec![(*digest).to_string()])
                }
                _ => None,
            },
            ManifestFormat::NameThenDigests => match tokens.split_first() {
                Some((name, digests)) if *name == file_name && !digests.is_empty() => {
                    Some(digests.iter().map(|d| (*d).to_string()).collect())
                }
                _ => None,
            },
        }
    })
}

/// Compare two digests, ignoring surrounding whitespace and hex case.
#[must_use]
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    expected.trim().eq_ignore_ascii_case(actual.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_sha256_file_known_value() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world").unwrap();

        let digest = sha256_file(file.path()).await.unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[tokio::test]
    async fn test_sha256_file_missing_is_filesystem_error() {
        let err = sha256_file(Path::new("/definitely/not/here")).await.unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }

    #[test]
    fn test_manifest_exact_key_token() {
        let manifest = "\
aaaa  rosa-linux-amd64.tar.gz
bbbb  rosa-linux-amd64
cccc *rosa-darwin-amd64
";
        let found = manifest_digests(manifest, "rosa-linux-amd64", ManifestFormat::DigestThenName);
        assert_eq!(found, Some(vec!["bbbb".to_string()]));

        let binary_mode =
            manifest_digests(manifest, "rosa-darwin-amd64", ManifestFormat::DigestThenName);
        assert_eq!(binary_mode, Some(vec!["cccc".to_string()]));

        assert!(manifest_digests(manifest, "rosa", ManifestFormat::DigestThenName).is_none());
    }

    #[test]
    fn test_manifest_name_then_digests() {
        let manifest = "yq_linux_amd64  d41d8c 2fd4e1 e3b0c4\nyq_linux_arm64  111 222 333\n";
        let found = manifest_digests(manifest, "yq_linux_amd64", ManifestFormat::NameThenDigests)
            .unwrap();
        assert_eq!(found, vec!["d41d8c", "2fd4e1", "e3b0c4"]);
    }

    #[test]
    fn test_inline_digest_first_token() {
        assert_eq!(
            inline_digest("abc123  ocm-linux-amd64\n").as_deref(),
            Some("abc123")
        );
        assert!(inline_digest("   \n").is_none());
    }

    #[test]
    fn test_digest_matches_case_and_whitespace() {
        assert!(digest_matches(" ABCDEF\n", "abcdef"));
        assert!(!digest_matches("abcdee", "abcdef"));
    }
}
