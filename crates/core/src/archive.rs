//! Archive detection and extraction into version directories.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tar::Archive;
use tracing::debug;
use walkdir::WalkDir;

use crate::{Error, Result};

/// Mode applied to extracted files whose archive entry records none.
pub const DEFAULT_FILE_MODE: u32 = 0o755;

/// Archive formats the installer can unpack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Gzip-compressed tarball (`.tar.gz`, `.tgz`).
    TarGz,
    /// Zip archive.
    Zip,
    /// macOS installer package, expanded with `pkgutil --expand-full`.
    MacPkg,
}

impl ArchiveKind {
    /// Detect the archive format from a file name. `None` means a raw binary.
    #[must_use]
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_lowercase();
        if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".pkg") {
            Some(Self::MacPkg)
        } else {
            None
        }
    }
}

/// Extract `archive` into `dest`, preserving recorded permission bits.
///
/// Entries that would escape `dest` are skipped. `dest` is created if needed
/// and existing files are overwritten, so re-running over a partially
/// extracted directory is safe. Installer packages are the exception:
/// `pkgutil` creates `dest` itself and refuses one that already exists.
///
/// # Errors
///
/// Returns [`Error::Unarchive`] for corrupt archives and
/// [`Error::Filesystem`] when writing fails.
pub fn unpack(archive: &Path, kind: ArchiveKind, dest: &Path) -> Result<()> {
    debug!(archive = ?archive, dest = ?dest, ?kind, "Unpacking archive");
    let created = match kind {
        ArchiveKind::MacPkg => dest.parent(),
        ArchiveKind::TarGz | ArchiveKind::Zip => Some(dest),
    };
    if let Some(dir) = created {
        std::fs::create_dir_all(dir).map_err(|e| Error::filesystem("create directory", dir, e))?;
    }
    match kind {
        ArchiveKind::TarGz => unpack_tar_gz(archive, dest),
        ArchiveKind::Zip => unpack_zip(archive, dest),
        ArchiveKind::MacPkg => expand_pkg(archive, dest),
    }
}

fn expand_pkg(archive_path: &Path, dest: &Path) -> Result<()> {
    let output = Command::new("pkgutil")
        .arg("--expand-full")
        .arg(archive_path)
        .arg(dest)
        .output()
        .map_err(|e| Error::unarchive(archive_path, format!("failed to run pkgutil: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::unarchive(
            archive_path,
            format!(
                "pkgutil exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}

fn unpack_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| Error::filesystem("open", archive_path, e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let entries = archive
        .entries()
        .map_err(|e| Error::unarchive(archive_path, e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::unarchive(archive_path, e.to_string()))?;
        let rel = entry
            .path()
            .map_err(|e| Error::unarchive(archive_path, e.to_string()))?
            .into_owned();
        let entry_type = entry.header().entry_type();
        let mode = entry.header().mode().ok();

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| Error::unarchive(archive_path, format!("{}: {e}", rel.display())))?;
        if !unpacked {
            debug!(entry = ?rel, "Skipping entry outside destination");
            continue;
        }

        let out = dest.join(&rel);
        if entry_type.is_dir() {
            if let Some(mode) = mode {
                set_mode(&out, mode)?;
            }
        } else if entry_type.is_file() {
            set_mode(&out, mode.unwrap_or(DEFAULT_FILE_MODE))?;
        }
    }
    Ok(())
}

fn unpack_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| Error::filesystem("open", archive_path, e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::unarchive(archive_path, e.to_string()))?;

    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| Error::unarchive(archive_path, e.to_string()))?;

        let Some(rel) = file.enclosed_name() else {
            debug!(entry = file.name(), "Skipping entry outside destination");
            continue;
        };
        let out = dest.join(rel);

        if file.is_dir() {
            std::fs::create_dir_all(&out)
                .map_err(|e| Error::filesystem("create directory", &out, e))?;
            if let Some(mode) = file.unix_mode() {
                set_mode(&out, mode)?;
            }
            continue;
        }

        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::filesystem("create directory", parent, e))?;
        }
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| Error::unarchive(archive_path, format!("{}: {e}", out.display())))?;
        std::fs::write(&out, &content).map_err(|e| Error::filesystem("write", &out, e))?;
        set_mode(&out, file.unix_mode().unwrap_or(DEFAULT_FILE_MODE))?;
    }
    Ok(())
}

/// Set permission bits on `path`.
///
/// # Errors
///
/// Returns [`Error::Filesystem`] if the permissions cannot be changed.
pub fn set_mode(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| Error::filesystem("set permissions on", path, e))?;
    }
    #[cfg(not(unix))]
    let _ = (path, mode);
    Ok(())
}

/// Locate the single regular file named `file_name` beneath `root`.
///
/// # Errors
///
/// [`Error::AssetNotFound`] when no such file exists, and
/// [`Error::AmbiguousAsset`] when several do.
pub fn find_file(root: &Path, file_name: &str, tool: &str) -> Result<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(walkdir::DirEntry::into_path)
        .collect();

    match found.len() {
        1 => Ok(found.remove(0)),
        0 => Err(Error::asset_not_found(
            tool,
            "executable",
            format!("file '{file_name}' under {}", root.display()),
        )),
        _ => Err(Error::ambiguous_asset(
            tool,
            "executable",
            found.iter().map(|p| p.display().to_string()).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_tar_gz(path: &Path, entries: &[(&str, &[u8], u32)]) {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_detect_kind() {
        assert_eq!(ArchiveKind::detect("a.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("a.TGZ"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("awscli.zip"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect("AWSCLIV2.pkg"), Some(ArchiveKind::MacPkg));
        assert_eq!(ArchiveKind::detect("rosa-linux-amd64"), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_tar_gz_preserves_modes() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("tool.tar.gz");
        write_tar_gz(
            &archive,
            &[
                ("pkg/bin/tool", b"#!/bin/sh\necho hi\n", 0o755),
                ("pkg/README", b"docs", 0o644),
            ],
        );

        let dest = tmp.path().join("out");
        unpack(&archive, ArchiveKind::TarGz, &dest).unwrap();

        let bin = dest.join("pkg/bin/tool");
        let readme = dest.join("pkg/README");
        assert_eq!(std::fs::metadata(&bin).unwrap().permissions().mode() & 0o777, 0o755);
        assert_eq!(std::fs::metadata(&readme).unwrap().permissions().mode() & 0o777, 0o644);

        // idempotent over an existing extraction
        unpack(&archive, ArchiveKind::TarGz, &dest).unwrap();
        assert_eq!(std::fs::read(&readme).unwrap(), b"docs");
    }

    #[cfg(unix)]
    #[test]
    fn test_unpack_zip_defaults_mode() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("tool.zip");
        {
            let file = File::create(&archive).unwrap();
            let mut zip = zip::ZipWriter::new(file);
            let opts = zip::write::SimpleFileOptions::default().unix_permissions(0o700);
            zip.add_directory("aws/dist/", opts).unwrap();
            zip.start_file("aws/dist/aws", opts).unwrap();
            zip.write_all(b"binary").unwrap();
            zip.finish().unwrap();
        }

        let dest = tmp.path().join("out");
        unpack(&archive, ArchiveKind::Zip, &dest).unwrap();
        let aws = dest.join("aws/dist/aws");
        assert_eq!(std::fs::read(&aws).unwrap(), b"binary");
        assert_eq!(std::fs::metadata(&aws).unwrap().permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn test_unpack_corrupt_archive_is_unarchive_error() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("broken.tar.gz");
        std::fs::write(&archive, b"not a gzip stream").unwrap();

        let err = unpack(&archive, ArchiveKind::TarGz, &tmp.path().join("out")).unwrap_err();
        assert!(matches!(err, Error::Unarchive { .. }), "got {err:?}");
    }

    #[test]
    fn test_unreadable_pkg_is_unarchive_error() {
        let tmp = TempDir::new().unwrap();
        let archive = tmp.path().join("AWSCLIV2.pkg");
        std::fs::write(&archive, b"not a package").unwrap();
        let dest = tmp.path().join("staged").join("aws-cli");

        let err = unpack(&archive, ArchiveKind::MacPkg, &dest).unwrap_err();
        assert!(matches!(err, Error::Unarchive { .. }), "got {err:?}");
        assert!(tmp.path().join("staged").is_dir());
    }

    #[test]
    fn test_find_file_exactly_one() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("golangci-lint-1.55.2-linux-amd64");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("golangci-lint"), b"x").unwrap();
        std::fs::write(nested.join("LICENSE"), b"x").unwrap();

        let found = find_file(tmp.path(), "golangci-lint", "golangci-lint").unwrap();
        assert_eq!(found, nested.join("golangci-lint"));

        let missing = find_file(tmp.path(), "nope", "golangci-lint").unwrap_err();
        assert!(matches!(missing, Error::AssetNotFound { .. }));

        std::fs::write(tmp.path().join("golangci-lint"), b"y").unwrap();
        let dup = find_file(tmp.path(), "golangci-lint", "golangci-lint").unwrap_err();
        assert!(matches!(dup, Error::AmbiguousAsset { .. }));
    }
}
