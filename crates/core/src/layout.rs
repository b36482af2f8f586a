//! Install directory layout.
//!
//! ```text
//! <root>/
//!   latest/
//!     <executable>  -> <tool>/<version>/...
//!   <tool>/
//!     <version>/
//! ```
//!
//! Every path under the install root is derived here.

use std::path::{Component, Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Directory name of the symlink farm.
pub const LATEST_DIR_NAME: &str = "latest";

/// Suffix of the directory holding files that failed verification.
pub const UNVERIFIED_SUFFIX: &str = ".unverified";

/// Mode for directories created under the install root.
pub const DIR_MODE: u32 = 0o755;

/// Paths of an install root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// Layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$HOME/.local/bin/backplane`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the home directory cannot be determined.
    pub fn default_root() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::configuration("could not determine home directory"))?;
        Ok(home.join(".local").join("bin").join("backplane"))
    }

    /// Root install directory.
    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root
    }

    /// Directory holding the `latest` symlinks.
    #[must_use]
    pub fn latest_dir(&self) -> PathBuf {
        self.root.join(LATEST_DIR_NAME)
    }

    /// Directory owning every installed version of `tool`.
    #[must_use]
    pub fn tool_dir(&self, tool: &str) -> PathBuf {
        self.root.join(tool)
    }

    /// Directory for one installed version of `tool`.
    #[must_use]
    pub fn version_dir(&self, tool: &str, version: &str) -> PathBuf {
        self.tool_dir(tool).join(version)
    }

    /// Location of the `latest` symlink for `executable`.
    #[must_use]
    pub fn symlink_path(&self, executable: &str) -> PathBuf {
        self.latest_dir().join(executable)
    }

    /// Idempotently create the root and `latest` directories.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if either directory cannot be created.
    pub fn ensure_dirs(&self) -> Result<()> {
        create_dir(&self.root)?;
        create_dir(&self.latest_dir())
    }

    /// Reject release tags that cannot name a single directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for empty or path-like tags.
    pub fn check_version(version: &str) -> Result<()> {
        if is_single_component(version) {
            Ok(())
        } else {
            Err(Error::configuration(format!(
                "release tag '{version}' cannot be used as a directory name"
            )))
        }
    }

    /// Idempotently create `<tool>/<version>/`, reusing any existing contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the directory cannot be created.
    pub fn prepare_version_dir(&self, tool: &str, version: &str) -> Result<PathBuf> {
        Self::check_version(version)?;
        let dir = self.version_dir(tool, version);
        create_dir(&dir)?;
        Ok(dir)
    }

    /// Scratch directory under the root for downloading and unpacking `tool`.
    ///
    /// It sits on the same filesystem as the version directories so that
    /// [`Self::promote`] is a rename. Dropping it deletes it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the directory cannot be created.
    pub fn staging_dir(&self, tool: &str) -> Result<TempDir> {
        create_dir(&self.root)?;
        tempfile::Builder::new()
            .prefix(&format!(".{tool}-"))
            .tempdir_in(&self.root)
            .map_err(|e| Error::filesystem("create staging directory", &self.root, e))
    }

    /// Move every entry of `staging` into `<tool>/<version>/`.
    ///
    /// Files replace their counterparts by rename, so a linked binary is
    /// swapped in one step. Directories are replaced whole.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if an entry cannot be moved.
    pub fn promote(&self, staging: &Path, tool: &str, version: &str) -> Result<PathBuf> {
        let dir = self.prepare_version_dir(tool, version)?;
        move_entries(staging, &dir)?;
        debug!(tool, version, dir = ?dir, "Promoted staged files");
        Ok(dir)
    }

    /// Keep staged files that failed verification in
    /// `<tool>/<version>.unverified/`, replacing any earlier attempt.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the files cannot be moved.
    pub fn quarantine(&self, staging: TempDir, tool: &str, version: &str) -> Result<PathBuf> {
        Self::check_version(version)?;
        let tool_dir = self.tool_dir(tool);
        create_dir(&tool_dir)?;
        let dir = tool_dir.join(format!("{version}{UNVERIFIED_SUFFIX}"));
        remove_tree(&dir)?;
        let kept = staging.keep();
        std::fs::rename(&kept, &dir).map_err(|e| Error::filesystem("move unverified files to", &dir, e))?;
        Ok(dir)
    }

    /// Point `latest/<executable>` at `target`, replacing any existing link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the old link cannot be removed or the
    /// new one cannot be created.
    pub fn relink(&self, executable: &str, target: &Path) -> Result<PathBuf> {
        let link = self.symlink_path(executable);
        remove_link(&link)?;
        symlink(target, &link).map_err(|e| Error::filesystem("create symlink", &link, e))?;
        info!(link = ?link, target = ?target, "Linked");
        Ok(link)
    }

    /// Point each `latest/` link at its new target.
    ///
    /// If any link fails, the links switched so far are restored to their
    /// previous targets (or removed if they did not exist).
    ///
    /// # Errors
    ///
    /// The first [`Error::Filesystem`] encountered.
    pub fn relink_all(&self, links: &[(&str, PathBuf)]) -> Result<()> {
        let mut switched: Vec<(&str, Option<PathBuf>)> = Vec::with_capacity(links.len());
        for (executable, target) in links {
            let previous = std::fs::read_link(self.symlink_path(executable)).ok();
            switched.push((*executable, previous));
            if let Err(e) = self.relink(executable, target) {
                self.restore_links(&switched);
                return Err(e);
            }
        }
        Ok(())
    }

    fn restore_links(&self, switched: &[(&str, Option<PathBuf>)]) {
        for (executable, previous) in switched.iter().rev() {
            let restored = match previous {
                Some(target) => self.relink(executable, target).map(|_| ()),
                None => self.unlink(executable),
            };
            if let Err(e) = restored {
                warn!(executable, error = %e, "Could not restore link");
            }
        }
    }

    /// Remove `latest/<executable>`; an absent link is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] for any failure other than "not found".
    pub fn unlink(&self, executable: &str) -> Result<()> {
        remove_link(&self.symlink_path(executable))
    }

    /// Delete the whole directory tree of `tool`; an absent tree is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the tree cannot be removed.
    pub fn remove_tool_dir(&self, tool: &str) -> Result<()> {
        remove_tree(&self.tool_dir(tool))
    }

    /// Recursively delete the install root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the root cannot be removed.
    pub fn remove_all(&self) -> Result<()> {
        remove_tree(&self.root)
    }

    /// Whether `tool` has a directory under the root.
    #[must_use]
    pub fn is_tool_present(&self, tool: &str) -> bool {
        self.tool_dir(tool).is_dir()
    }

    /// Version currently linked for `executable`.
    ///
    /// The symlink target is fully resolved and made relative to the resolved
    /// root; its second component is the version directory. `Ok(None)` means
    /// not installed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the link exists but is broken or
    /// points outside the root.
    pub fn installed_version(&self, executable: &str) -> Result<Option<String>> {
        let link = self.symlink_path(executable);
        match std::fs::symlink_metadata(&link) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::filesystem("inspect symlink", &link, e)),
        }

        let target = std::fs::canonicalize(&link).map_err(|e| Error::filesystem("resolve symlink", &link, e))?;
        let root = std::fs::canonicalize(&self.root)
            .map_err(|e| Error::filesystem("resolve install root", &self.root, e))?;

        let version = target
            .strip_prefix(&root)
            .ok()
            .and_then(|rel| rel.components().nth(1))
            .and_then(|c| match c {
                Component::Normal(s) => s.to_str().map(str::to_string),
                _ => None,
            });

        match version {
            Some(v) => Ok(Some(v)),
            None => Err(Error::filesystem(
                "derive version from symlink",
                &link,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("target '{}' is not inside a version directory", target.display()),
                ),
            )),
        }
    }

    /// Whether the `latest` directory appears in a `PATH`-style string.
    #[must_use]
    pub fn latest_on_path(&self, path_var: &std::ffi::OsStr) -> bool {
        let latest = self.latest_dir();
        std::env::split_paths(path_var).any(|p| p == latest)
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

fn create_dir(path: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder
        .create(path)
        .map_err(|e| Error::filesystem("create directory", path, e))
}

fn move_entries(from: &Path, to: &Path) -> Result<()> {
    let entries = std::fs::read_dir(from).map_err(|e| Error::filesystem("read directory", from, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::filesystem("read directory", from, e))?;
        let dest = to.join(entry.file_name());
        let file_type = entry
            .file_type()
            .map_err(|e| Error::filesystem("inspect", entry.path(), e))?;
        if file_type.is_dir() {
            remove_tree(&dest)?;
        }
        std::fs::rename(entry.path(), &dest).map_err(|e| Error::filesystem("move into place", &dest, e))?;
    }
    Ok(())
}

fn remove_link(link: &Path) -> Result<()> {
    match std::fs::remove_file(link) {
        Ok(()) => {
            debug!(link = ?link, "Removed existing link");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::filesystem("remove existing symlink", link, e)),
    }
}

fn remove_tree(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::filesystem("remove", path, e)),
    }
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are only supported on unix hosts",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> (TempDir, Layout) {
        let tmp = TempDir::new().unwrap();
        let layout = Layout::new(tmp.path().join("backplane"));
        layout.ensure_dirs().unwrap();
        (tmp, layout)
    }

    #[test]
    fn test_paths_are_derived_from_root() {
        let layout = Layout::new("/opt/bp");
        assert_eq!(layout.latest_dir(), PathBuf::from("/opt/bp/latest"));
        assert_eq!(layout.tool_dir("oc"), PathBuf::from("/opt/bp/oc"));
        assert_eq!(
            layout.version_dir("oc", "4.15.2"),
            PathBuf::from("/opt/bp/oc/4.15.2")
        );
        assert_eq!(
            layout.symlink_path("ocm-backplane"),
            PathBuf::from("/opt/bp/latest/ocm-backplane")
        );
    }

    #[test]
    fn test_default_root_under_home() {
        temp_env::with_var("HOME", Some("/home/tester"), || {
            let root = Layout::default_root().unwrap();
            assert_eq!(root, PathBuf::from("/home/tester/.local/bin/backplane"));
        });
    }

    #[test]
    fn test_ensure_dirs_is_idempotent() {
        let (_tmp, layout) = layout();
        layout.ensure_dirs().unwrap();
        assert!(layout.latest_dir().is_dir());
    }

    #[test]
    fn test_prepare_version_dir_rejects_path_like_tags() {
        let (_tmp, layout) = layout();
        assert!(layout.prepare_version_dir("oc", "../escape").is_err());
        assert!(layout.prepare_version_dir("oc", "a/b").is_err());
        let dir = layout.prepare_version_dir("oc", "v1.0.0").unwrap();
        assert!(dir.is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_relink_and_installed_version() {
        let (_tmp, layout) = layout();
        assert_eq!(layout.installed_version("rosa").unwrap(), None);

        let v1 = layout.prepare_version_dir("rosa", "v1.2.0").unwrap();
        std::fs::write(v1.join("rosa"), b"one").unwrap();
        layout.relink("rosa", &v1.join("rosa")).unwrap();
        assert_eq!(
            layout.installed_version("rosa").unwrap().as_deref(),
            Some("v1.2.0")
        );

        let v2 = layout.prepare_version_dir("rosa", "v1.3.0").unwrap();
        std::fs::write(v2.join("rosa"), b"two").unwrap();
        layout.relink("rosa", &v2.join("rosa")).unwrap();
        assert_eq!(
            layout.installed_version("rosa").unwrap().as_deref(),
            Some("v1.3.0")
        );
        assert_eq!(std::fs::read(layout.symlink_path("rosa")).unwrap(), b"two");
        // old version is retained
        assert!(v1.join("rosa").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn test_installed_version_broken_link_is_error() {
        let (_tmp, layout) = layout();
        let v1 = layout.prepare_version_dir("oc", "4.15.2").unwrap();
        layout.relink("oc", &v1.join("oc")).unwrap();

        let err = layout.installed_version("oc").unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_remove_tool_and_unlink_tolerate_absence() {
        let (_tmp, layout) = layout();
        layout.unlink("nothing").unwrap();
        layout.remove_tool_dir("nothing").unwrap();

        let v = layout.prepare_version_dir("yq", "v4.40.5").unwrap();
        std::fs::write(v.join("yq"), b"yq").unwrap();
        layout.relink("yq", &v.join("yq")).unwrap();
        assert!(layout.is_tool_present("yq"));

        layout.remove_tool_dir("yq").unwrap();
        layout.unlink("yq").unwrap();
        assert!(!layout.is_tool_present("yq"));
        assert!(std::fs::symlink_metadata(layout.symlink_path("yq")).is_err());
    }

    #[test]
    fn test_promote_replaces_files_and_directories() {
        let (_tmp, layout) = layout();
        let v1 = layout.prepare_version_dir("aws", "2.15.0").unwrap();
        std::fs::write(v1.join("aws"), b"old").unwrap();
        std::fs::create_dir_all(v1.join("aws-cli/dist")).unwrap();
        std::fs::write(v1.join("aws-cli/dist/stale"), b"old").unwrap();
        std::fs::write(v1.join("notes"), b"kept").unwrap();

        let staging = layout.staging_dir("aws").unwrap();
        assert!(staging.path().starts_with(layout.root_dir()));
        std::fs::write(staging.path().join("aws"), b"new").unwrap();
        std::fs::create_dir_all(staging.path().join("aws-cli/dist")).unwrap();
        std::fs::write(staging.path().join("aws-cli/dist/aws"), b"new").unwrap();

        let dir = layout.promote(staging.path(), "aws", "2.15.0").unwrap();
        assert_eq!(dir, v1);
        assert_eq!(std::fs::read(v1.join("aws")).unwrap(), b"new");
        assert!(v1.join("aws-cli/dist/aws").is_file());
        assert!(!v1.join("aws-cli/dist/stale").exists());
        assert!(v1.join("notes").is_file());
    }

    #[test]
    fn test_quarantine_moves_staging_aside() {
        let (_tmp, layout) = layout();
        let staging = layout.staging_dir("ocm").unwrap();
        let staged = staging.path().to_path_buf();
        std::fs::write(staged.join("ocm-linux-amd64"), b"unverified").unwrap();

        let kept = layout.quarantine(staging, "ocm", "v1.0.0").unwrap();
        assert_eq!(kept, layout.tool_dir("ocm").join("v1.0.0.unverified"));
        assert!(kept.join("ocm-linux-amd64").is_file());
        assert!(!staged.exists());
        assert!(!layout.version_dir("ocm", "v1.0.0").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_relink_all_restores_previous_links_on_failure() {
        let (_tmp, layout) = layout();
        let v1 = layout.prepare_version_dir("aws", "1").unwrap();
        layout.relink("aws", &v1.join("aws")).unwrap();

        // a directory in latest/ cannot be replaced by a link
        std::fs::create_dir_all(layout.symlink_path("aws_completer").join("x")).unwrap();

        let v2 = layout.prepare_version_dir("aws", "2").unwrap();
        let err = layout
            .relink_all(&[
                ("aws", v2.join("aws")),
                ("aws_completer", v2.join("aws_completer")),
            ])
            .unwrap_err();
        assert!(matches!(err, Error::Filesystem { .. }));
        assert_eq!(std::fs::read_link(layout.symlink_path("aws")).unwrap(), v1.join("aws"));
    }

    #[test]
    fn test_remove_all_deletes_root() {
        let (_tmp, layout) = layout();
        layout.prepare_version_dir("oc", "4.15.2").unwrap();
        layout.remove_all().unwrap();
        assert!(!layout.root_dir().exists());
        // second removal is a no-op
        layout.remove_all().unwrap();
    }

    #[test]
    fn test_latest_on_path() {
        let layout = Layout::new("/opt/bp");
        let path = std::env::join_paths(["/usr/bin", "/opt/bp/latest"]).unwrap();
        assert!(layout.latest_on_path(&path));
        let path = std::env::join_paths(["/usr/bin"]).unwrap();
        assert!(!layout.latest_on_path(&path));
    }
}
