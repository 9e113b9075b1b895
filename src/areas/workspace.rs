//! Working tree access
//!
//! Paths given to and returned by the workspace are relative to its root and
//! slash-separated, the form index entries use.

use crate::errors::{Error, Result};
use bytes::Bytes;
use std::fs::Metadata;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 3] = [".git", ".", ".."];

#[derive(Debug, Clone)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Workspace {
            path: path.into().into_boxed_path(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Absolute location of a workspace-relative path
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let mut resolved = self.path.to_path_buf();
        for component in relative.split('/') {
            if component.is_empty() || component == "." || component == ".." || component == ".git"
            {
                return Err(Error::invalid_argument(format!(
                    "path {relative:?} is outside the working tree"
                )));
            }
            resolved.push(component);
        }

        Ok(resolved)
    }

    /// Stat a path without following a final symlink
    pub fn stat(&self, relative: &str) -> Result<Metadata> {
        let path = self.resolve(relative)?;
        std::fs::symlink_metadata(&path).map_err(|error| match error.kind() {
            std::io::ErrorKind::NotFound => Error::not_found(format!("path {relative}")),
            _ => error.into(),
        })
    }

    pub fn read_file(&self, relative: &str) -> Result<Bytes> {
        let path = self.resolve(relative)?;
        Ok(std::fs::read(path)?.into())
    }

    /// Link target bytes, stored by git as the blob of a symlink
    pub fn read_link(&self, relative: &str) -> Result<Bytes> {
        let path = self.resolve(relative)?;
        let target = std::fs::read_link(path)?;
        Ok(Bytes::copy_from_slice(target.as_os_str().as_bytes()))
    }

    /// Every file and symlink under the root, excluding `.git`, sorted by path bytes
    pub fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.path)
            .min_depth(1)
            .into_iter()
            .filter_entry(|entry| !Self::is_ignored(entry.file_name().as_bytes()));
        for entry in walker {
            let entry = entry.map_err(|error| {
                error
                    .into_io_error()
                    .map(Error::from)
                    .unwrap_or_else(|| Error::invalid_argument("filesystem loop in working tree"))
            })?;
            if entry.file_type().is_dir() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&self.path)
                .map_err(|_| Error::invalid_argument("walked outside the working tree"))?;
            let relative = relative.to_str().ok_or_else(|| {
                Error::invalid_argument(format!("path {} is not valid UTF-8", relative.display()))
            })?;
            files.push(relative.to_string());
        }
        files.sort();

        Ok(files)
    }

    fn is_ignored(name: &[u8]) -> bool {
        IGNORED_PATHS.iter().any(|ignored| ignored.as_bytes() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use assert_fs::TempDir;
    use assert_fs::prelude::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lists_files_relative_to_the_root() {
        let dir = TempDir::new().unwrap();
        dir.child("b.txt").write_str("b").unwrap();
        dir.child("a/nested.txt").write_str("n").unwrap();
        dir.child(".git/HEAD").write_str("ref: refs/heads/main\n").unwrap();

        let workspace = Workspace::new(dir.path());

        assert_eq!(workspace.list_files().unwrap(), vec!["a/nested.txt", "b.txt"]);
        assert_eq!(workspace.read_file("a/nested.txt").unwrap().as_ref(), b"n");
    }

    #[test]
    fn symlinks_are_read_without_following() {
        let dir = TempDir::new().unwrap();
        std::os::unix::fs::symlink("target/file", dir.path().join("link")).unwrap();

        let workspace = Workspace::new(dir.path());

        assert!(workspace.stat("link").unwrap().file_type().is_symlink());
        assert_eq!(workspace.read_link("link").unwrap().as_ref(), b"target/file");
    }

    #[test]
    fn escaping_paths_are_rejected() {
        let workspace = Workspace::new("/tmp/work");

        assert_eq!(
            workspace.resolve("../etc/passwd").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            workspace.resolve(".git/config").unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
}
