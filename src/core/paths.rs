//! core::paths
//!
//! Centralized path routing for a working copy.
//!
//! # Layout
//!
//! - `<work_dir>/.gitmodules` - submodule declarations (read-only, mtime-checked)
//! - `<git_dir>/` - metadata directory observed by the lock watcher
//! - `<git_dir>/repoflow/config.toml` - repository configuration
//!
//! **Rule:** no code outside this module joins these names onto a path by hand.
//!
//! ```
//! use repoflow::core::paths::RepoPaths;
//! use std::path::PathBuf;
//!
//! let paths = RepoPaths::new(PathBuf::from("/repo/.git"), PathBuf::from("/repo"));
//! assert_eq!(paths.gitmodules_path(), PathBuf::from("/repo/.gitmodules"));
//! assert_eq!(paths.repo_config_path(), PathBuf::from("/repo/.git/repoflow/config.toml"));
//! ```

use std::path::{Path, PathBuf};

/// Directory name for repoflow data inside the git dir.
const REPOFLOW_DIR: &str = "repoflow";

/// Paths derived from one working copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPaths {
    git_dir: PathBuf,
    work_dir: PathBuf,
}

impl RepoPaths {
    /// Create paths from the metadata directory and working directory.
    pub fn new(git_dir: PathBuf, work_dir: PathBuf) -> Self {
        Self { git_dir, work_dir }
    }

    /// The metadata directory (`.git`).
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// The working directory root.
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// `<work_dir>/.gitmodules`.
    pub fn gitmodules_path(&self) -> PathBuf {
        self.work_dir.join(".gitmodules")
    }

    /// `<git_dir>/repoflow`.
    pub fn repoflow_dir(&self) -> PathBuf {
        self.git_dir.join(REPOFLOW_DIR)
    }

    /// `<git_dir>/repoflow/config.toml`.
    pub fn repo_config_path(&self) -> PathBuf {
        self.repoflow_dir().join("config.toml")
    }

    /// Resolve a path relative to the working directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.work_dir.join(path)
        }
    }

    /// Express `path` relative to the working directory, if it lies inside it.
    pub fn relative<'a>(&self, path: &'a Path) -> Option<&'a Path> {
        if path.is_absolute() {
            path.strip_prefix(&self.work_dir).ok()
        } else {
            Some(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> RepoPaths {
        RepoPaths::new(PathBuf::from("/r/.git"), PathBuf::from("/r"))
    }

    #[test]
    fn derived_locations() {
        let p = paths();
        assert_eq!(p.git_dir(), Path::new("/r/.git"));
        assert_eq!(p.work_dir(), Path::new("/r"));
        assert_eq!(p.repoflow_dir(), PathBuf::from("/r/.git/repoflow"));
    }

    #[test]
    fn absolute_joins_relative_paths() {
        let p = paths();
        assert_eq!(p.absolute(Path::new("src/a.rs")), PathBuf::from("/r/src/a.rs"));
        assert_eq!(p.absolute(Path::new("/elsewhere")), PathBuf::from("/elsewhere"));
    }

    #[test]
    fn relative_strips_work_dir() {
        let p = paths();
        assert_eq!(p.relative(Path::new("/r/src/a.rs")), Some(Path::new("src/a.rs")));
        assert_eq!(p.relative(Path::new("/other/a.rs")), None);
        assert_eq!(p.relative(Path::new("a.rs")), Some(Path::new("a.rs")));
    }
}
