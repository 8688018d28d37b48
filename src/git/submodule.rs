//! git::submodule
//!
//! Reading declared submodule paths from `.gitmodules`.

use std::path::{Path, PathBuf};

use super::error::GitError;

/// Submodule paths declared in a `.gitmodules` file, relative to the work dir.
///
/// A missing file yields an empty list.
pub fn submodule_paths(gitmodules: &Path) -> Result<Vec<PathBuf>, GitError> {
    if !gitmodules.exists() {
        return Ok(Vec::new());
    }
    let config = git2::Config::open(gitmodules)
        .map_err(|e| GitError::from_git2(e, "open .gitmodules"))?;
    let mut entries = config
        .entries(Some(r"submodule\..*\.path"))
        .map_err(|e| GitError::from_git2(e, "read .gitmodules"))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries.next() {
        let entry = entry.map_err(|e| GitError::from_git2(e, "read .gitmodules"))?;
        if let Some(value) = entry.value() {
            paths.push(PathBuf::from(value));
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let paths = submodule_paths(&dir.path().join(".gitmodules")).unwrap();
        assert!(paths.is_empty());
    }

    #[test]
    fn reads_declared_paths() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(".gitmodules");
        std::fs::write(
            &file,
            "[submodule \"lib\"]\n\tpath = vendor/lib\n\turl = ../lib\n\
             [submodule \"docs\"]\n\tpath = docs\n\turl = ../docs\n",
        )
        .unwrap();

        let paths = submodule_paths(&file).unwrap();
        assert_eq!(paths, vec![PathBuf::from("docs"), PathBuf::from("vendor/lib")]);
    }
}
