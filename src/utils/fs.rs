//! Filesystem helpers for relocating install-root entries.
//!
//! Backup, promotion and restore all work on whole top-level entries (a file
//! or an entire directory tree) and relocate them with a rename, which keeps
//! each move atomic on the same volume.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Ensures a directory exists, creating it and all parent directories if necessary.
///
/// # Errors
///
/// Returns an error if the path exists but is not a directory, or creation fails.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// List the direct children of `dir`, sorted by file name.
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub async fn top_level_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut reader = fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .with_context(|| format!("Failed to read directory entry in {}", dir.display()))?
    {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Remove a file, symlink or directory tree. Missing paths are not an error.
///
/// Symlinks are removed themselves, never followed.
///
/// # Errors
///
/// Returns an error if the entry exists but cannot be removed.
pub async fn remove_entry(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to inspect {}", path.display()));
        }
    };

    if metadata.is_dir() {
        fs::remove_dir_all(path)
            .await
            .with_context(|| format!("Failed to remove directory: {}", path.display()))
    } else {
        fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove file: {}", path.display()))
    }
}

/// Move `from` to `to` with a rename.
///
/// # Errors
///
/// Returns an error if the rename fails, e.g. because the entry is in use
/// or `to` is an existing non-empty directory.
pub async fn move_entry(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to)
        .await
        .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))
}

/// File name of `path` as UTF-8, lossily converted.
pub fn file_name_lossy(path: &Path) -> String {
    path.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ensure_dir_on_file() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("file.txt");
        std::fs::write(&file_path, "content").unwrap();

        assert!(ensure_dir(&file_path).is_err());
        ensure_dir(&temp.path().join("a").join("b")).unwrap();
        assert!(temp.path().join("a/b").is_dir());
    }

    #[tokio::test]
    async fn test_top_level_entries_sorted() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("b.txt"), "b").unwrap();
        std::fs::create_dir(temp.path().join("a")).unwrap();
        std::fs::write(temp.path().join("a").join("nested.txt"), "n").unwrap();

        let names: Vec<String> = top_level_entries(temp.path())
            .await
            .unwrap()
            .iter()
            .map(|p| file_name_lossy(p))
            .collect();
        assert_eq!(names, vec!["a", "b.txt"]);
    }

    #[tokio::test]
    async fn test_remove_entry_handles_files_dirs_and_missing() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("f");
        let dir = temp.path().join("d");
        std::fs::write(&file, "x").unwrap();
        std::fs::create_dir_all(dir.join("inner")).unwrap();

        remove_entry(&file).await.unwrap();
        remove_entry(&dir).await.unwrap();
        remove_entry(&temp.path().join("missing")).await.unwrap();
        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_move_entry_moves_directory_tree() {
        let temp = tempdir().unwrap();
        let from = temp.path().join("src");
        std::fs::create_dir_all(from.join("deep")).unwrap();
        std::fs::write(from.join("deep").join("f.txt"), "x").unwrap();

        let to = temp.path().join("dst");
        move_entry(&from, &to).await.unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read_to_string(to.join("deep/f.txt")).unwrap(), "x");
    }
}
