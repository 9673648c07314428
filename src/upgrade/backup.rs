use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};

use crate::constants::{MAX_BACKOFF_DELAY_MS, RESTORE_RETRIES, STARTING_BACKOFF_DELAY_MS};
use crate::core::UpdaterError;
use crate::utils::fs::{file_name_lossy, move_entry, remove_entry, top_level_entries};

/// Install-root entries that are never backed up, overwritten or removed.
///
/// Matching is by exact top-level name and applies to files and directories
/// alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Denylist {
    preserved: Vec<String>,
    updater: String,
    backup_dir: String,
}

impl Denylist {
    /// Build a denylist from user data entries, the updater's file name and
    /// the backup directory name.
    pub fn new(
        preserved: impl IntoIterator<Item = String>,
        updater: impl Into<String>,
        backup_dir: impl Into<String>,
    ) -> Self {
        Self {
            preserved: preserved.into_iter().collect(),
            updater: updater.into(),
            backup_dir: backup_dir.into(),
        }
    }

    /// Whether the top-level entry `name` is denylisted.
    pub fn contains(&self, name: &str) -> bool {
        name == self.updater || name == self.backup_dir || self.is_user_data(name)
    }

    /// Whether `name` is user data (as opposed to the updater or backup directory).
    pub fn is_user_data(&self, name: &str) -> bool {
        self.preserved.iter().any(|entry| entry == name)
    }

    /// Name of the backup directory.
    pub fn backup_dir(&self) -> &str {
        &self.backup_dir
    }
}

/// Record of the entries a backup relocated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupManifest {
    /// Directory holding the relocated entries
    pub backup_dir: PathBuf,
    /// Top-level names moved into `backup_dir`, sorted
    pub entries: Vec<String>,
}

impl BackupManifest {
    /// Number of relocated entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was relocated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Relocates the current installation into a backup directory before it is
/// replaced, and optionally moves it back.
///
/// The backup directory lives inside the install root, so every relocation
/// is a same-volume rename. An existing backup directory is reused; entries
/// in it that collide with the ones being backed up are replaced.
///
/// # Examples
///
/// ```rust,no_run
/// use randpicker_updater::upgrade::{InstallationBackup, UpdaterConfig};
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = UpdaterConfig::default();
/// let backup = InstallationBackup::new(Path::new("C:/RandPicker"), config.denylist());
/// let manifest = backup.backup().await?;
/// println!("Moved {} entries into {}", manifest.len(), manifest.backup_dir.display());
/// # Ok(())
/// # }
/// ```
pub struct InstallationBackup {
    install_root: PathBuf,
    denylist: Denylist,
}

impl InstallationBackup {
    /// Create a backup manager for `install_root`.
    pub fn new(install_root: impl Into<PathBuf>, denylist: Denylist) -> Self {
        Self {
            install_root: install_root.into(),
            denylist,
        }
    }

    /// Path of the backup directory.
    pub fn backup_dir(&self) -> PathBuf {
        self.install_root.join(self.denylist.backup_dir())
    }

    /// Move every non-denylisted top-level entry into the backup directory.
    ///
    /// Stops at the first entry that cannot be moved. Entries moved before
    /// the failure stay in the backup directory.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::BackupFailed`] naming the entry that could not
    /// be relocated.
    pub async fn backup(&self) -> Result<BackupManifest, UpdaterError> {
        let backup_dir = self.backup_dir();
        let failed = |path: &Path, e: anyhow::Error| UpdaterError::BackupFailed {
            path: path.display().to_string(),
            reason: format!("{e:#}"),
        };

        if backup_dir.is_dir() {
            debug!("Reusing existing backup directory {}", backup_dir.display());
        } else {
            tokio::fs::create_dir_all(&backup_dir)
                .await
                .context("Failed to create backup directory")
                .map_err(|e| failed(&backup_dir, e))?;
        }

        let entries =
            top_level_entries(&self.install_root).await.map_err(|e| failed(&self.install_root, e))?;

        let mut moved = Vec::new();
        for entry in entries {
            let name = file_name_lossy(&entry);
            if self.denylist.contains(&name) {
                debug!("Leaving {} in place", name);
                continue;
            }

            let target = backup_dir.join(&name);
            remove_entry(&target).await.map_err(|e| failed(&target, e))?;
            move_entry(&entry, &target).await.map_err(|e| failed(&entry, e))?;
            debug!("Backed up {}", name);
            moved.push(name);
        }

        info!("Backed up {} entries into {}", moved.len(), backup_dir.display());
        Ok(BackupManifest {
            backup_dir,
            entries: moved,
        })
    }

    /// Put a backed-up installation back in place.
    ///
    /// Every non-denylisted top-level entry currently in the install root
    /// (the partially applied update) is removed first, then each entry of
    /// `manifest` is moved back. Each move is retried with exponential
    /// backoff, since freshly extracted files can still be held open briefly
    /// on Windows.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::RestoreFailed`] if the partial update cannot
    /// be cleared or an entry cannot be moved back after all retries.
    pub async fn restore(&self, manifest: &BackupManifest) -> Result<(), UpdaterError> {
        let failed = |e: anyhow::Error| UpdaterError::RestoreFailed {
            reason: format!("{e:#}"),
        };
        warn!("Restoring previous installation from {}", manifest.backup_dir.display());

        for entry in top_level_entries(&self.install_root).await.map_err(failed)? {
            let name = file_name_lossy(&entry);
            if !self.denylist.contains(&name) {
                debug!("Removing partially updated {}", name);
                remove_entry(&entry).await.map_err(failed)?;
            }
        }

        for name in &manifest.entries {
            let from = manifest.backup_dir.join(name);
            let to = self.install_root.join(name);
            restore_entry(&from, &to).await.map_err(failed)?;
            debug!("Restored {}", name);
        }

        info!("Restored {} entries", manifest.len());
        Ok(())
    }
}

async fn restore_entry(from: &Path, to: &Path) -> anyhow::Result<()> {
    let strategy = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
        .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS))
        .take(RESTORE_RETRIES);

    Retry::spawn(strategy, || async move {
        move_entry(from, to).await.inspect_err(|e| {
            warn!("Restore of {} failed: {:#}", from.display(), e);
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn denylist() -> Denylist {
        Denylist::new(
            ["config.ini".to_string(), "students.json".to_string()],
            "Updater.exe",
            "backup",
        )
    }

    fn populate(root: &Path) {
        for file in ["RandPicker.exe", "config.ini", "students.json", "Updater.exe"] {
            std::fs::write(root.join(file), file).unwrap();
        }
        std::fs::create_dir_all(root.join("assets")).unwrap();
        std::fs::write(root.join("assets").join("Logo.png"), "png").unwrap();
    }

    #[tokio::test]
    async fn test_backup_moves_everything_but_denylist() {
        let temp = TempDir::new().unwrap();
        populate(temp.path());

        let backup = InstallationBackup::new(temp.path(), denylist());
        let manifest = backup.backup().await.unwrap();

        assert_eq!(manifest.entries, vec!["RandPicker.exe", "assets"]);
        for kept in ["config.ini", "students.json", "Updater.exe", "backup"] {
            assert!(temp.path().join(kept).exists(), "{kept} should stay");
        }
        assert!(!temp.path().join("RandPicker.exe").exists());
        assert!(temp.path().join("backup/assets/Logo.png").exists());
    }

    #[tokio::test]
    async fn test_backup_reuses_existing_backup_dir() {
        let temp = TempDir::new().unwrap();
        populate(temp.path());
        std::fs::create_dir_all(temp.path().join("backup/assets")).unwrap();
        std::fs::write(temp.path().join("backup/assets/old.png"), "stale").unwrap();
        std::fs::write(temp.path().join("backup/keep.txt"), "older backup").unwrap();

        let backup = InstallationBackup::new(temp.path(), denylist());
        backup.backup().await.unwrap();

        assert!(temp.path().join("backup/keep.txt").exists());
        assert!(temp.path().join("backup/assets/Logo.png").exists());
        assert!(!temp.path().join("backup/assets/old.png").exists());
    }

    #[tokio::test]
    async fn test_backup_of_empty_root() {
        let temp = TempDir::new().unwrap();
        let backup = InstallationBackup::new(temp.path(), denylist());
        let manifest = backup.backup().await.unwrap();
        assert!(manifest.is_empty());
        assert!(temp.path().join("backup").is_dir());
    }

    #[tokio::test]
    async fn test_restore_replaces_partial_update() {
        let temp = TempDir::new().unwrap();
        populate(temp.path());

        let backup = InstallationBackup::new(temp.path(), denylist());
        let manifest = backup.backup().await.unwrap();

        // A half-applied update
        std::fs::write(temp.path().join("RandPicker.exe"), "new").unwrap();
        std::fs::write(temp.path().join("half.dll"), "new").unwrap();

        backup.restore(&manifest).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(temp.path().join("RandPicker.exe")).unwrap(),
            "RandPicker.exe"
        );
        assert!(!temp.path().join("half.dll").exists());
        assert!(temp.path().join("assets/Logo.png").exists());
        assert_eq!(std::fs::read_to_string(temp.path().join("config.ini")).unwrap(), "config.ini");
    }

    #[test]
    fn test_denylist_matches_exact_names() {
        let denylist = denylist();
        assert!(denylist.contains("backup"));
        assert!(denylist.is_user_data("students.json"));
        assert!(!denylist.is_user_data("Updater.exe"));
        assert!(!denylist.contains("config.ini.bak"));
    }
}
