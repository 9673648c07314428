use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, info};
use zip::ZipArchive;

use crate::core::UpdaterError;
use crate::upgrade::backup::Denylist;
use crate::upgrade::progress::StageReporter;
use crate::utils::fs::{ensure_dir, file_name_lossy, move_entry, remove_entry, top_level_entries};

/// Unpacks a release archive into the install root and flattens the nested
/// release folder into it.
///
/// Release archives contain a single top-level folder named after the
/// product. [`extract`](Self::extract) unpacks the archive as-is and
/// [`promote`](Self::promote) then moves the folder's children up one level.
///
/// Denylisted names that already exist in the install root are never
/// overwritten by either step.
pub struct ArchiveExtractor {
    dest_root: PathBuf,
    denylist: Denylist,
}

impl ArchiveExtractor {
    /// Create an extractor targeting `dest_root`.
    pub fn new(dest_root: impl Into<PathBuf>, denylist: Denylist) -> Self {
        Self {
            dest_root: dest_root.into(),
            denylist,
        }
    }

    /// Extract every entry of `archive` into the install root.
    ///
    /// Runs on the blocking thread pool. Progress is reported per entry and
    /// `reporter` finishes at its upper bound. Returns the number of entries
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::ExtractionFailed`] for unreadable or corrupt
    /// archives, entries whose path escapes the install root, and write
    /// failures. Entries written before the failure stay in place.
    pub async fn extract(
        &self,
        archive: &Path,
        mut reporter: StageReporter,
    ) -> Result<usize, UpdaterError> {
        let archive_path = archive.to_path_buf();
        let dest_root = self.dest_root.clone();
        let denylist = self.denylist.clone();

        let result = tokio::task::spawn_blocking(move || {
            reporter.set_message("Extracting update");
            let written = extract_archive(&archive_path, &dest_root, &denylist, &mut reporter)?;
            reporter.finish("Extraction complete");
            Ok::<_, anyhow::Error>(written)
        })
        .await
        .context("Extraction task panicked")
        .and_then(|inner| inner);

        result.map_err(|e| UpdaterError::ExtractionFailed {
            archive: file_name_lossy(archive),
            reason: format!("{e:#}"),
        })
    }

    /// Move every child of the nested `folder` up into the install root and
    /// remove the emptied folder.
    ///
    /// The folder is first renamed to a staging name, so a child may share
    /// the folder's own name. Returns `false` (and still finishes `reporter`)
    /// when there is no such folder.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::PromotionFailed`] when a child cannot be moved.
    pub async fn promote(
        &self,
        folder: &str,
        mut reporter: StageReporter,
    ) -> Result<bool, UpdaterError> {
        let nested = self.dest_root.join(folder);
        if !nested.is_dir() {
            debug!("No nested {} folder to promote", folder);
            reporter.finish("Nothing to promote");
            return Ok(false);
        }

        reporter.set_message(format!("Moving {folder} into place"));
        self.promote_children(&nested, folder, &mut reporter).await.map_err(|e| {
            UpdaterError::PromotionFailed {
                folder: folder.to_string(),
                reason: format!("{e:#}"),
            }
        })?;

        reporter.finish("Files moved into place");
        info!("Promoted contents of {} into {}", folder, self.dest_root.display());
        Ok(true)
    }

    async fn promote_children(
        &self,
        nested: &Path,
        folder: &str,
        reporter: &mut StageReporter,
    ) -> Result<()> {
        let staging = self.dest_root.join(format!(".{folder}-promote"));
        remove_entry(&staging).await?;
        move_entry(nested, &staging).await?;

        let children = top_level_entries(&staging).await?;
        let total = children.len() as u64;
        for (index, child) in children.iter().enumerate() {
            let name = file_name_lossy(child);
            let target = self.dest_root.join(&name);

            if self.denylist.contains(&name) && tokio::fs::try_exists(&target).await? {
                debug!("Keeping existing {}", name);
            } else {
                remove_entry(&target).await?;
                move_entry(child, &target).await?;
            }
            reporter.report(index as u64 + 1, total);
        }

        remove_entry(&staging).await
    }
}

fn extract_archive(
    archive: &Path,
    dest_root: &Path,
    denylist: &Denylist,
    reporter: &mut StageReporter,
) -> Result<usize> {
    let file = File::open(archive)
        .with_context(|| format!("Failed to open archive {}", archive.display()))?;
    let mut zip = ZipArchive::new(BufReader::new(file)).context("Failed to read zip archive")?;

    let total = zip.len() as u64;
    let mut written = 0;
    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).with_context(|| format!("Corrupt entry #{index}"))?;
        let Some(relative) = entry.enclosed_name() else {
            bail!("Archive entry '{}' escapes the destination", entry.name());
        };

        let top = match relative.components().next() {
            Some(Component::Normal(name)) => name.to_string_lossy().into_owned(),
            _ => String::new(),
        };
        if denylist.contains(&top) && dest_root.join(&top).exists() {
            debug!("Skipping {}: {} is preserved", relative.display(), top);
        } else {
            let out = dest_root.join(&relative);
            if entry.is_dir() {
                ensure_dir(&out)?;
            } else {
                if let Some(parent) = out.parent() {
                    ensure_dir(parent)?;
                }
                let mut output = File::create(&out)
                    .with_context(|| format!("Failed to create {}", out.display()))?;
                std::io::copy(&mut entry, &mut output)
                    .with_context(|| format!("Failed to write {}", out.display()))?;

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    if let Some(mode) = entry.unix_mode() {
                        std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode))
                            .with_context(|| {
                                format!("Failed to set permissions on {}", out.display())
                            })?;
                    }
                }
            }
            written += 1;
        }

        reporter.report(index as u64 + 1, total);
    }

    debug!("Extracted {} of {} entries from {}", written, total, archive.display());
    Ok(written)
}
