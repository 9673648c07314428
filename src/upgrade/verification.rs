use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info};

use crate::core::UpdaterError;

/// Verifies the integrity of a downloaded archive using SHA256 checksums.
///
/// Release manifests publish digests in two spellings: GitHub's asset
/// `digest` field (`sha256:<hex>`) and the mirror feed's bare hex `sha256`
/// field. Both are accepted and compared case-insensitively.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Normalize a published digest to lowercase hex.
    ///
    /// Returns `None` for digests that are not SHA256 (another algorithm
    /// prefix, wrong length, non-hex characters); those cannot be verified
    /// and are ignored by the downloader.
    ///
    /// ```rust
    /// use randpicker_updater::upgrade::verification::ChecksumVerifier;
    ///
    /// let hex = "DFFD6021BB2BD5B0AF676290809EC3A53191DD81C7F70A4B28688A362182986F";
    /// assert_eq!(
    ///     ChecksumVerifier::normalize(&format!("sha256:{hex}")),
    ///     Some(hex.to_lowercase())
    /// );
    /// assert_eq!(ChecksumVerifier::normalize("md5:abc"), None);
    /// ```
    pub fn normalize(digest: &str) -> Option<String> {
        let digest = digest.trim();
        let hex_part = match digest.split_once(':') {
            Some((algorithm, rest)) if algorithm.eq_ignore_ascii_case("sha256") => rest,
            Some(_) => return None,
            None => digest,
        };

        let decoded = hex::decode(hex_part).ok()?;
        (decoded.len() == 32).then(|| hex_part.to_lowercase())
    }

    /// Compute the hex-encoded SHA256 checksum of a file.
    pub async fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let contents = fs::read(file_path)
            .await
            .with_context(|| format!("Failed to read file: {file_path:?}"))?;

        let mut hasher = Sha256::new();
        hasher.update(&contents);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Verify a file downloaded from `url` against a normalized expected digest.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::ChecksumMismatch`] when the digests differ, or
    /// [`UpdaterError::Other`] when the file cannot be read.
    pub async fn verify_file(
        file_path: &Path,
        expected: &str,
        url: &str,
    ) -> Result<(), UpdaterError> {
        info!("Verifying checksum of download from {}", url);

        let actual = Self::compute_sha256(file_path).await.map_err(|e| UpdaterError::Other {
            message: format!("{e:#}"),
        })?;

        if !actual.eq_ignore_ascii_case(expected) {
            return Err(UpdaterError::ChecksumMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(())
    }
}
