//! Release archive download with mirror fallback.
//!
//! The primary asset URL is tried first, then every mirror in configured
//! order. A URL is tried exactly once. Each attempt streams into its own
//! temporary file next to the final archive; the first attempt that
//! completes (and matches the published digest, when there is one) is
//! persisted under the archive name. Failed attempts drop their temporary
//! file, so no partial download survives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use futures::StreamExt;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::constants::{DOWNLOAD_CHUNK_SIZE, USER_AGENT};
use crate::core::UpdaterError;
use crate::upgrade::progress::StageReporter;
use crate::upgrade::verification::ChecksumVerifier;

/// Expand a mirror template for `url`.
///
/// Templates containing `{url}` get the URL substituted; anything else is
/// treated as a proxy prefix.
///
/// ```rust
/// use randpicker_updater::upgrade::download::expand_mirror_template;
///
/// let url = "https://github.com/o/r/releases/download/v2/RandPicker.zip";
/// assert_eq!(
///     expand_mirror_template("https://ghfast.top/{url}", url),
///     format!("https://ghfast.top/{url}")
/// );
/// assert_eq!(
///     expand_mirror_template("https://proxy.example.com/", url),
///     format!("https://proxy.example.com/{url}")
/// );
/// ```
pub fn expand_mirror_template(template: &str, url: &str) -> String {
    if template.contains("{url}") {
        template.replace("{url}", url)
    } else {
        format!("{}/{}", template.trim_end_matches('/'), url)
    }
}

/// Ordered list of URLs for one artifact: the primary URL, then its mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTarget {
    /// Asset URL published by the manifest
    pub primary: String,
    /// Proxied variants of `primary`, in fallback order
    pub mirrors: Vec<String>,
}

impl DownloadTarget {
    /// Build a target from the primary URL and mirror templates.
    pub fn from_templates<S: AsRef<str>>(primary: impl Into<String>, templates: &[S]) -> Self {
        let primary = primary.into();
        let mirrors = templates
            .iter()
            .map(|template| expand_mirror_template(template.as_ref(), &primary))
            .collect();
        Self {
            primary,
            mirrors,
        }
    }

    /// All URLs in attempt order.
    pub fn urls(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str()).chain(self.mirrors.iter().map(String::as_str))
    }

    /// Number of URLs.
    pub fn len(&self) -> usize {
        1 + self.mirrors.len()
    }

    /// Always false: a target has at least its primary URL.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Downloads release archives into the install root.
pub struct ArtifactDownloader {
    client: reqwest::Client,
    dest_dir: PathBuf,
    archive_name: String,
    idle_timeout: Option<Duration>,
}

impl ArtifactDownloader {
    /// Create a downloader writing `archive_name` into `dest_dir`.
    ///
    /// `idle_timeout` aborts an attempt when the connection cannot be
    /// established, the response headers do not arrive, or no body bytes
    /// arrive within the limit.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::Other`] if the HTTP client cannot be built.
    pub fn new(
        dest_dir: impl Into<PathBuf>,
        archive_name: impl Into<String>,
        idle_timeout: Option<Duration>,
    ) -> Result<Self, UpdaterError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(limit) = idle_timeout {
            builder = builder.connect_timeout(limit);
        }
        let client = builder.build().map_err(|e| UpdaterError::Other {
            message: format!("Failed to build HTTP client: {e}"),
        })?;

        Ok(Self {
            client,
            dest_dir: dest_dir.into(),
            archive_name: archive_name.into(),
            idle_timeout,
        })
    }

    /// Path the archive is persisted to.
    pub fn archive_path(&self) -> PathBuf {
        self.dest_dir.join(&self.archive_name)
    }

    /// Download `target`, trying the primary URL and then each mirror once.
    ///
    /// Progress is reported through `reporter`, which ends at its upper bound
    /// on success. `expected_sha256` is a normalized lowercase hex digest; a
    /// mismatch fails that attempt and moves on to the next URL.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::DownloadFailed`] when every URL failed, with
    /// one reason per attempt.
    pub async fn download(
        &self,
        target: &DownloadTarget,
        expected_sha256: Option<&str>,
        reporter: &mut StageReporter,
    ) -> Result<PathBuf, UpdaterError> {
        let mut failures = Vec::with_capacity(target.len());

        for (index, url) in target.urls().enumerate() {
            let label = if index == 0 {
                "primary".to_string()
            } else {
                format!("mirror {index}")
            };
            reporter.set_message(format!("Downloading update ({label})"));
            info!("Downloading {} from {}", self.archive_name, url);

            let temp = match self.attempt(url, expected_sha256, reporter).await {
                Ok(temp) => temp,
                Err(e) => {
                    warn!("Download from {} ({}) failed: {:#}", url, label, e);
                    failures.push(format!("{url}: {e:#}"));
                    continue;
                }
            };

            let archive = self.archive_path();
            if let Err(e) = temp.persist(&archive) {
                warn!("Failed to move download into place: {}", e.error);
                failures.push(format!("{}: {}", archive.display(), e.error));
                // The temp file is still owned by the error and removed with it.
                break;
            }

            reporter.finish("Download complete");
            info!("Downloaded update archive to {}", archive.display());
            return Ok(archive);
        }

        Err(UpdaterError::DownloadFailed {
            attempts: failures.len(),
            reason: failures.join("; "),
        })
    }

    /// One download attempt. The returned temp file holds the complete body.
    async fn attempt(
        &self,
        url: &str,
        expected_sha256: Option<&str>,
        reporter: &mut StageReporter,
    ) -> Result<NamedTempFile> {
        let request = self.client.get(url).send();
        let sent = match self.idle_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| anyhow!("no response within {}s", limit.as_secs()))?,
            None => request.await,
        };
        let response =
            sent.with_context(|| format!("Failed to connect to {url}"))?.error_for_status()?;

        let total = response.content_length().unwrap_or(0);
        if total == 0 {
            debug!("Server did not report a content length for {}", url);
        }

        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(&self.dest_dir)
            .with_context(|| {
                format!("Failed to create temporary file in {}", self.dest_dir.display())
            })?;
        let mut file = tokio::fs::File::from_std(
            temp.as_file().try_clone().context("Failed to open temporary file")?,
        );

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        loop {
            let next = match self.idle_timeout {
                Some(limit) => tokio::time::timeout(limit, stream.next())
                    .await
                    .map_err(|_| anyhow!("no data received for {}s", limit.as_secs()))?,
                None => stream.next().await,
            };
            let Some(bytes) = next else {
                break;
            };
            let bytes = bytes.context("Failed to read response body")?;

            for chunk in bytes.chunks(DOWNLOAD_CHUNK_SIZE) {
                file.write_all(chunk).await.context("Failed to write download")?;
                received += chunk.len() as u64;
                reporter.report(received, total);
            }
        }
        file.flush().await.context("Failed to flush download")?;
        drop(file);

        if total > 0 && received != total {
            // Only logged; the digest check below is the integrity gate.
            warn!("Received {} bytes from {} but Content-Length was {}", received, url, total);
        }
        debug!("Received {} bytes from {}", received, url);

        if let Some(expected) = expected_sha256 {
            verify(temp.path(), expected, url).await?;
        }

        Ok(temp)
    }
}

async fn verify(path: &Path, expected: &str, url: &str) -> Result<()> {
    ChecksumVerifier::verify_file(path, expected, url).await.map_err(anyhow::Error::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_orders_primary_first() {
        let target = DownloadTarget::from_templates(
            "https://x/v2.zip",
            &["https://m1/{url}", "https://m2", "https://m3/"],
        );
        let urls: Vec<&str> = target.urls().collect();
        assert_eq!(
            urls,
            vec![
                "https://x/v2.zip",
                "https://m1/https://x/v2.zip",
                "https://m2/https://x/v2.zip",
                "https://m3/https://x/v2.zip",
            ]
        );
        assert_eq!(target.len(), 4);
    }

    #[test]
    fn test_target_without_mirrors() {
        let target = DownloadTarget::from_templates::<String>("https://x/v2.zip", &[]);
        assert_eq!(target.urls().count(), 1);
        assert!(!target.is_empty());
    }
}
