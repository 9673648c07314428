//! Release manifest resolution.
//!
//! Two backends publish the latest release in slightly different JSON
//! layouts. [`ManifestResolver`] fetches one of them and normalizes the
//! response into a [`ReleaseInfo`]. Resolution never fails from the caller's
//! point of view: any network, status or parse error becomes the sentinel
//! release (`0.0.0`) with the error text as its changelog.
//!
//! # Official layout (GitHub REST "latest release")
//!
//! ```json
//! {"tag_name": "v2.0.0",
//!  "assets": [{"browser_download_url": "https://x/v2.zip", "digest": "sha256:..."}],
//!  "body": "fix bugs"}
//! ```
//!
//! # Mirror feed layout
//!
//! ```json
//! {"version": "v2.0.0", "url": "https://x/v2.zip", "changelog": "fix bugs", "sha256": "..."}
//! ```
//!
//! `tag_name` may replace `version`, an `assets` list may replace `url`, and
//! `body` may replace `changelog`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{SENTINEL_VERSION, USER_AGENT};
use crate::core::UpdaterError;
use crate::upgrade::config::UpdaterConfig;
use crate::upgrade::verification::ChecksumVerifier;

/// Manifest backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The project's GitHub releases
    #[default]
    Official,
    /// The mirror feed
    Mirror,
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "official" | "github" => Ok(Self::Official),
            "mirror" | "oss" => Ok(Self::Mirror),
            other => Err(format!("unknown origin '{other}' (expected 'official' or 'mirror')")),
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Official => f.write_str("official"),
            Self::Mirror => f.write_str("mirror"),
        }
    }
}

/// Canonical description of a published release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    /// Version tag as published, e.g. `v2.0.0`
    pub version: String,
    /// Direct URL of the first published asset
    pub download_url: Option<String>,
    /// Release notes, or the error text for the sentinel release
    pub changelog: String,
    /// Lowercase hex SHA256 of the asset, when the manifest publishes one
    pub sha256: Option<String>,
}

impl ReleaseInfo {
    /// The "resolution failed" release carrying `reason` as its changelog.
    pub fn sentinel(reason: impl fmt::Display) -> Self {
        Self {
            version: SENTINEL_VERSION.to_string(),
            download_url: None,
            changelog: format!("Update check failed: {reason}"),
            sha256: None,
        }
    }

    /// Whether this is the sentinel release.
    pub fn is_sentinel(&self) -> bool {
        self.version == SENTINEL_VERSION
    }

    /// The version parsed as semver, accepting a leading `v`.
    pub fn semver(&self) -> Option<semver::Version> {
        parse_version(&self.version)
    }

    /// Whether this release is newer than `current`.
    ///
    /// Returns `None` when either side is not a valid semantic version.
    pub fn is_newer_than(&self, current: &str) -> Option<bool> {
        Some(self.semver()? > parse_version(current)?)
    }
}

/// Parse a version tag, ignoring surrounding whitespace and a leading `v`.
pub fn parse_version(tag: &str) -> Option<semver::Version> {
    let trimmed = tag.trim();
    let trimmed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
    semver::Version::parse(trimmed).ok()
}

#[derive(Debug, Deserialize)]
struct OfficialRelease {
    tag_name: Option<String>,
    assets: Option<Vec<OfficialAsset>>,
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OfficialAsset {
    browser_download_url: Option<String>,
    digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MirrorRelease {
    tag_name: Option<String>,
    version: Option<String>,
    assets: Option<Vec<MirrorAsset>>,
    url: Option<String>,
    body: Option<String>,
    changelog: Option<String>,
    sha256: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MirrorAsset {
    browser_download_url: Option<String>,
}

/// Normalize a manifest body into a [`ReleaseInfo`].
///
/// # Errors
///
/// Returns [`UpdaterError::ManifestUnavailable`] for malformed JSON and for
/// manifests without a version tag or without any asset information.
/// An empty asset list is not an error; it yields a release without a
/// download URL.
pub fn parse_manifest(origin: Origin, body: &str) -> Result<ReleaseInfo, UpdaterError> {
    let unavailable = |reason: String| UpdaterError::ManifestUnavailable {
        reason,
    };

    match origin {
        Origin::Official => {
            let release: OfficialRelease = serde_json::from_str(body)
                .map_err(|e| unavailable(format!("malformed manifest: {e}")))?;
            let version =
                release.tag_name.ok_or_else(|| unavailable("manifest has no tag_name".into()))?;
            let assets =
                release.assets.ok_or_else(|| unavailable("manifest has no assets".into()))?;
            let first = assets.into_iter().next();

            Ok(ReleaseInfo {
                version,
                download_url: first.as_ref().and_then(|a| a.browser_download_url.clone()),
                changelog: release.body.unwrap_or_default(),
                sha256: first
                    .and_then(|a| a.digest)
                    .and_then(|digest| ChecksumVerifier::normalize(&digest)),
            })
        }
        Origin::Mirror => {
            let release: MirrorRelease = serde_json::from_str(body)
                .map_err(|e| unavailable(format!("malformed manifest: {e}")))?;
            let version = release
                .tag_name
                .or(release.version)
                .ok_or_else(|| unavailable("manifest has no tag_name or version".into()))?;
            let download_url = match (release.assets, release.url) {
                (Some(assets), url) => {
                    assets.into_iter().next().and_then(|a| a.browser_download_url).or(url)
                }
                (None, Some(url)) => Some(url),
                (None, None) => {
                    return Err(unavailable("manifest has no assets or url".into()));
                }
            };

            Ok(ReleaseInfo {
                version,
                download_url,
                changelog: release.body.or(release.changelog).unwrap_or_default(),
                sha256: release.sha256.as_deref().and_then(ChecksumVerifier::normalize),
            })
        }
    }
}

/// Fetches and normalizes the latest release from a manifest backend.
///
/// ```rust,no_run
/// use randpicker_updater::upgrade::{ManifestResolver, Origin, UpdaterConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let resolver = ManifestResolver::new(&UpdaterConfig::default())?;
/// let release = resolver.resolve(Origin::Official).await;
/// if release.is_sentinel() {
///     eprintln!("{}", release.changelog);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ManifestResolver {
    client: reqwest::Client,
    official_url: String,
    mirror_url: String,
    timeout: Duration,
}

impl ManifestResolver {
    /// Create a resolver for the endpoints and timeout in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::Other`] if the HTTP client cannot be built.
    pub fn new(config: &UpdaterConfig) -> Result<Self, UpdaterError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build().map_err(|e| {
            UpdaterError::Other {
                message: format!("Failed to build HTTP client: {e}"),
            }
        })?;

        Ok(Self {
            client,
            official_url: config.manifest_url(Origin::Official).to_string(),
            mirror_url: config.manifest_url(Origin::Mirror).to_string(),
            timeout: config.manifest_timeout(),
        })
    }

    /// Resolve the latest release from `origin`.
    ///
    /// Never fails: errors are logged and folded into [`ReleaseInfo::sentinel`].
    pub async fn resolve(&self, origin: Origin) -> ReleaseInfo {
        match self.fetch(origin).await {
            Ok(release) => {
                info!("Latest {} release: {}", origin, release.version);
                release
            }
            Err(e) => {
                warn!("Failed to resolve {} manifest: {}", origin, e);
                ReleaseInfo::sentinel(e)
            }
        }
    }

    /// Fetch and parse the manifest, surfacing the failure reason.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::ManifestUnavailable`] on timeout, connection
    /// failure, non-success status or an unusable body.
    pub async fn fetch(&self, origin: Origin) -> Result<ReleaseInfo, UpdaterError> {
        let url = match origin {
            Origin::Official => &self.official_url,
            Origin::Mirror => &self.mirror_url,
        };
        debug!("Fetching {} manifest from {}", origin, url);

        let unavailable = |e: reqwest::Error| UpdaterError::ManifestUnavailable {
            reason: if e.is_timeout() {
                format!("request to {url} timed out after {}s", self.timeout.as_secs_f32())
            } else {
                e.to_string()
            },
        };

        let response = self
            .client
            .get(url.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(self.timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(unavailable)?;
        let body = response.text().await.map_err(unavailable)?;

        parse_manifest(origin, &body)
    }
}
