use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{
    ARCHIVE_NAME, BACKUP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_MIRROR_TEMPLATES, MANIFEST_TIMEOUT,
    MIRROR_MANIFEST_URL, OFFICIAL_MANIFEST_URL, PRESERVED_ENTRIES, PRODUCT_NAME,
    UPDATER_EXECUTABLE,
};
use crate::core::UpdaterError;
use crate::upgrade::backup::Denylist;
use crate::upgrade::manifest::Origin;

/// Configuration settings for the RandPicker updater.
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration pointed at the public release endpoints.
///
/// # Lookup Order
///
/// [`UpdaterConfig::load`] takes the first of:
/// 1. an explicit path (`--config`), which must exist
/// 2. `updater.toml` in the install root
/// 3. `updater.toml` in the platform configuration directory
/// 4. built-in defaults
///
/// # TOML Example
/// ```toml
/// mirror_templates = ["https://ghfast.top/{url}", "https://proxy.example.com"]
/// enable_mirror_fallback = true
/// require_confirmation = true
/// restore_on_failure = false
/// download_idle_timeout_secs = 30
/// preserved_entries = ["config.ini", "students.json", "history.db"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Endpoint returning the latest tagged release in GitHub's REST layout.
    #[serde(default = "default_official_manifest_url")]
    pub official_manifest_url: String,

    /// Endpoint of the mirror feed manifest.
    #[serde(default = "default_mirror_manifest_url")]
    pub mirror_manifest_url: String,

    /// Timeout for the manifest request in seconds.
    ///
    /// # Default: `5`
    #[serde(default = "default_manifest_timeout_secs")]
    pub manifest_timeout_secs: u64,

    /// Download proxies tried in order after the primary asset URL fails.
    ///
    /// A template containing `{url}` has the primary URL substituted in;
    /// any other value is treated as a prefix joined with `/`.
    #[serde(default = "default_mirror_templates")]
    pub mirror_templates: Vec<String>,

    /// Whether mirrors are tried at all after the primary URL fails.
    ///
    /// # Default: `true`
    #[serde(default = "default_true")]
    pub enable_mirror_fallback: bool,

    /// Ask before touching the installation.
    ///
    /// # Default: `false`
    #[serde(default)]
    pub require_confirmation: bool,

    /// Move the backed-up installation back when a stage after the backup fails.
    ///
    /// # Default: `false`
    ///
    /// When disabled, a failed run leaves the previous files in the backup
    /// directory for manual recovery.
    #[serde(default)]
    pub restore_on_failure: bool,

    /// Verify the archive against the digest published in the manifest.
    ///
    /// # Default: `true`
    ///
    /// Has no effect when the manifest carries no digest.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,

    /// Abort a download attempt when no bytes arrive for this many seconds.
    ///
    /// # Default: `60`; `0` disables the limit
    #[serde(default = "default_download_idle_timeout_secs")]
    pub download_idle_timeout_secs: u64,

    /// Product name. Also the name of the nested folder inside release archives.
    #[serde(default = "default_product_name")]
    pub product_name: String,

    /// Main executable launched after a successful update, relative to the install root.
    #[serde(default = "default_product_executable")]
    pub product_executable: String,

    /// File name of the updater itself. Never backed up or overwritten.
    ///
    /// Defaults to the running binary's file name.
    #[serde(default)]
    pub updater_executable: Option<String>,

    /// File name of the downloaded archive inside the install root.
    #[serde(default = "default_archive_name")]
    pub archive_name: String,

    /// Name of the backup directory inside the install root.
    #[serde(default = "default_backup_dir")]
    pub backup_dir: String,

    /// User data that is never backed up or overwritten.
    #[serde(default = "default_preserved_entries")]
    pub preserved_entries: Vec<String>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            official_manifest_url: default_official_manifest_url(),
            mirror_manifest_url: default_mirror_manifest_url(),
            manifest_timeout_secs: default_manifest_timeout_secs(),
            mirror_templates: default_mirror_templates(),
            enable_mirror_fallback: true,
            require_confirmation: false,
            restore_on_failure: false,
            verify_checksum: true,
            download_idle_timeout_secs: default_download_idle_timeout_secs(),
            product_name: default_product_name(),
            product_executable: default_product_executable(),
            updater_executable: None,
            archive_name: default_archive_name(),
            backup_dir: default_backup_dir(),
            preserved_entries: default_preserved_entries(),
        }
    }
}

fn default_official_manifest_url() -> String {
    OFFICIAL_MANIFEST_URL.to_string()
}

fn default_mirror_manifest_url() -> String {
    MIRROR_MANIFEST_URL.to_string()
}

fn default_manifest_timeout_secs() -> u64 {
    MANIFEST_TIMEOUT.as_secs()
}

fn default_mirror_templates() -> Vec<String> {
    DEFAULT_MIRROR_TEMPLATES.iter().map(ToString::to_string).collect()
}

fn default_true() -> bool {
    true
}

fn default_download_idle_timeout_secs() -> u64 {
    60
}

fn default_product_name() -> String {
    PRODUCT_NAME.to_string()
}

fn default_product_executable() -> String {
    if cfg!(windows) {
        format!("{PRODUCT_NAME}.exe")
    } else {
        PRODUCT_NAME.to_string()
    }
}

fn default_archive_name() -> String {
    ARCHIVE_NAME.to_string()
}

fn default_backup_dir() -> String {
    BACKUP_DIR_NAME.to_string()
}

fn default_preserved_entries() -> Vec<String> {
    PRESERVED_ENTRIES.iter().map(ToString::to_string).collect()
}

impl UpdaterConfig {
    /// Load the configuration following the lookup order above, then validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path does not exist, a found file
    /// cannot be read or parsed, or the result fails [`validate`](Self::validate).
    pub fn load(explicit: Option<&Path>, install_root: &Path) -> Result<Self> {
        let config = if let Some(path) = explicit {
            if !path.exists() {
                return Err(UpdaterError::ConfigError {
                    message: format!("Config file not found: {}", path.display()),
                }
                .into());
            }
            Self::load_from(path)?
        } else {
            let candidates =
                std::iter::once(install_root.join(CONFIG_FILE_NAME)).chain(Self::default_path());
            match candidates.into_iter().find(|path| path.is_file()) {
                Some(path) => Self::load_from(&path)?,
                None => {
                    debug!("No updater config found, using defaults");
                    Self::default()
                }
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading updater config from {}", path.display());
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Platform configuration file location, e.g. `~/.config/randpicker/updater.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("randpicker").join(CONFIG_FILE_NAME))
    }

    /// Reject settings the workflow cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::ConfigError`] naming the offending field.
    pub fn validate(&self) -> Result<(), UpdaterError> {
        let invalid = |message: String| Err(UpdaterError::ConfigError {
            message,
        });

        if self.manifest_timeout_secs == 0 {
            return invalid("manifest_timeout_secs must be greater than 0".to_string());
        }
        for (field, value) in [
            ("product_name", &self.product_name),
            ("archive_name", &self.archive_name),
            ("backup_dir", &self.backup_dir),
        ] {
            if !is_plain_file_name(value) {
                return invalid(format!("{field} must be a plain file name, got '{value}'"));
            }
        }
        if self.product_executable.trim().is_empty() {
            return invalid("product_executable must not be empty".to_string());
        }
        for template in &self.mirror_templates {
            if !(template.starts_with("http://") || template.starts_with("https://")) {
                return invalid(format!("mirror template '{template}' is not an http(s) URL"));
            }
        }
        Ok(())
    }

    /// Manifest endpoint for `origin`.
    pub fn manifest_url(&self, origin: Origin) -> &str {
        match origin {
            Origin::Official => &self.official_manifest_url,
            Origin::Mirror => &self.mirror_manifest_url,
        }
    }

    /// Manifest request timeout.
    pub const fn manifest_timeout(&self) -> Duration {
        Duration::from_secs(self.manifest_timeout_secs)
    }

    /// Idle timeout for the download stream, `None` when disabled.
    pub const fn download_idle_timeout(&self) -> Option<Duration> {
        match self.download_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Mirror templates in effect; empty when fallback is disabled.
    pub fn active_mirror_templates(&self) -> &[String] {
        if self.enable_mirror_fallback {
            &self.mirror_templates
        } else {
            &[]
        }
    }

    /// Updater file name: configured value, else the running binary's name.
    pub fn updater_file_name(&self) -> String {
        self.updater_executable
            .clone()
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.file_name().map(|name| name.to_string_lossy().into_owned()))
            })
            .unwrap_or_else(|| UPDATER_EXECUTABLE.to_string())
    }

    /// Entries of the install root that backup, extraction and promotion leave alone.
    ///
    /// Besides the preserved user data this covers `updater.toml`, the updater
    /// binary and the backup directory.
    pub fn denylist(&self) -> Denylist {
        Denylist::new(
            self.preserved_entries
                .iter()
                .cloned()
                .chain(std::iter::once(CONFIG_FILE_NAME.to_string())),
            self.updater_file_name(),
            self.backup_dir.clone(),
        )
    }
}

fn is_plain_file_name(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = UpdaterConfig::default();
        assert_eq!(config.manifest_timeout(), MANIFEST_TIMEOUT);
        assert_eq!(config.manifest_timeout(), Duration::from_secs(5));
        assert_eq!(config.mirror_templates.len(), 3);
        assert!(config.enable_mirror_fallback);
        assert!(!config.require_confirmation);
        assert!(!config.restore_on_failure);
        assert_eq!(config.archive_name, "update.zip");
        assert_eq!(config.preserved_entries, vec!["config.ini", "students.json"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: UpdaterConfig = toml::from_str(
            r#"
            require_confirmation = true
            download_idle_timeout_secs = 0
            "#,
        )
        .unwrap();
        assert!(config.require_confirmation);
        assert_eq!(config.download_idle_timeout(), None);
        assert_eq!(config.product_name, "RandPicker");
        assert!(config.verify_checksum);
    }

    #[test]
    fn test_load_prefers_install_root_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("updater.toml"),
            "mirror_manifest_url = \"http://127.0.0.1:9/latest.json\"\n",
        )
        .unwrap();

        let config = UpdaterConfig::load(None, temp.path()).unwrap();
        assert_eq!(config.manifest_url(Origin::Mirror), "http://127.0.0.1:9/latest.json");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let temp = TempDir::new().unwrap();
        let result = UpdaterConfig::load(Some(&temp.path().join("nope.toml")), temp.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_nested_names() {
        let config = UpdaterConfig {
            backup_dir: "../backup".to_string(),
            ..UpdaterConfig::default()
        };
        assert!(matches!(config.validate(), Err(UpdaterError::ConfigError { .. })));
    }

    #[test]
    fn test_disabled_fallback_has_no_mirrors() {
        let config = UpdaterConfig {
            enable_mirror_fallback: false,
            ..UpdaterConfig::default()
        };
        assert!(config.active_mirror_templates().is_empty());
    }

    #[test]
    fn test_denylist_contains_fixed_entries() {
        let config = UpdaterConfig {
            updater_executable: Some("Updater.exe".to_string()),
            ..UpdaterConfig::default()
        };
        let denylist = config.denylist();
        for name in ["config.ini", "students.json", "Updater.exe", "backup", "updater.toml"] {
            assert!(denylist.contains(name), "{name} should be denylisted");
        }
        assert!(!denylist.contains("RandPicker.exe"));
    }
}
