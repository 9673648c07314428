//! Global constants used throughout the updater.
//!
//! This module contains timeouts, progress ranges, retry parameters, and the
//! default file layout of a RandPicker installation. Defining them centrally
//! keeps the magic numbers of the update workflow in one discoverable place.

use std::time::Duration;

use crate::upgrade::progress::ProgressRange;

/// Version string reserved for "the manifest could not be resolved".
///
/// A [`ReleaseInfo`](crate::upgrade::ReleaseInfo) carrying this version is never
/// a real release and must always be treated as a terminal error.
pub const SENTINEL_VERSION: &str = "0.0.0";

/// Timeout for the release manifest request (5 seconds).
pub const MANIFEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Size of the slices the artifact body is written and accounted in.
pub const DOWNLOAD_CHUNK_SIZE: usize = 1024;

/// User agent sent with every request. GitHub rejects API calls without one.
pub const USER_AGENT: &str = concat!("randpicker-updater/", env!("CARGO_PKG_VERSION"));

/// Overall progress once the backup stage has completed.
pub const BACKUP_DONE_PERCENT: u8 = 15;

/// Overall progress range covered by the artifact download.
pub const DOWNLOAD_RANGE: ProgressRange = ProgressRange::new(15, 75);

/// Overall progress range covered by archive extraction.
pub const EXTRACT_RANGE: ProgressRange = ProgressRange::new(75, 93);

/// Overall progress range covered by nested folder promotion.
pub const PROMOTE_RANGE: ProgressRange = ProgressRange::new(93, 97);

/// Overall progress once cleanup has finished.
pub const COMPLETE_PERCENT: u8 = 100;

/// Starting delay for exponential backoff when restoring backed-up entries (100ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 100;

/// Maximum backoff delay when restoring backed-up entries (1 second).
pub const MAX_BACKOFF_DELAY_MS: u64 = 1000;

/// Number of retries after the first failed restore attempt of one entry.
pub const RESTORE_RETRIES: usize = 2;

/// Official release endpoint (latest tagged GitHub release).
pub const OFFICIAL_MANIFEST_URL: &str =
    "https://api.github.com/repos/xuanxuan1231/RandPicker/releases/latest";

/// Mirror feed manifest.
pub const MIRROR_MANIFEST_URL: &str = "https://oss.may.pp.ua/latest.json";

/// Download proxies tried in order when the primary asset URL fails.
pub const DEFAULT_MIRROR_TEMPLATES: [&str; 3] = [
    "https://ghfast.top/{url}",
    "https://gh-proxy.com/{url}",
    "https://github.moeyy.xyz/{url}",
];

/// Product name; also the top-level folder inside release archives.
pub const PRODUCT_NAME: &str = "RandPicker";

/// Name of the downloaded archive inside the install root.
pub const ARCHIVE_NAME: &str = "update.zip";

/// Directory (inside the install root) receiving the previous installation.
pub const BACKUP_DIR_NAME: &str = "backup";

/// Updater executable name used when the running binary's name is unavailable.
pub const UPDATER_EXECUTABLE: &str = "Updater.exe";

/// User data that survives every update untouched.
pub const PRESERVED_ENTRIES: [&str; 2] = ["config.ini", "students.json"];

/// Name of the optional configuration file looked up in the install root.
pub const CONFIG_FILE_NAME: &str = "updater.toml";

/// Environment variable disabling terminal progress bars.
pub const NO_PROGRESS_ENV: &str = "UPDATER_NO_PROGRESS";
