//! Error handling for the updater
//!
//! Every stage of the update workflow reports failure through one of the
//! strongly-typed [`UpdaterError`] variants below. Stage internals use
//! `anyhow` with context and convert into the matching variant at the stage
//! boundary, so the orchestrator can decide what to stop on without string
//! matching.
//!
//! For CLI display, [`user_friendly_error`] maps any `anyhow::Error` to an
//! [`ErrorContext`] that carries a suggestion and optional details, printed
//! with terminal colors by [`ErrorContext::display`].
//!
//! # Failure Policy
//!
//! | Variant               | Stage              | Install state afterwards        |
//! |-----------------------|--------------------|---------------------------------|
//! | `ManifestUnavailable` | resolving manifest | untouched                       |
//! | `MissingAsset`        | resolving manifest | untouched                       |
//! | `BackupFailed`        | backing up         | partially moved into backup     |
//! | `DownloadFailed`      | downloading        | backed up, nothing extracted    |
//! | `ExtractionFailed`    | extracting         | partially replaced              |
//! | `PromotionFailed`     | promoting          | partially replaced              |

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for update operations
///
/// Variants are grouped by the workflow stage that produces them. Only
/// [`UpdaterError::ManifestUnavailable`] is ever produced before the
/// installation is touched by something other than a read.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// The release manifest could not be fetched or parsed
    ///
    /// Covers network errors, timeouts, non-success HTTP statuses and
    /// malformed JSON. The resolver downgrades this error into the sentinel
    /// release, so the orchestrator sees it as a resolved-but-invalid release.
    #[error("Release manifest unavailable: {reason}")]
    ManifestUnavailable {
        /// Underlying error text, shown to the user as the changelog
        reason: String,
    },

    /// The resolved release publishes no downloadable asset
    #[error("Release {version} has no downloadable asset")]
    MissingAsset {
        /// Version tag of the release
        version: String,
    },

    /// Primary URL and every mirror failed
    #[error("Download failed after {attempts} attempt(s): {reason}")]
    DownloadFailed {
        /// Number of URLs that were tried
        attempts: usize,
        /// Per-URL failure summary
        reason: String,
    },

    /// Relocating the current installation into the backup directory failed
    #[error("Backup of {path} failed: {reason}")]
    BackupFailed {
        /// Entry that could not be relocated
        path: String,
        /// Underlying error text
        reason: String,
    },

    /// The downloaded archive could not be extracted
    #[error("Extraction of {archive} failed: {reason}")]
    ExtractionFailed {
        /// Archive file name
        archive: String,
        /// Underlying error text
        reason: String,
    },

    /// Moving the nested release folder into the install root failed
    #[error("Promotion of {folder} failed: {reason}")]
    PromotionFailed {
        /// Nested folder name
        folder: String,
        /// Underlying error text
        reason: String,
    },

    /// The downloaded artifact does not match the digest published in the manifest
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// URL the artifact was downloaded from
        url: String,
        /// Digest published by the manifest
        expected: String,
        /// Digest of the received bytes
        actual: String,
    },

    /// Moving backed-up entries back into the install root failed
    #[error("Restore from backup failed: {reason}")]
    RestoreFailed {
        /// Underlying error text
        reason: String,
    },

    /// Invalid updater configuration
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the invalid setting
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Other error
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl UpdaterError {
    /// Whether the install root may hold a partially applied update that a
    /// completed backup can undo.
    ///
    /// [`UpdaterError::BackupFailed`] is excluded: no backup manifest exists
    /// yet, and entries moved before the failure stay in the backup directory.
    #[must_use]
    pub const fn install_touched(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed { .. }
                | Self::ExtractionFailed { .. }
                | Self::PromotionFailed { .. }
                | Self::RestoreFailed { .. }
        )
    }
}

impl Clone for UpdaterError {
    fn clone(&self) -> Self {
        match self {
            Self::ManifestUnavailable {
                reason,
            } => Self::ManifestUnavailable {
                reason: reason.clone(),
            },
            Self::MissingAsset {
                version,
            } => Self::MissingAsset {
                version: version.clone(),
            },
            Self::DownloadFailed {
                attempts,
                reason,
            } => Self::DownloadFailed {
                attempts: *attempts,
                reason: reason.clone(),
            },
            Self::BackupFailed {
                path,
                reason,
            } => Self::BackupFailed {
                path: path.clone(),
                reason: reason.clone(),
            },
            Self::ExtractionFailed {
                archive,
                reason,
            } => Self::ExtractionFailed {
                archive: archive.clone(),
                reason: reason.clone(),
            },
            Self::PromotionFailed {
                folder,
                reason,
            } => Self::PromotionFailed {
                folder: folder.clone(),
                reason: reason.clone(),
            },
            Self::ChecksumMismatch {
                url,
                expected,
                actual,
            } => Self::ChecksumMismatch {
                url: url.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::RestoreFailed {
                reason,
            } => Self::RestoreFailed {
                reason: reason.clone(),
            },
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            // io::Error is not Clone
            Self::IoError(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error context wrapper that provides user-friendly error information
///
/// `ErrorContext` wraps an [`UpdaterError`] and adds an optional suggestion
/// and optional details. When displayed, the error is printed in red, details
/// in yellow and the suggestion in green.
///
/// ```rust,no_run
/// use randpicker_updater::core::{ErrorContext, UpdaterError};
///
/// let context = ErrorContext::new(UpdaterError::MissingAsset {
///     version: "v2.0.0".to_string(),
/// })
/// .with_suggestion("Download the release manually");
///
/// context.display();
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying updater error
    pub error: UpdaterError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context without suggestion or details
    #[must_use]
    pub const fn new(error: UpdaterError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error to a user-friendly [`ErrorContext`] with actionable suggestions
///
/// Recognizes [`UpdaterError`], `std::io::Error` and TOML parse errors
/// anywhere in the chain; everything else is reported with its full cause
/// chain under [`UpdaterError::Other`].
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(updater_error) = error.downcast_ref::<UpdaterError>() {
        return create_error_context(updater_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(UpdaterError::Other {
                message: format!("Permission denied: {io_error}"),
            })
            .with_suggestion(
                "Close RandPicker and run the updater from an account that can write to the \
                 installation folder",
            );
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdaterError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion(
            "Check the TOML syntax of updater.toml or remove the file to use defaults",
        );
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdaterError::Other {
        message,
    })
}

/// Map each [`UpdaterError`] variant to a tailored suggestion.
fn create_error_context(error: UpdaterError) -> ErrorContext {
    let retry = "Exit the updater and run it again";
    match &error {
        UpdaterError::ManifestUnavailable { .. } => ErrorContext::new(error)
            .with_suggestion(format!(
                "{retry}. If the official source is unreachable, try --origin mirror"
            ))
            .with_details("The installation was not modified"),

        UpdaterError::MissingAsset { .. } => ErrorContext::new(error)
            .with_suggestion("Download the release manually from the project's release page")
            .with_details("The installation was not modified"),

        UpdaterError::BackupFailed { .. } => ErrorContext::new(error)
            .with_suggestion(format!("Close RandPicker and any program using its files. {retry}"))
            .with_details("Entries already moved are in the backup folder of the installation"),

        UpdaterError::DownloadFailed { .. } | UpdaterError::ChecksumMismatch { .. } => {
            ErrorContext::new(error)
                .with_suggestion(format!("Check your network connection. {retry}"))
                .with_details("Your previous files are in the backup folder of the installation")
        }

        UpdaterError::ExtractionFailed { .. } | UpdaterError::PromotionFailed { .. } => {
            ErrorContext::new(error)
                .with_suggestion(format!("Check free disk space. {retry}"))
                .with_details(
                    "The installation may be partially replaced; your previous files are in \
                     the backup folder",
                )
        }

        UpdaterError::RestoreFailed { .. } => ErrorContext::new(error).with_suggestion(
            "Move the contents of the backup folder back into the installation folder manually",
        ),

        UpdaterError::ConfigError { .. } => ErrorContext::new(error)
            .with_suggestion("Fix updater.toml or remove it to use the built-in defaults"),

        UpdaterError::IoError(_) | UpdaterError::Other { .. } => ErrorContext::new(error),
    }
}
