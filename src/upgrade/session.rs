//! State of one update run.
//!
//! An [`UpdateSession`] is created by the caller, handed to
//! [`UpdateOrchestrator::run`](crate::upgrade::UpdateOrchestrator::run) by
//! mutable reference, and only ever advanced by the orchestrator. After the
//! run it holds the resolved release, the terminal stage and the last status
//! line, which the CLI uses for its exit code and summary.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use crate::upgrade::backup::BackupManifest;
use crate::upgrade::manifest::{Origin, ReleaseInfo};
use crate::upgrade::progress::StatusUpdate;

/// Stages of the update workflow, in execution order.
///
/// The last four variants are terminal: once a session reaches one of them
/// the orchestrator does no further work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowStage {
    /// Session created, nothing done yet
    Init,
    /// Fetching the release manifest
    ResolvingManifest,
    /// Waiting for the user to approve the update
    AwaitingConfirmation,
    /// Relocating the current installation into the backup directory
    BackingUp,
    /// Downloading the release archive
    Downloading,
    /// Extracting the archive into the install root
    Extracting,
    /// Moving the nested release folder's children into the install root
    Promoting,
    /// Removing the downloaded archive
    Cleanup,
    /// The update was installed
    Finished,
    /// No newer release exists; nothing was changed
    UpToDate,
    /// The user declined the update; nothing was changed
    Cancelled,
    /// A stage failed and the run stopped there
    Failed,
}

impl WorkflowStage {
    /// Whether the workflow stops at this stage.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::UpToDate | Self::Cancelled | Self::Failed)
    }

    /// Short label used in status lines and logs.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::ResolvingManifest => "resolving manifest",
            Self::AwaitingConfirmation => "awaiting confirmation",
            Self::BackingUp => "backing up",
            Self::Downloading => "downloading",
            Self::Extracting => "extracting",
            Self::Promoting => "promoting",
            Self::Cleanup => "cleanup",
            Self::Finished => "finished",
            Self::UpToDate => "up to date",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutable state of a single update run.
#[derive(Debug, Clone)]
pub struct UpdateSession {
    /// Release resolved from the manifest; `None` until resolution ran
    pub release: Option<ReleaseInfo>,
    /// Caller hint that the running build is already known to be outdated
    pub known_stale: bool,
    /// Version of the running build, when the caller knows it
    pub current_version: Option<String>,
    /// Manifest backend used for this run
    pub origin: Origin,
    /// Current stage
    pub stage: WorkflowStage,
    /// Overall progress, 0 to 100
    pub progress_percent: u8,
    /// Last status line
    pub status_message: String,
    /// Entries relocated by the backup stage
    pub backup: Option<BackupManifest>,
    /// Downloaded archive, once the download stage succeeded
    pub archive_path: Option<PathBuf>,
    /// When the session was created
    pub started_at: DateTime<Utc>,
    /// When the session reached a terminal stage
    pub finished_at: Option<DateTime<Utc>>,
}

impl UpdateSession {
    /// Create a fresh session in [`WorkflowStage::Init`].
    pub fn new(origin: Origin, known_stale: bool) -> Self {
        Self {
            release: None,
            known_stale,
            current_version: None,
            origin,
            stage: WorkflowStage::Init,
            progress_percent: 0,
            status_message: String::new(),
            backup: None,
            archive_path: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Set the version of the running build used for the newer-than check.
    #[must_use]
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }

    /// Move to `stage`. Entering a terminal stage stamps `finished_at`.
    pub fn enter(&mut self, stage: WorkflowStage) {
        self.stage = stage;
        if stage.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Record a status update. Progress never moves backwards.
    pub fn apply(&mut self, update: &StatusUpdate) {
        self.progress_percent = self.progress_percent.max(update.percent.min(100));
        self.status_message.clone_from(&update.message);
    }

    /// Whether the session reached a terminal stage.
    pub const fn is_finished(&self) -> bool {
        self.stage.is_terminal()
    }
}
