//! The update workflow.
//!
//! [`UpdateOrchestrator::run`] drives an [`UpdateSession`] through a fixed,
//! linear pipeline of stages. Each stage either lets the run continue, stops
//! it in an informational terminal state (up to date, cancelled), or fails it.
//! Nothing in the install root is touched before a genuinely newer release
//! with a download URL has been resolved and, when required, confirmed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::constants::{
    BACKUP_DONE_PERCENT, COMPLETE_PERCENT, DOWNLOAD_RANGE, EXTRACT_RANGE, PROMOTE_RANGE,
};
use crate::core::UpdaterError;
use crate::upgrade::backup::InstallationBackup;
use crate::upgrade::config::UpdaterConfig;
use crate::upgrade::download::{ArtifactDownloader, DownloadTarget};
use crate::upgrade::extract::ArchiveExtractor;
use crate::upgrade::manifest::{ManifestResolver, ReleaseInfo};
use crate::upgrade::progress::{
    NoopSink, ProgressRange, ProgressSink, SharedSink, StageReporter, StatusTap, StatusUpdate,
};
use crate::upgrade::session::{UpdateSession, WorkflowStage};

/// Stages executed by [`UpdateOrchestrator::run`], in order.
pub const PIPELINE: [WorkflowStage; 7] = [
    WorkflowStage::ResolvingManifest,
    WorkflowStage::AwaitingConfirmation,
    WorkflowStage::BackingUp,
    WorkflowStage::Downloading,
    WorkflowStage::Extracting,
    WorkflowStage::Promoting,
    WorkflowStage::Cleanup,
];

/// Asks whether a resolved release should be installed.
pub trait Confirmation: Send + Sync {
    /// Return `true` to proceed with installing `release`.
    fn confirm(&self, release: &ReleaseInfo) -> bool;
}

/// Approves every release.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

impl Confirmation for AutoConfirm {
    fn confirm(&self, _release: &ReleaseInfo) -> bool {
        true
    }
}

/// How a run ended.
#[derive(Debug)]
pub enum Outcome {
    /// The release was installed
    Finished {
        /// Installed version tag
        version: String,
    },
    /// No newer release; the installation was not touched
    UpToDate {
        /// Message for the user
        message: String,
    },
    /// The user declined; the installation was not touched
    Cancelled,
    /// A stage failed
    Failed(UpdaterError),
}

impl Outcome {
    /// Terminal stage corresponding to this outcome.
    pub const fn stage(&self) -> WorkflowStage {
        match self {
            Self::Finished { .. } => WorkflowStage::Finished,
            Self::UpToDate { .. } => WorkflowStage::UpToDate,
            Self::Cancelled => WorkflowStage::Cancelled,
            Self::Failed(_) => WorkflowStage::Failed,
        }
    }

    /// Whether the run ended without an error.
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

enum Step {
    Continue,
    Stop(Outcome),
}

type StageResult = Result<Step, UpdaterError>;

/// Sequences manifest resolution, backup, download, extraction and
/// promotion into one update run.
///
/// # Examples
///
/// ```rust,no_run
/// use randpicker_updater::upgrade::{Origin, UpdateOrchestrator, UpdateSession, UpdaterConfig};
/// use std::path::PathBuf;
///
/// # async fn example() -> anyhow::Result<()> {
/// let orchestrator = UpdateOrchestrator::new(UpdaterConfig::default(), PathBuf::from("."))?;
/// let mut session = UpdateSession::new(Origin::Official, false);
/// let outcome = orchestrator.run(&mut session).await;
/// if outcome.is_success() {
///     orchestrator.launch_new_version();
/// }
/// # Ok(())
/// # }
/// ```
pub struct UpdateOrchestrator {
    config: UpdaterConfig,
    install_root: PathBuf,
    resolver: ManifestResolver,
    sink: SharedSink,
    confirmation: Box<dyn Confirmation>,
}

impl UpdateOrchestrator {
    /// Create an orchestrator for `install_root` that reports nowhere and
    /// approves every release.
    ///
    /// # Errors
    ///
    /// Returns [`UpdaterError::Other`] if the HTTP client cannot be built.
    pub fn new(
        config: UpdaterConfig,
        install_root: impl Into<PathBuf>,
    ) -> Result<Self, UpdaterError> {
        let resolver = ManifestResolver::new(&config)?;
        Ok(Self {
            config,
            install_root: install_root.into(),
            resolver,
            sink: Arc::new(NoopSink),
            confirmation: Box::new(AutoConfirm),
        })
    }

    /// Report status updates to `sink`.
    #[must_use]
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Use `confirmation` when the configuration requires approval.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: impl Confirmation + 'static) -> Self {
        self.confirmation = Box::new(confirmation);
        self
    }

    /// Configuration in effect.
    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    /// Install root the orchestrator operates on.
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Run the workflow to a terminal stage.
    ///
    /// Never returns an error: failures end the session in
    /// [`WorkflowStage::Failed`] and are returned as [`Outcome::Failed`].
    pub async fn run(&self, session: &mut UpdateSession) -> Outcome {
        let tap = Arc::new(StatusTap::new(Arc::clone(&self.sink)));
        info!(
            "Starting update run (origin: {}, install root: {})",
            session.origin,
            self.install_root.display()
        );

        for stage in PIPELINE {
            session.enter(stage);
            debug!("Entering stage: {}", stage);

            let step = match stage {
                WorkflowStage::ResolvingManifest => self.resolve(session, &tap).await,
                WorkflowStage::AwaitingConfirmation => self.confirm(session, &tap),
                WorkflowStage::BackingUp => self.backup(session, &tap).await,
                WorkflowStage::Downloading => self.download(session, &tap).await,
                WorkflowStage::Extracting => self.extract(session, &tap).await,
                WorkflowStage::Promoting => self.promote(&tap).await,
                WorkflowStage::Cleanup => self.cleanup(session, &tap).await,
                other => Err(UpdaterError::Other {
                    message: format!("Stage '{other}' cannot be executed"),
                }),
            };
            if let Some(update) = tap.take_latest() {
                session.apply(&update);
            }

            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Stop(outcome)) => return self.conclude(session, outcome, &tap),
                Err(e) => return self.fail(session, e, &tap).await,
            }
        }

        let version = session.release.as_ref().map(|r| r.version.clone()).unwrap_or_default();
        self.conclude(
            session,
            Outcome::Finished {
                version,
            },
            &tap,
        )
    }

    /// Start the freshly installed product. Failures are logged and ignored.
    ///
    /// Returns whether the process was spawned.
    pub fn launch_new_version(&self) -> bool {
        let executable = self.install_root.join(&self.config.product_executable);
        match std::process::Command::new(&executable).current_dir(&self.install_root).spawn() {
            Ok(child) => {
                info!("Launched {} (pid {})", executable.display(), child.id());
                true
            }
            Err(e) => {
                warn!("Failed to launch {}: {}", executable.display(), e);
                false
            }
        }
    }

    async fn resolve(&self, session: &mut UpdateSession, tap: &StatusTap) -> StageResult {
        let stage = WorkflowStage::ResolvingManifest;
        emit(tap, stage, 0, format!("Checking for updates ({})", session.origin));

        let release = self.resolver.resolve(session.origin).await;
        session.release = Some(release.clone());

        if release.is_sentinel() {
            return Err(UpdaterError::ManifestUnavailable {
                reason: release.changelog,
            });
        }

        let newer = match session.current_version.as_deref() {
            Some(current) => release.is_newer_than(current).unwrap_or_else(|| {
                warn!(
                    "Cannot compare versions '{}' and '{}', falling back to the caller's hint",
                    release.version, current
                );
                session.known_stale
            }),
            None => session.known_stale,
        };
        if !newer {
            return Ok(Step::Stop(Outcome::UpToDate {
                message: format!(
                    "{} is up to date (latest release: {})",
                    self.config.product_name, release.version
                ),
            }));
        }

        if release.download_url.is_none() {
            return Err(UpdaterError::MissingAsset {
                version: release.version,
            });
        }

        emit(tap, stage, 0, format!("New version available: {}", release.version));
        Ok(Step::Continue)
    }

    fn confirm(&self, session: &UpdateSession, tap: &StatusTap) -> StageResult {
        if !self.config.require_confirmation {
            return Ok(Step::Continue);
        }
        let Some(release) = session.release.as_ref() else {
            return Err(missing_state("release"));
        };

        let question = format!("Install {}?", release.version);
        emit(tap, WorkflowStage::AwaitingConfirmation, session.progress_percent, question);
        if self.confirmation.confirm(release) {
            Ok(Step::Continue)
        } else {
            info!("Update to {} declined", release.version);
            Ok(Step::Stop(Outcome::Cancelled))
        }
    }

    async fn backup(&self, session: &mut UpdateSession, tap: &StatusTap) -> StageResult {
        let stage = WorkflowStage::BackingUp;
        emit(tap, stage, session.progress_percent, "Backing up current installation");

        let backup = InstallationBackup::new(&self.install_root, self.config.denylist());
        let manifest = backup.backup().await?;
        emit(tap, stage, BACKUP_DONE_PERCENT, format!("Backed up {} entries", manifest.len()));
        session.backup = Some(manifest);
        Ok(Step::Continue)
    }

    async fn download(&self, session: &mut UpdateSession, tap: &Arc<StatusTap>) -> StageResult {
        let Some(release) = session.release.as_ref() else {
            return Err(missing_state("release"));
        };
        let Some(url) = release.download_url.as_deref() else {
            return Err(UpdaterError::MissingAsset {
                version: release.version.clone(),
            });
        };

        let target = DownloadTarget::from_templates(url, self.config.active_mirror_templates());
        let expected = if self.config.verify_checksum {
            release.sha256.as_deref()
        } else {
            None
        };
        if expected.is_none() {
            debug!("No digest to verify the download against");
        }

        let downloader = ArtifactDownloader::new(
            &self.install_root,
            &self.config.archive_name,
            self.config.download_idle_timeout(),
        )?;
        let mut reporter = reporter(tap, WorkflowStage::Downloading, DOWNLOAD_RANGE);
        let archive = downloader.download(&target, expected, &mut reporter).await?;
        session.archive_path = Some(archive);
        Ok(Step::Continue)
    }

    async fn extract(&self, session: &UpdateSession, tap: &Arc<StatusTap>) -> StageResult {
        let Some(archive) = session.archive_path.as_deref() else {
            return Err(missing_state("archive"));
        };

        let extractor = ArchiveExtractor::new(&self.install_root, self.config.denylist());
        extractor.extract(archive, reporter(tap, WorkflowStage::Extracting, EXTRACT_RANGE)).await?;
        Ok(Step::Continue)
    }

    async fn promote(&self, tap: &Arc<StatusTap>) -> StageResult {
        let extractor = ArchiveExtractor::new(&self.install_root, self.config.denylist());
        let reporter = reporter(tap, WorkflowStage::Promoting, PROMOTE_RANGE);
        extractor.promote(&self.config.product_name, reporter).await?;
        Ok(Step::Continue)
    }

    async fn cleanup(&self, session: &mut UpdateSession, tap: &StatusTap) -> StageResult {
        if let Some(archive) = session.archive_path.take() {
            match tokio::fs::remove_file(&archive).await {
                Ok(()) => debug!("Removed {}", archive.display()),
                Err(e) => warn!("Failed to remove {}: {}", archive.display(), e),
            }
        }
        emit(tap, WorkflowStage::Cleanup, COMPLETE_PERCENT, "Cleanup complete");
        Ok(Step::Continue)
    }

    async fn fail(
        &self,
        session: &mut UpdateSession,
        error: UpdaterError,
        tap: &StatusTap,
    ) -> Outcome {
        error!("Update failed while {}: {}", session.stage, error);

        if self.config.restore_on_failure && error.install_touched() {
            if let Some(manifest) = session.backup.as_ref() {
                let backup = InstallationBackup::new(&self.install_root, self.config.denylist());
                match backup.restore(manifest).await {
                    Ok(()) => info!("Previous installation restored"),
                    Err(restore_error) => error!("{}", restore_error),
                }
            }
        }

        self.conclude(session, Outcome::Failed(error), tap)
    }

    fn conclude(&self, session: &mut UpdateSession, outcome: Outcome, tap: &StatusTap) -> Outcome {
        let stage = outcome.stage();
        let (percent, message) = match &outcome {
            Outcome::Finished {
                version,
            } => (COMPLETE_PERCENT, format!("Updated to {version}")),
            Outcome::UpToDate {
                message,
            } => (COMPLETE_PERCENT, message.clone()),
            Outcome::Cancelled => (session.progress_percent, "Update cancelled".to_string()),
            Outcome::Failed(e) => (session.progress_percent, e.to_string()),
        };

        session.enter(stage);
        emit(tap, stage, percent, message);
        if let Some(update) = tap.take_latest() {
            session.apply(&update);
        }
        info!("Update run ended: {} ({})", stage, session.status_message);
        outcome
    }
}

fn emit(tap: &StatusTap, stage: WorkflowStage, percent: u8, message: impl Into<String>) {
    tap.emit(StatusUpdate {
        stage,
        percent,
        message: message.into(),
    });
}

fn reporter(tap: &Arc<StatusTap>, stage: WorkflowStage, range: ProgressRange) -> StageReporter {
    let sink: SharedSink = Arc::clone(tap) as SharedSink;
    StageReporter::new(sink, stage, range)
}

fn missing_state(what: &str) -> UpdaterError {
    UpdaterError::Other {
        message: format!("Internal error: no {what} recorded for this session"),
    }
}
