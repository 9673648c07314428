//! In-place update of a RandPicker installation.
//!
//! This module checks a release manifest for a newer version, backs up the
//! current installation, downloads the release archive (falling back through
//! download mirrors), extracts it and flattens the nested release folder into
//! the install root.
//!
//! # Architecture Overview
//!
//! ## Core Components
//!
//! - **[`ManifestResolver`]**: Fetches the latest release from the official or mirror backend
//! - **[`ArtifactDownloader`]**: Streams the archive to disk, trying mirrors in order
//! - **[`InstallationBackup`]**: Moves the current installation aside before it is replaced
//! - **[`ArchiveExtractor`]**: Unpacks the archive and promotes the nested folder
//! - **[`UpdateOrchestrator`]**: Runs the stages above as one linear workflow
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Resolve manifest          (sentinel release or nothing newer: stop, untouched)
//! 2. Await confirmation        (optional; declining stops, untouched)
//! 3. Back up                   install root -> backup/            15%
//! 4. Download                  primary, then mirrors       15% - 75%
//! 5. Extract                   update.zip -> install root  75% - 93%
//! 6. Promote                   RandPicker/* -> install root 93% - 97%
//! 7. Clean up                  delete update.zip                 100%
//! ```
//!
//! # Safety Mechanisms
//!
//! - The backup always completes before anything is downloaded or extracted
//! - `config.ini`, `students.json`, the updater binary and the backup
//!   directory are never moved or overwritten
//! - Partial downloads live in temporary files that are deleted on failure
//! - Archives are verified against the manifest's SHA256 digest when one is published
//! - Archive entries escaping the install root are rejected
//! - With `restore_on_failure`, a failure after the backup moves the previous
//!   installation back
//!
//! # Progress
//!
//! The workflow reports `{stage, percent, message}` events to a
//! [`ProgressSink`](progress::ProgressSink) and knows nothing about how they
//! are displayed:
//!
//! ```rust,no_run
//! use randpicker_updater::upgrade::{Origin, UpdateOrchestrator, UpdateSession, UpdaterConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let orchestrator =
//!     UpdateOrchestrator::new(UpdaterConfig::default(), ".")?.with_sink(Arc::new(tx));
//!
//! tokio::spawn(async move {
//!     while let Some(update) = rx.recv().await {
//!         println!("[{:>3}%] {}", update.percent, update.message);
//!     }
//! });
//!
//! let mut session = UpdateSession::new(Origin::Official, true);
//! let outcome = orchestrator.run(&mut session).await;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

/// Relocation of the current installation into the backup directory.
pub mod backup;
/// Updater configuration and its lookup order.
pub mod config;
/// Release archive download with mirror fallback.
pub mod download;
/// Archive extraction and nested folder promotion.
pub mod extract;
/// Manifest backends and release normalization.
pub mod manifest;
/// The stage pipeline.
pub mod orchestrator;
/// Status events and progress rescaling.
pub mod progress;
/// Per-run state.
pub mod session;
/// Download verification and integrity checking.
pub mod verification;


pub use backup::{BackupManifest, Denylist, InstallationBackup};
pub use config::UpdaterConfig;
pub use download::{ArtifactDownloader, DownloadTarget};
pub use extract::ArchiveExtractor;
pub use manifest::{ManifestResolver, Origin, ReleaseInfo};
pub use orchestrator::{AutoConfirm, Confirmation, Outcome, UpdateOrchestrator};
pub use progress::{ProgressSink, StatusUpdate};
pub use session::{UpdateSession, WorkflowStage};
pub use verification::ChecksumVerifier;
