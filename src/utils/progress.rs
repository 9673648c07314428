//! Terminal progress display for the update workflow.
//!
//! [`TerminalProgress`] renders workflow [`StatusUpdate`]s as a single
//! `indicatif` bar running from 0 to 100. The bar is hidden when progress is
//! disabled, either explicitly or through the environment.
//!
//! # Environment Variables
//!
//! - `UPDATER_NO_PROGRESS`: Set to any value to hide the progress bar
//!
//! # Examples
//!
//! ```rust,no_run
//! use randpicker_updater::upgrade::{Origin, UpdateOrchestrator, UpdateSession, UpdaterConfig};
//! use randpicker_updater::utils::progress::TerminalProgress;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let progress = Arc::new(TerminalProgress::new(false));
//! let orchestrator = UpdateOrchestrator::new(UpdaterConfig::default(), ".")?
//!     .with_sink(progress.clone());
//!
//! let mut session = UpdateSession::new(Origin::Official, true);
//! let outcome = orchestrator.run(&mut session).await;
//! progress.finish(&outcome);
//! # Ok(())
//! # }
//! ```

use indicatif::{ProgressBar, ProgressStyle};

use crate::constants::{COMPLETE_PERCENT, NO_PROGRESS_ENV};
use crate::upgrade::Outcome;
use crate::upgrade::progress::{ProgressSink, StatusUpdate};

/// Checks if progress bars are disabled through `UPDATER_NO_PROGRESS`.
pub fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

/// Progress bar sink for interactive runs.
pub struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    /// Create the bar. It stays hidden when `disabled` is set or when
    /// `UPDATER_NO_PROGRESS` is present.
    pub fn new(disabled: bool) -> Self {
        let bar = if disabled || is_progress_disabled() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new(u64::from(COMPLETE_PERCENT));
            bar.set_style(bar_style());
            bar
        };
        Self {
            bar,
        }
    }

    /// Whether anything is drawn.
    pub fn is_hidden(&self) -> bool {
        self.bar.is_hidden()
    }

    /// Current position, 0 to 100.
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Leave the bar with a final line describing `outcome`.
    pub fn finish(&self, outcome: &Outcome) {
        match outcome {
            Outcome::Finished {
                version,
            } => self.bar.finish_with_message(format!("Updated to {version}")),
            Outcome::UpToDate {
                message,
            } => self.bar.finish_with_message(message.clone()),
            Outcome::Cancelled => self.bar.abandon_with_message("Update cancelled"),
            Outcome::Failed(_) => self.bar.abandon_with_message("Update failed"),
        }
    }
}

impl ProgressSink for TerminalProgress {
    fn emit(&self, update: StatusUpdate) {
        self.bar.set_prefix(update.stage.label().to_string());
        self.bar.set_message(update.message);
        self.bar.set_position(u64::from(update.percent));
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}
