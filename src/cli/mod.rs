//! Command-line interface for the RandPicker updater.
//!
//! The updater is normally started by RandPicker itself, which passes the
//! manifest origin and whether the running build is known to be current.
//! Everything else comes from `updater.toml` (see
//! [`UpdaterConfig`](crate::upgrade::UpdaterConfig)).
//!
//! # Global Options
//!
//! - `--origin <official|mirror>` - Manifest backend (`github` and `oss` are aliases)
//! - `--latest <true|false>` - `false` when the caller knows its build is outdated
//! - `--current-version <VERSION>` - Compare against the resolved release instead
//! - `--install-root <PATH>` - Installation to update (default: the updater's folder)
//! - `--config <PATH>` - Explicit configuration file
//! - `--yes` - Skip the confirmation prompt
//! - `--no-launch` - Do not start RandPicker after a successful update
//! - `--verbose` / `--quiet` - Log level
//! - `--no-progress` - Hide the progress bar
//!
//! # Examples
//!
//! ```bash
//! # Update from the mirror, the caller knows it is outdated
//! randpicker-updater --origin oss --latest false
//!
//! # Real version comparison, no relaunch
//! randpicker-updater --current-version 1.4.0 --no-launch
//! ```

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::upgrade::{
    Confirmation, Origin, Outcome, ReleaseInfo, UpdateOrchestrator, UpdateSession, UpdaterConfig,
};
use crate::utils::progress::TerminalProgress;

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Default log filter; `RUST_LOG` takes precedence when set
    pub log_level: String,
    /// Hide the progress bar
    pub no_progress: bool,
    /// Explicit configuration file
    pub config_path: Option<PathBuf>,
}

/// RandPicker update assistant.
#[derive(Parser, Debug)]
#[command(
    name = "randpicker-updater",
    about = "RandPicker update assistant - installs the latest release in place",
    version,
    long_about = "Checks the release manifest, backs up the current installation, downloads the new release (falling back through download mirrors) and installs it while keeping config.ini and students.json."
)]
pub struct Cli {
    /// Manifest backend: `official` (GitHub) or `mirror` (OSS feed).
    #[arg(long, default_value = "official")]
    origin: Origin,

    /// Whether the running build is believed to be the latest.
    ///
    /// `--latest false` means the caller already knows it is outdated, so
    /// any resolved release is installed.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    latest: bool,

    /// Version of the running build, compared against the resolved release.
    ///
    /// Takes precedence over `--latest` when it parses as a version.
    #[arg(long, value_name = "VERSION")]
    current_version: Option<String>,

    /// Installation to update. Defaults to the folder holding the updater.
    #[arg(long, value_name = "PATH")]
    install_root: Option<PathBuf>,

    /// Configuration file to use instead of the default lookup.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Install without asking, even when the configuration requires confirmation.
    #[arg(short, long)]
    yes: bool,

    /// Do not start RandPicker after a successful update.
    #[arg(long)]
    no_launch: bool,

    /// Enable debug logging.
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long)]
    quiet: bool,

    /// Hide the progress bar (also set by `UPDATER_NO_PROGRESS`).
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    /// Run the update.
    ///
    /// A run that ends up to date or cancelled is a success. A failed run is
    /// returned as an error carrying its [`UpdaterError`](crate::core::UpdaterError)
    /// so `main` can render it and exit with status 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the run fails.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Run the update with explicit runtime settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or the run fails.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        init_logging(&config.log_level);

        let install_root = self.install_root.clone().unwrap_or_else(default_install_root);
        debug!("Install root: {}", install_root.display());

        let updater_config = UpdaterConfig::load(config.config_path.as_deref(), &install_root)?;
        let needs_prompt = updater_config.require_confirmation && !self.yes;

        let progress = Arc::new(TerminalProgress::new(config.no_progress || self.quiet));
        let mut orchestrator =
            UpdateOrchestrator::new(updater_config, &install_root)?.with_sink(progress.clone());
        if needs_prompt {
            orchestrator = orchestrator.with_confirmation(PromptConfirmation);
        }

        let mut session = UpdateSession::new(self.origin, !self.latest);
        if let Some(version) = self.current_version {
            session = session.with_current_version(version);
        }

        let outcome = orchestrator.run(&mut session).await;
        progress.finish(&outcome);

        match outcome {
            Outcome::Finished {
                version,
            } => {
                if !self.quiet {
                    println!("{} RandPicker updated to {}", "✓".green().bold(), version.bold());
                }
                if !self.no_launch {
                    orchestrator.launch_new_version();
                }
                Ok(())
            }
            Outcome::UpToDate {
                message,
            } => {
                if !self.quiet {
                    println!("{} {}", "✓".green().bold(), message);
                }
                Ok(())
            }
            Outcome::Cancelled => {
                if !self.quiet {
                    println!("{}", "Update cancelled".yellow());
                }
                Ok(())
            }
            Outcome::Failed(e) => Err(e.into()),
        }
    }
}

/// Asks on the terminal before installing a release.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptConfirmation;

impl PromptConfirmation {
    /// Read one answer from `input`. Only `y` and `yes` approve.
    pub fn ask(release: &ReleaseInfo, input: &mut impl BufRead, output: &mut impl Write) -> bool {
        let _ = writeln!(output, "{} {}", "New version available:".bold(), release.version.green());
        if !release.changelog.trim().is_empty() {
            let _ = writeln!(output, "\n{}\n", release.changelog.trim());
        }
        let _ = write!(output, "Install now? [y/N] ");
        let _ = output.flush();

        let mut answer = String::new();
        if input.read_line(&mut answer).is_err() {
            return false;
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

impl Confirmation for PromptConfirmation {
    fn confirm(&self, release: &ReleaseInfo) -> bool {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        Self::ask(release, &mut stdin.lock(), &mut stdout)
    }
}

/// Install the global `tracing` subscriber. `RUST_LOG` overrides `level`.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("randpicker_updater={level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn default_install_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}
