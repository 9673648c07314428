//! RandPicker updater
//!
//! Replaces a RandPicker installation in place with the latest published
//! release while keeping the user's data.
//!
//! # Architecture Overview
//!
//! One run resolves the latest release from the official (GitHub) or mirror
//! manifest, moves the current installation into a backup folder, downloads
//! the release archive (trying download mirrors when the primary URL fails),
//! extracts it and flattens the archive's nested `RandPicker/` folder into the
//! install root. `config.ini`, `students.json`, the updater itself and the
//! backup folder are never moved or overwritten.
//!
//! # Core Modules
//!
//! - [`upgrade`] - The update workflow and its stages
//! - [`core`] - Error types and user-facing error rendering
//! - [`cli`] - Command-line interface
//! - [`constants`] - Timeouts, progress ranges and default file layout
//! - [`utils`] - Filesystem helpers and the terminal progress bar
//!
//! # Example
//!
//! ```rust,no_run
//! use randpicker_updater::upgrade::{Origin, UpdateOrchestrator, UpdateSession, UpdaterConfig};
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let root = Path::new("C:/Program Files/RandPicker");
//! let config = UpdaterConfig::load(None, root)?;
//! let orchestrator = UpdateOrchestrator::new(config, root)?;
//!
//! let mut session = UpdateSession::new(Origin::Mirror, true);
//! let outcome = orchestrator.run(&mut session).await;
//! if outcome.is_success() {
//!     orchestrator.launch_new_version();
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
