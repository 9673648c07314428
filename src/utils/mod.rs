//! Filesystem and terminal helpers shared by the update workflow.
//!
//! # Modules
//!
//! - [`fs`] - Whole-entry relocation inside the install root
//! - [`progress`] - Terminal progress bar for workflow status updates

pub mod fs;
pub mod progress;

pub use fs::{ensure_dir, move_entry, remove_entry, top_level_entries};
pub use progress::TerminalProgress;
