//! RandPicker updater entry point
//!
//! Parses the command line, runs one update and renders a failure as a
//! user-friendly error before exiting with status 1.

use anyhow::Result;
use clap::Parser;
use randpicker_updater::cli;
use randpicker_updater::core::error::user_friendly_error;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
