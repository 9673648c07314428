//! Test utilities for the updater
//!
//! This module provides shared fixtures for unit and integration tests:
//! - A local HTTP server serving manifests and archives ([`TestServer`])
//! - Release archive and manifest builders
//! - A populated fake installation directory ([`InstallRootFixture`])
//!
//! It is compiled for the crate's own tests and, through the `test-utils`
//! feature, for the integration test targets.
//!
//! # Example
//!
//! ```rust,ignore
//! use randpicker_updater::test_utils::{Route, TestServer, release_archive};
//!
//! let archive = release_archive("RandPicker", &[("RandPicker.exe", b"v2")]);
//! let server = TestServer::start(vec![("/v2.zip", Route::ok(archive))]);
//! println!("archive at {}", server.url("/v2.zip"));
//! ```

pub mod fixtures;
pub mod server;

pub use fixtures::{
    InstallRootFixture, github_manifest, mirror_manifest, release_archive, release_server,
    sha256_hex, updater_config, zip_bytes,
};
pub use server::{Route, TestServer};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` when given, otherwise
/// `RUST_LOG` when set, otherwise stays silent.
///
/// ```bash
/// RUST_LOG=randpicker_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}
