//! Integration test suite for the RandPicker updater
//!
//! These tests drive [`UpdateOrchestrator`](randpicker_updater::upgrade::UpdateOrchestrator)
//! end to end against a local HTTP server and a temporary installation
//! directory. They need no network access and run in CI on every commit.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! RUST_LOG=randpicker_updater=debug cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **workflow**: Successful updates, origins and progress reporting
//! - **download**: Mirror fallback, checksum and stream hardening
//! - **failures**: Manifest failures, corrupt archives and restore

mod download;
mod failures;
mod workflow;
