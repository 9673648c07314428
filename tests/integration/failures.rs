//! Runs that end in failure, and what they leave behind.

use std::time::Duration;

use randpicker_updater::core::UpdaterError;
use randpicker_updater::test_utils::{
    InstallRootFixture, Route, TestServer, github_manifest, release_archive, release_server,
    updater_config,
};
use randpicker_updater::upgrade::{
    Origin, Outcome, UpdateOrchestrator, UpdateSession, UpdaterConfig, WorkflowStage,
};

#[tokio::test]
async fn test_manifest_timeout_leaves_installation_untouched() {
    let server = TestServer::new();
    let manifest = github_manifest("v2.0.0", &server.url("/v2.zip"), "fix bugs", None);
    server.mount("/release", Route::json(manifest).with_delay(Duration::from_secs(4)));
    let root = InstallRootFixture::new();
    let before = root.top_level();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;

    match outcome {
        Outcome::Failed(UpdaterError::ManifestUnavailable {
            reason,
        }) => assert!(reason.starts_with("Update check failed"), "{reason}"),
        other => panic!("expected manifest failure, got {other:?}"),
    }
    assert_eq!(session.stage, WorkflowStage::Failed);
    assert!(session.backup.is_none());
    assert_eq!(root.top_level(), before);
    assert!(!root.exists("backup"));
    assert_eq!(server.hit_count("/v2.zip"), 0);
}

#[tokio::test]
async fn test_unreachable_manifest_fails_even_for_current_build() {
    let server = TestServer::new();
    let root = InstallRootFixture::new();
    let before = root.top_level();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Mirror, false);
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Failed(UpdaterError::ManifestUnavailable { .. })));
    assert!(!outcome.is_success());
    assert_eq!(server.hit_count("/latest.json"), 1);
    assert_eq!(root.top_level(), before);
}

#[tokio::test]
async fn test_malformed_manifest_fails_without_touching_installation() {
    let server = TestServer::start(vec![("/release", Route::json("<html>rate limited</html>"))]);
    let root = InstallRootFixture::new();
    let before = root.top_level();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Failed(UpdaterError::ManifestUnavailable { .. })));
    assert_eq!(root.top_level(), before);
}

#[tokio::test]
async fn test_corrupt_archive_keeps_backup_by_default() {
    let server = release_server(b"definitely not a zip archive".to_vec(), None);
    let root = InstallRootFixture::new();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Failed(UpdaterError::ExtractionFailed { .. })));
    assert!(!root.exists("RandPicker.exe"));
    assert_eq!(root.read("backup/RandPicker.exe"), "old RandPicker.exe");
    assert_eq!(root.read("config.ini"), "old config.ini");
    assert_eq!(root.read("students.json"), "old students.json");
    assert!(session.progress_percent >= 75);
}

#[tokio::test]
async fn test_corrupt_archive_restores_backup_when_enabled() {
    let server = release_server(b"definitely not a zip archive".to_vec(), None);
    let root = InstallRootFixture::new();
    let config = UpdaterConfig {
        restore_on_failure: true,
        ..updater_config(&server)
    };

    let orchestrator = UpdateOrchestrator::new(config, root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Failed(UpdaterError::ExtractionFailed { .. })));
    assert_eq!(root.read("RandPicker.exe"), "old RandPicker.exe");
    assert_eq!(root.read("assets/Logo.png"), "old assets/Logo.png");
    assert_eq!(root.read("config.ini"), "old config.ini");
    assert!(!root.exists("update.zip"));
    assert!(!root.exists("backup/RandPicker.exe"));
}

#[tokio::test]
async fn test_backup_failure_stops_before_download() {
    let server = release_server(release_archive("RandPicker", &[("RandPicker.exe", b"new")]), None);
    let root = InstallRootFixture::new();
    // A plain file where the backup directory belongs
    root.write("backup", "not a directory");
    let before = root.top_level();

    let config = UpdaterConfig {
        restore_on_failure: true,
        ..updater_config(&server)
    };
    let orchestrator = UpdateOrchestrator::new(config, root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Failed(UpdaterError::BackupFailed { .. })), "{outcome:?}");
    assert!(session.backup.is_none());
    assert_eq!(server.hit_count("/v2.zip"), 0);
    assert_eq!(root.top_level(), before);
    assert_eq!(root.read("RandPicker.exe"), "old RandPicker.exe");
    assert_eq!(root.read("backup"), "not a directory");
}
