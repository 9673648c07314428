//! Successful update runs.

use std::sync::{Arc, Mutex};

use randpicker_updater::test_utils::{
    InstallRootFixture, init_test_logging, release_archive, release_server, sha256_hex,
    updater_config,
};
use randpicker_updater::upgrade::progress::FnSink;
use randpicker_updater::upgrade::{
    Origin, Outcome, StatusUpdate, UpdateOrchestrator, UpdateSession, WorkflowStage,
};

fn new_release() -> Vec<u8> {
    release_archive(
        "RandPicker",
        &[
            ("RandPicker.exe", b"new RandPicker.exe"),
            ("assets/Logo.png", b"new logo"),
            ("assets/icons/app.ico", b"new icon"),
            ("config.ini", b"shipped defaults"),
        ],
    )
}

#[tokio::test]
async fn test_update_replaces_installation_and_keeps_user_data() {
    init_test_logging(None);
    let server = release_server(new_release(), None);
    let root = InstallRootFixture::new();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Finished { ref version } if version == "v2.0.0"));
    assert_eq!(session.stage, WorkflowStage::Finished);

    // New files promoted out of the nested folder
    assert_eq!(root.read("RandPicker.exe"), "new RandPicker.exe");
    assert_eq!(root.read("assets/Logo.png"), "new logo");
    assert_eq!(root.read("assets/icons/app.ico"), "new icon");
    assert!(!root.exists("RandPicker"));
    assert!(!root.exists("update.zip"));

    // User data and the updater untouched
    assert_eq!(root.read("config.ini"), "old config.ini");
    assert_eq!(root.read("students.json"), "old students.json");
    assert_eq!(root.read("Updater.exe"), "old Updater.exe");

    // Previous installation kept in the backup folder
    assert_eq!(root.read("backup/RandPicker.exe"), "old RandPicker.exe");
    assert_eq!(root.read("backup/assets/Logo.png"), "old assets/Logo.png");
    assert!(!root.exists("backup/config.ini"));
    assert!(!root.exists("backup/Updater.exe"));
}

#[tokio::test]
async fn test_mirror_origin_reads_mirror_manifest() {
    let server = release_server(new_release(), None);
    let root = InstallRootFixture::new();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Mirror, true);
    let outcome = orchestrator.run(&mut session).await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(server.hit_count("/latest.json"), 1);
    assert_eq!(server.hit_count("/release"), 0);
    assert_eq!(root.read("RandPicker.exe"), "new RandPicker.exe");
    assert_eq!(session.release.as_ref().map(|r| r.changelog.as_str()), Some("fix bugs"));
}

#[tokio::test]
async fn test_published_checksum_is_accepted() {
    let archive = new_release();
    let digest = sha256_hex(&archive);
    let server = release_server(archive, Some(&digest));
    let root = InstallRootFixture::new();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(session.release.and_then(|r| r.sha256), Some(digest));
}

#[tokio::test]
async fn test_newer_current_version_skips_update() {
    let server = release_server(new_release(), None);
    let root = InstallRootFixture::new();
    let before = root.top_level();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true).with_current_version("v2.1.0");
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::UpToDate { ref message } if message.contains("v2.0.0")));
    assert_eq!(server.hit_count("/v2.zip"), 0);
    assert_eq!(root.top_level(), before);
}

#[tokio::test]
async fn test_older_current_version_installs_update() {
    let server = release_server(new_release(), None);
    let root = InstallRootFixture::new();

    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, false).with_current_version("1.9.3");
    let outcome = orchestrator.run(&mut session).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(root.read("RandPicker.exe"), "new RandPicker.exe");
}

#[tokio::test]
async fn test_progress_never_goes_backwards() {
    let server = release_server(new_release(), None);
    let root = InstallRootFixture::new();
    let updates: Arc<Mutex<Vec<StatusUpdate>>> = Arc::new(Mutex::new(Vec::new()));

    let collected = Arc::clone(&updates);
    let sink = FnSink(move |update: StatusUpdate| collected.lock().unwrap().push(update));
    let orchestrator = UpdateOrchestrator::new(updater_config(&server), root.path())
        .unwrap()
        .with_sink(Arc::new(sink));
    let mut session = UpdateSession::new(Origin::Official, true);
    let outcome = orchestrator.run(&mut session).await;
    assert!(outcome.is_success());

    let updates = updates.lock().unwrap();
    assert!(!updates.is_empty());
    assert!(
        updates.windows(2).all(|pair| pair[0].percent <= pair[1].percent),
        "progress went backwards: {:?}",
        updates.iter().map(|u| u.percent).collect::<Vec<_>>()
    );
    assert!(updates.iter().all(|u| u.percent <= 100));

    let backed_up = updates.iter().find(|u| u.stage == WorkflowStage::BackingUp && u.percent == 15);
    assert!(backed_up.is_some());
    let downloading = updates.iter().filter(|u| u.stage == WorkflowStage::Downloading);
    assert!(downloading.clone().all(|u| (15..=75).contains(&u.percent)));
    assert_eq!(downloading.map(|u| u.percent).max(), Some(75));

    let last = updates.last().unwrap();
    assert_eq!(last.stage, WorkflowStage::Finished);
    assert_eq!(last.percent, 100);
}
