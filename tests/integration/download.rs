//! Mirror fallback and download hardening.

use std::time::{Duration, Instant};

use randpicker_updater::core::UpdaterError;
use randpicker_updater::test_utils::{
    InstallRootFixture, Route, TestServer, github_manifest, release_archive, sha256_hex,
    updater_config,
};
use randpicker_updater::upgrade::{
    Origin, Outcome, UpdateOrchestrator, UpdateSession, UpdaterConfig,
};

fn archive() -> Vec<u8> {
    release_archive("RandPicker", &[("RandPicker.exe", b"new RandPicker.exe")])
}

/// Server whose official manifest points at `/v2.zip`, with `/m1/` as the only mirror.
fn fallback_server(primary: Route, mirror: Route, sha256: Option<&str>) -> TestServer {
    let server = TestServer::new();
    let manifest = github_manifest("v2.0.0", &server.url("/v2.zip"), "fix bugs", sha256);
    server.mount("/release", Route::json(manifest));
    server.mount("/v2.zip", primary);
    server.mount("/m1/", mirror);
    server
}

fn mirrored_config(server: &TestServer) -> UpdaterConfig {
    UpdaterConfig {
        mirror_templates: vec![server.url("/m1/{url}")],
        ..updater_config(server)
    }
}

async fn run(config: UpdaterConfig, root: &InstallRootFixture) -> Outcome {
    let orchestrator = UpdateOrchestrator::new(config, root.path()).unwrap();
    let mut session = UpdateSession::new(Origin::Official, true);
    orchestrator.run(&mut session).await
}

fn leftover_partials(root: &InstallRootFixture) -> Vec<String> {
    root.top_level().into_iter().filter(|name| name.ends_with(".part")).collect()
}

#[tokio::test]
async fn test_primary_failure_falls_back_to_mirror() {
    let server = fallback_server(Route::status(503), Route::ok(archive()), None);
    let root = InstallRootFixture::new();

    let outcome = run(mirrored_config(&server), &root).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(server.hit_count("/v2.zip"), 1);
    assert_eq!(server.hit_count("/m1/"), 1);
    let mirror_path = format!("/m1/{}", server.url("/v2.zip"));
    assert!(server.hits().contains(&mirror_path), "{:?}", server.hits());
    assert_eq!(root.read("RandPicker.exe"), "new RandPicker.exe");
    assert!(leftover_partials(&root).is_empty());
}

#[tokio::test]
async fn test_mirrors_not_tried_when_fallback_disabled() {
    let server = fallback_server(Route::status(503), Route::ok(archive()), None);
    let root = InstallRootFixture::new();
    let config = UpdaterConfig {
        enable_mirror_fallback: false,
        ..mirrored_config(&server)
    };

    let outcome = run(config, &root).await;

    assert!(matches!(outcome, Outcome::Failed(UpdaterError::DownloadFailed { attempts: 1, .. })));
    assert_eq!(server.hit_count("/m1/"), 0);
}

#[tokio::test]
async fn test_every_source_failing_reports_all_attempts() {
    let server = fallback_server(Route::status(404), Route::status(502), None);
    let root = InstallRootFixture::new();

    let outcome = run(mirrored_config(&server), &root).await;

    match outcome {
        Outcome::Failed(UpdaterError::DownloadFailed {
            attempts,
            reason,
        }) => {
            assert_eq!(attempts, 2);
            assert!(reason.contains("404"), "{reason}");
            assert!(reason.contains("502"), "{reason}");
        }
        other => panic!("expected download failure, got {other:?}"),
    }
    assert!(!root.exists("update.zip"));
    assert!(leftover_partials(&root).is_empty());
    // Backup already happened; user data stayed in place
    assert!(root.exists("backup/RandPicker.exe"));
    assert_eq!(root.read("config.ini"), "old config.ini");
}

#[tokio::test]
async fn test_checksum_mismatch_falls_back_to_mirror() {
    let genuine = archive();
    let digest = sha256_hex(&genuine);
    let tampered = release_archive("RandPicker", &[("RandPicker.exe", b"tampered")]);
    let server = fallback_server(Route::ok(tampered), Route::ok(genuine), Some(&digest));
    let root = InstallRootFixture::new();

    let outcome = run(mirrored_config(&server), &root).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(server.hit_count("/m1/"), 1);
    assert_eq!(root.read("RandPicker.exe"), "new RandPicker.exe");
}

#[tokio::test]
async fn test_checksum_ignored_when_verification_disabled() {
    let digest = sha256_hex(b"something else entirely");
    let server = fallback_server(Route::ok(archive()), Route::status(502), Some(&digest));
    let root = InstallRootFixture::new();
    let config = UpdaterConfig {
        verify_checksum: false,
        ..mirrored_config(&server)
    };

    let outcome = run(config, &root).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(server.hit_count("/m1/"), 0);
}

#[tokio::test]
async fn test_stalled_download_times_out_and_falls_back() {
    let stalled = Route::ok(archive()).stalling_after(16, Duration::from_secs(4));
    let server = fallback_server(stalled, Route::ok(archive()), None);
    let root = InstallRootFixture::new();
    let config = UpdaterConfig {
        download_idle_timeout_secs: 1,
        ..mirrored_config(&server)
    };

    let outcome = run(config, &root).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(server.hit_count("/m1/"), 1);
    assert!(leftover_partials(&root).is_empty());
}

#[tokio::test]
async fn test_silent_primary_times_out_and_falls_back() {
    let silent = Route::ok(archive()).with_delay(Duration::from_secs(6));
    let server = fallback_server(silent, Route::ok(archive()), None);
    let root = InstallRootFixture::new();
    let config = UpdaterConfig {
        download_idle_timeout_secs: 1,
        ..mirrored_config(&server)
    };

    let started = Instant::now();
    let outcome = run(config, &root).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(server.hit_count("/m1/"), 1);
    assert!(started.elapsed() < Duration::from_secs(5), "waited {:?}", started.elapsed());
    assert!(leftover_partials(&root).is_empty());
}

#[tokio::test]
async fn test_download_without_content_length() {
    let server = fallback_server(
        Route::ok(archive()).without_content_length(),
        Route::status(502),
        None,
    );
    let root = InstallRootFixture::new();

    let outcome = run(mirrored_config(&server), &root).await;

    assert!(matches!(outcome, Outcome::Finished { .. }), "{outcome:?}");
    assert_eq!(root.read("RandPicker.exe"), "new RandPicker.exe");
}
