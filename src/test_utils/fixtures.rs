//! Release archives, manifests and installation directories for tests.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use serde_json::json;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

use crate::test_utils::server::{Route, TestServer};
use crate::upgrade::UpdaterConfig;

/// Build a zip archive in memory. Names ending in `/` become directories.
pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, SimpleFileOptions::default()).expect("add directory");
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).expect("start file");
            writer.write_all(content).expect("write entry");
        }
    }
    writer.finish().expect("finish zip").into_inner()
}

/// Build a release archive: every file nested under a `product/` folder.
pub fn release_archive(product: &str, files: &[(&str, &[u8])]) -> Vec<u8> {
    let folder = format!("{product}/");
    let names: Vec<String> = files.iter().map(|(name, _)| format!("{folder}{name}")).collect();

    let mut entries: Vec<(&str, &[u8])> = Vec::with_capacity(files.len() + 1);
    entries.push((folder.as_str(), &[]));
    entries.extend(names.iter().zip(files).map(|(name, (_, content))| (name.as_str(), *content)));
    zip_bytes(&entries)
}

/// Lowercase hex SHA256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A manifest in the official (GitHub REST) layout.
pub fn github_manifest(tag: &str, download_url: &str, body: &str, sha256: Option<&str>) -> String {
    let mut asset = json!({ "name": "RandPicker.zip", "browser_download_url": download_url });
    if let Some(hex) = sha256 {
        asset["digest"] = json!(format!("sha256:{hex}"));
    }
    json!({ "tag_name": tag, "assets": [asset], "body": body }).to_string()
}

/// A manifest in the mirror feed layout.
pub fn mirror_manifest(version: &str, url: &str, changelog: &str) -> String {
    json!({ "version": version, "url": url, "changelog": changelog }).to_string()
}

/// Server publishing release `v2.0.0` with `archive` as its only asset.
///
/// Serves the archive at `/v2.zip`, the official manifest at `/release`
/// (with `sha256` as the asset digest when given) and the mirror manifest
/// at `/latest.json`.
pub fn release_server(archive: Vec<u8>, sha256: Option<&str>) -> TestServer {
    let server = TestServer::new();
    let url = server.url("/v2.zip");
    server.mount("/v2.zip", Route::ok(archive));
    server.mount("/release", Route::json(github_manifest("v2.0.0", &url, "fix bugs", sha256)));
    server.mount("/latest.json", Route::json(mirror_manifest("v2.0.0", &url, "fix bugs")));
    server
}

/// Configuration pointing both manifest backends at `server`.
///
/// Manifests are served from `/release` (official) and `/latest.json`
/// (mirror). No download mirrors are configured, timeouts are short and the
/// updater binary is named `Updater.exe` regardless of the test binary's name.
pub fn updater_config(server: &TestServer) -> UpdaterConfig {
    UpdaterConfig {
        official_manifest_url: server.url("/release"),
        mirror_manifest_url: server.url("/latest.json"),
        manifest_timeout_secs: 2,
        mirror_templates: Vec::new(),
        download_idle_timeout_secs: 5,
        updater_executable: Some("Updater.exe".to_string()),
        ..UpdaterConfig::default()
    }
}

/// A temporary RandPicker installation.
///
/// Contains the product executable, an `assets/` directory, the user's
/// `config.ini` and `students.json`, and the updater binary `Updater.exe`.
pub struct InstallRootFixture {
    temp: TempDir,
}

impl InstallRootFixture {
    /// Names of the files the fixture starts with, relative to the root.
    pub const FILES: [&'static str; 5] =
        ["RandPicker.exe", "assets/Logo.png", "config.ini", "students.json", "Updater.exe"];

    /// Create a populated installation.
    pub fn new() -> Self {
        let fixture = Self::empty();
        for file in Self::FILES {
            fixture.write(file, &format!("old {file}"));
        }
        fixture
    }

    /// Create an empty installation directory.
    pub fn empty() -> Self {
        Self {
            temp: TempDir::new().expect("create temp dir"),
        }
    }

    /// Install root path.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// Absolute path of `relative`.
    pub fn join(&self, relative: &str) -> PathBuf {
        self.temp.path().join(relative)
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) {
        let path = self.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, content).expect("write fixture file");
    }

    /// Read a file as UTF-8.
    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.join(relative)).expect("read fixture file")
    }

    /// Whether `relative` exists.
    pub fn exists(&self, relative: &str) -> bool {
        self.join(relative).exists()
    }

    /// Sorted top-level names, for asserting that nothing was touched.
    pub fn top_level(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.path())
            .expect("read install root")
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl Default for InstallRootFixture {
    fn default() -> Self {
        Self::new()
    }
}
