// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Full deploy run against a mocked release API and deployment server

use mockito::{Matcher, Server, ServerGuard};
use owsf_deploy::firmware::{self, FirmwareArtifact};
use owsf_deploy::pipeline::{self, DeployReport};
use owsf_deploy::uploader::{ArtifactKind, UploadOutcome};
use owsf_deploy::{DeployError, DeploymentTarget, PipelinePaths, ToolConfig, http};
use serde_json::json;
use tempfile::TempDir;

const KEY_B64: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";
const LATEST_PATH: &str = "/repos/owsf/owsf-firmware/releases/latest";

fn workspace() -> (TempDir, PipelinePaths) {
    let root = tempfile::tempdir().unwrap();
    let data_dir = root.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::write(
        data_dir.join("global_config.json"),
        json!({"global_config_key": KEY_B64, "mqtt_host": "broker"}).to_string(),
    )
    .unwrap();

    let fragment = root.path().join("bme280.json");
    std::fs::write(&fragment, json!({"sensors": [{"type": "bme280"}]}).to_string()).unwrap();

    let mapping_file = root.path().join("mapping.json");
    let entry = |name: &str| {
        json!({
            "config_version": 1,
            "device_name": name,
            "sleep_time_s": 300,
            "sensor_config": [&fragment],
        })
    };
    std::fs::write(
        &mapping_file,
        json!({"a1b2": entry("attic"), "c3d4": entry("cellar")}).to_string(),
    )
    .unwrap();

    let paths = PipelinePaths {
        data_dir,
        output_dir: root.path().join("server_data"),
        mapping_file,
    };
    (root, paths)
}

fn test_config(server: &ServerGuard) -> ToolConfig {
    ToolConfig {
        api_base_url: server.url(),
        max_retries: 0,
        ..Default::default()
    }
}

async fn mock_release(server: &mut ServerGuard) {
    let download_url = format!("{}/download/v1.4.0/firmware.sig", server.url());
    server
        .mock("GET", LATEST_PATH)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "tag_name": "v1.4.0",
                "assets": [{"name": "firmware.sig", "browser_download_url": download_url}],
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/download/v1.4.0/firmware.sig")
        .with_status(200)
        .with_body(b"signed-image")
        .create_async()
        .await;
}

async fn run(server: &ServerGuard, paths: &PipelinePaths) -> Result<DeployReport, DeployError> {
    let config = test_config(server);
    let target = DeploymentTarget::new(server.url(), "tok");
    let client = http::build_client(&config).unwrap();
    pipeline::deploy(&client, &config, &target, paths).await
}

fn outcome_of<'a>(report: &'a DeployReport, kind: ArtifactKind, label: &str) -> &'a UploadOutcome {
    &report
        .records
        .iter()
        .find(|r| r.kind == kind && r.label == label)
        .unwrap()
        .outcome
}

#[tokio::test]
async fn test_deploy_uploads_every_artifact_class() {
    let mut server = Server::new_async().await;
    let (_root, paths) = workspace();
    mock_release(&mut server).await;

    let global = server
        .mock("PUT", "/api/v1/deploy/global_config")
        .match_header("x-auth-token", "tok")
        .match_header("x-global-config-key", KEY_B64)
        .with_status(201)
        .create_async()
        .await;
    let local = server
        .mock("PUT", "/api/v1/deploy/local_config")
        .match_header("x-auth-token", "tok")
        .match_header("x-chip-id", Matcher::Regex("^(a1b2|c3d4)$".to_owned()))
        .with_status(201)
        .expect(2)
        .create_async()
        .await;
    let firmware = server
        .mock("PUT", "/api/v1/deploy/firmware")
        .match_header("x-firmware-version", "v1.4.0")
        .match_body("signed-image")
        .with_status(201)
        .create_async()
        .await;

    let report = run(&server, &paths).await.unwrap();

    assert_eq!(report.records.len(), 4);
    assert!(!report.has_failures());
    assert!(paths.output_dir.join("config.json.a1b2").is_file());
    assert!(paths.output_dir.join("config.json.c3d4").is_file());
    assert_eq!(
        std::fs::read_to_string(paths.output_dir.join("fw_version")).unwrap(),
        "v1.4.0"
    );

    global.assert_async().await;
    local.assert_async().await;
    firmware.assert_async().await;
}

#[tokio::test]
async fn test_rejected_upload_does_not_abort_deploy() {
    let mut server = Server::new_async().await;
    let (_root, paths) = workspace();
    mock_release(&mut server).await;

    server
        .mock("PUT", "/api/v1/deploy/global_config")
        .with_status(401)
        .with_body("bad token")
        .create_async()
        .await;
    server
        .mock("PUT", "/api/v1/deploy/local_config")
        .with_status(201)
        .expect(2)
        .create_async()
        .await;
    let firmware = server
        .mock("PUT", "/api/v1/deploy/firmware")
        .with_status(304)
        .create_async()
        .await;

    let report = run(&server, &paths).await.unwrap();

    assert!(report.has_failures());
    assert_eq!(report.failures().count(), 1);
    assert_eq!(
        outcome_of(&report, ArtifactKind::GlobalConfig, "global_config.json"),
        &UploadOutcome::Failed {
            status: 401,
            body: "bad token".to_owned()
        }
    );
    assert_eq!(
        outcome_of(&report, ArtifactKind::Firmware, "v1.4.0"),
        &UploadOutcome::AlreadyCurrent
    );
    firmware.assert_async().await;
}

#[tokio::test]
async fn test_deploy_never_sends_previously_staged_local_image() {
    let mut server = Server::new_async().await;
    let (_root, paths) = workspace();
    mock_release(&mut server).await;

    firmware::stage(
        &FirmwareArtifact {
            version: "v1.0.0".to_owned(),
            filename: "firmware.v1.0.0.sig".to_owned(),
            data: b"OLD-LOCAL".to_vec(),
        },
        &paths.output_dir,
    )
    .unwrap();

    server
        .mock("PUT", Matcher::Regex("^/api/v1/deploy/(global|local)_config$".to_owned()))
        .with_status(201)
        .expect_at_least(1)
        .create_async()
        .await;
    let stale = server
        .mock("PUT", "/api/v1/deploy/firmware")
        .match_body("OLD-LOCAL")
        .with_status(201)
        .expect(0)
        .create_async()
        .await;
    let fresh = server
        .mock("PUT", "/api/v1/deploy/firmware")
        .match_header("x-firmware-version", "v1.4.0")
        .match_body("signed-image")
        .with_status(201)
        .expect(1)
        .create_async()
        .await;

    let report = run(&server, &paths).await.unwrap();

    let firmware_records = report
        .records
        .iter()
        .filter(|r| r.kind == ArtifactKind::Firmware)
        .count();
    assert_eq!(firmware_records, 1);
    assert!(!paths.output_dir.join("firmware.v1.0.0.sig").exists());
    stale.assert_async().await;
    fresh.assert_async().await;
}

#[tokio::test]
async fn test_missing_release_is_fatal() {
    let mut server = Server::new_async().await;
    let (_root, paths) = workspace();

    server
        .mock("PUT", Matcher::Regex("^/api/v1/deploy/".to_owned()))
        .with_status(201)
        .create_async()
        .await;
    server
        .mock("GET", LATEST_PATH)
        .with_status(404)
        .with_body("Not Found")
        .create_async()
        .await;

    let err = run(&server, &paths).await.unwrap_err();
    assert!(matches!(err, DeployError::ReleaseCheck(_)));
    assert!(!paths.output_dir.join("firmware.sig").exists());
}
