// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Latest firmware release lookup via the GitHub releases API

use crate::config::ToolConfig;
use crate::error::{DeployError, Result};
use crate::http;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Download URLs of signed firmware images contain this marker
pub const SIGNED_FIRMWARE_MARKER: &str = "firmware.sig";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub tag: String,
    pub asset_name: String,
    pub download_url: String,
}

#[derive(Debug, Deserialize, Serialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize, Serialize)]
struct GithubAsset {
    #[serde(default)]
    name: String,
    browser_download_url: String,
}

impl GithubRelease {
    // When several assets match, the last listed one wins.
    fn signed_firmware(&self) -> Option<&GithubAsset> {
        self.assets
            .iter()
            .rev()
            .find(|a| a.browser_download_url.contains(SIGNED_FIRMWARE_MARKER))
    }
}

pub async fn check_latest_release(client: &Client, config: &ToolConfig) -> Result<ReleaseInfo> {
    let url = config.latest_release_url();
    tracing::debug!("Querying {url}");

    let response = http::send_with_retry(config, "release check", || client.get(&url))
        .await
        .map_err(|e| DeployError::ReleaseCheck(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = http::body_text(response).await;
        return Err(DeployError::ReleaseCheck(format!(
            "GitHub API error {status}: {body}"
        )));
    }

    let release: GithubRelease = response
        .json()
        .await
        .map_err(|e| DeployError::ReleaseCheck(format!("Failed to parse response: {e}")))?;

    let asset = release.signed_firmware().ok_or_else(|| {
        DeployError::ReleaseCheck(format!(
            "Release {} has no {SIGNED_FIRMWARE_MARKER} asset",
            release.tag_name
        ))
    })?;

    Ok(ReleaseInfo {
        tag: release.tag_name.clone(),
        asset_name: asset.name.clone(),
        download_url: asset.browser_download_url.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Server, ServerGuard};
    use serde_json::json;

    const LATEST_PATH: &str = "/repos/owsf/owsf-firmware/releases/latest";

    fn test_config(server: &ServerGuard) -> ToolConfig {
        ToolConfig {
            api_base_url: server.url(),
            max_retries: 0,
            ..Default::default()
        }
    }

    fn asset(server: &ServerGuard, name: &str) -> GithubAsset {
        GithubAsset {
            name: name.to_owned(),
            browser_download_url: format!("{}/download/{name}", server.url()),
        }
    }

    #[tokio::test]
    async fn test_check_latest_release_success() {
        let mut server = Server::new_async().await;
        let release = GithubRelease {
            tag_name: "v1.4.0".to_owned(),
            assets: vec![
                asset(&server, "firmware.bin"),
                asset(&server, "firmware.sig"),
                asset(&server, "public.key"),
            ],
        };

        let mock = server
            .mock("GET", LATEST_PATH)
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(serde_json::to_string(&release).unwrap())
            .create_async()
            .await;

        let config = test_config(&server);
        let client = http::build_client(&config).unwrap();
        let info = check_latest_release(&client, &config).await.unwrap();

        assert_eq!(info.tag, "v1.4.0");
        assert_eq!(info.asset_name, "firmware.sig");
        assert_eq!(info.download_url, format!("{}/download/firmware.sig", server.url()));

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_last_matching_asset_wins() {
        let mut server = Server::new_async().await;
        let release = GithubRelease {
            tag_name: "v1.4.0".to_owned(),
            assets: vec![
                asset(&server, "old-firmware.sig"),
                asset(&server, "firmware.sig"),
            ],
        };

        server
            .mock("GET", LATEST_PATH)
            .with_status(200)
            .with_body(serde_json::to_string(&release).unwrap())
            .create_async()
            .await;

        let config = test_config(&server);
        let client = http::build_client(&config).unwrap();
        let info = check_latest_release(&client, &config).await.unwrap();
        assert_eq!(info.asset_name, "firmware.sig");
    }

    #[tokio::test]
    async fn test_release_without_firmware_asset() {
        let mut server = Server::new_async().await;
        let release = GithubRelease {
            tag_name: "v1.4.0".to_owned(),
            assets: vec![asset(&server, "firmware.bin")],
        };

        let mock = server
            .mock("GET", LATEST_PATH)
            .with_status(200)
            .with_body(serde_json::to_string(&release).unwrap())
            .create_async()
            .await;

        let config = test_config(&server);
        let client = http::build_client(&config).unwrap();
        let result = check_latest_release(&client, &config).await;

        assert!(matches!(result.unwrap_err(), DeployError::ReleaseCheck(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_listing_error_status() {
        let mut server = Server::new_async().await;

        let mock = server
            .mock("GET", LATEST_PATH)
            .with_status(403)
            .with_header("content-type", "application/json")
            .with_body(json!({"message": "API rate limit exceeded"}).to_string())
            .create_async()
            .await;

        let config = test_config(&server);
        let client = http::build_client(&config).unwrap();
        let err = check_latest_release(&client, &config).await.unwrap_err();

        assert!(matches!(err, DeployError::ReleaseCheck(_)));
        assert!(err.to_string().contains("rate limit"));
        mock.assert_async().await;
    }
}
