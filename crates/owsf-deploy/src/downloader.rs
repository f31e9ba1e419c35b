// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Release asset download

use crate::config::ToolConfig;
use crate::error::{DeployError, Result};
use crate::http;
use reqwest::Client;

pub async fn download_asset(client: &Client, config: &ToolConfig, url: &str) -> Result<Vec<u8>> {
    let response = http::send_with_retry(config, "firmware download", || client.get(url))
        .await
        .map_err(|e| DeployError::Download(format!("Request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(DeployError::Download(format!(
            "Download of {url} failed with status: {}",
            response.status()
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| DeployError::Download(format!("Failed to download bytes: {e}")))?;

    tracing::debug!("Downloaded {} bytes from {url}", bytes.len());
    Ok(bytes.to_vec())
}
