// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Configuration module for the deployment tool

use crate::error::{DeployError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const SERVER_URL_VAR: &str = "OWSF_SERVER_URL";
pub const AUTH_TOKEN_VAR: &str = "IOTA_TOKEN";

const DEFAULT_RELEASE_REPO: &str = "owsf/owsf-firmware";
const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

fn default_release_repo() -> String {
    DEFAULT_RELEASE_REPO.to_owned()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_owned()
}

fn default_30() -> u64 {
    30
}

fn default_3() -> u32 {
    3
}

fn default_retry_delays() -> Vec<u64> {
    vec![1000, 5000, 30000]
}

/// Settings that tune how the tool talks to the outside world.
///
/// Everything is optional; a missing settings file yields [`ToolConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolConfig {
    /// GitHub repository publishing signed firmware releases
    #[serde(default = "default_release_repo")]
    pub release_repo: String,

    /// Base URL of the release listing API (overridable for testing)
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_30")]
    pub request_timeout_secs: u64,

    /// Attempts made after the first one for retryable failures
    #[serde(default = "default_3")]
    pub max_retries: u32,

    /// Delay before each retry, in milliseconds; the last entry repeats
    #[serde(default = "default_retry_delays")]
    pub retry_delays_ms: Vec<u64>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            release_repo: default_release_repo(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_30(),
            max_retries: default_3(),
            retry_delays_ms: default_retry_delays(),
        }
    }
}

impl ToolConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay to wait before retry number `retry` (1-based)
    pub fn retry_delay(&self, retry: u32) -> Duration {
        let idx = usize::try_from(retry.saturating_sub(1)).unwrap_or(usize::MAX);
        let ms = self
            .retry_delays_ms
            .get(idx)
            .or_else(|| self.retry_delays_ms.last())
            .copied()
            .unwrap_or(0);
        Duration::from_millis(ms)
    }

    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/releases/latest",
            self.api_base_url.trim_end_matches('/'),
            self.release_repo
        )
    }
}

/// Load tool settings from `path`, or defaults when no path is given
pub fn load_config(path: Option<&Path>) -> Result<ToolConfig> {
    let Some(path) = path else {
        return Ok(ToolConfig::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
    serde_json::from_str(&content)
        .map_err(|e| DeployError::Config(format!("Failed to parse {}: {e}", path.display())))
}

/// Where artifacts get deployed to and the token authorizing it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    pub base_url: String,
    pub auth_token: String,
}

impl DeploymentTarget {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_token: auth_token.into(),
        }
    }

    /// Build the target from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the target from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(SERVER_URL_VAR).ok_or_else(|| {
            DeployError::Config(format!(
                "Please specify url to owsf server ({SERVER_URL_VAR})"
            ))
        })?;
        let auth_token = lookup(AUTH_TOKEN_VAR).ok_or_else(|| {
            DeployError::Config(format!(
                "Please specify token for writing to owsf server ({AUTH_TOKEN_VAR})"
            ))
        })?;

        Ok(Self::new(base_url, auth_token))
    }

    /// Full URL of a deploy endpoint, e.g. `endpoint("firmware")`
    pub fn endpoint(&self, artifact: &str) -> String {
        format!(
            "{}/api/v1/deploy/{artifact}",
            self.base_url.trim_end_matches('/')
        )
    }
}
