// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Shared HTTP client construction and retry policy
//!
//! Only transport errors and 5xx responses are retried. Every request the
//! tool sends is a GET or an idempotent PUT, so repeating one is safe.

use crate::config::ToolConfig;
use crate::error::{DeployError, Result};
use reqwest::{Client, RequestBuilder, Response};

const USER_AGENT: &str = concat!("owsf-deploy/", env!("CARGO_PKG_VERSION"));

pub fn build_client(config: &ToolConfig) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| DeployError::Http(format!("Failed to build HTTP client: {e}")))
}

/// Send the request produced by `make_request`, retrying transient failures.
///
/// The final response is returned whatever its status; the caller decides
/// what counts as success.
pub async fn send_with_retry<F>(
    config: &ToolConfig,
    what: &str,
    make_request: F,
) -> std::result::Result<Response, reqwest::Error>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let result = make_request().send().await;

        let retryable = match &result {
            Ok(response) => response.status().is_server_error(),
            Err(e) => !e.is_builder(),
        };
        if !retryable || attempt >= config.max_retries {
            return result;
        }

        attempt += 1;
        let delay = config.retry_delay(attempt);
        match &result {
            Ok(response) => tracing::warn!(
                "{what}: server returned {}, retrying in {delay:?} (attempt {}/{})",
                response.status(),
                attempt + 1,
                config.max_retries + 1
            ),
            Err(e) => tracing::warn!(
                "{what}: request failed ({e}), retrying in {delay:?} (attempt {}/{})",
                attempt + 1,
                config.max_retries + 1
            ),
        }
        tokio::time::sleep(delay).await;
    }
}

/// Read a response body for diagnostics without failing the caller
pub async fn body_text(response: Response) -> String {
    response
        .text()
        .await
        .unwrap_or_else(|_| "Failed to read error body".to_owned())
}
