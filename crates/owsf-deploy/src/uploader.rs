// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Artifact upload to the deployment server
//!
//! Each artifact goes out as one PUT. Outcomes are recorded per artifact; a
//! failed upload never stops the remaining ones.

use crate::config::{DeploymentTarget, ToolConfig};
use crate::encryptor::{self, GLOBAL_CONFIG_FILE};
use crate::error::{DeployError, Result};
use crate::firmware::{self, VERSION_SIDECAR};
use crate::http;
use crate::packager::LOCAL_CONFIG_PREFIX;
use crate::staging;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::path::{Path, PathBuf};

const AUTH_HEADER: &str = "X-auth-token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    GlobalConfig,
    LocalConfig,
    Firmware,
}

impl ArtifactKind {
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::GlobalConfig => "global_config",
            Self::LocalConfig => "local_config",
            Self::Firmware => "firmware",
        }
    }

    pub fn identity_header(self) -> &'static str {
        match self {
            Self::GlobalConfig => "X-global-config-key",
            Self::LocalConfig => "X-chip-id",
            Self::Firmware => "X-firmware-version",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::GlobalConfig | Self::LocalConfig => "application/json",
            Self::Firmware => "text/plain",
        }
    }

    /// Map a response status onto an outcome for this kind of artifact
    pub fn classify(self, status: StatusCode, body: impl FnOnce() -> String) -> UploadOutcome {
        match status {
            StatusCode::CREATED => UploadOutcome::Deployed,
            StatusCode::NOT_MODIFIED if self == Self::Firmware => UploadOutcome::AlreadyCurrent,
            other => UploadOutcome::Failed {
                status: other.as_u16(),
                body: body(),
            },
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GlobalConfig => f.write_str("global config"),
            Self::LocalConfig => f.write_str("local config"),
            Self::Firmware => f.write_str("firmware"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Deployed,
    /// Firmware endpoint answered 304
    AlreadyCurrent,
    Failed { status: u16, body: String },
    /// The request could not be completed at all
    Error(String),
}

impl UploadOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Deployed | Self::AlreadyCurrent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub kind: ArtifactKind,
    /// Chip id, firmware version, or file name for the global config
    pub label: String,
    pub outcome: UploadOutcome,
}

impl fmt::Display for UploadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let subject = match self.kind {
            ArtifactKind::GlobalConfig => "Global config".to_owned(),
            ArtifactKind::LocalConfig => format!("Local config for chip_id ({})", self.label),
            ArtifactKind::Firmware => format!("Firmware ({})", self.label),
        };
        match &self.outcome {
            UploadOutcome::Deployed => write!(f, "{subject} successfully deployed"),
            UploadOutcome::AlreadyCurrent => write!(f, "{subject} already up to date"),
            UploadOutcome::Failed { status, body } => {
                write!(f, "Error deploying {subject}: {status} {body}")
            }
            UploadOutcome::Error(message) => write!(f, "Error deploying {subject}: {message}"),
        }
    }
}

/// Chip id encoded in a local config file name (`config.json.<chip_id>`)
pub fn chip_id_from_path(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    if !name.starts_with(LOCAL_CONFIG_PREFIX) {
        return None;
    }
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|id| !id.is_empty())
}

/// Regular files in `dir` whose name satisfies `keep`, sorted by name
fn list_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| DeployError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DeployError::io(dir, e))?;
        let path = entry.path();
        let matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(&keep);
        if matches && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug)]
pub struct Uploader<'a> {
    client: &'a Client,
    config: &'a ToolConfig,
    target: &'a DeploymentTarget,
}

impl<'a> Uploader<'a> {
    pub fn new(client: &'a Client, config: &'a ToolConfig, target: &'a DeploymentTarget) -> Self {
        Self {
            client,
            config,
            target,
        }
    }

    async fn put(
        &self,
        kind: ArtifactKind,
        identity: &str,
        label: String,
        body: Vec<u8>,
    ) -> UploadRecord {
        let url = self.target.endpoint(kind.endpoint());
        let what = format!("{kind} upload ({label})");

        let result = http::send_with_retry(self.config, &what, || {
            self.client
                .put(&url)
                .header(reqwest::header::CONTENT_TYPE, kind.content_type())
                .header(AUTH_HEADER, &self.target.auth_token)
                .header(kind.identity_header(), identity)
                .body(body.clone())
        })
        .await;

        let outcome = match result {
            Ok(response) => {
                let status = response.status();
                let text = http::body_text(response).await;
                kind.classify(status, || text)
            }
            Err(e) => UploadOutcome::Error(e.to_string()),
        };

        let record = UploadRecord {
            kind,
            label,
            outcome,
        };
        if record.outcome.is_success() {
            tracing::info!("{record}");
        } else {
            tracing::error!("{record}");
        }
        record
    }

    /// Upload `data_dir/global_config.json`, announcing its embedded key
    pub async fn upload_global_config(&self, data_dir: &Path) -> Result<UploadRecord> {
        let path = data_dir.join(GLOBAL_CONFIG_FILE);
        let plaintext = staging::read_artifact(&path)?;
        let key = encryptor::extract_key(&plaintext)?;

        Ok(self
            .put(
                ArtifactKind::GlobalConfig,
                key.encoded(),
                GLOBAL_CONFIG_FILE.to_owned(),
                plaintext,
            )
            .await)
    }

    /// Upload every `config.json.<chip_id>` found in `dir`
    pub async fn upload_local_configs(&self, dir: &Path) -> Result<Vec<UploadRecord>> {
        let files = list_files(dir, |name| name.starts_with(LOCAL_CONFIG_PREFIX))?;

        let mut records = Vec::with_capacity(files.len());
        for path in files {
            let Some(chip_id) = chip_id_from_path(&path) else {
                tracing::trace!("Skipping {}: no chip id", path.display());
                continue;
            };
            let chip_id = chip_id.to_owned();

            let record = match staging::read_artifact(&path) {
                Ok(body) => {
                    self.put(ArtifactKind::LocalConfig, &chip_id, chip_id.clone(), body)
                        .await
                }
                Err(e) => UploadRecord {
                    kind: ArtifactKind::LocalConfig,
                    label: chip_id,
                    outcome: UploadOutcome::Error(e.to_string()),
                },
            };
            records.push(record);
        }
        Ok(records)
    }

    /// Upload every `firmware*.sig` image in `dir` labelled with the
    /// version from the `fw_version` sidecar
    pub async fn upload_firmware(&self, dir: &Path) -> Result<Vec<UploadRecord>> {
        let files = list_files(dir, firmware::is_staged_image)?;
        if files.is_empty() {
            tracing::warn!("No firmware image found in {}", dir.display());
            return Ok(Vec::new());
        }

        let sidecar = dir.join(VERSION_SIDECAR);
        let version = match std::fs::read_to_string(&sidecar) {
            // Sent as written; only a line terminator is dropped, it would
            // make the header value invalid.
            Ok(v) => v.trim_end_matches(['\r', '\n']).to_owned(),
            Err(e) => {
                let message = DeployError::io(&sidecar, e).to_string();
                let records = files
                    .iter()
                    .map(|path| UploadRecord {
                        kind: ArtifactKind::Firmware,
                        label: path.display().to_string(),
                        outcome: UploadOutcome::Error(message.clone()),
                    })
                    .collect::<Vec<_>>();
                for record in &records {
                    tracing::error!("{record}");
                }
                return Ok(records);
            }
        };

        let mut records = Vec::with_capacity(files.len());
        for path in files {
            let record = match staging::read_artifact(&path) {
                Ok(body) => {
                    self.put(ArtifactKind::Firmware, &version, version.clone(), body)
                        .await
                }
                Err(e) => UploadRecord {
                    kind: ArtifactKind::Firmware,
                    label: version.clone(),
                    outcome: UploadOutcome::Error(e.to_string()),
                },
            };
            records.push(record);
        }
        Ok(records)
    }
}
