// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Signed firmware artifact location and staging
//!
//! Release builds are published as `firmware.<version>.sig`, everything else
//! as `firmware.sig.<version>`. Remotely fetched images keep the plain
//! `firmware.sig` name. Every staged image gets a `firmware.json` descriptor
//! and a `fw_version` sidecar holding the version the uploader announces.

use crate::config::ToolConfig;
use crate::downloader;
use crate::error::{DeployError, Result};
use crate::release_checker;
use crate::staging;
use crate::version::VersionDescriptor;
use reqwest::Client;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const DESCRIPTOR_FILE: &str = "firmware.json";
pub const VERSION_SIDECAR: &str = "fw_version";
pub const REMOTE_FILE: &str = "firmware.sig";

const IMAGE_PREFIX: &str = "firmware";
const IMAGE_SUFFIX: &str = ".sig";

const BUILD_OUTPUT_DIR: [&str; 3] = [".pio", "build", "release"];
const SIG_LEN_TRAILER: usize = 4;

/// A signed image ready to be staged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareArtifact {
    pub version: String,
    pub filename: String,
    pub data: Vec<u8>,
}

/// Where a staged image ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFirmware {
    pub version: String,
    pub binary_path: PathBuf,
    pub descriptor_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct FirmwareDescriptor<'a> {
    file: &'a str,
    version: &'a str,
}

/// Published file name for a resolved version
pub fn artifact_filename(version: &VersionDescriptor) -> String {
    if version.is_release() {
        format!("firmware.{}.sig", version.normalized_base())
    } else {
        format!("firmware.sig.{}", version.raw())
    }
}

/// Path of the signed image inside a source tree's release build output
pub fn build_output_path(src_dir: &Path, version: &VersionDescriptor) -> PathBuf {
    let name = if version.is_release() {
        format!("firmware.{}.sig", version.normalized_base())
    } else {
        REMOTE_FILE.to_owned()
    };
    BUILD_OUTPUT_DIR
        .iter()
        .fold(src_dir.to_path_buf(), |path, part| path.join(part))
        .join(name)
}

/// Read the signed image produced by a local release build
pub fn locate_local(src_dir: &Path, version: &VersionDescriptor) -> Result<FirmwareArtifact> {
    let path = build_output_path(src_dir, version);
    let data = staging::read_artifact(&path)?;
    tracing::info!("Found local firmware {} ({} bytes)", path.display(), data.len());

    Ok(FirmwareArtifact {
        version: version.version(),
        filename: artifact_filename(version),
        data,
    })
}

/// Whether a staged file name is picked up as an uploadable image
/// (`firmware*.sig`)
pub fn is_staged_image(name: &str) -> bool {
    name.starts_with(IMAGE_PREFIX) && name.ends_with(IMAGE_SUFFIX)
}

/// Remove uploadable images left in `output_dir` by an earlier run, except
/// `keep`. The `fw_version` sidecar only describes the newest image.
fn clear_stale_images(output_dir: &Path, keep: &str) -> Result<()> {
    let entries = std::fs::read_dir(output_dir).map_err(|e| DeployError::io(output_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| DeployError::io(output_dir, e))?;
        let path = entry.path();
        let stale = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name != keep && is_staged_image(name));
        if stale && path.is_file() {
            tracing::info!("Removing stale firmware image {}", path.display());
            std::fs::remove_file(&path).map_err(|e| DeployError::io(&path, e))?;
        }
    }
    Ok(())
}

/// Write the image, its descriptor and the version sidecar into `output_dir`,
/// replacing any previously staged image
pub fn stage(artifact: &FirmwareArtifact, output_dir: &Path) -> Result<StagedFirmware> {
    inspect(&artifact.data);

    staging::ensure_dir(output_dir)?;
    clear_stale_images(output_dir, &artifact.filename)?;

    let descriptor = FirmwareDescriptor {
        file: &artifact.filename,
        version: &artifact.version,
    };
    let descriptor_json = staging::to_canonical_json(&serde_json::to_value(&descriptor)?)?;

    let descriptor_path = staging::write_artifact(output_dir, DESCRIPTOR_FILE, descriptor_json)?;
    let binary_path = staging::write_artifact(output_dir, &artifact.filename, &artifact.data)?;
    staging::write_artifact(output_dir, VERSION_SIDECAR, &artifact.version)?;

    tracing::info!(
        "Staged firmware {} as {}",
        artifact.version,
        binary_path.display()
    );

    Ok(StagedFirmware {
        version: artifact.version.clone(),
        binary_path,
        descriptor_path,
    })
}

/// Fetch the newest published signed image and stage it
pub async fn fetch_remote(
    client: &Client,
    config: &ToolConfig,
    output_dir: &Path,
) -> Result<StagedFirmware> {
    let release = release_checker::check_latest_release(client, config).await?;
    tracing::info!("Latest release: {} ({})", release.tag, release.asset_name);

    let data = downloader::download_asset(client, config, &release.download_url).await?;

    let artifact = FirmwareArtifact {
        version: release.tag,
        filename: REMOTE_FILE.to_owned(),
        data,
    };
    stage(&artifact, output_dir)
}

/// View of the envelope the signing step produces:
/// `payload || signature || signature length (u32, little endian)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedImage<'a> {
    pub payload: &'a [u8],
    pub signature: &'a [u8],
}

impl<'a> SignedImage<'a> {
    pub fn parse(image: &'a [u8]) -> Result<Self> {
        let body_len = image.len().checked_sub(SIG_LEN_TRAILER).ok_or_else(|| {
            DeployError::Envelope(format!("image of {} bytes has no trailer", image.len()))
        })?;
        let (body, trailer) = image.split_at(body_len);

        let mut len_bytes = [0u8; SIG_LEN_TRAILER];
        len_bytes.copy_from_slice(trailer);
        let sig_len = usize::try_from(u32::from_le_bytes(len_bytes))
            .map_err(|e| DeployError::Envelope(e.to_string()))?;

        let payload_len = body.len().checked_sub(sig_len).ok_or_else(|| {
            DeployError::Envelope(format!(
                "signature length {sig_len} exceeds image body of {} bytes",
                body.len()
            ))
        })?;
        if sig_len == 0 {
            return Err(DeployError::Envelope("empty signature".to_owned()));
        }

        let (payload, signature) = body.split_at(payload_len);
        Ok(Self { payload, signature })
    }
}

fn inspect(image: &[u8]) {
    match SignedImage::parse(image) {
        Ok(signed) => tracing::debug!(
            "Signed image: {} byte payload, {} byte signature",
            signed.payload.len(),
            signed.signature.len()
        ),
        Err(e) => tracing::warn!("Firmware image does not look signed: {e}"),
    }
}
