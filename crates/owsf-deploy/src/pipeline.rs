// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! End-to-end flows built from the individual stages
//!
//! Stages run strictly one after another: producers fill the staging
//! directory first, the uploader reads it afterwards.

use crate::config::{DeploymentTarget, ToolConfig};
use crate::encryptor;
use crate::error::{DeployError, Result};
use crate::firmware::{self, StagedFirmware};
use crate::packager::{self, ChipConfig};
use crate::uploader::{UploadRecord, Uploader};
use crate::version;
use reqwest::Client;
use std::fmt;
use std::path::{Path, PathBuf};

/// Where the firmware image of a `prepare` run comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareSource {
    /// Latest published release
    Remote,
    /// Release build output of the checkout at `src_dir`
    Local { src_dir: PathBuf },
    Skip,
}

#[derive(Debug, Clone)]
pub struct PipelinePaths {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    pub mapping_file: PathBuf,
}

#[derive(Debug)]
pub struct PrepareSummary {
    pub encrypted_config: PathBuf,
    pub chips: Vec<ChipConfig>,
    pub firmware: Option<StagedFirmware>,
}

/// Encrypt the global config, package local configs and stage firmware
pub async fn prepare(
    client: &Client,
    config: &ToolConfig,
    paths: &PipelinePaths,
    source: &FirmwareSource,
) -> Result<PrepareSummary> {
    let encrypted_config = encryptor::encrypt(&paths.data_dir, &paths.output_dir)?;
    let chips = packager::package(&paths.mapping_file, &paths.output_dir)?;

    let firmware = match source {
        FirmwareSource::Remote => {
            Some(firmware::fetch_remote(client, config, &paths.output_dir).await?)
        }
        FirmwareSource::Local { src_dir } => {
            let descriptor = version::resolve(src_dir)?;
            let artifact = firmware::locate_local(src_dir, &descriptor)?;
            Some(firmware::stage(&artifact, &paths.output_dir)?)
        }
        FirmwareSource::Skip => None,
    };

    Ok(PrepareSummary {
        encrypted_config,
        chips,
        firmware,
    })
}

/// Outcome of every upload attempted during a deploy run
#[derive(Debug, Default)]
pub struct DeployReport {
    pub records: Vec<UploadRecord>,
}

impl DeployReport {
    pub fn failures(&self) -> impl Iterator<Item = &UploadRecord> {
        self.records.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

impl fmt::Display for DeployReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for record in &self.records {
            writeln!(f, "{record}")?;
        }
        let failed = self.failures().count();
        write!(
            f,
            "{} artifact(s) processed, {failed} failed",
            self.records.len()
        )
    }
}

/// Upload the global config, package and upload local configs, then fetch
/// and upload the latest firmware.
pub async fn deploy(
    client: &Client,
    config: &ToolConfig,
    target: &DeploymentTarget,
    paths: &PipelinePaths,
) -> Result<DeployReport> {
    let uploader = Uploader::new(client, config, target);
    let mut report = DeployReport::default();

    report
        .records
        .push(uploader.upload_global_config(&paths.data_dir).await?);

    packager::package(&paths.mapping_file, &paths.output_dir)?;
    report
        .records
        .extend(uploader.upload_local_configs(&paths.output_dir).await?);

    firmware::fetch_remote(client, config, &paths.output_dir).await?;
    report
        .records
        .extend(uploader.upload_firmware(&paths.output_dir).await?);

    Ok(report)
}

/// Fetch the latest firmware and hand it to the flashing script
pub async fn bringup(
    client: &Client,
    config: &ToolConfig,
    output_dir: &Path,
    flash_script: &Path,
) -> Result<StagedFirmware> {
    let staged = firmware::fetch_remote(client, config, output_dir).await?;
    flash(flash_script, &staged.binary_path).await?;
    Ok(staged)
}

async fn flash(script: &Path, image: &Path) -> Result<()> {
    tracing::info!("Flashing {} with {}", image.display(), script.display());

    let status = tokio::process::Command::new(script)
        .arg(image)
        .status()
        .await
        .map_err(|e| DeployError::Flash(format!("failed to run {}: {e}", script.display())))?;

    if !status.success() {
        return Err(DeployError::Flash(format!(
            "{} exited with {status}",
            script.display()
        )));
    }
    Ok(())
}
