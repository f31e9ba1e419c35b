// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Per-chip local config packaging
//!
//! The mapping file links every chip id to its scalar settings and a list of
//! sensor fragment files. Each chip gets one `config.json.<chip_id>` whose
//! `sensors` array is the concatenation of its fragments' `sensors` arrays.

use crate::error::{DeployError, Result};
use crate::staging;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LOCAL_CONFIG_PREFIX: &str = "config.json.";

#[derive(Debug, Clone, Deserialize)]
struct MappingEntry {
    config_version: i64,
    device_name: String,
    sleep_time_s: i64,
    sensor_config: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SensorFragment {
    sensors: Vec<Value>,
}

/// Merged local configuration for one chip
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChipConfig {
    #[serde(skip)]
    pub chip_id: String,
    pub config_version: i64,
    pub device_name: String,
    pub sleep_time_s: i64,
    pub sensors: Vec<Value>,
}

impl ChipConfig {
    pub fn file_name(&self) -> String {
        format!("{LOCAL_CONFIG_PREFIX}{}", self.chip_id)
    }

    pub fn to_json(&self) -> Result<String> {
        staging::to_canonical_json(&serde_json::to_value(self)?)
    }
}

/// Build and write one config per chip listed in `mapping_file`
pub fn package(mapping_file: &Path, output_dir: &Path) -> Result<Vec<ChipConfig>> {
    let content = std::fs::read_to_string(mapping_file)
        .map_err(|e| DeployError::io(mapping_file, e))?;
    let mapping: BTreeMap<String, MappingEntry> = serde_json::from_str(&content).map_err(|e| {
        DeployError::Mapping(format!("{}: {e}", mapping_file.display()))
    })?;

    staging::ensure_dir(output_dir)?;

    let mut configs = Vec::with_capacity(mapping.len());
    for (chip_id, entry) in mapping {
        let config = build_chip_config(chip_id, entry)?;
        let path = staging::write_artifact(output_dir, &config.file_name(), config.to_json()?)?;
        tracing::info!(
            "Packaged {} sensor(s) for chip {} into {}",
            config.sensors.len(),
            config.chip_id,
            path.display()
        );
        configs.push(config);
    }

    if configs.is_empty() {
        tracing::warn!("Mapping file {} lists no chips", mapping_file.display());
    }

    Ok(configs)
}

fn build_chip_config(chip_id: String, entry: MappingEntry) -> Result<ChipConfig> {
    if chip_id.is_empty() || chip_id.contains(['/', '\\']) || chip_id.starts_with('.') {
        return Err(DeployError::Mapping(format!("invalid chip id {chip_id:?}")));
    }

    let mut sensors = Vec::new();
    for fragment_path in &entry.sensor_config {
        sensors.extend(read_fragment(fragment_path)?);
    }

    Ok(ChipConfig {
        chip_id,
        config_version: entry.config_version,
        device_name: entry.device_name,
        sleep_time_s: entry.sleep_time_s,
        sensors,
    })
}

fn read_fragment(path: &Path) -> Result<Vec<Value>> {
    let content = std::fs::read_to_string(path).map_err(|e| DeployError::io(path, e))?;
    let fragment: SensorFragment = serde_json::from_str(&content)
        .map_err(|e| DeployError::Mapping(format!("sensor fragment {}: {e}", path.display())))?;
    Ok(fragment.sensors)
}
