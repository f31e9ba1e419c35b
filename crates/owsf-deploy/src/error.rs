// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Error types for the deployment pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("config error: {0}")]
    Config(String),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("version resolution failed: {0}")]
    Version(String),

    #[error("release check failed: {0}")]
    ReleaseCheck(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("global config error: {0}")]
    GlobalConfig(String),

    #[error("mapping error: {0}")]
    Mapping(String),

    #[error("malformed signed image: {0}")]
    Envelope(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("flashing failed: {0}")]
    Flash(String),
}

impl DeployError {
    /// Wrap an I/O error together with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeployError>;
