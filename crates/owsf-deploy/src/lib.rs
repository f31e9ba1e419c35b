// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! OWSF Deploy - firmware and device configuration deployment pipeline
//!
//! Resolves the firmware version from git, stages signed firmware images,
//! packages per-chip sensor configuration, encrypts the shared global
//! configuration and uploads everything to the OWSF server.

pub mod config;
pub mod downloader;
pub mod encryptor;
pub mod error;
pub mod firmware;
pub mod http;
pub mod packager;
pub mod pipeline;
pub mod release_checker;
pub mod staging;
pub mod uploader;
pub mod version;

pub use config::{DeploymentTarget, ToolConfig};
pub use error::DeployError;
pub use pipeline::{DeployReport, FirmwareSource, PipelinePaths};
pub use version::VersionDescriptor;
