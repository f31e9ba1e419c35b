// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! OWSF Deploy - Entry point for the deployment binary

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use owsf_deploy::config::load_config;
use owsf_deploy::{DeploymentTarget, FirmwareSource, PipelinePaths, http, pipeline, version};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "owsf-deploy")]
#[command(about = "Package, encrypt and deploy OWSF firmware and device configs", long_about = None)]
struct Cli {
    /// JSON settings file (release repo, timeouts, retries)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the firmware version resolved from git
    Version {
        #[arg(long, default_value = ".")]
        src_dir: PathBuf,
    },
    /// Stage encrypted global config, local configs and firmware
    Prepare {
        #[command(flatten)]
        paths: PathArgs,

        /// Where to take the firmware image from
        #[arg(long, value_enum, default_value_t = FirmwareArg::Remote)]
        firmware: FirmwareArg,

        /// Source checkout used with `--firmware local`
        #[arg(long, default_value = ".")]
        src_dir: PathBuf,
    },
    /// Upload global config, local configs and the latest firmware
    Deploy {
        #[command(flatten)]
        paths: PathArgs,
    },
    /// Fetch the latest firmware and flash it onto a device
    Bringup {
        #[arg(long, default_value = "./server_data")]
        output_dir: PathBuf,

        #[arg(long, default_value = "misc/flash_firmware.sh")]
        flash_script: PathBuf,
    },
}

#[derive(clap::Args)]
struct PathArgs {
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    #[arg(long, default_value = "./server_data")]
    output_dir: PathBuf,

    #[arg(long, default_value = "misc/mapping.json")]
    mapping_file: PathBuf,
}

impl From<PathArgs> for PipelinePaths {
    fn from(args: PathArgs) -> Self {
        Self {
            data_dir: args.data_dir,
            output_dir: args.output_dir,
            mapping_file: args.mapping_file,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum FirmwareArg {
    Remote,
    Local,
    Skip,
}

/// Exit status when every stage ran but some uploads were rejected
const PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("owsf_deploy=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Version { src_dir } => {
            let descriptor = version::resolve(&src_dir)?;
            let kind = if descriptor.is_release() {
                "release"
            } else {
                "snapshot"
            };
            println!("{descriptor} ({kind})");
        }
        Command::Prepare {
            paths,
            firmware,
            src_dir,
        } => {
            let source = match firmware {
                FirmwareArg::Remote => FirmwareSource::Remote,
                FirmwareArg::Local => FirmwareSource::Local { src_dir },
                FirmwareArg::Skip => FirmwareSource::Skip,
            };
            let client = http::build_client(&config)?;
            let summary = pipeline::prepare(&client, &config, &paths.into(), &source).await?;

            info!(
                "Prepared {} local config(s), global config at {}",
                summary.chips.len(),
                summary.encrypted_config.display()
            );
            if let Some(fw) = summary.firmware {
                info!("Firmware {} staged at {}", fw.version, fw.binary_path.display());
            }
        }
        Command::Deploy { paths } => {
            let target = DeploymentTarget::from_env()?;
            let client = http::build_client(&config)?;
            let report = pipeline::deploy(&client, &config, &target, &paths.into())
                .await
                .context("deployment aborted")?;

            println!("{report}");
            if report.has_failures() {
                error!("Some artifacts were not deployed");
                return Ok(ExitCode::from(PARTIAL_FAILURE));
            }
        }
        Command::Bringup {
            output_dir,
            flash_script,
        } => {
            let client = http::build_client(&config)?;
            let staged = pipeline::bringup(&client, &config, &output_dir, &flash_script).await?;
            info!("Flashed firmware {}", staged.version);
        }
    }

    Ok(ExitCode::SUCCESS)
}
