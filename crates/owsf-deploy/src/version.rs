// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Firmware version resolution from `git describe`
//!
//! A descriptor has the shape `<base>[-g<7 hex>][-dirty]`. Only a clean build
//! sitting exactly on a tag yields a *release* version; everything else is a
//! snapshot and keeps the raw descriptor as its version.

use crate::error::{DeployError, Result};
use std::fmt;
use std::path::Path;
use std::process::Command;

const DIRTY_SUFFIX: &str = "-dirty";
const COMMIT_MARKER: &str = "-g";
const COMMIT_HASH_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDescriptor {
    raw: String,
    base: String,
    commit_suffix: Option<String>,
    dirty: bool,
}

impl VersionDescriptor {
    /// Parse a `git describe --always --dirty` output
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DeployError::Version("empty version descriptor".to_owned()));
        }

        let (rest, dirty) = match raw.strip_suffix(DIRTY_SUFFIX) {
            Some(rest) => (rest, true),
            None => (raw, false),
        };
        let (base, commit_suffix) = split_commit_suffix(rest);

        Ok(Self {
            raw: raw.to_owned(),
            base: base.to_owned(),
            commit_suffix: commit_suffix.map(str::to_owned),
            dirty,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// The `-g<hash>` part, if the build is past the last tag
    pub fn commit_suffix(&self) -> Option<&str> {
        self.commit_suffix.as_deref()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_release(&self) -> bool {
        self.commit_suffix.is_none() && !self.dirty
    }

    pub fn normalized_base(&self) -> String {
        self.base.replace('-', ".")
    }

    /// Published version string
    pub fn version(&self) -> String {
        if self.is_release() {
            self.normalized_base()
        } else {
            self.raw.clone()
        }
    }
}

impl fmt::Display for VersionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.version())
    }
}

/// Splits a trailing `-g` followed by exactly seven lowercase hex digits.
fn split_commit_suffix(s: &str) -> (&str, Option<&str>) {
    let suffix_len = COMMIT_MARKER.len() + COMMIT_HASH_LEN;
    let Some(idx) = s.len().checked_sub(suffix_len) else {
        return (s, None);
    };
    let (Some(head), Some(tail)) = (s.get(..idx), s.get(idx..)) else {
        return (s, None);
    };

    let is_commit = tail.strip_prefix(COMMIT_MARKER).is_some_and(|hash| {
        hash.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    });

    if is_commit {
        (head, Some(tail))
    } else {
        (s, None)
    }
}

/// Describe the checkout at `src_dir` and parse the result
pub fn resolve(src_dir: &Path) -> Result<VersionDescriptor> {
    let output = Command::new("git")
        .arg("-C")
        .arg(src_dir)
        .args(["describe", "--always", "--dirty"])
        .output()
        .map_err(|e| DeployError::Version(format!("failed to run git: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DeployError::Version(format!(
            "git describe failed in {} ({}): {}",
            src_dir.display(),
            output.status,
            stderr.trim()
        )));
    }

    let raw = String::from_utf8(output.stdout)
        .map_err(|e| DeployError::Version(format!("git describe output is not UTF-8: {e}")))?;

    let descriptor = VersionDescriptor::parse(&raw)?;
    tracing::debug!(
        "Resolved version {descriptor} (raw {}, release: {})",
        descriptor.raw(),
        descriptor.is_release()
    );
    Ok(descriptor)
}
