// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Global config encryption
//!
//! The global config carries its own key in `global_config_key`. The complete
//! original file, key included, is sealed with XSalsa20-Poly1305 and written as
//! `nonce || tag || ciphertext`, the container NaCl's `SecretBox` produces.

use crate::error::{DeployError, Result};
use crate::staging;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use crypto_secretbox::XSalsa20Poly1305;
use crypto_secretbox::aead::generic_array::GenericArray;
use crypto_secretbox::aead::{AeadInPlace, KeyInit};
use rand::RngCore;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const GLOBAL_CONFIG_FILE: &str = "global_config.json";
pub const ENCRYPTED_FILE: &str = "global_config.enc";
pub const KEY_FIELD: &str = "global_config_key";

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 24;
pub const TAG_LEN: usize = 16;

/// Key taken out of a global config document
#[derive(Clone)]
pub struct GlobalConfigKey {
    encoded: String,
    bytes: [u8; KEY_LEN],
}

impl GlobalConfigKey {
    /// The key exactly as it appears in the document (base64)
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for GlobalConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalConfigKey").finish_non_exhaustive()
    }
}

/// Parse `plaintext` only far enough to pull out the embedded key
pub fn extract_key(plaintext: &[u8]) -> Result<GlobalConfigKey> {
    let doc: Value = serde_json::from_slice(plaintext)
        .map_err(|e| DeployError::GlobalConfig(format!("invalid JSON: {e}")))?;

    let encoded = doc
        .get(KEY_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| DeployError::GlobalConfig(format!("missing string field {KEY_FIELD}")))?;

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|e| DeployError::GlobalConfig(format!("{KEY_FIELD} is not base64: {e}")))?;

    let bytes: [u8; KEY_LEN] = decoded.as_slice().try_into().map_err(|_| {
        DeployError::GlobalConfig(format!(
            "{KEY_FIELD} must decode to {KEY_LEN} bytes, got {}",
            decoded.len()
        ))
    })?;

    Ok(GlobalConfigKey {
        encoded: encoded.to_owned(),
        bytes,
    })
}

/// Seal `plaintext` under `key` with a fresh random nonce
pub fn seal(key: &GlobalConfigKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XSalsa20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut body = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut body)
        .map_err(|e| DeployError::GlobalConfig(format!("encryption failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + TAG_LEN + body.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&tag);
    sealed.extend_from_slice(&body);
    Ok(sealed)
}

/// Encrypt `data_dir/global_config.json` into `output_dir/global_config.enc`
pub fn encrypt(data_dir: &Path, output_dir: &Path) -> Result<PathBuf> {
    let source = data_dir.join(GLOBAL_CONFIG_FILE);
    let plaintext = staging::read_artifact(&source)?;
    let key = extract_key(&plaintext)?;

    let sealed = seal(&key, &plaintext)?;
    let path = staging::write_artifact(output_dir, ENCRYPTED_FILE, sealed)?;
    tracing::info!(
        "Encrypted {} ({} bytes) to {}",
        source.display(),
        plaintext.len(),
        path.display()
    );
    Ok(path)
}
