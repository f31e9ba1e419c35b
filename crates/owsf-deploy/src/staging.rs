// Copyright (c) 2021 OWSF contributors
//
// This file is part of OWSF.
//
// Licensed under the MIT License. You may use, copy, modify and distribute this file under
// the terms of that license. See <https://opensource.org/licenses/MIT>.
//
// This software is provided "AS IS", without warranty of any kind.

//! Staging directory helpers shared by all artifact producers

use crate::error::{DeployError, Result};
use serde_json::Value;
use serde_json::ser::{Formatter, PrettyFormatter, Serializer};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Create `dir` (and parents) unless it already exists
pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| DeployError::io(dir, e))
}

/// Write `contents` to `dir/name`, creating `dir` first
pub fn write_artifact(dir: &Path, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(|e| DeployError::io(&path, e))?;
    Ok(path)
}

pub fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| DeployError::io(path, e))
}

/// Serialize `value` the way the deployment server expects config documents:
/// keys sorted at every level, four-space indentation and non-ASCII
/// characters escaped as `\uXXXX`.
pub fn to_canonical_json(value: &Value) -> Result<String> {
    let sorted = sort_keys(value.clone());
    let mut buf = Vec::new();
    let mut ser = Serializer::with_formatter(&mut buf, AsciiFormatter::default());
    serde::Serialize::serialize(&sorted, &mut ser)?;
    // the formatter only ever emits ASCII
    String::from_utf8(buf).map_err(|e| DeployError::Config(format!("non-UTF-8 JSON output: {e}")))
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

struct AsciiFormatter {
    inner: PrettyFormatter<'static>,
}

impl Default for AsciiFormatter {
    fn default() -> Self {
        Self {
            inner: PrettyFormatter::with_indent(b"    "),
        }
    }
}

impl Formatter for AsciiFormatter {
    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            // printable ASCII only; DEL goes out as \u007f
            if (' '..='~').contains(&c) {
                let mut byte = [0u8; 1];
                writer.write_all(c.encode_utf8(&mut byte).as_bytes())?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }

    fn begin_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_array(writer)
    }

    fn end_array<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_array(writer)
    }

    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_array_value(writer, first)
    }

    fn end_array_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_array_value(writer)
    }

    fn begin_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object(writer)
    }

    fn end_object<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_object(writer)
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object_key(writer, first)
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.begin_object_value(writer)
    }

    fn end_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        self.inner.end_object_value(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("server_data").join("nested");
        ensure_dir(&out).unwrap();
        ensure_dir(&out).unwrap();
        assert!(out.is_dir());
    }

    #[test]
    fn test_ensure_dir_fails_on_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            ensure_dir(&file).unwrap_err(),
            DeployError::Io { .. }
        ));
    }

    #[test]
    fn test_write_artifact_creates_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let path = write_artifact(&out, "fw_version", "v1.0.0").unwrap();
        assert_eq!(path, out.join("fw_version"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "v1.0.0");
    }

    #[test]
    fn test_canonical_json_layout() {
        let value = json!({
            "sleep_time_s": 300,
            "device_name": "attic",
            "sensors": [{"type": "bme280", "addr": 118}],
            "empty": [],
        });
        let expected = "{\n    \"device_name\": \"attic\",\n    \"empty\": [],\n    \"sensors\": [\n        {\n            \"addr\": 118,\n            \"type\": \"bme280\"\n        }\n    ],\n    \"sleep_time_s\": 300\n}";
        assert_eq!(to_canonical_json(&value).unwrap(), expected);
    }

    #[test]
    fn test_canonical_json_escapes_non_ascii() {
        let value = json!({"device_name": "Küche 🌡"});
        let out = to_canonical_json(&value).unwrap();
        assert_eq!(
            out,
            "{\n    \"device_name\": \"K\\u00fcche \\ud83c\\udf21\"\n}"
        );
    }

    #[test]
    fn test_canonical_json_escapes_del() {
        let value = json!({"name": "a\u{7f}b"});
        assert_eq!(
            to_canonical_json(&value).unwrap(),
            "{\n    \"name\": \"a\\u007fb\"\n}"
        );
    }
}
