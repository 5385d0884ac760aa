use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .with_context(|| format!("failed to open file for hashing: {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to read file for hashing: {}", path.display()))?;
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sha256_text(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn temp_sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|value| value.to_os_string())
        .unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

// Readers see either the previous content or the complete new content.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let staging = temp_sibling(path, ".tmp");
    let file = File::create(&staging)
        .with_context(|| format!("failed to create {}", staging.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("failed to serialize json: {}", staging.display()))?;
    writer.write_all(b"\n")?;
    let file = writer
        .into_inner()
        .map_err(|err| err.into_error())
        .with_context(|| format!("failed to flush {}", staging.display()))?;
    file.sync_all()
        .with_context(|| format!("failed to sync {}", staging.display()))?;

    fs::rename(&staging, path).with_context(|| {
        format!("failed to move {} into place at {}", staging.display(), path.display())
    })
}

pub fn read_text_input(text: Option<&str>, input: Option<&Path>) -> Result<Option<String>> {
    if let Some(text) = text {
        return Ok(Some(text.to_string()));
    }

    let Some(input) = input else {
        return Ok(None);
    };

    let raw = fs::read_to_string(input)
        .with_context(|| format!("failed to read input file: {}", input.display()))?;
    Ok(Some(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_sibling_appends_suffix_to_file_name() {
        let path = Path::new("/tmp/cache/manifest.json");
        assert_eq!(
            temp_sibling(path, ".tmp"),
            PathBuf::from("/tmp/cache/manifest.json.tmp")
        );
    }

    #[test]
    fn write_json_atomic_replaces_existing_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("values.json");

        write_json_atomic(&path, &vec!["a", "b"]).expect("first write");
        write_json_atomic(&path, &vec!["c"]).expect("second write");

        let raw = fs::read_to_string(&path).expect("read back");
        let values: Vec<String> = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(values, vec!["c".to_string()]);
        assert!(!temp_sibling(&path, ".tmp").exists());
    }

    #[test]
    fn sha256_text_is_stable() {
        assert_eq!(
            sha256_text("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
