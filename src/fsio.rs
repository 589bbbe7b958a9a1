//! Crash-safe file persistence for ledger artifacts.
//!
//! Every rewrite goes through a uniquely-named temporary file followed by an
//! atomic rename, so a killed process can only ever lose the temporary copy
//! and never the published artifact.
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Write `bytes` to `path` via write-then-rename.
///
/// The temporary name embeds the process id and a nanosecond timestamp so
/// concurrent invocations cannot collide on it. A pre-existing symlink at the
/// temporary path aborts the write. Any mid-write failure removes the
/// temporary file and leaves the published file untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent).with_context(|| format!("create {}", parent.display()))?;

    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("invalid file name in {}", path.display()))?;
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_nanos();
    let tmp_path = parent.join(format!(".{file_name}.{}.{nanos}.tmp", std::process::id()));

    if let Ok(meta) = fs::symlink_metadata(&tmp_path) {
        if meta.file_type().is_symlink() {
            return Err(anyhow!(
                "refusing to write through symlinked temp artifact {}",
                tmp_path.display()
            ));
        }
    }

    if let Err(err) = write_and_publish(&tmp_path, path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}

fn write_and_publish(tmp_path: &Path, path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(tmp_path, bytes).with_context(|| format!("write {}", tmp_path.display()))?;
    if fs::rename(tmp_path, path).is_err() {
        // Some platforms refuse to rename over an existing file.
        if path.exists() {
            fs::remove_file(path).with_context(|| format!("replace {}", path.display()))?;
        }
        fs::rename(tmp_path, path).with_context(|| format!("publish {}", path.display()))?;
    }
    Ok(())
}

/// Read a line-delimited JSON file into typed records.
///
/// Any unparsable line is an error naming the line number; callers that need
/// lenient parsing read the raw text themselves.
pub fn read_jsonl_strict<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line).with_context(|| {
            format!("parse {} line {}", path.display(), index + 1)
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Serialize records one-per-line and publish them atomically.
pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record).context("serialize JSONL record")?;
        out.push_str(&line);
        out.push('\n');
    }
    write_atomic(path, out.as_bytes())
}

/// Read a pretty-printed JSON document.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parse {}", path.display()))
}

/// Write a pretty-printed JSON document atomically.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize JSON document")?;
    write_atomic(path, text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_atomic_replaces_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");
        write_atomic(&path, b"first\n").unwrap();
        write_atomic(&path, b"second\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second\n");
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.jsonl");
        write_atomic(&path, b"data\n").unwrap();
        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["store.jsonl".to_string()]);
    }

    #[test]
    fn strict_read_names_the_bad_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        fs::write(&path, "{\"ok\": 1}\nnot json\n").unwrap();
        let err = read_jsonl_strict::<serde_json::Value>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("line 2"));
    }

    #[test]
    fn jsonl_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.jsonl");
        let records = vec![serde_json::json!({"a": 1}), serde_json::json!({"b": 2})];
        write_jsonl(&path, &records).unwrap();
        let back: Vec<serde_json::Value> = read_jsonl_strict(&path).unwrap();
        assert_eq!(back, records);
    }
}
