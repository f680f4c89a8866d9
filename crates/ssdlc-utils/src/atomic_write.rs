//! Atomic file writes for persisted stage documents and receipts.
//!
//! Content goes to a temporary file in the target directory, is fsynced, and
//! is then renamed over the target. A reader never observes a partially
//! written document.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;

use tempfile::NamedTempFile;

/// Outcome of an atomic write.
#[derive(Debug, Clone, Default)]
pub struct AtomicWriteResult {
    /// Bytes written after line-ending normalization
    pub bytes_written: usize,
    /// Whether the rename failed and a copy into place was used instead
    pub used_copy_fallback: bool,
    pub warnings: Vec<String>,
}

/// Atomically write `content` to `path`, creating parent directories.
///
/// Line endings are normalized to LF.
pub fn write_file_atomic(path: &Utf8Path, content: &str) -> Result<AtomicWriteResult> {
    let mut result = AtomicWriteResult::default();
    let normalized = normalize_line_endings(content);

    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("Failed to create directory: {dir}"))?;

    let mut temp_file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temporary file in: {dir}"))?;
    temp_file
        .write_all(normalized.as_bytes())
        .context("Failed to write content to temporary file")?;
    temp_file
        .as_file()
        .sync_all()
        .context("Failed to sync temporary file")?;
    result.bytes_written = normalized.len();

    if let Err(err) = temp_file.persist(path.as_std_path()) {
        // Rename can fail across mounts; fall back to copy + fsync.
        let temp_path = err.file.path().to_path_buf();
        fs::copy(&temp_path, path.as_std_path())
            .with_context(|| format!("Failed to copy temporary file to {path}"))?;
        fs::File::open(path.as_std_path())
            .and_then(|f| f.sync_all())
            .with_context(|| format!("Failed to sync {path}"))?;
        result.used_copy_fallback = true;
        result
            .warnings
            .push(format!("rename into {path} failed ({}); copied instead", err.error));
    }

    Ok(result)
}

/// Read a UTF-8 file, normalizing CRLF to LF.
pub fn read_file_normalized(path: &Utf8Path) -> Result<String> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?;
    Ok(normalize_line_endings(&content))
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}
