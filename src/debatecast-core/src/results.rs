//! Persisted pipeline artifacts.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

const MAX_FILENAME_CHARS: usize = 100;

/// Lower-cased topic with every non-alphanumeric character replaced by
/// `_`, cut to 100 characters.
pub fn safe_filename(topic: &str) -> String {
    topic
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(MAX_FILENAME_CHARS)
        .collect()
}

/// Write `value` as pretty JSON to `<dir>/<safe_filename(topic)>.json`.
pub fn save_result_json<T: Serialize>(dir: &Path, topic: &str, value: &T) -> Result<PathBuf> {
    write_json(dir, &format!("{}.json", safe_filename(topic)), value)
}

/// Write `value` as pretty JSON to `<dir>/<filename>`, creating `dir`.
pub fn write_json<T: Serialize>(dir: &Path, filename: &str, value: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(filename);
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, json)?;
    tracing::info!(path = %path.display(), "saved results");
    Ok(path)
}
