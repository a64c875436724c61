//! File system helpers

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Normalize a path lexically (no filesystem access)
pub fn normalize_path(path: &Path) -> PathBuf {
    path_clean::clean(path)
}

/// Decode file bytes as UTF-8, replacing invalid sequences.
///
/// Scanning and migration both go through this, so line numbers and
/// content hashes agree between them.
pub fn decode_text_lossy(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Read a text file, replacing invalid UTF-8 sequences
pub fn read_text_lossy(path: &Path) -> crate::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(decode_text_lossy(&bytes).into_owned())
}

/// Write a file by writing a sibling temp file and renaming it into place.
///
/// Readers never observe a half-written file; parent directories are
/// created as needed.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> crate::Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    tokio::fs::create_dir_all(&parent).await?;

    let file_name = path
        .file_name()
        .ok_or_else(|| crate::UtilError::PathOperation(format!("Not a file path: {}", path.display())))?
        .to_string_lossy();
    let temp_path = parent.join(format!(
        ".{file_name}.{}.tmp",
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    tokio::fs::write(&temp_path, contents).await?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}
