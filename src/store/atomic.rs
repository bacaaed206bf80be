//! Crash-safe file replacement.

use std::path::Path;

use uuid::Uuid;

use crate::error::StoreError;

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// over the target. Readers never observe a partially written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| StoreError::io(parent, e))?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Invalid(format!("Invalid file path: {}", path.display())))?;
    let tmp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));

    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(StoreError::io(path, e));
    }
    Ok(())
}

/// Read a file to string, mapping "not found" to `None`.
pub async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replaces_file_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        write_atomic(&path, b"{\"a\":1}").await.unwrap();
        write_atomic(&path, b"{\"a\":2}").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{\"a\":2}");
        let entries: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_optional(&dir.path().join("nope")).await.unwrap().is_none());
    }
}
