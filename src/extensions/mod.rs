//! Workspace extensions managed over the API: skills and commands as
//! markdown files, plugins and MCP connectors as engine config keys.

pub mod commands;
pub mod frontmatter;
pub mod mcp;
pub mod plugins;
pub mod skills;

use crate::error::StoreError;

/// Names usable as a single path segment or config key: ASCII letters,
/// digits, `-` and `_`.
pub(crate) fn validate_simple_name(kind: &str, name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid(format!("{kind} name is required")));
    }
    if trimmed.len() > 128
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StoreError::Invalid(format!(
            "{kind} name may only contain letters, digits, '-' and '_'"
        )));
    }
    Ok(trimmed.to_string())
}

/// Immediate subdirectories / files of `dir`, tolerating a missing dir.
pub(crate) async fn read_dir_names(
    dir: &std::path::Path,
) -> Result<Vec<(String, std::fs::FileType)>, StoreError> {
    let mut reader = match tokio::fs::read_dir(dir).await {
        Ok(reader) => reader,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };
    let mut out = Vec::new();
    while let Some(entry) = reader.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| StoreError::io(entry.path(), e))?;
        out.push((name, file_type));
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}
