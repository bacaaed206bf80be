//! Slash commands: `.opencode/commands/<name>.md`.
//!
//! The frontmatter carries the command options and the markdown body is the
//! prompt template.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{frontmatter, read_dir_names, validate_simple_name};
use crate::error::StoreError;
use crate::store::{read_optional, write_atomic};

pub const COMMANDS_DIR: &str = ".opencode/commands";
pub const LEGACY_COMMANDS_DIR: &str = ".opencode/command";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtask: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommandSummary {
    pub name: String,
    #[serde(flatten)]
    pub options: CommandOptions,
    pub template: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBundle {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct CommandWrite {
    pub path: PathBuf,
    pub created: bool,
}

pub fn validate_command_name(name: &str) -> Result<String, StoreError> {
    validate_simple_name("command", name)
}

fn command_dirs(root: &Path) -> [PathBuf; 2] {
    [root.join(COMMANDS_DIR), root.join(LEGACY_COMMANDS_DIR)]
}

async fn command_files(root: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for dir in command_dirs(root) {
        for (file_name, file_type) in read_dir_names(&dir).await? {
            if !file_type.is_file() {
                continue;
            }
            let Some(name) = file_name.strip_suffix(".md") else {
                continue;
            };
            if seen.insert(name.to_string()) {
                out.push((name.to_string(), dir.join(&file_name)));
            }
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

pub async fn list_commands(root: &Path) -> Result<Vec<CommandSummary>, StoreError> {
    let mut out = Vec::new();
    for (name, path) in command_files(root).await? {
        let text = read_optional(&path).await?.unwrap_or_default();
        let (options, body): (CommandOptions, _) = frontmatter::parse(&text);
        out.push(CommandSummary {
            name,
            options,
            template: body.trim().to_string(),
            path: path.display().to_string(),
        });
    }
    Ok(out)
}

pub async fn read_command_bundles(root: &Path) -> Result<Vec<CommandBundle>, StoreError> {
    let mut out = Vec::new();
    for (name, path) in command_files(root).await? {
        if let Some(content) = read_optional(&path).await? {
            out.push(CommandBundle { name, content });
        }
    }
    Ok(out)
}

/// Write a command from options plus template.
pub async fn upsert_command(
    root: &Path,
    name: &str,
    options: &CommandOptions,
    template: &str,
) -> Result<CommandWrite, StoreError> {
    if template.trim().is_empty() {
        return Err(StoreError::Invalid("command template is required".to_string()));
    }
    let text = frontmatter::render(options, template)?;
    write_command_file(root, name, &text).await
}

/// Write a command file verbatim.
pub async fn write_command_file(
    root: &Path,
    name: &str,
    content: &str,
) -> Result<CommandWrite, StoreError> {
    let name = validate_command_name(name)?;
    let path = root.join(COMMANDS_DIR).join(format!("{name}.md"));
    let created = !tokio::fs::try_exists(&path).await.unwrap_or(false);
    write_atomic(&path, content.as_bytes()).await?;
    Ok(CommandWrite { path, created })
}

pub async fn remove_command(root: &Path, name: &str) -> Result<Vec<PathBuf>, StoreError> {
    let name = validate_command_name(name)?;
    let mut removed = Vec::new();
    for dir in command_dirs(root) {
        let path = dir.join(format!("{name}.md"));
        match tokio::fs::remove_file(&path).await {
            Ok(()) => removed.push(path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&path, e)),
        }
    }
    if removed.is_empty() {
        return Err(StoreError::NotFound(format!("Command not found: {name}")));
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_list_round_trips_options() {
        let dir = tempfile::tempdir().unwrap();
        let options = CommandOptions {
            description: Some("Review the diff".into()),
            agent: Some("build".into()),
            model: None,
            subtask: Some(true),
        };
        let write = upsert_command(dir.path(), "review", &options, "Review $ARGUMENTS")
            .await
            .unwrap();
        assert!(write.created);
        assert!(write.path.ends_with(".opencode/commands/review.md"));

        let commands = list_commands(dir.path()).await.unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].options, options);
        assert_eq!(commands[0].template, "Review $ARGUMENTS");
    }

    #[tokio::test]
    async fn legacy_directory_is_read_and_removed() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join(LEGACY_COMMANDS_DIR);
        std::fs::create_dir_all(&legacy).unwrap();
        std::fs::write(legacy.join("old.md"), "Do the old thing").unwrap();
        std::fs::write(legacy.join("notes.txt"), "ignored").unwrap();

        let commands = list_commands(dir.path()).await.unwrap();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].name, "old");
        assert_eq!(commands[0].options, CommandOptions::default());

        remove_command(dir.path(), "old").await.unwrap();
        assert!(list_commands(dir.path()).await.unwrap().is_empty());
        assert!(matches!(
            remove_command(dir.path(), "old").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_path_like_names_and_empty_templates() {
        let dir = tempfile::tempdir().unwrap();
        let options = CommandOptions::default();
        assert!(upsert_command(dir.path(), "../x", &options, "t").await.is_err());
        assert!(upsert_command(dir.path(), "x", &options, "  ").await.is_err());
    }
}
