//! Skills: `.opencode/skills/<name>/SKILL.md`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{frontmatter, read_dir_names};
use crate::error::StoreError;
use crate::store::{read_optional, write_atomic};

pub const SKILLS_DIR: &str = ".opencode/skills";
pub const LEGACY_SKILLS_DIR: &str = ".opencode/skill";
pub const SKILL_FILE: &str = "SKILL.md";

const MAX_DESCRIPTION: usize = 180;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillFrontmatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub path: String,
}

/// Raw skill file, as exported and imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillBundle {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct SkillWrite {
    pub path: PathBuf,
    pub created: bool,
}

/// Skill names are kebab-case: lowercase letters, digits and single dashes.
pub fn validate_skill_name(name: &str) -> Result<String, StoreError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid("skill name is required".to_string()));
    }
    let charset_ok = trimmed
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !charset_ok || trimmed.starts_with('-') || trimmed.ends_with('-') || trimmed.contains("--")
    {
        return Err(StoreError::Invalid("skill name must be kebab-case".to_string()));
    }
    Ok(trimmed.to_string())
}

fn skill_dirs(root: &Path) -> [PathBuf; 2] {
    [root.join(SKILLS_DIR), root.join(LEGACY_SKILLS_DIR)]
}

/// Skill files present in the workspace, current layout first. A name in
/// both layouts is reported once.
async fn skill_files(root: &Path) -> Result<Vec<(String, PathBuf)>, StoreError> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for dir in skill_dirs(root) {
        for (name, file_type) in read_dir_names(&dir).await? {
            if !file_type.is_dir() {
                continue;
            }
            let file = dir.join(&name).join(SKILL_FILE);
            if !tokio::fs::try_exists(&file).await.unwrap_or(false) {
                continue;
            }
            if seen.insert(name.clone()) {
                out.push((name, file));
            }
        }
    }
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

pub async fn list_skills(root: &Path) -> Result<Vec<SkillSummary>, StoreError> {
    let mut out = Vec::new();
    for (name, path) in skill_files(root).await? {
        let text = read_optional(&path).await?.unwrap_or_default();
        out.push(SkillSummary {
            name,
            description: describe(&text),
            path: path.display().to_string(),
        });
    }
    Ok(out)
}

pub async fn read_skill_bundles(root: &Path) -> Result<Vec<SkillBundle>, StoreError> {
    let mut out = Vec::new();
    for (name, path) in skill_files(root).await? {
        if let Some(content) = read_optional(&path).await? {
            out.push(SkillBundle { name, content });
        }
    }
    Ok(out)
}

/// Frontmatter description, else the first line of prose.
fn describe(text: &str) -> Option<String> {
    let (meta, body): (SkillFrontmatter, _) = frontmatter::parse(text);
    if let Some(description) = meta.description.filter(|d| !d.trim().is_empty()) {
        return Some(truncate(description.trim()));
    }
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| truncate(&line.replace('`', "")))
        .filter(|line| !line.is_empty())
}

fn truncate(text: &str) -> String {
    if text.chars().count() > MAX_DESCRIPTION {
        let cut: String = text.chars().take(MAX_DESCRIPTION).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// Content to store for a skill. Content without frontmatter gets one
/// carrying the name and a description.
pub fn skill_content(name: &str, content: &str, description: Option<&str>) -> Result<String, StoreError> {
    if frontmatter::split(content).frontmatter.is_some() {
        return Ok(content.to_string());
    }
    let description = description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .or_else(|| describe(content));
    let meta = SkillFrontmatter {
        name: Some(name.to_string()),
        description,
    };
    frontmatter::render(&meta, content)
}

pub async fn upsert_skill(
    root: &Path,
    name: &str,
    content: &str,
    description: Option<&str>,
) -> Result<SkillWrite, StoreError> {
    let name = validate_skill_name(name)?;
    if content.trim().is_empty() {
        return Err(StoreError::Invalid("skill content is required".to_string()));
    }
    let path = root.join(SKILLS_DIR).join(&name).join(SKILL_FILE);
    let created = !tokio::fs::try_exists(&path).await.unwrap_or(false);
    let text = skill_content(&name, content, description)?;
    write_atomic(&path, text.as_bytes()).await?;
    Ok(SkillWrite { path, created })
}

/// Delete a skill from every layout it appears in.
pub async fn remove_skill(root: &Path, name: &str) -> Result<Vec<PathBuf>, StoreError> {
    let name = validate_skill_name(name)?;
    let mut removed = Vec::new();
    for dir in skill_dirs(root) {
        let skill_dir = dir.join(&name);
        match tokio::fs::remove_dir_all(&skill_dir).await {
            Ok(()) => removed.push(skill_dir),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StoreError::io(&skill_dir, e)),
        }
    }
    if removed.is_empty() {
        return Err(StoreError::NotFound(format!("Skill not found: {name}")));
    }
    Ok(removed)
}
