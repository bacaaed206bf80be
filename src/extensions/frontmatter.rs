//! YAML frontmatter for markdown skill and command files.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;

/// A markdown file split at its frontmatter fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Document<'a> {
    pub frontmatter: Option<&'a str>,
    pub body: &'a str,
}

pub fn split(text: &str) -> Document<'_> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let Some(rest) = text
        .strip_prefix("---\n")
        .or_else(|| text.strip_prefix("---\r\n"))
    else {
        return Document {
            frontmatter: None,
            body: text,
        };
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Document {
                frontmatter: Some(&rest[..offset]),
                body: &rest[offset + line.len()..],
            };
        }
        offset += line.len();
    }

    // Unclosed fence: treat the whole file as body.
    Document {
        frontmatter: None,
        body: text,
    }
}

/// Parse the frontmatter into `T`. Missing or unreadable frontmatter yields
/// `T::default()`.
pub fn parse<T: DeserializeOwned + Default>(text: &str) -> (T, &str) {
    let doc = split(text);
    let meta = match doc.frontmatter {
        Some(yaml) if !yaml.trim().is_empty() => match serde_yml::from_str::<T>(yaml) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::debug!("Ignoring unreadable frontmatter: {}", e);
                T::default()
            }
        },
        _ => T::default(),
    };
    (meta, doc.body)
}

pub fn render<T: Serialize>(meta: &T, body: &str) -> Result<String, StoreError> {
    let mut yaml = serde_yml::to_string(meta).map_err(|e| StoreError::Invalid(e.to_string()))?;
    if yaml.trim() == "{}" {
        yaml.clear();
    }
    if !yaml.is_empty() && !yaml.ends_with('\n') {
        yaml.push('\n');
    }
    let body = body.trim_start_matches(['\r', '\n']);
    Ok(format!("---\n{yaml}---\n\n{body}"))
}
