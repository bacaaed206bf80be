//! JSON-with-comments handling for the engine config file.
//!
//! [`parse`] strips comments and trailing commas and hands the rest to
//! serde_json. [`patch_top_level`] rewrites only the value text of the named
//! top-level keys; every other byte of the document, comments included, is
//! left exactly as it was.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JsoncError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unexpected character {found:?} at byte {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("root value must be an object")]
    NotAnObject,

    #[error("{0}")]
    Json(String),
}

/// Parse a JSONC document. Blank input is an empty object.
pub fn parse(text: &str) -> Result<Value, JsoncError> {
    let stripped = strip_trailing_commas(&strip_comments(text));
    if stripped.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(&stripped).map_err(|e| JsoncError::Json(e.to_string()))
}

/// Replace (or append) each top-level key of `patch` inside `text`.
pub fn patch_top_level(text: &str, patch: &Map<String, Value>) -> Result<String, JsoncError> {
    let source = if text.trim().is_empty() { "{\n}\n" } else { text };
    let layout = Layout::scan(source)?;

    let indent = layout
        .entries
        .first()
        .map(|e| line_indent(source, e.key_start))
        .unwrap_or_else(|| "  ".to_string());

    // (start, end, replacement); zero-width ranges are insertions.
    let mut edits: Vec<(usize, usize, String)> = Vec::new();
    let mut appended: Vec<String> = Vec::new();

    for (key, value) in patch {
        let rendered = render_value(value, &indent)?;
        // serde_json keeps the last duplicate, so that is the one to edit.
        match layout.entries.iter().rev().find(|e| &e.key == key) {
            Some(entry) => edits.push((entry.value_start, entry.value_end, rendered)),
            None => {
                let key_text =
                    serde_json::to_string(key).map_err(|e| JsoncError::Json(e.to_string()))?;
                appended.push(format!("{indent}{key_text}: {rendered}"));
            }
        }
    }

    if !appended.is_empty() {
        match layout.entries.last() {
            Some(last) => {
                let mut insert = String::new();
                for line in &appended {
                    insert.push_str(",\n");
                    insert.push_str(line);
                }
                edits.push((last.value_end, last.value_end, insert));
            }
            None => {
                let body = format!("\n{}\n", appended.join(",\n"));
                let inner = &source[layout.open + 1..layout.close];
                if inner.trim().is_empty() {
                    edits.push((layout.open + 1, layout.close, body));
                } else {
                    edits.push((layout.close, layout.close, body));
                }
            }
        }
    }

    // Apply back to front so earlier offsets stay valid. An insertion at the
    // end of a value sorts ahead of the replacement of that value.
    edits.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    let mut out = source.to_string();
    for (start, end, replacement) in edits {
        out.replace_range(start..end, &replacement);
    }
    Ok(out)
}

fn render_value(value: &Value, indent: &str) -> Result<String, JsoncError> {
    let pretty = serde_json::to_string_pretty(value).map_err(|e| JsoncError::Json(e.to_string()))?;
    Ok(pretty.replace('\n', &format!("\n{indent}")))
}

fn line_indent(text: &str, pos: usize) -> String {
    let line_start = text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let prefix = &text[line_start..pos];
    if prefix.chars().all(|c| c == ' ' || c == '\t') && !prefix.is_empty() {
        prefix.to_string()
    } else {
        "  ".to_string()
    }
}

/// Blank out `//` and `/* */` comments that are not inside strings. Newlines
/// are kept so error offsets still point at the right line.
fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    let mut in_string = false;

    while i < bytes.len() {
        let b = bytes[i];
        if in_string {
            out.push(b);
            if b == b'\\' && i + 1 < bytes.len() {
                out.push(bytes[i + 1]);
                i += 2;
                continue;
            }
            if b == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        match (b, bytes.get(i + 1)) {
            (b'"', _) => {
                in_string = true;
                out.push(b);
                i += 1;
            }
            (b'/', Some(b'/')) => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    out.push(b' ');
                    i += 1;
                }
            }
            (b'/', Some(b'*')) => {
                out.extend_from_slice(b"  ");
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    out.push(if bytes[i] == b'\n' { b'\n' } else { b' ' });
                    i += 1;
                }
                if i < bytes.len() {
                    out.extend_from_slice(b"  ");
                    i += 2;
                }
            }
            _ => {
                out.push(b);
                i += 1;
            }
        }
    }

    // Only ASCII was replaced with ASCII, so this cannot fail in practice.
    String::from_utf8(out).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn strip_trailing_commas(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text.char_indices() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = bytes[i + 1..]
                    .iter()
                    .find(|b| !b.is_ascii_whitespace())
                    .copied();
                if !matches!(next, Some(b'}') | Some(b']')) {
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug)]
struct Entry {
    key: String,
    key_start: usize,
    value_start: usize,
    value_end: usize,
}

/// Byte positions of the root object and its top-level members.
#[derive(Debug)]
struct Layout {
    open: usize,
    close: usize,
    entries: Vec<Entry>,
}

impl Layout {
    fn scan(text: &str) -> Result<Self, JsoncError> {
        let mut s = Scanner { text, pos: 0 };
        s.skip_trivia()?;
        match s.peek() {
            Some(b'{') => {}
            Some(_) => return Err(JsoncError::NotAnObject),
            None => return Err(JsoncError::UnexpectedEof),
        }
        let open = s.pos;
        s.pos += 1;

        let mut entries = Vec::new();
        loop {
            s.skip_trivia()?;
            match s.peek() {
                Some(b'}') => {
                    return Ok(Self {
                        open,
                        close: s.pos,
                        entries,
                    });
                }
                Some(b'"') => {}
                Some(_) => return Err(s.unexpected()),
                None => return Err(JsoncError::UnexpectedEof),
            }

            let key_start = s.pos;
            s.skip_string()?;
            let key: String = serde_json::from_str(&text[key_start..s.pos])
                .map_err(|e| JsoncError::Json(e.to_string()))?;

            s.skip_trivia()?;
            s.expect(b':')?;
            s.skip_trivia()?;
            let value_start = s.pos;
            s.skip_value()?;
            entries.push(Entry {
                key,
                key_start,
                value_start,
                value_end: s.pos,
            });

            s.skip_trivia()?;
            match s.peek() {
                Some(b',') => s.pos += 1,
                Some(b'}') => {}
                Some(_) => return Err(s.unexpected()),
                None => return Err(JsoncError::UnexpectedEof),
            }
        }
    }
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl Scanner<'_> {
    fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.pos).copied()
    }

    fn unexpected(&self) -> JsoncError {
        match self.text[self.pos..].chars().next() {
            Some(found) => JsoncError::Unexpected {
                found,
                offset: self.pos,
            },
            None => JsoncError::UnexpectedEof,
        }
    }

    fn expect(&mut self, b: u8) -> Result<(), JsoncError> {
        match self.peek() {
            Some(found) if found == b => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => Err(self.unexpected()),
            None => Err(JsoncError::UnexpectedEof),
        }
    }

    /// Skip whitespace and comments.
    fn skip_trivia(&mut self) -> Result<(), JsoncError> {
        loop {
            match (self.peek(), self.bytes().get(self.pos + 1).copied()) {
                (Some(b), _) if b.is_ascii_whitespace() => self.pos += 1,
                (Some(b'/'), Some(b'/')) => {
                    while let Some(b) = self.peek() {
                        if b == b'\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                (Some(b'/'), Some(b'*')) => {
                    self.pos += 2;
                    loop {
                        match (self.peek(), self.bytes().get(self.pos + 1).copied()) {
                            (Some(b'*'), Some(b'/')) => {
                                self.pos += 2;
                                break;
                            }
                            (Some(_), _) => self.pos += 1,
                            (None, _) => return Err(JsoncError::UnexpectedEof),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn skip_string(&mut self) -> Result<(), JsoncError> {
        self.expect(b'"')?;
        loop {
            match self.peek() {
                Some(b'\\') => self.pos += 2,
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
                None => return Err(JsoncError::UnexpectedEof),
            }
        }
    }

    fn skip_value(&mut self) -> Result<(), JsoncError> {
        match self.peek() {
            Some(b'"') => self.skip_string(),
            Some(b'{') | Some(b'[') => self.skip_container(),
            Some(_) => {
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b == b',' || b == b'}' || b == b']' || b == b'/' || b.is_ascii_whitespace()
                    {
                        break;
                    }
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(self.unexpected());
                }
                Ok(())
            }
            None => Err(JsoncError::UnexpectedEof),
        }
    }

    fn skip_container(&mut self) -> Result<(), JsoncError> {
        let mut depth = 0usize;
        loop {
            self.skip_trivia()?;
            match self.peek() {
                Some(b'"') => self.skip_string()?,
                Some(b'{') | Some(b'[') => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(b'}') | Some(b']') => {
                    depth = depth.saturating_sub(1);
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => self.pos += 1,
                None => return Err(JsoncError::UnexpectedEof),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    const DOC: &str = r#"{
  // The default model
  "$schema": "https://opencode.ai/config.json",
  "model": "anthropic/claude", /* inline */
  "plugin": [
    "a@1.0", // keep me
    "b"
  ],
}
"#;

    #[test]
    fn parse_accepts_comments_and_trailing_commas() {
        let value = parse(DOC).unwrap();
        assert_eq!(value["model"], "anthropic/claude");
        assert_eq!(value["plugin"], json!(["a@1.0", "b"]));
    }

    #[test]
    fn parse_keeps_comment_markers_inside_strings() {
        let value = parse(r#"{"url": "http://x/*y*/", "s": "a,}"}"#).unwrap();
        assert_eq!(value["url"], "http://x/*y*/");
        assert_eq!(value["s"], "a,}");
    }

    #[test]
    fn blank_document_is_empty_object() {
        assert_eq!(parse("  \n").unwrap(), json!({}));
    }

    #[test]
    fn patch_replaces_only_the_named_value() {
        let out = patch_top_level(DOC, &obj(json!({"model": "x"}))).unwrap();
        let expected = DOC.replace("\"anthropic/claude\"", "\"x\"");
        assert_eq!(out, expected);
    }

    #[test]
    fn patch_rewrites_nested_values_with_document_indent() {
        let out = patch_top_level(DOC, &obj(json!({"plugin": ["c"]}))).unwrap();
        assert!(out.contains("\"plugin\": [\n    \"c\"\n  ],\n}"));
        assert!(out.contains("// The default model"));
        assert!(out.contains("/* inline */"));
        assert_eq!(parse(&out).unwrap()["plugin"], json!(["c"]));
    }

    #[test]
    fn patch_appends_missing_keys_before_closing_brace() {
        let out = patch_top_level(DOC, &obj(json!({"mcp": {"x": {"type": "local"}}}))).unwrap();
        let value = parse(&out).unwrap();
        assert_eq!(value["mcp"]["x"]["type"], "local");
        assert_eq!(value["model"], "anthropic/claude");
        assert!(out.contains("// keep me"));
    }

    #[test]
    fn patch_fills_empty_object() {
        let out = patch_top_level("{}", &obj(json!({"model": "m"}))).unwrap();
        assert_eq!(out, "{\n  \"model\": \"m\"\n}");
        let out = patch_top_level("", &obj(json!({"model": "m"}))).unwrap();
        assert_eq!(parse(&out).unwrap(), json!({"model": "m"}));
    }

    #[test]
    fn patch_rejects_non_object_root() {
        assert_eq!(
            patch_top_level("[1, 2]", &obj(json!({"a": 1}))).unwrap_err(),
            JsoncError::NotAnObject
        );
    }

    #[test]
    fn patch_reports_truncated_documents() {
        assert_eq!(
            patch_top_level("{\"a\": [1, 2", &obj(json!({"a": 1}))).unwrap_err(),
            JsoncError::UnexpectedEof
        );
    }
}
