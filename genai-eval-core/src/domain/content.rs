use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{EvalError, Result};

const CONTENTS_MARKER: &str = "contents {";
const PARTS_MARKER: &str = "parts {";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    #[serde(alias = "mimeType")]
    pub mime_type: String,
    #[serde(alias = "fileUri")]
    pub file_uri: String,
}

/// One fragment of a multimodal message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    #[serde(alias = "fileData")]
    FileData(FileData),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(text.into())
    }

    pub fn from_uri(file_uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Part::FileData(FileData {
            mime_type: mime_type.into(),
            file_uri: file_uri.into(),
        })
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(text),
            Part::FileData(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { role: None, parts }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::from_parts(vec![Part::text(text)])
    }
}

/// The serialized form of a multimodal cell: `{"contents": [...]}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContentList {
    pub contents: Vec<Content>,
}

impl ContentList {
    pub fn new(contents: Vec<Content>) -> Self {
        Self { contents }
    }

    /// A single text part wrapping a plain value.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::new(vec![Content::text(text)])
    }

    pub fn parts(&self) -> impl Iterator<Item = &Part> {
        self.contents.iter().flat_map(|c| c.parts.iter())
    }
}

/// Judge payload keyed by placeholder name, used when any input is multimodal.
pub type ContentMap = BTreeMap<String, ContentList>;

/// How dataset cells are probed for multimodal payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultimodalMode {
    /// Parse when possible; a value that looks multimodal but fails to parse is logged and kept as text.
    #[default]
    Auto,
    /// Same probe, but a value that looks multimodal and fails to parse is an error.
    Strict,
    /// Every value is text.
    Disabled,
}

impl fmt::Display for MultimodalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MultimodalMode::Auto => "auto",
            MultimodalMode::Strict => "strict",
            MultimodalMode::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// True when the raw text carries both text-format markers of a content list.
pub fn looks_multimodal(text: &str) -> bool {
    text.contains(CONTENTS_MARKER) && text.contains(PARTS_MARKER)
}

/// Parse a content list from its JSON or protobuf text-format serialization.
pub fn parse_content_list(text: &str) -> Result<ContentList> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        let list: ContentList = serde_json::from_str(trimmed)
            .map_err(|e| EvalError::Multimodal(format!("invalid JSON content list: {}", e)))?;
        return non_empty(list);
    }
    let fields = TextFormatParser::new(tokenize(trimmed)?).parse_message(false)?;
    non_empty(contents_from_fields(fields)?)
}

fn non_empty(list: ContentList) -> Result<ContentList> {
    if list.contents.is_empty() {
        return Err(EvalError::Multimodal("content list is empty".to_string()));
    }
    Ok(list)
}

/// Probe a dataset cell for a multimodal payload.
///
/// Returns `Ok(None)` when the value is plain text.
pub fn probe_multimodal(value: &Value, mode: MultimodalMode) -> Result<Option<ContentList>> {
    if mode == MultimodalMode::Disabled {
        return Ok(None);
    }
    match value {
        Value::String(text) => match parse_content_list(text) {
            Ok(list) => Ok(Some(list)),
            Err(err) if looks_multimodal(text) => match mode {
                MultimodalMode::Strict => Err(err),
                _ => {
                    tracing::warn!(
                        error = %err,
                        "Value looks like a multimodal content list but failed to parse; treating it as text"
                    );
                    Ok(None)
                }
            },
            Err(_) => Ok(None),
        },
        Value::Object(map) if map.contains_key("contents") => {
            match serde_json::from_value::<ContentList>(value.clone()) {
                Ok(list) if !list.contents.is_empty() => Ok(Some(list)),
                Ok(_) => Ok(None),
                Err(err) if mode == MultimodalMode::Strict => Err(EvalError::Multimodal(
                    format!("invalid content list object: {}", err),
                )),
                Err(_) => Ok(None),
            }
        }
        _ => Ok(None),
    }
}

// ===== Protobuf text format =====

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Colon,
    Open,
    Close,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() || c == ',' || c == ';' => {
                chars.next();
            }
            '#' => {
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        break;
                    }
                }
            }
            '{' | '<' => {
                chars.next();
                tokens.push(Token::Open);
            }
            '}' | '>' => {
                chars.next();
                tokens.push(Token::Close);
            }
            ':' => {
                chars.next();
                tokens.push(Token::Colon);
            }
            '"' | '\'' => {
                chars.next();
                tokens.push(Token::Str(read_quoted(&mut chars, c)?));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '-' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(EvalError::Multimodal(format!(
                    "unexpected character `{}` in text-format content",
                    other
                )))
            }
        }
    }
    Ok(tokens)
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            None => {
                return Err(EvalError::Multimodal(
                    "unterminated string in text-format content".to_string(),
                ))
            }
            Some(ch) if ch == quote => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
                None => {
                    return Err(EvalError::Multimodal(
                        "dangling escape in text-format content".to_string(),
                    ))
                }
            },
            Some(ch) => out.push(ch),
        }
    }
}

#[derive(Debug)]
enum Node {
    Scalar(String),
    Message(Vec<(String, Node)>),
}

struct TextFormatParser {
    tokens: Vec<Token>,
    pos: usize,
}

impl TextFormatParser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn parse_message(&mut self, nested: bool) -> Result<Vec<(String, Node)>> {
        let mut fields = Vec::new();
        loop {
            match self.next() {
                None if nested => {
                    return Err(EvalError::Multimodal(
                        "unexpected end of text-format content".to_string(),
                    ))
                }
                None => return Ok(fields),
                Some(Token::Close) if nested => return Ok(fields),
                Some(Token::Ident(name)) => {
                    let has_colon = self.peek() == Some(&Token::Colon);
                    if has_colon {
                        self.pos += 1;
                    }
                    let node = match self.next() {
                        Some(Token::Open) => Node::Message(self.parse_message(true)?),
                        Some(Token::Str(mut value)) if has_colon => {
                            while let Some(Token::Str(more)) = self.peek().cloned() {
                                value.push_str(&more);
                                self.pos += 1;
                            }
                            Node::Scalar(value)
                        }
                        Some(Token::Ident(value)) if has_colon => Node::Scalar(value),
                        other => {
                            return Err(EvalError::Multimodal(format!(
                                "unexpected token {:?} after field `{}`",
                                other, name
                            )))
                        }
                    };
                    fields.push((name, node));
                }
                Some(other) => {
                    return Err(EvalError::Multimodal(format!(
                        "unexpected token {:?} in text-format content",
                        other
                    )))
                }
            }
        }
    }
}

fn contents_from_fields(fields: Vec<(String, Node)>) -> Result<ContentList> {
    let mut contents = Vec::new();
    for (name, node) in fields {
        match (name.as_str(), node) {
            ("contents", Node::Message(inner)) => contents.push(content_from_fields(inner)?),
            (other, _) => {
                return Err(EvalError::Multimodal(format!(
                    "unexpected top-level field `{}`",
                    other
                )))
            }
        }
    }
    Ok(ContentList::new(contents))
}

fn content_from_fields(fields: Vec<(String, Node)>) -> Result<Content> {
    let mut content = Content::from_parts(Vec::new());
    for (name, node) in fields {
        match (name.as_str(), node) {
            ("role", Node::Scalar(role)) => content.role = Some(role),
            ("parts", Node::Message(inner)) => content.parts.push(part_from_fields(inner)?),
            (other, _) => {
                return Err(EvalError::Multimodal(format!(
                    "unexpected field `{}` in content",
                    other
                )))
            }
        }
    }
    Ok(content)
}

fn part_from_fields(fields: Vec<(String, Node)>) -> Result<Part> {
    let mut part = None;
    for (name, node) in fields {
        match (name.as_str(), node) {
            ("text", Node::Scalar(text)) => part = Some(Part::Text(text)),
            ("file_data", Node::Message(inner)) => {
                let mut mime_type = None;
                let mut file_uri = None;
                for (key, value) in inner {
                    match (key.as_str(), value) {
                        ("mime_type", Node::Scalar(v)) => mime_type = Some(v),
                        ("file_uri", Node::Scalar(v)) => file_uri = Some(v),
                        (other, _) => {
                            return Err(EvalError::Multimodal(format!(
                                "unexpected field `{}` in file_data",
                                other
                            )))
                        }
                    }
                }
                match (mime_type, file_uri) {
                    (Some(mime_type), Some(file_uri)) => {
                        part = Some(Part::from_uri(file_uri, mime_type))
                    }
                    _ => {
                        return Err(EvalError::Multimodal(
                            "file_data requires mime_type and file_uri".to_string(),
                        ))
                    }
                }
            }
            (other, _) => {
                return Err(EvalError::Multimodal(format!(
                    "unexpected field `{}` in part",
                    other
                )))
            }
        }
    }
    part.ok_or_else(|| EvalError::Multimodal("empty part".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEXT_FORMAT: &str = r#"
        contents {
          role: "user"
          parts { text: "Describe this image:" }
          parts {
            file_data {
              mime_type: "image/png"
              file_uri: "gs://bucket/cat.png"
            }
          }
        }
    "#;

    #[test]
    fn test_parse_text_format() {
        let list = parse_content_list(TEXT_FORMAT).unwrap();
        assert_eq!(list.contents.len(), 1);
        assert_eq!(list.contents[0].role.as_deref(), Some("user"));
        assert_eq!(
            list.contents[0].parts,
            vec![
                Part::text("Describe this image:"),
                Part::from_uri("gs://bucket/cat.png", "image/png"),
            ]
        );
    }

    #[test]
    fn test_parse_json_with_camel_case_aliases() {
        let raw = r#"{"contents":[{"parts":[{"fileData":{"mimeType":"video/mp4","fileUri":"gs://b/v.mp4"}}]}]}"#;
        let list = parse_content_list(raw).unwrap();
        assert_eq!(
            list.parts().next(),
            Some(&Part::from_uri("gs://b/v.mp4", "video/mp4"))
        );
    }

    #[test]
    fn test_plain_text_is_not_multimodal() {
        let value = json!("just a response");
        assert_eq!(probe_multimodal(&value, MultimodalMode::Auto).unwrap(), None);
    }

    #[test]
    fn test_broken_payload_with_markers() {
        let value = json!("contents { parts { text: \"unterminated } }");
        assert_eq!(probe_multimodal(&value, MultimodalMode::Auto).unwrap(), None);
        assert!(probe_multimodal(&value, MultimodalMode::Strict).is_err());
        assert_eq!(
            probe_multimodal(&json!(TEXT_FORMAT), MultimodalMode::Disabled).unwrap(),
            None
        );
    }
}
