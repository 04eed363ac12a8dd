//! Attribute values and upload payloads.

use std::fmt;
use std::path::{Path, PathBuf};

/// A typed attribute scalar.
///
/// Values hydrated from XML are typed by the node's `type` marker; values
/// written locally keep whatever variant the caller chose.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Integer(i64),
    Float(f64),
    /// Enumerated token, e.g. a conversion status.
    Symbol(String),
}

impl Value {
    /// Text or symbol content.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self, Value::Symbol(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) | Value::Symbol(s) => f.write_str(s),
            Value::Integer(n) => write!(f, "{n}"),
            // keeps the fractional part, "10.0" rather than "10"
            Value::Float(n) => write!(f, "{n:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

/// Binary content for the single file field of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub filename: String,
    pub content: Vec<u8>,
}

impl FilePart {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read(path)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self { filename, content })
    }
}

/// Where the content of an upload comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Upload {
    Path(PathBuf),
    /// Remote location fetched by the service itself.
    Url(String),
    Bytes(FilePart),
}

impl Upload {
    /// Classifies a string as a remote URL (`http`, `https`, `ftp`) or a local path.
    pub fn parse(location: &str) -> Self {
        let lower = location.to_ascii_lowercase();
        if ["http://", "https://", "ftp://"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
        {
            Upload::Url(location.to_string())
        } else {
            Upload::Path(PathBuf::from(location))
        }
    }

    /// Local content as a file part. `None` for URLs.
    pub fn read(&self) -> std::io::Result<Option<FilePart>> {
        match self {
            Upload::Path(path) => FilePart::from_path(path).map(Some),
            Upload::Bytes(part) => Ok(Some(part.clone())),
            Upload::Url(_) => Ok(None),
        }
    }
}

/// Interprets leading numeric text the lenient way the service's typed nodes
/// expect: surrounding whitespace ignored, trailing garbage ignored, nothing
/// numeric at all reads as zero.
pub(crate) fn parse_integer(text: &str) -> i64 {
    let text = text.trim();
    let end = numeric_prefix(text, false);
    text[..end].parse().unwrap_or(0)
}

pub(crate) fn parse_float(text: &str) -> f64 {
    let text = text.trim();
    let end = numeric_prefix(text, true);
    text[..end].parse().unwrap_or(0.0)
}

fn numeric_prefix(text: &str, fraction: bool) -> usize {
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => end += 1,
            b'.' if fraction && !seen_dot => {
                seen_dot = true;
                end += 1;
            }
            _ => break,
        }
    }
    end
}
