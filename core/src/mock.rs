//! Scripted transport for tests.
//!
//! `MockTransport` plays back queued results in order and records every
//! request and every retry pause, so tests can drive the client and the
//! resource types without a network. Clones share the same script, so a test
//! can hand one clone to a `Client` and keep another for assertions.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse, Transport};

#[derive(Default)]
struct Script {
    results: VecDeque<Result<HttpResponse, TransportError>>,
    requests: Vec<HttpRequest>,
    pauses: Vec<Duration>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<Script>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a 200 response with `body`.
    pub fn respond(&self, body: impl Into<String>) -> &Self {
        self.script.lock().results.push_back(Ok(HttpResponse::ok(body)));
        self
    }

    /// Queues a transport failure.
    pub fn fail(&self, error: impl Into<TransportError>) -> &Self {
        self.script.lock().results.push_back(Err(error.into()));
        self
    }

    /// Number of `execute` calls so far.
    pub fn calls(&self) -> usize {
        self.script.lock().requests.len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().requests.clone()
    }

    /// Decoded form of every request, in call order.
    pub fn forms(&self) -> Vec<Vec<FormPart>> {
        self.script.lock().requests.iter().map(decode_form).collect()
    }

    /// Remote method names of every request, in call order.
    pub fn methods(&self) -> Vec<String> {
        self.forms()
            .iter()
            .filter_map(|form| {
                form.iter()
                    .find(|p| p.name == "method")
                    .map(|p| p.text().to_string())
            })
            .collect()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.script.lock().pauses.clone()
    }

    /// True once every queued result has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.script.lock().results.is_empty()
    }
}

impl Transport for MockTransport {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut script = self.script.lock();
        script.requests.push(request.clone());
        script
            .results
            .pop_front()
            .unwrap_or_else(|| Err("mock transport has no scripted result left".into()))
    }

    fn pause(&self, delay: Duration) {
        self.script.lock().pauses.push(delay);
    }
}

/// One part of a decoded multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub value: Vec<u8>,
}

impl FormPart {
    /// The value as text; empty when it is not UTF-8.
    pub fn text(&self) -> &str {
        std::str::from_utf8(&self.value).unwrap_or_default()
    }
}

/// Splits a multipart request body back into its parts, in wire order.
pub fn decode_form(request: &HttpRequest) -> Vec<FormPart> {
    let Some(boundary) = request
        .header("content-type")
        .and_then(|ct| ct.split_once("boundary="))
        .map(|(_, b)| b.trim_matches('"').to_string())
    else {
        return Vec::new();
    };
    let delimiter = format!("--{boundary}");

    let mut parts = Vec::new();
    for segment in split(&request.body, delimiter.as_bytes()).into_iter().skip(1) {
        if segment.starts_with(b"--") {
            break;
        }
        let segment = segment.strip_prefix(b"\r\n").unwrap_or(segment);
        let Some(header_end) = find(segment, b"\r\n\r\n") else {
            continue;
        };
        let headers = String::from_utf8_lossy(&segment[..header_end]);
        let content = &segment[header_end + 4..];
        let content = content.strip_suffix(b"\r\n").unwrap_or(content);

        let mut part = FormPart {
            name: String::new(),
            filename: None,
            content_type: None,
            value: content.to_vec(),
        };
        for line in headers.lines() {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.eq_ignore_ascii_case("content-disposition") {
                part.name = quoted(value, "name").unwrap_or_default();
                part.filename = quoted(value, "filename");
            } else if key.eq_ignore_ascii_case("content-type") {
                part.content_type = Some(value.trim().to_string());
            }
        }
        parts.push(part);
    }
    parts
}

fn quoted(header: &str, param: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|item| {
        item.strip_prefix(param)
            .and_then(|rest| rest.strip_prefix("=\""))
            .and_then(|rest| rest.strip_suffix('"'))
            .map(str::to_string)
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn split<'a>(mut haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    while let Some(at) = find(haystack, needle) {
        out.push(&haystack[..at]);
        haystack = &haystack[at + needle.len()..];
    }
    out.push(haystack);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::{self, Part};
    use crate::types::FilePart;

    #[test]
    fn plays_back_in_order_and_records() {
        let mock = MockTransport::new();
        mock.respond("one").fail("boom");
        let req = HttpRequest {
            url: "u".to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        };
        assert_eq!(mock.execute(&req).unwrap().body, "one");
        assert!(mock.execute(&req).is_err());
        assert!(mock.execute(&req).is_err());
        assert_eq!(mock.calls(), 3);
        assert!(mock.is_exhausted());
    }

    #[test]
    fn decodes_what_multipart_encodes() {
        let file = FilePart::new("thumb.png", vec![0x89, b'P', b'N', b'G']);
        let body = multipart::encode(
            "BND",
            &[
                Part::File { name: "file", file: &file },
                Part::Text { name: "doc_id", value: "7" },
            ],
        );
        let req = HttpRequest {
            url: "u".to_string(),
            headers: vec![("content-type".to_string(), multipart::content_type("BND"))],
            body,
        };
        let form = decode_form(&req);
        assert_eq!(form.len(), 2);
        assert_eq!(form[0].filename.as_deref(), Some("thumb.png"));
        assert_eq!(form[0].content_type.as_deref(), Some("image/png"));
        assert_eq!(form[0].value, vec![0x89, b'P', b'N', b'G']);
        assert_eq!(form[1].name, "doc_id");
        assert_eq!(form[1].text(), "7");
        assert_eq!(form[1].filename, None);
    }
}
