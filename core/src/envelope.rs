//! Response envelope validation.
//!
//! Every response must be a `<rsp stat="...">` document. A missing envelope
//! is a protocol failure (`MalformedResponse`); `stat="fail"` is a domain
//! failure (`Remote`) carrying the server's code.

use crate::error::{ApiError, RemoteError};
use crate::xml::Document;

pub const ROOT: &str = "rsp";
pub const STATUS_ATTR: &str = "stat";
pub const STATUS_FAIL: &str = "fail";
pub const UNKNOWN_CODE: &str = "-1";

const MALFORMED: &str = "The response received from the remote host could not be interpreted";

/// Parses a raw body and validates its envelope.
pub fn parse(body: &str, method: &str) -> Result<Document, ApiError> {
    let document = Document::parse(body)
        .map_err(|e| ApiError::MalformedResponse(format!("{MALFORMED}: {e}")))?;
    validate(document, method)
}

/// Returns `document` unchanged when its envelope reports success.
pub fn validate(document: Document, method: &str) -> Result<Document, ApiError> {
    let status = match document.at(&format!("/{ROOT}")).and_then(|rsp| rsp.attr(STATUS_ATTR)) {
        Some(status) => status,
        None => return Err(ApiError::MalformedResponse(MALFORMED.to_string())),
    };

    if status == STATUS_FAIL {
        let (code, message) = match document.at(&format!("/{ROOT}/error")) {
            Some(error) => (
                error.attr("code").unwrap_or(UNKNOWN_CODE).to_string(),
                error
                    .attr("message")
                    .or_else(|| error.attr("msg"))
                    .unwrap_or_default()
                    .to_string(),
            ),
            None => (UNKNOWN_CODE.to_string(), format!("Unidentified error:\n{document}")),
        };
        return Err(RemoteError::new(method, code, message).into());
    }

    Ok(document)
}
