//! Error types for the document service client.
//!
//! # Design
//! Every failure is a variant of `ApiError` and reaches the direct caller as
//! an `Err`. Local precondition failures (`NotReady`, `InvalidArgument`,
//! `Privilege`) are raised before any network access. `Remote` carries the
//! server's error code so call sites can match on known codes and downgrade
//! them; everything else propagates.

use std::fmt;

/// Error produced by a `Transport` implementation. Propagated unchanged once
/// the retry budget is spent, so callers can downcast to the concrete type.
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the client and the resource types.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// API key or secret missing at call time.
    #[error("API key and secret must be set before making requests")]
    NotReady,

    /// Not-ready condition scoped to a resource, e.g. a user that was never created.
    #[error("not ready: {0}")]
    ResourceNotReady(String),

    /// Malformed call: empty method name, bad option combination, ...
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport succeeded but the body carries no recognizable envelope.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The envelope reported `stat="fail"`.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The caller lacks the ownership/session needed for a mutation.
    #[error("privilege error: {0}")]
    Privilege(String),

    /// Connection failure, timeout, ... after all attempts were used.
    #[error("transport error: {0}")]
    Transport(TransportError),

    /// A base resource operation invoked on a type that does not provide it.
    #[error("cannot {operation} {kind} objects")]
    NotImplemented {
        kind: &'static str,
        operation: &'static str,
    },

    /// The resource type exists but refuses this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// A local upload file could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    /// The remote error, if this is one.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            ApiError::Remote(err) => Some(err),
            _ => None,
        }
    }
}

/// A failure envelope returned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Remote method that produced the failure.
    pub method: String,
    /// Server-defined code, kept as sent (`"-1"` when the error node is absent).
    pub code: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(
        method: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            code: code.into(),
            message: message.into(),
        }
    }

    /// The code as a number, if the server sent a numeric one.
    pub fn code_number(&self) -> Option<i64> {
        self.code.trim().parse().ok()
    }

    pub fn is(&self, code: i64) -> bool {
        self.code_number() == Some(code)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Method: {} Response: code={} message={}",
            self.method, self.code, self.message
        )
    }
}

impl std::error::Error for RemoteError {}
