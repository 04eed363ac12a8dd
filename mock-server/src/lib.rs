//! In-memory stand-in for the document API, for end-to-end tests.
//!
//! Serves the single `POST /api` endpoint: a multipart form naming a
//! `method`, authenticated by `api_key` and an md5 `api_sig`, answered with
//! an `<rsp stat="...">` XML envelope.

mod store;

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};

use store::Store;

pub const TEST_KEY: &str = "test-key";
pub const TEST_SECRET: &str = "test-secret";

/// Remote error codes the mock answers with.
pub mod codes {
    pub const MISSING_PARAMETER: u32 = 400;
    pub const INVALID_SIGNATURE: u32 = 401;
    pub const PERMISSION_DENIED: u32 = 403;
    pub const NOT_FOUND: u32 = 404;
    pub const UNKNOWN_METHOD: u32 = 405;
    pub const LOGIN_FAILED: u32 = 612;
    pub const USERNAME_TAKEN: u32 = 613;
    pub const DOCUMENT_MISSING: u32 = 652;
    pub const DOCUMENT_EXISTS: u32 = 653;
}

/// A remote failure, rendered as `<error code=".." message=".."/>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fail {
    pub code: u32,
    pub message: String,
}

impl Fail {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Inner XML of a successful envelope, or the failure.
pub type Reply = Result<String, Fail>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub filename: String,
    pub content: Vec<u8>,
}

/// A decoded request form.
#[derive(Debug, Default)]
pub struct Form {
    text: BTreeMap<String, String>,
    files: BTreeMap<String, UploadedFile>,
}

impl Form {
    async fn read(mut multipart: Multipart) -> Result<Self, Response> {
        let mut form = Form::default();
        while let Some(field) = multipart.next_field().await.map_err(IntoResponse::into_response)? {
            let name = field.name().unwrap_or_default().to_string();
            let filename = field.file_name().map(str::to_string);
            let content = field.bytes().await.map_err(IntoResponse::into_response)?;
            match filename {
                Some(filename) => {
                    form.files.insert(
                        name,
                        UploadedFile {
                            filename,
                            content: content.to_vec(),
                        },
                    );
                }
                None => {
                    form.text.insert(name, String::from_utf8_lossy(&content).into_owned());
                }
            }
        }
        Ok(form)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }

    pub fn require(&self, name: &str) -> Result<&str, Fail> {
        self.text(name).ok_or_else(|| {
            Fail::new(codes::MISSING_PARAMETER, format!("Missing parameter: {name}"))
        })
    }

    pub fn integer(&self, name: &str) -> Result<i64, Fail> {
        self.require(name)?
            .parse()
            .map_err(|_| Fail::new(codes::MISSING_PARAMETER, format!("Invalid integer: {name}")))
    }

    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    /// md5 of the secret followed by every text field except `api_sig`,
    /// sorted by name.
    pub fn signature(&self, secret: &str) -> String {
        let mut input = secret.to_string();
        for (name, value) in self.text.iter().filter(|(name, _)| *name != "api_sig") {
            input.push_str(name);
            input.push_str(value);
        }
        format!("{:x}", md5::compute(input))
    }
}

struct Server {
    key: String,
    secret: String,
    store: RwLock<Store>,
}

impl Server {
    async fn call(&self, form: &Form) -> Reply {
        if form.text("api_key") != Some(self.key.as_str()) {
            return Err(Fail::new(codes::INVALID_SIGNATURE, "Invalid API key"));
        }
        if form.text("api_sig") != Some(form.signature(&self.secret).as_str()) {
            return Err(Fail::new(codes::INVALID_SIGNATURE, "Invalid signature"));
        }
        let method = form.require("method")?;
        self.store.write().await.dispatch(method, form)
    }
}

/// Renders the full response document.
pub fn render(reply: &Reply) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    match reply {
        Ok(inner) => {
            let _ = write!(out, "<rsp stat=\"ok\">{inner}</rsp>");
        }
        Err(fail) => {
            let _ = write!(
                out,
                "<rsp stat=\"fail\"><error code=\"{}\" message=\"{}\"/></rsp>",
                fail.code,
                escape(&fail.message)
            );
        }
    }
    out
}

pub(crate) fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

async fn api(State(server): State<Arc<Server>>, multipart: Multipart) -> Response {
    let form = match Form::read(multipart).await {
        Ok(form) => form,
        Err(rejection) => return rejection,
    };
    let reply = server.call(&form).await;
    debug!(method = form.text("method").unwrap_or_default(), ok = reply.is_ok(), "api call");
    ([(header::CONTENT_TYPE, "text/xml; charset=utf-8")], render(&reply)).into_response()
}

/// Router with the test credentials.
pub fn app() -> Router {
    app_with(TEST_KEY, TEST_SECRET)
}

pub fn app_with(key: &str, secret: &str) -> Router {
    let server = Arc::new(Server {
        key: key.to_string(),
        secret: secret.to_string(),
        store: RwLock::new(Store::default()),
    });
    Router::new().route("/api", post(api)).with_state(server)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock api serving");
    }
    axum::serve(listener, app()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> Form {
        Form {
            text: pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            files: BTreeMap::new(),
        }
    }

    #[test]
    fn signature_skips_api_sig_and_sorts() {
        let a = form(&[("method", "m"), ("api_key", "k")]);
        let b = form(&[("api_key", "k"), ("method", "m"), ("api_sig", "whatever")]);
        assert_eq!(a.signature("s"), b.signature("s"));
        assert_eq!(
            a.signature("s"),
            format!("{:x}", md5::compute("sapi_keykmethodm"))
        );
    }

    #[test]
    fn render_escapes_failure_message() {
        let body = render(&Err(Fail::new(1, "a < b & \"c\"")));
        assert!(body.contains(r#"message="a &lt; b &amp; &quot;c&quot;""#));
        assert!(render(&Ok("<x/>".to_string())).ends_with("<rsp stat=\"ok\"><x/></rsp>"));
    }

    #[test]
    fn require_reports_missing_parameter() {
        let err = form(&[]).require("doc_id").unwrap_err();
        assert_eq!(err.code, codes::MISSING_PARAMETER);
        assert!(form(&[("doc_id", "x")]).integer("doc_id").is_err());
    }
}
