//! Signed request façade.
//!
//! # Design
//! `Client` is the single entry point for remote calls. It holds the
//! configuration, the API credentials, the current actor and a `Transport`.
//! Each call is split the same way the rest of the crate is: `build_request`
//! produces a complete signed `HttpRequest` without I/O, the transport runs
//! it with bounded retries, and `parse_response` validates the envelope.
//!
//! Credentials and actor sit behind a lock so one client can be shared, and
//! a process-wide default is available through `Client::global`. Nothing
//! forces its use: every resource operation takes the client explicitly.

use std::fmt;
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::{debug, instrument, trace, warn};

use crate::config::{Config, Credentials};
use crate::envelope;
use crate::error::ApiError;
use crate::fields::{FieldValue, Fields};
use crate::http::{HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::multipart::{self, Part};
use crate::signer;
use crate::user::User;
use crate::xml::Document;

/// Identity requests are attributed to.
#[derive(Debug, Clone, Default)]
pub enum Actor {
    #[default]
    Anonymous,
    /// A logged-in user; requests carry its `session_key`.
    User(Arc<User>),
    /// An opaque identifier from the calling application; requests carry it
    /// as `my_user_id`.
    External(String),
}

#[derive(Debug, Default)]
struct Session {
    credentials: Credentials,
    actor: Actor,
}

static GLOBAL: LazyLock<RwLock<Arc<Client>>> =
    LazyLock::new(|| RwLock::new(Arc::new(Client::from_env())));

pub struct Client {
    config: Config,
    session: RwLock<Session>,
    transport: Box<dyn Transport>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("actor", &self.session.read().actor)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A client without credentials.
    pub fn new(config: Config, transport: impl Transport + 'static) -> Self {
        Self {
            config,
            session: RwLock::new(Session::default()),
            transport: Box::new(transport),
        }
    }

    /// Default configuration over HTTP, credentials read from the environment.
    pub fn from_env() -> Self {
        let config = Config::default();
        let transport = UreqTransport::new(config.read_timeout);
        Self::new(config, transport).with_credentials(Credentials::from_env())
    }

    pub fn with_credentials(self, credentials: Credentials) -> Self {
        self.session.write().credentials = credentials;
        self
    }

    /// The process-wide default client.
    pub fn global() -> Arc<Client> {
        GLOBAL.read().clone()
    }

    /// Replaces the process-wide default client.
    pub fn set_global(client: Client) -> Arc<Client> {
        let client = Arc::new(client);
        *GLOBAL.write() = client.clone();
        client
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn credentials(&self) -> Credentials {
        self.session.read().credentials.clone()
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        self.session.write().credentials = credentials;
    }

    pub fn actor(&self) -> Actor {
        self.session.read().actor.clone()
    }

    pub fn set_actor(&self, actor: Actor) {
        self.session.write().actor = actor;
    }

    /// The logged-in user, if the actor is one.
    pub fn current_user(&self) -> Option<Arc<User>> {
        match &self.session.read().actor {
            Actor::User(user) => Some(user.clone()),
            _ => None,
        }
    }

    /// Re-reads credentials from the environment and forgets the actor.
    pub fn reload(&self) {
        let mut session = self.session.write();
        session.credentials = Credentials::from_env();
        session.actor = Actor::Anonymous;
    }

    /// Calls remote `method` and returns the validated response document.
    #[instrument(skip(self, fields), fields(method = %method))]
    pub fn request(&self, method: &str, fields: Fields) -> Result<Document, ApiError> {
        let request = self.build_request(method, fields)?;
        debug!(url = %request.url, "sending request");
        let response = self.send(&request)?;
        trace!(status = response.status, body = %response.body, "received response");
        self.parse_response(method, response)
    }

    /// Assembles the signed multipart request for `method`. No I/O.
    pub fn build_request(&self, method: &str, fields: Fields) -> Result<HttpRequest, ApiError> {
        let session = self.session.read();
        let (key, secret) = session.credentials.pair().ok_or(ApiError::NotReady)?;
        if method.is_empty() {
            return Err(ApiError::InvalidArgument("Method should be given".to_string()));
        }

        let mut fields = fields;
        fields.insert("method", method);
        fields.insert("api_key", key);
        if !fields.has("session_key") && !fields.has("my_user_id") {
            match &session.actor {
                Actor::User(user) => {
                    fields.insert("session_key", user.session_key());
                }
                Actor::External(id) => {
                    fields.insert("my_user_id", id.as_str());
                }
                Actor::Anonymous => {}
            }
        }
        fields.compact();
        if fields.file_count() > 1 {
            return Err(ApiError::InvalidArgument(
                "at most one file field may be sent per request".to_string(),
            ));
        }

        let signature = signer::sign(secret, &fields);

        let mut parts = Vec::with_capacity(fields.len() + 1);
        for (name, value) in &fields {
            if let FieldValue::File(file) = value {
                parts.push(Part::File { name: name.as_str(), file });
            }
        }
        for (name, value) in fields.text_pairs() {
            parts.push(Part::Text { name, value });
        }
        parts.push(Part::Text {
            name: "api_sig",
            value: &signature,
        });

        let boundary = multipart::boundary();
        Ok(HttpRequest {
            url: self.config.endpoint.clone(),
            headers: vec![("content-type".to_string(), multipart::content_type(&boundary))],
            body: multipart::encode(&boundary, &parts),
        })
    }

    /// Validates the envelope of a raw response to `method`.
    pub fn parse_response(
        &self,
        method: &str,
        response: HttpResponse,
    ) -> Result<Document, ApiError> {
        envelope::parse(&response.body, method)
    }

    /// Runs `request`, retrying transport failures. The last failure is
    /// returned unchanged once attempts run out.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let policy = self.config.retry;
        let attempts = policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transport.execute(request) {
                Ok(response) => return Ok(response),
                Err(err) if attempt < attempts => {
                    warn!(
                        error = %err,
                        remaining = attempts - attempt,
                        "request failed, will retry"
                    );
                    self.transport.pause(policy.delay);
                    attempt += 1;
                }
                Err(err) => return Err(ApiError::Transport(err)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mock::{decode_form, MockTransport};
    use crate::resource::Resource;
    use crate::types::{FilePart, Value};

    fn client(mock: &MockTransport) -> Client {
        Client::new(
            Config::default().with_endpoint("http://localhost:3000/api"),
            mock.clone(),
        )
        .with_credentials(Credentials::new("test key", "test sec"))
    }

    fn field<'a>(form: &'a [crate::mock::FormPart], name: &str) -> Option<&'a str> {
        form.iter().find(|p| p.name == name).map(|p| p.text())
    }

    #[test]
    fn missing_credentials_fail_before_network() {
        let mock = MockTransport::new();
        let client = Client::new(Config::default(), mock.clone());
        let err = client.request("docs.search", Fields::new()).unwrap_err();
        assert!(matches!(err, ApiError::NotReady));
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn empty_method_fails_before_network() {
        let mock = MockTransport::new();
        let err = client(&mock).request("", Fields::new()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn request_carries_method_key_and_signature_last() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let req = client
            .build_request("test", Fields::new().with("field1", 1).with("field2", "hi"))
            .unwrap();
        assert_eq!(req.url, "http://localhost:3000/api");
        assert!(req.header("content-type").unwrap().starts_with("multipart/form-data; boundary="));

        let form = decode_form(&req);
        let names: Vec<&str> = form.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["api_key", "field1", "field2", "method", "api_sig"]);
        assert_eq!(field(&form, "field1"), Some("1"));
        assert_eq!(field(&form, "method"), Some("test"));
        assert_eq!(field(&form, "api_key"), Some("test key"));

        let expected = signer::sign_pairs(
            "test sec",
            [("api_key", "test key"), ("field1", "1"), ("field2", "hi"), ("method", "test")],
        );
        assert_eq!(field(&form, "api_sig"), Some(expected.as_str()));
    }

    #[test]
    fn null_fields_are_dropped() {
        let mock = MockTransport::new();
        let req = client(&mock)
            .build_request("m", Fields::new().with("page", None::<u32>))
            .unwrap();
        assert!(decode_form(&req).iter().all(|p| p.name != "page"));
    }

    #[test]
    fn file_part_comes_first_and_is_not_signed() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let req = client
            .build_request(
                "docs.upload",
                Fields::new().with("file", FilePart::new("paper.pdf", b"%PDF".to_vec())),
            )
            .unwrap();
        let form = decode_form(&req);
        assert_eq!(form[0].name, "file");
        assert_eq!(form[0].filename.as_deref(), Some("paper.pdf"));
        assert_eq!(form[0].content_type.as_deref(), Some("application/pdf"));
        assert_eq!(form[0].value, b"%PDF".to_vec());

        let expected = signer::sign_pairs(
            "test sec",
            [("api_key", "test key"), ("method", "docs.upload")],
        );
        assert_eq!(field(&form, "api_sig"), Some(expected.as_str()));
    }

    #[test]
    fn two_file_fields_are_rejected() {
        let mock = MockTransport::new();
        let err = client(&mock)
            .build_request(
                "docs.upload",
                Fields::new()
                    .with("file", FilePart::new("a.pdf", Vec::new()))
                    .with("thumb", FilePart::new("b.png", Vec::new())),
            )
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[test]
    fn external_actor_is_sent_as_my_user_id() {
        let mock = MockTransport::new();
        let client = client(&mock);
        client.set_actor(Actor::External("customer-42".to_string()));
        let form = decode_form(&client.build_request("m", Fields::new()).unwrap());
        assert_eq!(field(&form, "my_user_id"), Some("customer-42"));
        assert_eq!(field(&form, "session_key"), None);
    }

    #[test]
    fn user_actor_is_sent_as_session_key() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let mut user = User::new(Default::default());
        user.set("session_key", Value::from("sess-1"));
        client.set_actor(Actor::User(Arc::new(user)));
        let form = decode_form(&client.build_request("m", Fields::new()).unwrap());
        assert_eq!(field(&form, "session_key"), Some("sess-1"));
        assert_eq!(field(&form, "my_user_id"), None);
    }

    #[test]
    fn explicit_session_key_wins_over_actor() {
        let mock = MockTransport::new();
        let client = client(&mock);
        client.set_actor(Actor::External("someone".to_string()));
        let form = decode_form(
            &client
                .build_request("m", Fields::new().with("session_key", "explicit"))
                .unwrap(),
        );
        assert_eq!(field(&form, "session_key"), Some("explicit"));
        assert_eq!(field(&form, "my_user_id"), None);
    }

    #[test]
    fn transport_failures_retry_three_times_then_propagate() {
        let mock = MockTransport::new();
        mock.fail("connection refused");
        mock.fail("connection refused");
        mock.fail("timed out");
        let err = client(&mock).request("m", Fields::new()).unwrap_err();
        match err {
            ApiError::Transport(inner) => assert_eq!(inner.to_string(), "timed out"),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(mock.calls(), 3);
        assert_eq!(mock.pauses(), vec![Duration::from_secs(20); 2]);
    }

    #[test]
    fn retry_recovers_after_transient_failure() {
        let mock = MockTransport::new();
        mock.fail("connection reset");
        mock.respond(r#"<rsp stat="ok"/>"#);
        assert!(client(&mock).request("m", Fields::new()).is_ok());
        assert_eq!(mock.calls(), 2);
        assert_eq!(mock.pauses().len(), 1);
    }

    #[test]
    fn remote_failures_are_not_retried() {
        let mock = MockTransport::new();
        mock.respond(r#"<rsp stat="fail"><error code="401" message="Unauthorized"/></rsp>"#);
        let err = client(&mock).request("docs.getList", Fields::new()).unwrap_err();
        assert_eq!(err.as_remote().unwrap().code, "401");
        assert_eq!(mock.calls(), 1);
        assert!(mock.pauses().is_empty());
    }

    #[test]
    fn malformed_responses_are_not_retried() {
        let mock = MockTransport::new();
        mock.respond("<invalid/>");
        let err = client(&mock).request("m", Fields::new()).unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)));
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn reload_clears_actor() {
        let mock = MockTransport::new();
        let client = client(&mock);
        client.set_actor(Actor::External("x".to_string()));
        client.reload();
        assert!(matches!(client.actor(), Actor::Anonymous));
        assert!(client.current_user().is_none());
    }
}
