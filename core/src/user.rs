//! Service user accounts.

use std::fmt;
use std::sync::Arc;

use crate::client::{Actor, Client};
use crate::collection::Collection;
use crate::document::Document;
use crate::error::ApiError;
use crate::fields::Fields;
use crate::resource::{build_collection, Attributes, Record, Resource};
use crate::xml::Element;

/// A user of the service. `session_key` and `user_id` arrive as attributes
/// once the user has logged in or signed up.
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    record: Record,
}

impl User {
    /// A new, unsaved user. Saving it signs the account up.
    pub fn new(attributes: Attributes) -> Self {
        Self {
            record: Record::new(attributes),
        }
    }

    /// Logs in and makes the user the client's actor.
    pub fn login(client: &Client, username: &str, password: &str) -> Result<Arc<User>, ApiError> {
        let response = client.request(
            "user.login",
            Fields::new().with("username", username).with("password", password),
        )?;
        let rsp = response
            .at("/rsp")
            .ok_or_else(|| ApiError::MalformedResponse("login response without rsp".to_string()))?;
        let user = Arc::new(User::hydrate(rsp, ()));
        client.set_actor(Actor::User(user.clone()));
        Ok(user)
    }

    /// Creates a new account; same as building a user and saving it.
    pub fn signup(client: &Client, attributes: Attributes) -> Result<Arc<User>, ApiError> {
        Ok(Arc::new(User::new(attributes).create(client)?))
    }

    pub fn id(&self) -> Option<String> {
        self.get("user_id").map(ToString::to_string)
    }

    pub fn username(&self) -> Option<String> {
        self.get("username").map(ToString::to_string)
    }

    pub fn session_key(&self) -> Option<String> {
        self.get("session_key").map(ToString::to_string)
    }

    fn require_created(&self) -> Result<(), ApiError> {
        if self.created() {
            Ok(())
        } else {
            Err(ApiError::ResourceNotReady("User hasn't been created yet".to_string()))
        }
    }

    /// Documents owned by this user, each with this user as owner.
    pub fn documents(
        self: &Arc<Self>,
        client: &Client,
        options: Fields,
    ) -> Result<Vec<Document>, ApiError> {
        let mut fields = options;
        fields.insert("session_key", self.session_key());
        let response = client.request("docs.getList", fields)?;
        Ok(build_collection(&response, Some(self.clone())))
    }

    /// Searches within this user's documents. `None` without a session.
    pub fn find_documents(
        self: &Arc<Self>,
        client: &Client,
        query: &str,
        options: Fields,
    ) -> Result<Option<Vec<Document>>, ApiError> {
        let Some(session_key) = self.session_key() else {
            return Ok(None);
        };
        let fields = options
            .with("query", query)
            .with("scope", "user")
            .with("session_key", session_key);
        Document::find(client, fields).map(Some)
    }

    /// Loads one of this user's documents by id. `None` without a session.
    pub fn find_document(
        self: &Arc<Self>,
        client: &Client,
        doc_id: i64,
    ) -> Result<Option<Document>, ApiError> {
        let Some(session_key) = self.session_key() else {
            return Ok(None);
        };
        let response = client.request(
            "docs.getSettings",
            Fields::new().with("doc_id", doc_id).with("session_key", session_key),
        )?;
        let rsp = response
            .at("/rsp")
            .ok_or_else(|| {
                ApiError::MalformedResponse("settings response without rsp".to_string())
            })?;
        Ok(Some(Document::hydrate(rsp, Some(self.clone()))))
    }

    /// Uploads `document` on behalf of this user.
    pub fn upload(
        self: &Arc<Self>,
        client: &Client,
        document: Document,
    ) -> Result<Document, ApiError> {
        self.require_created()?;
        Ok(document.with_owner(self.clone()).create(client)?)
    }

    /// Collections created by this user.
    pub fn collections(
        self: &Arc<Self>,
        client: &Client,
        options: Fields,
    ) -> Result<Vec<Collection>, ApiError> {
        self.require_created()?;
        let mut fields = options;
        fields.insert("session_key", self.session_key());
        let response = client.request("docs.getCollections", fields)?;
        Ok(build_collection(&response, Some(self.clone())))
    }

    /// A URL that signs this user in and then redirects to `next_url`.
    pub fn auto_sign_in_url(&self, client: &Client, next_url: &str) -> Result<String, ApiError> {
        self.require_created()?;
        let response = client.request(
            "user.getAutoSignInUrl",
            Fields::new()
                .with("session_key", self.session_key())
                .with("next_url", next_url),
        )?;
        Ok(response.at("/rsp/url").map(Element::content).unwrap_or_default())
    }
}

impl Resource for User {
    type Context = ();
    const KIND: &'static str = "User";

    fn hydrate(xml: &Element, _context: ()) -> Self {
        Self {
            record: Record::from_xml(xml),
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    /// Signs the user up and makes it the client's actor. Existing users
    /// cannot be modified.
    fn save(&mut self, client: &Client) -> Result<(), ApiError> {
        if self.created() {
            return Err(ApiError::Unsupported(
                "cannot update a user once that user has been saved".to_string(),
            ));
        }
        let response = client.request("user.signup", self.record.to_fields())?;
        if let Some(rsp) = response.at("/rsp") {
            self.record.load(rsp);
        }
        self.record.mark_persisted();
        client.set_actor(Actor::User(Arc::new(self.clone())));
        Ok(())
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Credentials};
    use crate::mock::MockTransport;
    use crate::types::Value;

    fn client(mock: &MockTransport) -> Client {
        Client::new(Config::default(), mock.clone()).with_credentials(Credentials::new("k", "s"))
    }

    const LOGIN: &str = r#"<rsp stat="ok"><username>alice</username><user_id type="integer">7</user_id><session_key>sess-7</session_key><name>Alice</name></rsp>"#;

    #[test]
    fn login_sets_actor() {
        let mock = MockTransport::new();
        mock.respond(LOGIN);
        let client = client(&mock);
        let user = User::login(&client, "alice", "secret").unwrap();
        assert!(user.created() && user.saved());
        assert_eq!(user.id().as_deref(), Some("7"));
        assert_eq!(user.session_key().as_deref(), Some("sess-7"));
        assert_eq!(user.to_string(), "alice");
        assert_eq!(client.current_user().unwrap().username().as_deref(), Some("alice"));
        assert_eq!(mock.methods(), vec!["user.login"]);
    }

    #[test]
    fn signup_creates_and_logs_in() {
        let mock = MockTransport::new();
        mock.respond(LOGIN);
        let client = client(&mock);
        let mut attrs = Attributes::new();
        attrs.insert("username".to_string(), Value::from("alice"));
        attrs.insert("email".to_string(), Value::from("a@example.com"));
        let user = User::signup(&client, attrs).unwrap();
        assert!(user.created());
        assert_eq!(user.get("email"), Some(&Value::from("a@example.com")));
        assert_eq!(mock.methods(), vec!["user.signup"]);
        assert!(client.current_user().is_some());
    }

    #[test]
    fn saved_user_cannot_be_updated() {
        let mock = MockTransport::new();
        mock.respond(LOGIN);
        let client = client(&mock);
        let user = User::login(&client, "alice", "pw").unwrap();
        let mut user = (*user).clone();
        assert!(matches!(user.save(&client), Err(ApiError::Unsupported(_))));
        assert_eq!(mock.calls(), 1);
    }

    #[test]
    fn uncreated_user_cannot_list_collections() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let user = Arc::new(User::new(Attributes::new()));
        assert!(matches!(
            user.collections(&client, Fields::new()),
            Err(ApiError::ResourceNotReady(_))
        ));
        assert!(matches!(
            user.auto_sign_in_url(&client, ""),
            Err(ApiError::ResourceNotReady(_))
        ));
        assert_eq!(mock.calls(), 0);
    }

    #[test]
    fn documents_are_owned_by_user() {
        let mock = MockTransport::new();
        mock.respond(LOGIN);
        mock.respond(
            r#"<rsp stat="ok"><resultset><result><doc_id type="integer">1</doc_id><title>A</title></result><result><doc_id type="integer">2</doc_id><title>B</title></result></resultset></rsp>"#,
        );
        let client = client(&mock);
        let user = User::login(&client, "alice", "pw").unwrap();
        let docs = user.documents(&client, Fields::new()).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.owner().is_some_and(|o| Arc::ptr_eq(o, &user))));
        let form = &mock.forms()[1];
        assert!(form.iter().any(|p| p.name == "session_key" && p.text() == "sess-7"));
    }

    #[test]
    fn auto_sign_in_url_reads_cdata() {
        let mock = MockTransport::new();
        mock.respond(LOGIN);
        mock.respond(
            r#"<rsp stat="ok"><url><![CDATA[http://example.com/login?next=/home]]></url></rsp>"#,
        );
        let client = client(&mock);
        let user = User::login(&client, "alice", "pw").unwrap();
        assert_eq!(
            user.auto_sign_in_url(&client, "/home").unwrap(),
            "http://example.com/login?next=/home"
        );
    }

    #[test]
    fn find_document_without_session_is_none() {
        let mock = MockTransport::new();
        let client = client(&mock);
        let user = Arc::new(User::new(Attributes::new()));
        assert!(user.find_document(&client, 1).unwrap().is_none());
        assert_eq!(mock.calls(), 0);
    }
}
