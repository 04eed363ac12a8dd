//! Document collections. Collections are only ever retrieved, never created
//! locally; see `User::collections`.

use std::sync::Arc;

use crate::client::Client;
use crate::document::Document;
use crate::error::ApiError;
use crate::fields::Fields;
use crate::resource::{Record, Resource};
use crate::types::Value;
use crate::user::User;
use crate::xml::Element;

/// Remote code for removing a document that is not in the collection.
pub const DOCUMENT_MISSING: i64 = 652;
/// Remote code for adding a document that is already in the collection.
pub const DOCUMENT_EXISTS: i64 = 653;

#[derive(Debug, Clone)]
pub struct Collection {
    record: Record,
    owner: Option<Arc<User>>,
}

impl Collection {
    pub fn id(&self) -> Option<&Value> {
        self.get("collection_id")
    }

    pub fn name(&self) -> Option<&Value> {
        self.get("collection_name")
    }

    pub fn owner(&self) -> Option<&Arc<User>> {
        self.owner.as_ref()
    }

    /// Adds `document`. With `ignore_if_exists`, a document already in the
    /// collection is not an error.
    pub fn add<'a>(
        &self,
        client: &Client,
        document: &'a Document,
        ignore_if_exists: bool,
    ) -> Result<&'a Document, ApiError> {
        self.membership(
            client,
            "docs.addToCollection",
            document,
            ignore_if_exists.then_some(DOCUMENT_EXISTS),
        )
    }

    /// Removes `document`. With `ignore_if_missing`, a document that is not in
    /// the collection is not an error.
    pub fn remove<'a>(
        &self,
        client: &Client,
        document: &'a Document,
        ignore_if_missing: bool,
    ) -> Result<&'a Document, ApiError> {
        self.membership(
            client,
            "docs.removeFromCollection",
            document,
            ignore_if_missing.then_some(DOCUMENT_MISSING),
        )
    }

    fn membership<'a>(
        &self,
        client: &Client,
        method: &str,
        document: &'a Document,
        ignored: Option<i64>,
    ) -> Result<&'a Document, ApiError> {
        let fields = Fields::new()
            .with("collection_id", self.id())
            .with("doc_id", document.id())
            .with("session_key", self.owner.as_ref().and_then(|owner| owner.session_key()));
        match client.request(method, fields) {
            Ok(_) => Ok(document),
            Err(ApiError::Remote(err)) if ignored.is_some_and(|code| err.is(code)) => Ok(document),
            Err(err) => Err(err),
        }
    }
}

impl Resource for Collection {
    type Context = Option<Arc<User>>;
    const KIND: &'static str = "Collection";

    fn hydrate(xml: &Element, owner: Self::Context) -> Self {
        Self {
            record: Record::from_xml(xml),
            owner,
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Credentials};
    use crate::mock::MockTransport;
    use crate::resource::Attributes;

    fn client(mock: &MockTransport) -> Client {
        Client::new(Config::default(), mock.clone()).with_credentials(Credentials::new("k", "s"))
    }

    fn collection() -> Collection {
        let xml = crate::xml::Document::parse(
            "<result><collection_id>61</collection_id><collection_name>Papers</collection_name></result>",
        )
        .unwrap();
        let mut owner = User::new(Attributes::new());
        owner.set("session_key", "sess");
        Collection::hydrate(xml.root().unwrap(), Some(Arc::new(owner)))
    }

    fn document() -> Document {
        let mut doc = Document::new(Attributes::new());
        doc.set("doc_id", 9);
        doc
    }

    const EXISTS: &str =
        r#"<rsp stat="fail"><error code="653" message="Document already in collection"/></rsp>"#;
    const MISSING: &str =
        r#"<rsp stat="fail"><error code="652" message="Document not in collection"/></rsp>"#;

    #[test]
    fn id_and_name_alias_attributes() {
        let c = collection();
        assert_eq!(c.id(), Some(&Value::from("61")));
        assert_eq!(c.name(), Some(&Value::from("Papers")));
        assert!(c.created());
    }

    #[test]
    fn add_sends_owner_session() {
        let mock = MockTransport::new();
        mock.respond(r#"<rsp stat="ok"/>"#);
        let doc = document();
        let returned = collection().add(&client(&mock), &doc, true).unwrap();
        assert!(std::ptr::eq(returned, &doc));
        let form = &mock.forms()[0];
        let sent = |name: &str| form.iter().find(|p| p.name == name).map(|p| p.text().to_string());
        assert_eq!(sent("method").as_deref(), Some("docs.addToCollection"));
        assert_eq!(sent("collection_id").as_deref(), Some("61"));
        assert_eq!(sent("doc_id").as_deref(), Some("9"));
        assert_eq!(sent("session_key").as_deref(), Some("sess"));
    }

    #[test]
    fn already_present_is_ignored_when_asked() {
        let mock = MockTransport::new();
        mock.respond(EXISTS);
        mock.respond(EXISTS);
        let client = client(&mock);
        let doc = document();
        assert!(collection().add(&client, &doc, true).is_ok());
        let err = collection().add(&client, &doc, false).unwrap_err();
        assert!(err.as_remote().is_some_and(|e| e.is(DOCUMENT_EXISTS)));
    }

    #[test]
    fn only_the_matching_code_is_ignored() {
        let mock = MockTransport::new();
        mock.respond(MISSING);
        mock.respond(EXISTS);
        mock.respond(MISSING);
        let client = client(&mock);
        let doc = document();
        assert!(collection().add(&client, &doc, true).is_err());
        assert!(collection().remove(&client, &doc, true).is_err());
        assert!(collection().remove(&client, &doc, true).is_ok());
        assert_eq!(mock.methods()[1], "docs.removeFromCollection");
    }
}
