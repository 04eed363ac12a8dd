//! Behavioural scenarios over a scripted transport.
//!
//! Each test queues canned envelopes on a `MockTransport`, drives the public
//! API, and checks both the outcome and what went over the wire.

use std::time::Duration;

use scribd_core::collection::DOCUMENT_EXISTS;
use scribd_core::mock::{decode_form, MockTransport};
use scribd_core::resource::build_collection;
use scribd_core::{
    ApiError, Attributes, Client, Collection, Config, Credentials, Document, FilePart, Fields,
    Resource, Upload, User, Value,
};

fn client(mock: &MockTransport) -> Client {
    Client::new(Config::default(), mock.clone()).with_credentials(Credentials::new("key", "secret"))
}

fn api_sig(request: &scribd_core::HttpRequest) -> String {
    decode_form(request)
        .into_iter()
        .find(|p| p.name == "api_sig")
        .map(|p| p.text().to_string())
        .unwrap()
}

fn title(value: &str) -> Attributes {
    let mut attrs = Attributes::new();
    attrs.insert("title".to_string(), Value::from(value));
    attrs
}

#[test]
fn signature_ignores_insertion_order_and_boundary() {
    let client = client(&MockTransport::new());
    let a = client
        .build_request("docs.search", Fields::new().with("query", "rust").with("num_results", 5))
        .unwrap();
    let b = client
        .build_request("docs.search", Fields::new().with("num_results", 5).with("query", "rust"))
        .unwrap();
    assert_ne!(a.header("content-type"), b.header("content-type"));
    assert_eq!(api_sig(&a), api_sig(&b));
}

#[test]
fn signature_ignores_file_fields() {
    let client = client(&MockTransport::new());
    let without = client
        .build_request("docs.upload", Fields::new().with("access", "private"))
        .unwrap();
    let with = client
        .build_request(
            "docs.upload",
            Fields::new()
                .with("access", "private")
                .with("file", FilePart::new("a.pdf", b"%PDF".to_vec())),
        )
        .unwrap();
    assert_eq!(api_sig(&without), api_sig(&with));
    assert_eq!(decode_form(&with)[0].filename.as_deref(), Some("a.pdf"));
    assert_eq!(decode_form(&with).last().unwrap().name, "api_sig");
}

#[test]
fn retry_bound_then_last_error_propagates() {
    let mock = MockTransport::new();
    mock.fail("connection refused").fail("timed out").fail("connection reset");
    let err = client(&mock).request("docs.featured", Fields::new()).unwrap_err();

    assert_eq!(mock.calls(), 3);
    assert_eq!(mock.pauses(), vec![Duration::from_secs(20), Duration::from_secs(20)]);
    match err {
        ApiError::Transport(inner) => assert_eq!(inner.to_string(), "connection reset"),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[test]
fn malformed_body_is_never_a_remote_error() {
    for body in ["<invalid/>", "", "not xml at all", "<rsp><error code=\"1\"/></rsp>"] {
        let mock = MockTransport::new();
        mock.respond(body);
        let err = client(&mock).request("docs.search", Fields::new()).unwrap_err();
        assert!(matches!(err, ApiError::MalformedResponse(_)), "{body:?} gave {err:?}");
        assert_eq!(mock.calls(), 1);
    }
}

#[test]
fn missing_credentials_fail_before_the_network() {
    let mock = MockTransport::new();
    let client = Client::new(Config::default(), mock.clone());
    let mut doc =
        Document::new(title("t")).with_file(Upload::Bytes(FilePart::new("a.pdf", Vec::new())));
    assert!(matches!(doc.save(&client), Err(ApiError::NotReady)));
    assert_eq!(mock.calls(), 0);
    assert!(!doc.saved() && !doc.created());
}

#[test]
fn successful_create() {
    let mock = MockTransport::new();
    mock.respond(
        r#"<rsp stat="ok"><doc_id type="integer">77</doc_id><access_key>abc123</access_key></rsp>"#,
    );
    mock.respond(r#"<rsp stat="ok"/>"#);

    let doc = Document::new(title("t"))
        .with_file(Upload::Bytes(FilePart::new("t.pdf", b"%PDF".to_vec())))
        .create(&client(&mock))
        .unwrap();

    assert!(doc.created() && doc.saved());
    assert_eq!(doc.get("access_key"), Some(&Value::from("abc123")));
    assert_eq!(doc.get("title"), Some(&Value::from("t")));
    assert_eq!(mock.methods(), vec!["docs.upload", "docs.changeSettings"]);
    assert!(mock.is_exhausted());
}

#[test]
fn failed_create_hands_the_document_back() {
    let mock = MockTransport::new();
    mock.respond(r#"<rsp stat="fail"><error code="500" message="Server busy"/></rsp>"#);
    mock.respond(r#"<rsp stat="ok"><doc_id type="integer">8</doc_id></rsp>"#);
    mock.respond(r#"<rsp stat="ok"/>"#);
    let client = client(&mock);

    let failed = Document::new(title("t"))
        .with_file(Upload::Bytes(FilePart::new("t.pdf", b"%PDF".to_vec())))
        .create(&client)
        .unwrap_err();
    assert_eq!(failed.error.as_remote().and_then(|e| e.code_number()), Some(500));
    assert_eq!(failed.to_string(), failed.error.to_string());
    let doc = failed.resource;
    assert!(!doc.saved() && !doc.created());
    assert!(doc.file().is_some());

    let doc = doc.create(&client).unwrap();
    assert!(doc.saved() && doc.created());
    assert_eq!(doc.id(), Some(&Value::Integer(8)));
    assert_eq!(mock.methods(), vec!["docs.upload", "docs.upload", "docs.changeSettings"]);
}

#[test]
fn failed_save_keeps_prior_persisted_state() {
    let mock = MockTransport::new();
    mock.respond(
        r#"<rsp stat="ok"><result_set><result><doc_id type="integer">3</doc_id></result></result_set></rsp>"#,
    );
    mock.respond(r#"<rsp stat="fail"><error code="500" message="Server busy"/></rsp>"#);
    let client = client(&mock);

    let mut docs = Document::search(&client, "x", Fields::new()).unwrap();
    let doc = &mut docs[0];
    assert!(doc.saved() && doc.created());
    doc.set("title", "renamed");
    let err = doc.save(&client).unwrap_err();
    assert_eq!(err.as_remote().and_then(|e| e.code_number()), Some(500));
    assert!(doc.saved() && doc.created());
}

#[test]
fn ignorable_collection_error() {
    let exists = r#"<rsp stat="fail"><error code="653" message="Document already exists in collection"/></rsp>"#;
    let mock = MockTransport::new();
    mock.respond(
        r#"<rsp stat="ok"><resultset><result><collection_id>9</collection_id></result></resultset></rsp>"#,
    );
    mock.respond(exists);
    mock.respond(exists);
    let client = client(&mock);

    let listing = client.request("docs.getCollections", Fields::new()).unwrap();
    let collections: Vec<Collection> = build_collection(&listing, None);
    let mut doc = Document::new(Attributes::new());
    doc.set("doc_id", 4);

    let returned = collections[0].add(&client, &doc, true).unwrap();
    assert!(std::ptr::eq(returned, &doc));

    let err = collections[0].add(&client, &doc, false).unwrap_err();
    let remote = err.as_remote().unwrap();
    assert!(remote.is(DOCUMENT_EXISTS));
    assert_eq!(
        err.to_string(),
        "Method: docs.addToCollection Response: code=653 message=Document already exists in collection"
    );
}

#[test]
fn permissive_attribute_write() {
    let mut user = User::new(Attributes::new());
    user.set("favourite_colour", "teal");
    assert_eq!(user.get("favourite_colour"), Some(&Value::from("teal")));
    assert_eq!(user.get("anything_else"), None);
    assert!(!user.saved() && !user.created());
}

#[test]
fn upload_from_a_local_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "meeting notes").unwrap();

    let mock = MockTransport::new();
    mock.respond(r#"<rsp stat="ok"><doc_id type="integer">1</doc_id></rsp>"#);
    mock.respond(r#"<rsp stat="ok"/>"#);
    let doc = Document::new(title("Notes"))
        .with_file(Upload::parse(path.to_str().unwrap()))
        .create(&client(&mock))
        .unwrap();
    assert_eq!(doc.id(), Some(&Value::Integer(1)));

    let upload = &mock.forms()[0];
    assert_eq!(upload[0].name, "file");
    assert_eq!(upload[0].filename.as_deref(), Some("notes.txt"));
    assert_eq!(upload[0].content_type.as_deref(), Some("text/plain"));
    assert_eq!(upload[0].value, b"meeting notes");
}

#[test]
fn missing_local_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockTransport::new();
    let mut doc =
        Document::new(title("gone")).with_file(Upload::Path(dir.path().join("missing.pdf")));
    assert!(matches!(doc.save(&client(&mock)), Err(ApiError::Io(_))));
    assert_eq!(mock.calls(), 0);
}

#[test]
fn external_actor_is_attributed_unless_overridden() {
    let mock = MockTransport::new();
    mock.respond(r#"<rsp stat="ok"/>"#);
    mock.respond(r#"<rsp stat="ok"/>"#);
    let client = client(&mock);
    client.set_actor(scribd_core::Actor::External("crm-42".to_string()));

    client.request("docs.getList", Fields::new()).unwrap();
    client
        .request("docs.getList", Fields::new().with("session_key", "explicit"))
        .unwrap();

    let forms = mock.forms();
    let names = |i: usize| forms[i].iter().map(|p| p.name.clone()).collect::<Vec<_>>();
    assert!(names(0).contains(&"my_user_id".to_string()));
    assert!(!names(1).contains(&"my_user_id".to_string()));
    assert!(names(1).contains(&"session_key".to_string()));
}
