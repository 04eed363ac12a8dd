//! Access control for private documents.
//!
//! Access is granted to opaque user identifiers chosen by the calling
//! application, either for one document or, without a document, for every
//! document of the API account.

use crate::client::Client;
use crate::document::Document;
use crate::error::ApiError;
use crate::fields::Fields;
use crate::resource::Resource;
use crate::types::Value;
use crate::xml::Element;

pub fn grant_access(
    client: &Client,
    user_identifier: &str,
    doc_id: Option<&Value>,
) -> Result<(), ApiError> {
    set_access(client, user_identifier, true, doc_id)
}

pub fn revoke_access(
    client: &Client,
    user_identifier: &str,
    doc_id: Option<&Value>,
) -> Result<(), ApiError> {
    set_access(client, user_identifier, false, doc_id)
}

pub fn set_access(
    client: &Client,
    user_identifier: &str,
    allowed: bool,
    doc_id: Option<&Value>,
) -> Result<(), ApiError> {
    client.request(
        "security.setAccess",
        Fields::new()
            .with("user_identifier", user_identifier)
            .with("allowed", u32::from(allowed))
            .with("doc_id", doc_id),
    )?;
    Ok(())
}

/// User identifiers that may view the document.
pub fn document_access_list(client: &Client, doc_id: &Value) -> Result<Vec<String>, ApiError> {
    let response = client.request(
        "security.getDocumentAccessList",
        Fields::new().with("doc_id", doc_id),
    )?;
    Ok(response
        .all("/rsp/resultset/result/user_identifier")
        .into_iter()
        .map(Element::content)
        .collect())
}

/// Documents the user identifier may view.
pub fn user_access_list(client: &Client, user_identifier: &str) -> Result<Vec<Document>, ApiError> {
    let response = client.request(
        "security.getUserAccessList",
        Fields::new().with("user_identifier", user_identifier),
    )?;
    Ok(response
        .all("/rsp/resultset/result")
        .into_iter()
        .map(|xml| Document::hydrate(xml, None))
        .collect())
}
