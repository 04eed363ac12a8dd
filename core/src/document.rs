//! Hosted documents.
//!
//! A `Document` is created locally with attributes plus an upload source and
//! becomes persisted by `save`, which is a sequence of independent remote
//! calls: upload, optional thumbnail upload, settings update. There is no
//! rollback between them; a failure part-way leaves the remote document
//! partially updated and the local one still unsaved.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use crate::client::Client;
use crate::error::ApiError;
use crate::fields::Fields;
use crate::resource::{build_collection, Attributes, Record, Resource};
use crate::security;
use crate::types::{Upload, Value};
use crate::user::User;
use crate::xml::Element;

#[derive(Debug, Clone)]
pub struct Document {
    record: Record,
    file: Option<Upload>,
    thumbnail: Option<Upload>,
    owner: Option<Arc<User>>,
    download_urls: HashMap<String, String>,
    reads: Option<String>,
}

/// Requested thumbnail dimensions. Give `width` and `height` together, or
/// `size`, or nothing for the service default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size: Option<(u32, u32)>,
    pub page: Option<u32>,
}

impl ThumbnailOptions {
    fn dimensions(&self) -> Result<(Option<u32>, Option<u32>), ApiError> {
        match (self.width, self.height, self.size) {
            (Some(_), _, Some(_)) | (_, Some(_), Some(_)) => Err(ApiError::InvalidArgument(
                "Cannot specify both width/height and size".to_string(),
            )),
            (Some(w), Some(h), None) => Ok((Some(w), Some(h))),
            (None, None, Some((w, h))) => Ok((Some(w), Some(h))),
            (None, None, None) => Ok((None, None)),
            _ => Err(ApiError::InvalidArgument(
                "Must specify both width and height, or neither".to_string(),
            )),
        }
    }
}

impl Document {
    /// A new, unsaved document.
    pub fn new(attributes: Attributes) -> Self {
        Self {
            record: Record::new(attributes),
            file: None,
            thumbnail: None,
            owner: None,
            download_urls: HashMap::new(),
            reads: None,
        }
    }

    pub fn with_file(mut self, file: Upload) -> Self {
        self.file = Some(file);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: Upload) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }

    pub fn with_owner(mut self, owner: Arc<User>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Content to upload on the next save. On a created document this
    /// replaces the content and needs an owner with a session.
    pub fn set_file(&mut self, file: Upload) {
        self.file = Some(file);
    }

    pub fn set_thumbnail(&mut self, thumbnail: Upload) {
        self.thumbnail = Some(thumbnail);
    }

    pub fn set_owner(&mut self, owner: Option<Arc<User>>) {
        self.owner = owner;
    }

    pub fn file(&self) -> Option<&Upload> {
        self.file.as_ref()
    }

    pub fn thumbnail(&self) -> Option<&Upload> {
        self.thumbnail.as_ref()
    }

    /// The user allowed to modify this document, if known.
    pub fn owner(&self) -> Option<&Arc<User>> {
        self.owner.as_ref()
    }

    pub fn id(&self) -> Option<&Value> {
        self.get("doc_id")
    }

    fn require_id(&self) -> Result<Value, ApiError> {
        self.id()
            .cloned()
            .ok_or_else(|| ApiError::InvalidArgument("document has no doc_id".to_string()))
    }

    fn owner_session(&self) -> Option<String> {
        self.owner.as_ref().and_then(|owner| owner.session_key())
    }

    /// Loads a single document by id.
    pub fn find_by_id(client: &Client, doc_id: i64) -> Result<Document, ApiError> {
        let mut found = Self::find(client, Fields::new().with("doc_id", doc_id))?;
        found
            .pop()
            .ok_or_else(|| ApiError::MalformedResponse("settings response without rsp".to_string()))
    }

    /// Full-text search. `limit` and `offset` in `options` page the results.
    pub fn search(
        client: &Client,
        query: &str,
        options: Fields,
    ) -> Result<Vec<Document>, ApiError> {
        Self::find(client, options.with("query", query))
    }

    pub fn featured(client: &Client, options: Fields) -> Result<Vec<Document>, ApiError> {
        let response = client.request("docs.featured", options)?;
        Ok(build_collection(&response, None))
    }

    pub fn browse(client: &Client, options: Fields) -> Result<Vec<Document>, ApiError> {
        let response = client.request("docs.browse", options)?;
        Ok(build_collection(&response, None))
    }

    /// Applies `settings` to every document in `docs`, one call per owner.
    pub fn update_all(
        client: &Client,
        docs: &[Document],
        settings: Fields,
    ) -> Result<(), ApiError> {
        if docs.iter().any(|doc| doc.owner.is_none()) {
            return Err(ApiError::InvalidArgument(
                "You can't modify one or more documents".to_string(),
            ));
        }

        let mut by_owner: BTreeMap<Option<String>, Vec<String>> = BTreeMap::new();
        for doc in docs {
            by_owner
                .entry(doc.owner_session())
                .or_default()
                .push(doc.require_id()?.to_string());
        }

        for (session_key, ids) in by_owner {
            let fields = settings
                .clone()
                .with("doc_ids", ids.join(","))
                .with("session_key", session_key);
            client.request("docs.changeSettings", fields)?;
        }
        Ok(())
    }

    /// Thumbnail URL for the document with `doc_id`.
    pub fn thumbnail_url_for(
        client: &Client,
        doc_id: &Value,
        options: ThumbnailOptions,
    ) -> Result<String, ApiError> {
        let (width, height) = options.dimensions()?;
        let response = client.request(
            "thumbnail.get",
            Fields::new()
                .with("doc_id", doc_id)
                .with("width", width)
                .with("height", height)
                .with("page", options.page),
        )?;
        Ok(response
            .at("/rsp/thumbnail_url")
            .map(Element::content)
            .unwrap_or_default())
    }

    pub fn thumbnail_url(
        &self,
        client: &Client,
        options: ThumbnailOptions,
    ) -> Result<String, ApiError> {
        Self::thumbnail_url_for(client, &self.require_id()?, options)
    }

    pub fn conversion_status(&self, client: &Client) -> Result<String, ApiError> {
        let response = client.request(
            "docs.getConversionStatus",
            Fields::new().with("doc_id", self.require_id()?),
        )?;
        Ok(response
            .at("/rsp/conversion_status")
            .map(Element::content)
            .unwrap_or_default())
    }

    /// Read count, fetched once and memoized unless `force` is set.
    pub fn reads(&mut self, client: &Client, force: bool) -> Result<String, ApiError> {
        if let (Some(reads), false) = (&self.reads, force) {
            return Ok(reads.clone());
        }
        let response = client.request(
            "docs.getStats",
            Fields::new().with("doc_id", self.require_id()?),
        )?;
        let reads = response.at("/rsp/reads").map(Element::content).unwrap_or_default();
        self.reads = Some(reads.clone());
        Ok(reads)
    }

    /// Download link for `format` (`"original"`, `"pdf"`, `"txt"`, ...),
    /// memoized per format unless `force` is set.
    pub fn download_url(
        &mut self,
        client: &Client,
        format: &str,
        force: bool,
    ) -> Result<String, ApiError> {
        if !force {
            if let Some(url) = self.download_urls.get(format) {
                return Ok(url.clone());
            }
        }
        let response = client.request(
            "docs.getDownloadUrl",
            Fields::new()
                .with("doc_id", self.require_id()?)
                .with("doc_type", format),
        )?;
        let url = response
            .at("/rsp/download_link")
            .map(Element::content)
            .unwrap_or_default();
        self.download_urls.insert(format.to_string(), url.clone());
        Ok(url)
    }

    pub fn grant_access(&self, client: &Client, user_identifier: &str) -> Result<(), ApiError> {
        security::grant_access(client, user_identifier, Some(&self.require_id()?))
    }

    pub fn revoke_access(&self, client: &Client, user_identifier: &str) -> Result<(), ApiError> {
        security::revoke_access(client, user_identifier, Some(&self.require_id()?))
    }

    /// User identifiers allowed to view this document.
    pub fn access_list(&self, client: &Client) -> Result<Vec<String>, ApiError> {
        security::document_access_list(client, &self.require_id()?)
    }

    fn upload_file(&mut self, client: &Client) -> Result<(), ApiError> {
        let Some(file) = &self.file else {
            return Ok(());
        };

        let mut fields = self.record.to_fields();
        if let Some(session_key) = self.owner_session() {
            fields.insert("session_key", session_key);
        }
        if let Some(doc_type) = fields.remove("type") {
            let doc_type = doc_type.as_text().map(str::to_lowercase);
            fields.insert("doc_type", doc_type);
        }
        fields.rename("doc_id", "rev_id");

        let response = match file {
            Upload::Url(url) => {
                client.request("docs.uploadFromUrl", fields.with("url", url.as_str()))?
            }
            local => {
                let part = local.read()?.ok_or_else(|| {
                    ApiError::InvalidArgument("file has no local content".to_string())
                })?;
                client.request("docs.upload", fields.with("file", part))?
            }
        };
        if let Some(rsp) = response.at("/rsp") {
            self.record.load(rsp);
        }
        debug!(doc_id = ?self.id(), "document uploaded");
        Ok(())
    }

    fn upload_thumbnail(&self, client: &Client) -> Result<(), ApiError> {
        let Some(thumbnail) = &self.thumbnail else {
            return Ok(());
        };
        let part = thumbnail
            .read()?
            .ok_or_else(|| {
                ApiError::InvalidArgument("thumbnail must be a local file".to_string())
            })?;
        client.request(
            "docs.uploadThumb",
            Fields::new().with("file", part).with("doc_id", self.require_id()?),
        )?;
        Ok(())
    }

    fn apply_settings(&self, client: &Client) -> Result<(), ApiError> {
        let mut fields = self.record.to_fields();
        if let Some(session_key) = self.owner_session() {
            fields.insert("session_key", session_key);
        }
        fields.insert("doc_ids", self.require_id()?);
        if self.file.is_some() {
            fields.remove("access");
        }
        fields.remove("type");
        fields.remove("conversion_status");
        client.request("docs.changeSettings", fields)?;
        Ok(())
    }
}

impl Resource for Document {
    type Context = Option<Arc<User>>;
    const KIND: &'static str = "Document";

    fn hydrate(xml: &Element, owner: Self::Context) -> Self {
        Self {
            record: Record::from_xml(xml),
            owner,
            ..Self::new(Attributes::new())
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }

    /// Uploads new content (if a file is set), then the thumbnail (if set),
    /// then pushes the attributes as settings.
    fn save(&mut self, client: &Client) -> Result<(), ApiError> {
        if !self.created() && self.file.is_none() {
            return Err(ApiError::InvalidArgument(
                "'file' must be specified for new documents".to_string(),
            ));
        }
        if self.created() && self.file.is_some() && self.owner_session().is_none() {
            return Err(ApiError::Privilege(
                "The current API user is not the owner of this document".to_string(),
            ));
        }
        if matches!(self.thumbnail, Some(Upload::Url(_))) {
            return Err(ApiError::InvalidArgument("thumbnail must be a local file".to_string()));
        }

        self.upload_file(client)?;
        self.upload_thumbnail(client)?;
        self.apply_settings(client)?;

        if self.owner.is_none() {
            self.owner = client.current_user();
        }
        self.file = None;
        self.thumbnail = None;
        self.record.mark_persisted();
        Ok(())
    }

    /// `Ok(false)` when the service refuses the deletion.
    fn destroy(&mut self, client: &Client) -> Result<bool, ApiError> {
        match client.request("docs.delete", Fields::new().with("doc_id", self.require_id()?)) {
            Ok(_) => Ok(true),
            Err(ApiError::Remote(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// With `doc_id` in `query`, loads that one document; otherwise runs a
    /// search, which needs `query`.
    fn find(client: &Client, query: Fields) -> Result<Vec<Self>, ApiError> {
        if query.has("doc_id") {
            let response = client.request("docs.getSettings", query)?;
            return Ok(response
                .at("/rsp")
                .map(|rsp| Document::hydrate(rsp, None))
                .into_iter()
                .collect());
        }
        if !query.has("query") {
            return Err(ApiError::InvalidArgument(
                "You must specify a query or document ID".to_string(),
            ));
        }
        let mut fields = query;
        fields.rename("limit", "num_results");
        fields.rename("offset", "num_start");
        let response = client.request("docs.search", fields)?;
        Ok(build_collection(&response, None))
    }
}
