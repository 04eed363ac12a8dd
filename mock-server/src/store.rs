use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::{codes, escape, Fail, Form, Reply};

/// Settings a document accepts through upload and `docs.changeSettings`.
const SETTINGS: &[&str] = &[
    "title",
    "description",
    "access",
    "license",
    "tags",
    "show_ads",
    "link_back_url",
    "category_id",
    "author",
    "publisher",
];

const CATEGORIES: &[(i64, &str, &[(i64, &str)])] = &[
    (1, "Art", &[(11, "Painting"), (12, "Sculpture")]),
    (2, "Law", &[(21, "Tax")]),
    (3, "Science", &[]),
];

const HOST: &str = "http://mock.scribd.local";

struct UserRow {
    id: i64,
    username: String,
    password: String,
    name: String,
    email: String,
    session_key: String,
}

struct DocRow {
    id: i64,
    owner: Option<i64>,
    my_user_id: Option<String>,
    access_key: String,
    doc_type: String,
    revisions: u32,
    reads: i64,
    thumbnail: Option<String>,
    settings: BTreeMap<String, String>,
}

struct CollectionRow {
    id: i64,
    name: String,
    owner: i64,
    docs: BTreeSet<i64>,
}

#[derive(Default)]
pub(crate) struct Store {
    users: Vec<UserRow>,
    docs: BTreeMap<i64, DocRow>,
    collections: Vec<CollectionRow>,
    grants: BTreeSet<(String, Option<i64>)>,
}

fn not_found(what: &str) -> Fail {
    Fail::new(codes::NOT_FOUND, format!("{what} not found"))
}

fn element(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "<{name}>{}</{name}>", escape(value));
}

fn integer(out: &mut String, name: &str, value: i64) {
    let _ = write!(out, "<{name} type=\"integer\">{value}</{name}>");
}

fn cdata(out: &mut String, name: &str, value: &str) {
    let _ = write!(out, "<{name}><![CDATA[{value}]]></{name}>");
}

fn results(container: &str, rows: impl IntoIterator<Item = String>) -> String {
    let mut out = format!("<{container}>");
    for row in rows {
        let _ = write!(out, "<result>{row}</result>");
    }
    let _ = write!(out, "</{container}>");
    out
}

impl UserRow {
    fn xml(&self) -> String {
        let mut out = String::new();
        integer(&mut out, "user_id", self.id);
        element(&mut out, "username", &self.username);
        element(&mut out, "name", &self.name);
        element(&mut out, "email", &self.email);
        element(&mut out, "session_key", &self.session_key);
        out
    }
}

impl DocRow {
    fn xml(&self) -> String {
        let mut out = String::new();
        integer(&mut out, "doc_id", self.id);
        element(&mut out, "access_key", &self.access_key);
        element(&mut out, "doc_type", &self.doc_type);
        let _ = write!(out, "<conversion_status type=\"symbol\">DONE</conversion_status>");
        for (name, value) in &self.settings {
            element(&mut out, name, value);
        }
        if let Some(thumbnail) = &self.thumbnail {
            element(&mut out, "thumbnail_file", thumbnail);
        }
        out
    }

    fn is_private(&self) -> bool {
        self.settings.get("access").is_some_and(|a| a == "private")
    }
}

impl Store {
    pub(crate) fn dispatch(&mut self, method: &str, form: &Form) -> Reply {
        match method {
            "user.signup" => self.signup(form),
            "user.login" => self.login(form),
            "user.getAutoSignInUrl" => self.auto_sign_in_url(form),
            "docs.upload" => {
                let file = form
                    .file("file")
                    .ok_or_else(|| Fail::new(codes::MISSING_PARAMETER, "Missing parameter: file"))?;
                self.upload(form, &file.filename)
            }
            "docs.uploadFromUrl" => {
                let url = form.require("url")?.to_string();
                self.upload(form, &url)
            }
            "docs.uploadThumb" => self.upload_thumb(form),
            "docs.changeSettings" => self.change_settings(form),
            "docs.getSettings" => self.get_settings(form),
            "docs.getList" => self.list(form),
            "docs.search" => self.search(form),
            "docs.featured" => Ok(self.public_docs(|_| true)),
            "docs.browse" => self.browse(form),
            "docs.getConversionStatus" => {
                self.doc(form.integer("doc_id")?)?;
                Ok("<conversion_status>DONE</conversion_status>".to_string())
            }
            "docs.getStats" => {
                let doc = self.doc(form.integer("doc_id")?)?;
                Ok(format!("<reads>{}</reads>", doc.reads))
            }
            "docs.getDownloadUrl" => self.download_url(form),
            "docs.delete" => self.delete(form),
            "thumbnail.get" => self.thumbnail_url(form),
            "docs.getCategories" => self.categories(form),
            "docs.getCollections" => self.collections(form),
            "docs.addToCollection" => self.collection_membership(form, true),
            "docs.removeFromCollection" => self.collection_membership(form, false),
            "security.setAccess" => self.set_access(form),
            "security.getDocumentAccessList" => self.document_access_list(form),
            "security.getUserAccessList" => self.user_access_list(form),
            other => Err(Fail::new(codes::UNKNOWN_METHOD, format!("Unknown method: {other}"))),
        }
    }

    fn session_user(&self, form: &Form) -> Option<&UserRow> {
        let key = form.text("session_key")?;
        self.users.iter().find(|u| u.session_key == key)
    }

    fn require_session(&self, form: &Form) -> Result<i64, Fail> {
        self.session_user(form)
            .map(|u| u.id)
            .ok_or_else(|| Fail::new(codes::PERMISSION_DENIED, "A valid session_key is required"))
    }

    fn doc(&self, id: i64) -> Result<&DocRow, Fail> {
        self.docs.get(&id).ok_or_else(|| not_found("Document"))
    }

    /// Checks that the request may modify document `id`.
    fn writable(&self, form: &Form, id: i64) -> Result<(), Fail> {
        let doc = self.doc(id)?;
        match doc.owner {
            Some(owner) if self.session_user(form).map(|u| u.id) != Some(owner) => Err(Fail::new(
                codes::PERMISSION_DENIED,
                "You do not have permission to modify this document",
            )),
            _ => Ok(()),
        }
    }

    fn signup(&mut self, form: &Form) -> Reply {
        let username = form.require("username")?;
        let password = form.require("password")?;
        if self.users.iter().any(|u| u.username == username) {
            return Err(Fail::new(codes::USERNAME_TAKEN, "Username already taken"));
        }
        let id = self.users.len() as i64 + 1;
        self.users.push(UserRow {
            id,
            username: username.to_string(),
            password: password.to_string(),
            name: form.text("name").unwrap_or(username).to_string(),
            email: form.text("email").unwrap_or_default().to_string(),
            session_key: format!("session-{id}"),
        });
        self.collections.push(CollectionRow {
            id: 100 + id,
            name: "Favorites".to_string(),
            owner: id,
            docs: BTreeSet::new(),
        });
        Ok(self.users.last().map(UserRow::xml).unwrap_or_default())
    }

    fn login(&mut self, form: &Form) -> Reply {
        let username = form.require("username")?;
        let password = form.require("password")?;
        self.users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .map(UserRow::xml)
            .ok_or_else(|| Fail::new(codes::LOGIN_FAILED, "Invalid username or password"))
    }

    fn auto_sign_in_url(&self, form: &Form) -> Reply {
        let user = self.require_session(form)?;
        let next_url = form.text("next_url").unwrap_or_default();
        let mut out = String::new();
        cdata(&mut out, "url", &format!("{HOST}/login/{user}?next_url={next_url}"));
        Ok(out)
    }

    fn upload(&mut self, form: &Form, source: &str) -> Reply {
        if form.text("rev_id").is_some() {
            let id = form.integer("rev_id")?;
            self.writable(form, id)?;
            if let Some(doc) = self.docs.get_mut(&id) {
                doc.revisions += 1;
                if let Some(doc_type) = form.text("doc_type") {
                    doc.doc_type = doc_type.to_string();
                }
            }
            return self.upload_reply(id);
        }

        let id = self.docs.keys().next_back().copied().unwrap_or(0) + 1;
        let owner = self.session_user(form).map(|u| u.id);
        let extension = source.rsplit_once('.').map(|(_, ext)| ext.to_lowercase());
        let mut settings: BTreeMap<String, String> = SETTINGS
            .iter()
            .filter_map(|name| form.text(name).map(|v| (name.to_string(), v.to_string())))
            .collect();
        settings.entry("access".to_string()).or_insert_with(|| "public".to_string());
        settings.entry("title".to_string()).or_insert_with(|| {
            let name = source.rsplit('/').next().unwrap_or(source);
            name.split('.').next().unwrap_or(name).to_string()
        });
        self.docs.insert(
            id,
            DocRow {
                id,
                owner,
                my_user_id: form.text("my_user_id").map(str::to_string),
                access_key: format!("key-{id}"),
                doc_type: form
                    .text("doc_type")
                    .map(str::to_string)
                    .or(extension)
                    .unwrap_or_else(|| "pdf".to_string()),
                revisions: 1,
                reads: 0,
                thumbnail: None,
                settings,
            },
        );
        self.upload_reply(id)
    }

    fn upload_reply(&self, id: i64) -> Reply {
        let doc = self.doc(id)?;
        let mut out = String::new();
        integer(&mut out, "doc_id", doc.id);
        element(&mut out, "access_key", &doc.access_key);
        if doc.is_private() {
            element(&mut out, "secret_password", &format!("secret-{id}"));
        }
        Ok(out)
    }

    fn upload_thumb(&mut self, form: &Form) -> Reply {
        let id = form.integer("doc_id")?;
        let file = form
            .file("file")
            .ok_or_else(|| Fail::new(codes::MISSING_PARAMETER, "Missing parameter: file"))?;
        self.writable(form, id)?;
        if let Some(doc) = self.docs.get_mut(&id) {
            doc.thumbnail = Some(file.filename.clone());
        }
        Ok(String::new())
    }

    fn change_settings(&mut self, form: &Form) -> Reply {
        let ids = form
            .require("doc_ids")?
            .split(',')
            .map(|id| id.trim().parse::<i64>().map_err(|_| not_found("Document")))
            .collect::<Result<Vec<_>, _>>()?;
        for &id in &ids {
            self.writable(form, id)?;
        }
        for id in ids {
            if let Some(doc) = self.docs.get_mut(&id) {
                for name in SETTINGS {
                    if let Some(value) = form.text(name) {
                        doc.settings.insert(name.to_string(), value.to_string());
                    }
                }
            }
        }
        Ok(String::new())
    }

    fn get_settings(&mut self, form: &Form) -> Reply {
        let id = form.integer("doc_id")?;
        let doc = self.docs.get_mut(&id).ok_or_else(|| not_found("Document"))?;
        doc.reads += 1;
        Ok(doc.xml())
    }

    /// Documents of the session user, or of the `my_user_id` external user.
    fn list(&self, form: &Form) -> Reply {
        let docs: Vec<String> = match form.text("my_user_id") {
            Some(external) if form.text("session_key").is_none() => self
                .docs
                .values()
                .filter(|d| d.my_user_id.as_deref() == Some(external))
                .map(DocRow::xml)
                .collect(),
            _ => {
                let owner = self.require_session(form)?;
                self.docs
                    .values()
                    .filter(|d| d.owner == Some(owner))
                    .map(DocRow::xml)
                    .collect()
            }
        };
        Ok(results("resultset", docs))
    }

    fn public_docs(&self, filter: impl Fn(&DocRow) -> bool) -> String {
        results(
            "result_set",
            self.docs
                .values()
                .filter(|d| !d.is_private() && filter(d))
                .map(DocRow::xml),
        )
    }

    fn search(&self, form: &Form) -> Reply {
        let query = form.require("query")?.to_lowercase();
        let start = form.text("num_start").and_then(|v| v.parse().ok()).unwrap_or(0);
        let count = form.text("num_results").and_then(|v| v.parse().ok()).unwrap_or(10);
        let scope_owner = match form.text("scope") {
            Some("user") => Some(self.require_session(form)?),
            _ => None,
        };
        let matches = self
            .docs
            .values()
            .filter(|d| match scope_owner {
                Some(owner) => d.owner == Some(owner),
                None => !d.is_private(),
            })
            .filter(|d| {
                d.settings
                    .get("title")
                    .is_some_and(|t| t.to_lowercase().contains(&query))
            })
            .skip(start)
            .take(count)
            .map(DocRow::xml);
        Ok(results("result_set", matches))
    }

    fn browse(&self, form: &Form) -> Reply {
        let category = form.require("category_id")?.to_string();
        Ok(self.public_docs(|d| d.settings.get("category_id") == Some(&category)))
    }

    fn download_url(&self, form: &Form) -> Reply {
        let doc = self.doc(form.integer("doc_id")?)?;
        let format = form.text("doc_type").unwrap_or("original");
        let format = if format == "original" { doc.doc_type.as_str() } else { format };
        let mut out = String::new();
        cdata(
            &mut out,
            "download_link",
            &format!("{HOST}/download/{}/r{}.{format}", doc.id, doc.revisions),
        );
        Ok(out)
    }

    fn thumbnail_url(&self, form: &Form) -> Reply {
        let doc = self.doc(form.integer("doc_id")?)?;
        let mut url = format!("{HOST}/thumbnails/{}", doc.id);
        for name in ["width", "height", "page"] {
            if let Some(value) = form.text(name) {
                let _ = write!(url, "/{name}-{value}");
            }
        }
        let mut out = String::new();
        element(&mut out, "thumbnail_url", &url);
        Ok(out)
    }

    fn delete(&mut self, form: &Form) -> Reply {
        let id = form.integer("doc_id")?;
        self.writable(form, id)?;
        self.docs.remove(&id);
        for collection in &mut self.collections {
            collection.docs.remove(&id);
        }
        self.grants.retain(|(_, doc)| *doc != Some(id));
        Ok(String::new())
    }

    fn categories(&self, form: &Form) -> Reply {
        let category = |id: i64, name: &str| {
            let mut out = String::new();
            element(&mut out, "id", &id.to_string());
            element(&mut out, "name", name);
            out
        };
        if form.text("category_id").is_some() {
            let parent = form.integer("category_id")?;
            let (_, _, children) = CATEGORIES
                .iter()
                .find(|(id, _, _)| *id == parent)
                .ok_or_else(|| not_found("Category"))?;
            return Ok(results(
                "result_set",
                children.iter().map(|(id, name)| category(*id, *name)),
            ));
        }
        let nested = matches!(form.text("with_subcategories"), Some("true") | Some("1"));
        Ok(results(
            "result_set",
            CATEGORIES.iter().map(|(id, name, children)| {
                let mut out = category(*id, *name);
                if nested {
                    out.push_str("<subcategories>");
                    for (child, child_name) in children.iter() {
                        let _ = write!(
                            out,
                            "<subcategory>{}</subcategory>",
                            category(*child, *child_name)
                        );
                    }
                    out.push_str("</subcategories>");
                }
                out
            }),
        ))
    }

    fn collections(&self, form: &Form) -> Reply {
        let owner = self.require_session(form)?;
        Ok(results(
            "resultset",
            self.collections.iter().filter(|c| c.owner == owner).map(|c| {
                let mut out = String::new();
                integer(&mut out, "collection_id", c.id);
                element(&mut out, "collection_name", &c.name);
                integer(&mut out, "doc_count", c.docs.len() as i64);
                out
            }),
        ))
    }

    fn collection_membership(&mut self, form: &Form, add: bool) -> Reply {
        let collection_id = form.integer("collection_id")?;
        let doc_id = form.integer("doc_id")?;
        let owner = self.require_session(form)?;
        self.doc(doc_id)?;
        let collection = self
            .collections
            .iter_mut()
            .find(|c| c.id == collection_id)
            .ok_or_else(|| not_found("Collection"))?;
        if collection.owner != owner {
            return Err(Fail::new(codes::PERMISSION_DENIED, "Not your collection"));
        }
        match add {
            true if !collection.docs.insert(doc_id) => {
                Err(Fail::new(codes::DOCUMENT_EXISTS, "Document already in collection"))
            }
            false if !collection.docs.remove(&doc_id) => {
                Err(Fail::new(codes::DOCUMENT_MISSING, "Document not in collection"))
            }
            _ => Ok(String::new()),
        }
    }

    fn set_access(&mut self, form: &Form) -> Reply {
        let identifier = form.require("user_identifier")?.to_string();
        let allowed = form.require("allowed")? == "1";
        let doc = match form.text("doc_id") {
            Some(_) => Some(self.doc(form.integer("doc_id")?)?.id),
            None => None,
        };
        if allowed {
            self.grants.insert((identifier, doc));
        } else {
            self.grants.remove(&(identifier, doc));
        }
        Ok(String::new())
    }

    fn document_access_list(&self, form: &Form) -> Reply {
        let id = self.doc(form.integer("doc_id")?)?.id;
        Ok(results(
            "resultset",
            self.grants.iter().filter(|(_, doc)| *doc == Some(id)).map(|(who, _)| {
                let mut out = String::new();
                element(&mut out, "user_identifier", who);
                out
            }),
        ))
    }

    fn user_access_list(&self, form: &Form) -> Reply {
        let identifier = form.require("user_identifier")?;
        let global = self.grants.contains(&(identifier.to_string(), None));
        Ok(results(
            "resultset",
            self.docs
                .values()
                .filter(|d| d.is_private())
                .filter(|d| global || self.grants.contains(&(identifier.to_string(), Some(d.id))))
                .map(DocRow::xml),
        ))
    }
}
