//! Dynamically-attributed resource model.
//!
//! # Design
//! The set of attributes a resource carries is defined by the service and
//! discovered from responses, so a `Record` is a map from attribute name to
//! a typed `Value` with permissive reads and writes. Concrete resource types
//! wrap a `Record`, implement `Resource`, and add named accessors and remote
//! operations on top.
//!
//! Lifecycle is a two-state enum: a record is either `Fresh` (not saved, not
//! created) or `Persisted` (saved and created). Mixed combinations cannot be
//! represented.

use std::collections::BTreeMap;
use std::fmt;

use crate::client::Client;
use crate::error::ApiError;
use crate::fields::Fields;
use crate::types::{parse_float, parse_integer, Value};
use crate::xml::{Document, Element};

/// Attribute name to value mapping.
pub type Attributes = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Built in memory, no remote counterpart yet.
    Fresh,
    /// Matches a remote counterpart.
    Persisted,
}

/// Attribute storage plus lifecycle state shared by every resource type.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    attributes: Attributes,
    lifecycle: Lifecycle,
}

impl Record {
    /// Stores `attributes` verbatim; the record starts `Fresh`.
    pub fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            lifecycle: Lifecycle::Fresh,
        }
    }

    /// Hydrates from the child elements of `xml`; the record starts `Persisted`.
    pub fn from_xml(xml: &Element) -> Self {
        let mut record = Self::new(Attributes::new());
        record.load(xml);
        record.lifecycle = Lifecycle::Persisted;
        record
    }

    /// Writes one typed attribute per child element of `xml`, keyed by tag name.
    pub fn load(&mut self, xml: &Element) {
        for node in xml.elements() {
            self.attributes.insert(node.name.clone(), typed_value(node));
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// Always succeeds locally; names the service does not know are ignored
    /// by it on the next save.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.attributes.remove(name)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn saved(&self) -> bool {
        self.lifecycle == Lifecycle::Persisted
    }

    pub fn created(&self) -> bool {
        self.lifecycle == Lifecycle::Persisted
    }

    /// Transition after a successful save. There is no way back.
    pub fn mark_persisted(&mut self) {
        self.lifecycle = Lifecycle::Persisted;
    }

    /// Attributes as request fields.
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        for (name, value) in &self.attributes {
            fields.insert(name, value);
        }
        fields
    }
}

/// Infers a typed value from a node's `type` marker.
pub fn typed_value(node: &Element) -> Value {
    let text = node.content();
    match node.attr("type") {
        Some("integer") => Value::Integer(parse_integer(&text)),
        Some("float") => Value::Float(parse_float(&text)),
        Some("symbol") => Value::Symbol(text),
        _ => Value::Text(text),
    }
}

/// True for names usable as attribute keys: an ASCII letter or underscore
/// followed by letters, digits or underscores.
pub fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_name(name: &str) -> Result<(), ApiError> {
    if is_attribute_name(name) {
        Ok(())
    } else {
        Err(ApiError::InvalidArgument(format!("{name:?} is not a valid attribute name")))
    }
}

/// A local proxy for a remote entity.
pub trait Resource: Sized {
    /// Options shared by every instance hydrated from one response, such as
    /// a common owner.
    type Context: Clone + Default;

    const KIND: &'static str;

    /// Builds a persisted instance from a response fragment.
    fn hydrate(xml: &Element, context: Self::Context) -> Self;

    fn record(&self) -> &Record;

    fn record_mut(&mut self) -> &mut Record;

    fn get(&self, name: &str) -> Option<&Value> {
        self.record().get(name)
    }

    fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.record_mut().set(name, value);
    }

    fn saved(&self) -> bool {
        self.record().saved()
    }

    fn created(&self) -> bool {
        self.record().created()
    }

    /// Reads several attributes at once. Fails before reading anything if a
    /// name is not a valid attribute key.
    fn read_attributes(&self, names: &[&str]) -> Result<Vec<Option<&Value>>, ApiError> {
        for name in names {
            check_name(name)?;
        }
        Ok(names.iter().map(|name| self.get(name)).collect())
    }

    /// Writes several attributes at once. Fails before writing anything if a
    /// name is not a valid attribute key.
    fn write_attributes<I, K, V>(&mut self, values: I) -> Result<(), ApiError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let values: Vec<(K, V)> = values.into_iter().collect();
        for (name, _) in &values {
            check_name(name.as_ref())?;
        }
        for (name, value) in values {
            self.set(name.as_ref(), value);
        }
        Ok(())
    }

    fn save(&mut self, _client: &Client) -> Result<(), ApiError> {
        Err(ApiError::NotImplemented {
            kind: Self::KIND,
            operation: "save",
        })
    }

    /// Returns whether the remote side confirmed the deletion.
    fn destroy(&mut self, _client: &Client) -> Result<bool, ApiError> {
        Err(ApiError::NotImplemented {
            kind: Self::KIND,
            operation: "destroy",
        })
    }

    fn find(_client: &Client, _query: Fields) -> Result<Vec<Self>, ApiError> {
        Err(ApiError::NotImplemented {
            kind: Self::KIND,
            operation: "find",
        })
    }

    /// Saves `self` and hands it back. On failure the instance travels with
    /// the error, still `Fresh` and with any pending upload intact.
    fn create(mut self, client: &Client) -> Result<Self, CreateError<Self>> {
        match self.save(client) {
            Ok(()) => Ok(self),
            Err(error) => Err(CreateError {
                resource: self,
                error,
            }),
        }
    }
}

/// A failed [`Resource::create`].
#[derive(Debug)]
pub struct CreateError<R> {
    pub resource: R,
    pub error: ApiError,
}

impl<R> fmt::Display for CreateError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<R: fmt::Debug> std::error::Error for CreateError<R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

impl<R> From<CreateError<R>> for ApiError {
    fn from(err: CreateError<R>) -> Self {
        err.error
    }
}

/// Result containers used by list responses, in the order they are tried.
pub const RESULT_SETS: [&str; 2] = ["/rsp/result_set/result", "/rsp/resultset/result"];

/// Builds one resource per result element of a list response, each seeded
/// with `context`.
pub fn build_collection<R: Resource>(response: &Document, context: R::Context) -> Vec<R> {
    let results = RESULT_SETS
        .iter()
        .map(|path| response.all(path))
        .find(|results| !results.is_empty())
        .unwrap_or_default();
    results
        .into_iter()
        .map(|xml| R::hydrate(xml, context.clone()))
        .collect()
}
