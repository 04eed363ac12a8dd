//! Request fields.

use std::collections::btree_map;
use std::collections::BTreeMap;

use crate::types::{FilePart, Value};

/// A single request field value. `Null` fields are dropped before signing
/// and transmission.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    File(FilePart),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}

impl From<&String> for FieldValue {
    fn from(s: &String) -> Self {
        FieldValue::Text(s.clone())
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        FieldValue::Text(n.to_string())
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        FieldValue::Text(n.to_string())
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Text(n.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Text(b.to_string())
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<&Value> for FieldValue {
    fn from(v: &Value) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<FilePart> for FieldValue {
    fn from(part: FilePart) -> Self {
        FieldValue::File(part)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Field name to value mapping. Iteration is always sorted by name, so
/// insertion order never reaches the wire or the signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(BTreeMap<String, FieldValue>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(name.to_string(), value.into())
    }

    /// Inserts only when no non-null value is present under `name`.
    pub fn insert_default(&mut self, name: &str, value: impl Into<FieldValue>) {
        if !self.has(name) {
            self.insert(name, value);
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    /// True when `name` carries a non-null value.
    pub fn has(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.0.remove(name)
    }

    /// Renames a field, keeping its value. Missing fields are left alone.
    pub fn rename(&mut self, from: &str, to: &str) {
        if let Some(value) = self.0.remove(from) {
            self.0.insert(to.to_string(), value);
        }
    }

    /// Overwrites fields in `self` with those in `other`.
    pub fn merge(&mut self, other: Fields) {
        self.0.extend(other.0);
    }

    /// Drops null-valued fields.
    pub fn compact(&mut self) {
        self.0.retain(|_, v| !v.is_null());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, FieldValue> {
        self.0.iter()
    }

    /// Number of file-valued fields.
    pub fn file_count(&self) -> usize {
        self.0.values().filter(|v| matches!(v, FieldValue::File(_))).count()
    }

    /// Text fields as sorted `(name, value)` pairs; files and nulls excluded.
    pub fn text_pairs(&self) -> Vec<(&str, &str)> {
        self.0
            .iter()
            .filter_map(|(k, v)| v.as_text().map(|text| (k.as_str(), text)))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Fields {
    type Item = (&'a String, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, String, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
