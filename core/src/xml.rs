//! Owned XML tree for response bodies.
//!
//! # Design
//! Responses are small, so the whole body is read into a tree with
//! `quick_xml`'s event reader and navigated with slash paths. Only elements,
//! text and CDATA are kept; comments, processing instructions and the
//! declaration are dropped.

use std::fmt;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, thiserror::Error)]
#[error("invalid XML: {0}")]
pub struct XmlError(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
    CData(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Child elements in document order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            _ => None,
        })
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements().filter(move |el| el.name == name)
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.elements().find(|el| el.name == name)
    }

    /// First element at a relative slash path, e.g. `"subcategories/subcategory"`.
    pub fn at(&self, path: &str) -> Option<&Element> {
        self.all(path).into_iter().next()
    }

    /// Every element at a relative slash path.
    pub fn all(&self, path: &str) -> Vec<&Element> {
        let mut current = vec![self];
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = current
                .into_iter()
                .flat_map(|el| el.elements().filter(move |c| c.name == segment))
                .collect();
        }
        current
    }

    /// Direct text children, concatenated as-is.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Direct CDATA children, concatenated as-is.
    pub fn cdata(&self) -> String {
        self.children
            .iter()
            .filter_map(|node| match node {
                Node::CData(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Trimmed direct text, or the CDATA content when the text is blank.
    pub fn content(&self) -> String {
        let text = self.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            self.cdata()
        } else {
            trimmed.to_string()
        }
    }

    /// A copy without the child elements named `name`.
    pub fn without(&self, name: &str) -> Element {
        Element {
            name: self.name.clone(),
            attributes: self.attributes.clone(),
            children: self
                .children
                .iter()
                .filter(|node| !matches!(node, Node::Element(el) if el.name == name))
                .cloned()
                .collect(),
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attributes {
            write!(f, " {k}=\"{}\"", escape(v))?;
        }
        if self.children.is_empty() {
            return write!(f, "/>");
        }
        write!(f, ">")?;
        for node in &self.children {
            match node {
                Node::Element(el) => write!(f, "{el}")?,
                Node::Text(t) => write!(f, "{}", escape(t))?,
                Node::CData(t) => write!(f, "<![CDATA[{t}]]>")?,
            }
        }
        write!(f, "</{}>", self.name)
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A parsed response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    root: Option<Element>,
}

impl Document {
    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut reader = Reader::from_str(xml);
        let mut stack: Vec<Element> = Vec::new();
        let mut root = None;

        loop {
            let event = reader
                .read_event()
                .map_err(|e| XmlError(format!("at position {}: {e}", reader.buffer_position())))?;
            match event {
                Event::Start(start) => stack.push(open(&start)?),
                Event::Empty(start) => {
                    let el = open(&start)?;
                    attach(&mut stack, &mut root, el);
                }
                Event::End(_) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| XmlError("unbalanced closing tag".to_string()))?;
                    attach(&mut stack, &mut root, el);
                }
                Event::Text(text) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = text.unescape().map_err(|e| XmlError(e.to_string()))?;
                        parent.children.push(Node::Text(text.into_owned()));
                    }
                }
                Event::CData(data) => {
                    if let Some(parent) = stack.last_mut() {
                        let data = String::from_utf8_lossy(&data.into_inner()).into_owned();
                        parent.children.push(Node::CData(data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(XmlError(format!("unclosed element <{}>", open.name)));
        }
        Ok(Self { root })
    }

    /// A document holding `root`.
    pub fn from_root(root: Element) -> Self {
        Self { root: Some(root) }
    }

    pub fn root(&self) -> Option<&Element> {
        self.root.as_ref()
    }

    /// First element at an absolute path such as `/rsp/error`.
    pub fn at(&self, path: &str) -> Option<&Element> {
        self.all(path).into_iter().next()
    }

    /// Every element at an absolute path such as `/rsp/result_set/result`.
    pub fn all(&self, path: &str) -> Vec<&Element> {
        let path = path.trim_start_matches('/');
        let (first, rest) = path.split_once('/').unwrap_or((path, ""));
        match &self.root {
            Some(root) if root.name == first => root.all(rest),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.root {
            Some(root) => write!(f, "{root}"),
            None => Ok(()),
        }
    }
}

fn open(start: &BytesStart<'_>) -> Result<Element, XmlError> {
    let mut el = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError(e.to_string()))?
            .into_owned();
        el.attributes.push((key, value));
    }
    Ok(el)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, el: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None => {
            // anything after the first top-level element is ignored
            if root.is_none() {
                *root = Some(el);
            }
        }
    }
}
