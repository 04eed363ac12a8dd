//! Document categories.
//!
//! Categories form a tree. Listing with `include_children` returns each top
//! level category with its subcategories already attached; otherwise
//! `children` fetches them on demand. A child keeps a weak back-reference to
//! the category it was loaded under.

use std::sync::{Arc, Weak};

use crate::client::Client;
use crate::document::Document;
use crate::error::ApiError;
use crate::fields::Fields;
use crate::resource::{Record, Resource, RESULT_SETS};
use crate::types::Value;
use crate::xml::Element;

const SUBCATEGORIES: &str = "subcategories";
const SUBCATEGORY: &str = "subcategory";

#[derive(Debug, Clone)]
pub struct Category {
    record: Record,
    parent: Weak<Category>,
    children: Option<Vec<Arc<Category>>>,
}

impl Category {
    /// Every top-level category.
    pub fn all(client: &Client, include_children: bool) -> Result<Vec<Arc<Category>>, ApiError> {
        let fields = if include_children {
            Fields::new().with("with_subcategories", true)
        } else {
            Fields::new()
        };
        let response = client.request("docs.getCategories", fields)?;
        Ok(response
            .all(RESULT_SETS[0])
            .into_iter()
            .map(|xml| Self::tree(xml, Weak::new()))
            .collect())
    }

    /// Builds a category and, when the fragment lists any, its preloaded
    /// subcategories pointing back at it.
    fn tree(xml: &Element, parent: Weak<Category>) -> Arc<Category> {
        Arc::new_cyclic(|me| {
            let children = xml
                .child(SUBCATEGORIES)
                .map(|subs| {
                    subs.children_named(SUBCATEGORY)
                        .map(|child| Self::tree(child, me.clone()))
                        .collect::<Vec<_>>()
                })
                .filter(|children| !children.is_empty());
            Category {
                children,
                ..Self::hydrate(xml, parent)
            }
        })
    }

    pub fn id(&self) -> Option<&Value> {
        self.get("id")
    }

    pub fn name(&self) -> Option<&Value> {
        self.get("name")
    }

    /// The category this one was loaded under, while it is still alive.
    pub fn parent(&self) -> Option<Arc<Category>> {
        self.parent.upgrade()
    }

    pub fn children_preloaded(&self) -> bool {
        self.children.is_some()
    }

    /// Subcategories: the preloaded ones, or a fresh fetch.
    pub fn children(self: &Arc<Self>, client: &Client) -> Result<Vec<Arc<Category>>, ApiError> {
        if let Some(children) = &self.children {
            return Ok(children.clone());
        }
        let response = client.request(
            "docs.getCategories",
            Fields::new().with("category_id", self.id()),
        )?;
        Ok(response
            .all(RESULT_SETS[0])
            .into_iter()
            .map(|xml| Self::tree(xml, Arc::downgrade(self)))
            .collect())
    }

    /// Documents filed under this category.
    pub fn browse(&self, client: &Client, options: Fields) -> Result<Vec<Document>, ApiError> {
        let response = client.request("docs.browse", options.with("category_id", self.id()))?;
        Ok(response
            .at("/rsp/result_set")
            .map(|set| set.elements().map(|doc| Document::hydrate(doc, None)).collect())
            .unwrap_or_default())
    }
}

impl Resource for Category {
    type Context = Weak<Category>;
    const KIND: &'static str = "Category";

    /// Loads the attributes only; a `subcategories` element is not an
    /// attribute and is skipped.
    fn hydrate(xml: &Element, parent: Self::Context) -> Self {
        Self {
            record: Record::from_xml(&xml.without(SUBCATEGORIES)),
            parent,
            children: None,
        }
    }

    fn record(&self) -> &Record {
        &self.record
    }

    fn record_mut(&mut self) -> &mut Record {
        &mut self.record
    }
}
