//! Attribute catalog snapshot

use super::ids::AttrId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One side of an attribute's name: the entity type and the label on it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ident {
    pub etype: String,
    pub label: String,
}

impl Ident {
    pub fn new(etype: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            etype: etype.into(),
            label: label.into(),
        }
    }
}

/// Schema metadata linking a forward (and optional reverse) name to an id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttrId,
    pub forward: Ident,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverse: Option<Ident>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub indexed: bool,
}

impl Attribute {
    /// A plain value attribute `etype.label`
    pub fn new(etype: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: AttrId::new(),
            forward: Ident::new(etype, label),
            reverse: None,
            unique: false,
            indexed: false,
        }
    }

    /// A reference attribute with a reverse name on the target etype
    pub fn with_reverse(mut self, etype: impl Into<String>, label: impl Into<String>) -> Self {
        self.reverse = Some(Ident::new(etype, label));
        self
    }

    pub fn with_id(mut self, id: AttrId) -> Self {
        self.id = id;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.indexed = true;
        self
    }
}

/// Immutable snapshot of one app's attribute catalog.
///
/// Owned by the external catalog; the bridge only reads it.
#[derive(Debug, Clone, Default)]
pub struct Attrs {
    by_id: HashMap<AttrId, Attribute>,
    by_fwd: HashMap<Ident, AttrId>,
    by_rev: HashMap<Ident, AttrId>,
}

impl Attrs {
    pub fn new(attrs: impl IntoIterator<Item = Attribute>) -> Self {
        let mut out = Self::default();
        for attr in attrs {
            out.by_fwd.insert(attr.forward.clone(), attr.id);
            if let Some(rev) = &attr.reverse {
                out.by_rev.insert(rev.clone(), attr.id);
            }
            out.by_id.insert(attr.id, attr);
        }
        out
    }

    pub fn seek_by_id(&self, id: &AttrId) -> Option<&Attribute> {
        self.by_id.get(id)
    }

    pub fn seek_by_fwd_ident(&self, etype: &str, label: &str) -> Option<&Attribute> {
        self.by_fwd
            .get(&Ident::new(etype, label))
            .and_then(|id| self.by_id.get(id))
    }

    pub fn seek_by_rev_ident(&self, etype: &str, label: &str) -> Option<&Attribute> {
        self.by_rev
            .get(&Ident::new(etype, label))
            .and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
