//! Query forms and raw result shapes exchanged with the query engine

use crate::error::{BridgeError, BridgeResult};
use crate::model::{EntityId, Triple};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

/// A query variable
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The variable bound to the matched entities of `etype` at depth `level`
    pub fn for_etype(etype: &str, level: usize) -> Self {
        Self(format!("?{etype}-{level}"))
    }

    /// The variable for the top-level entities of a query on `etype`
    pub fn top_level(etype: &str) -> Self {
        Self::for_etype(etype, 0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entity ids bound to one variable, in the order they were discovered
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSet {
    order: Vec<EntityId>,
    seen: HashSet<EntityId>,
}

impl BindingSet {
    pub fn insert(&mut self, id: EntityId) -> bool {
        if self.seen.insert(id) {
            self.order.push(id);
            true
        } else {
            false
        }
    }

    pub fn union(mut self, other: &BindingSet) -> Self {
        for id in other.iter() {
            self.insert(id);
        }
        self
    }

    pub fn first(&self) -> Option<EntityId> {
        self.order.first().copied()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.seen.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl FromIterator<EntityId> for BindingSet {
    fn from_iter<I: IntoIterator<Item = EntityId>>(iter: I) -> Self {
        let mut set = BindingSet::default();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

/// Variable → bound entity ids
pub type SymbolBindings = BTreeMap<Symbol, BindingSet>;

/// One level of a query result tree
#[derive(Debug, Clone, Default)]
pub struct QueryNode {
    pub triples: Vec<Triple>,
    pub bindings: SymbolBindings,
    pub children: Vec<QueryNode>,
}

impl QueryNode {
    pub fn new(triples: Vec<Triple>, bindings: SymbolBindings) -> Self {
        Self {
            triples,
            bindings,
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: QueryNode) -> Self {
        self.children.push(child);
        self
    }
}

/// Equality filter on forward labels, AND-ed together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where(BTreeMap<String, Value>);

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, label: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(label.into(), value.into());
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect())
    }

    fn from_json(value: &Value) -> BridgeResult<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| BridgeError::Engine("where clause must be an object".into()))?;
        Ok(Self(obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
    }
}

/// A single-etype structured query: `{etype: {$: {where: filter}}}`
#[derive(Debug, Clone, PartialEq)]
pub struct InstaqlForm {
    pub etype: String,
    pub filter: Where,
}

impl InstaqlForm {
    pub fn new(etype: impl Into<String>) -> Self {
        Self {
            etype: etype.into(),
            filter: Where::new(),
        }
    }

    pub fn with_where(mut self, filter: Where) -> Self {
        self.filter = filter;
        self
    }

    pub fn to_json(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            self.etype.clone(),
            json!({ "$": { "where": self.filter.to_json() } }),
        );
        Value::Object(root)
    }

    /// Parse the JSON shape; a missing `$` or `where` means "no filter"
    pub fn from_json(value: &Value) -> BridgeResult<Self> {
        let obj: &Map<String, Value> = value
            .as_object()
            .ok_or_else(|| BridgeError::Engine("query must be an object".into()))?;
        let mut entries = obj.iter();
        let (etype, body) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(BridgeError::Engine(
                    "query must name exactly one etype".into(),
                ))
            }
        };
        let filter = match body.get("$").and_then(|opts| opts.get("where")) {
            Some(w) => Where::from_json(w)?,
            None => Where::new(),
        };
        Ok(Self {
            etype: etype.clone(),
            filter,
        })
    }
}
