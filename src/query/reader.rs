//! Entity lookups that return canonical records

use super::collect::collect;
use super::types::{InstaqlForm, Symbol, Where};
use crate::codec;
use crate::engine::{DatalogEngine, InstaqlEngine};
use crate::error::BridgeResult;
use crate::model::{AppId, Attrs, CanonicalRecord, EntityId, Triple};
use rusqlite::Connection;
use std::collections::BTreeMap;

/// The app, catalog and etype a lookup is bound to
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub app_id: AppId,
    pub attrs: &'a Attrs,
    pub etype: &'a str,
}

impl<'a> Scope<'a> {
    pub fn new(app_id: AppId, attrs: &'a Attrs, etype: &'a str) -> Self {
        Self {
            app_id,
            attrs,
            etype,
        }
    }

    fn decode<'t>(&self, triples: impl IntoIterator<Item = &'t Triple>) -> BridgeResult<CanonicalRecord> {
        codec::decode(self.app_id, self.attrs, self.etype, triples)
    }
}

/// Single and bulk entity reads through the datalog and InstaQL engines
#[derive(Clone, Copy)]
pub struct EntityReader<'e> {
    datalog: &'e dyn DatalogEngine,
    instaql: &'e dyn InstaqlEngine,
}

impl<'e> EntityReader<'e> {
    pub fn new(datalog: &'e dyn DatalogEngine, instaql: &'e dyn InstaqlEngine) -> Self {
        Self { datalog, instaql }
    }

    /// Fetch one entity by id; `None` when it has no triples of this etype
    pub fn get_entity(
        &self,
        conn: &Connection,
        scope: Scope<'_>,
        id: EntityId,
    ) -> BridgeResult<Option<CanonicalRecord>> {
        let triples = self
            .datalog
            .fetch_entity_triples(conn, scope.app_id, scope.attrs, scope.etype, id)?;
        if triples.is_empty() {
            return Ok(None);
        }
        scope.decode(&triples).map(Some)
    }

    /// Fetch the first entity matching `filter`.
    ///
    /// When several entities match, the first-discovered binding is used.
    pub fn get_entity_where(
        &self,
        conn: &Connection,
        scope: Scope<'_>,
        filter: &Where,
    ) -> BridgeResult<Option<CanonicalRecord>> {
        let collected = collect(&self.run(conn, scope, filter)?);
        let Some(ids) = collected.bindings.get(&Symbol::top_level(scope.etype)) else {
            return Ok(None);
        };
        if ids.len() > 1 {
            tracing::warn!(
                app_id = %scope.app_id,
                etype = scope.etype,
                matched = ids.len(),
                "filter matched several entities, using the first"
            );
        }
        let Some(id) = ids.first() else {
            return Ok(None);
        };

        let triples: Vec<&Triple> = collected
            .triples
            .iter()
            .filter(|t| t.entity_id == id)
            .collect();
        if triples.is_empty() {
            return Ok(None);
        }
        scope.decode(triples).map(Some)
    }

    /// Fetch every entity matching `filter`, in binding order.
    ///
    /// Ids without triples are left out.
    pub fn get_entities_where(
        &self,
        conn: &Connection,
        scope: Scope<'_>,
        filter: &Where,
    ) -> BridgeResult<Vec<CanonicalRecord>> {
        let collected = collect(&self.run(conn, scope, filter)?);
        let Some(ids) = collected.bindings.get(&Symbol::top_level(scope.etype)) else {
            return Ok(Vec::new());
        };
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut groups: BTreeMap<EntityId, Vec<&Triple>> = BTreeMap::new();
        for triple in &collected.triples {
            if ids.contains(&triple.entity_id) {
                groups.entry(triple.entity_id).or_default().push(triple);
            }
        }

        ids.iter()
            .filter_map(|id| groups.remove(&id))
            .map(|group| scope.decode(group))
            .collect()
    }

    fn run(
        &self,
        conn: &Connection,
        scope: Scope<'_>,
        filter: &Where,
    ) -> BridgeResult<Vec<super::QueryNode>> {
        let form = InstaqlForm::new(scope.etype).with_where(filter.clone());
        self.instaql.query(conn, scope.app_id, scope.attrs, &form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::model::{AttrId, Attribute};
    use crate::query::{BindingSet, QueryNode, SymbolBindings};
    use serde_json::json;
    use std::sync::Mutex;

    /// Engine double that serves canned triples and result trees
    #[derive(Default)]
    struct Canned {
        triples: Vec<Triple>,
        nodes: Vec<QueryNode>,
        seen_forms: Mutex<Vec<serde_json::Value>>,
    }

    impl DatalogEngine for Canned {
        fn fetch_entity_triples(
            &self,
            _conn: &Connection,
            _app_id: AppId,
            _attrs: &Attrs,
            _etype: &str,
            entity_id: EntityId,
        ) -> BridgeResult<Vec<Triple>> {
            Ok(self
                .triples
                .iter()
                .filter(|t| t.entity_id == entity_id)
                .cloned()
                .collect())
        }
    }

    impl InstaqlEngine for Canned {
        fn query(
            &self,
            _conn: &Connection,
            _app_id: AppId,
            _attrs: &Attrs,
            form: &InstaqlForm,
        ) -> BridgeResult<Vec<QueryNode>> {
            self.seen_forms.lock().unwrap().push(form.to_json());
            Ok(self.nodes.clone())
        }

        fn query_tree(
            &self,
            _conn: &Connection,
            _app_id: AppId,
            _attrs: &Attrs,
            _form: &InstaqlForm,
        ) -> BridgeResult<serde_json::Value> {
            Err(BridgeError::Engine("not used".into()))
        }
    }

    struct Fixture {
        attrs: Attrs,
        id_attr: AttrId,
        client_id_attr: AttrId,
        app_id: AppId,
        conn: Connection,
    }

    const ETYPE: &str = "$oauthClients";

    impl Fixture {
        fn new() -> Self {
            let id = Attribute::new(ETYPE, "id").unique();
            let client_id = Attribute::new(ETYPE, "clientId");
            let (id_attr, client_id_attr) = (id.id, client_id.id);
            Self {
                attrs: Attrs::new([id, client_id]),
                id_attr,
                client_id_attr,
                app_id: AppId::new(),
                conn: Connection::open_in_memory().unwrap(),
            }
        }

        fn scope(&self) -> Scope<'_> {
            Scope::new(self.app_id, &self.attrs, ETYPE)
        }

        fn client(&self, e: EntityId, client_id: &str) -> Vec<Triple> {
            vec![
                Triple::new(e, self.id_attr, json!(e.to_string()), 1),
                Triple::new(e, self.client_id_attr, json!(client_id), 2),
            ]
        }
    }

    fn node(triples: Vec<Triple>, ids: &[EntityId]) -> QueryNode {
        let mut bindings = SymbolBindings::new();
        bindings.insert(Symbol::top_level(ETYPE), ids.iter().copied().collect::<BindingSet>());
        QueryNode::new(triples, bindings)
    }

    #[test]
    fn get_entity_absent_without_triples() {
        let fx = Fixture::new();
        let engine = Canned::default();
        let reader = EntityReader::new(&engine, &engine);
        assert!(reader.get_entity(&fx.conn, fx.scope(), EntityId::new()).unwrap().is_none());
    }

    #[test]
    fn get_entity_decodes_triples() {
        let fx = Fixture::new();
        let e = EntityId::new();
        let engine = Canned {
            triples: fx.client(e, "abc"),
            ..Default::default()
        };
        let reader = EntityReader::new(&engine, &engine);
        let record = reader.get_entity(&fx.conn, fx.scope(), e).unwrap().unwrap();
        assert_eq!(record.get_id("id"), Some(e.as_uuid()));
        assert_eq!(record.get_str("client_id"), Some("abc"));
    }

    #[test]
    fn get_entity_where_uses_first_binding() {
        let fx = Fixture::new();
        let (a, b) = (EntityId::new(), EntityId::new());
        let mut triples = fx.client(a, "first");
        triples.extend(fx.client(b, "second"));
        let engine = Canned {
            nodes: vec![node(triples, &[a, b])],
            ..Default::default()
        };
        let reader = EntityReader::new(&engine, &engine);

        let filter = Where::new().eq("clientId", "first");
        let record = reader
            .get_entity_where(&fx.conn, fx.scope(), &filter)
            .unwrap()
            .unwrap();
        assert_eq!(record.get_str("client_id"), Some("first"));

        let forms = engine.seen_forms.lock().unwrap();
        assert_eq!(forms[0][ETYPE]["$"]["where"]["clientId"], "first");
    }

    #[test]
    fn get_entity_where_absent_when_nothing_bound() {
        let fx = Fixture::new();
        let engine = Canned {
            nodes: vec![node(Vec::new(), &[])],
            ..Default::default()
        };
        let reader = EntityReader::new(&engine, &engine);
        let found = reader
            .get_entity_where(&fx.conn, fx.scope(), &Where::new().eq("clientId", "x"))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn get_entities_where_skips_ids_without_triples() {
        let fx = Fixture::new();
        let (a, empty, b) = (EntityId::new(), EntityId::new(), EntityId::new());
        let root = node(Vec::new(), &[b, empty, a])
            .with_child(node(fx.client(a, "a"), &[a]))
            .with_child(node(fx.client(b, "b"), &[b]));
        let engine = Canned {
            nodes: vec![root],
            ..Default::default()
        };
        let reader = EntityReader::new(&engine, &engine);

        let records = reader
            .get_entities_where(&fx.conn, fx.scope(), &Where::new())
            .unwrap();
        let client_ids: Vec<_> = records.iter().map(|r| r.get_str("client_id").unwrap()).collect();
        assert_eq!(client_ids, vec!["b", "a"]);
    }
}
