//! `SqliteStore` as the catalog, query and transaction engines

use super::sqlite::{parse_uuid_col, row_to_attr, row_to_triple, SqliteStore};
use crate::engine::{AppDirectory, AttrCatalog, DatalogEngine, InstaqlEngine, TransactionEngine};
use crate::error::{BridgeError, BridgeResult};
use crate::model::{
    AppId, AppMigrationState, AttrId, Attribute, Attrs, EntityId, Lookup, Triple, TxReport, TxStep,
};
use crate::query::{BindingSet, InstaqlForm, QueryNode, Symbol, SymbolBindings};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

const TRIPLE_COLUMNS: &str = "t.entity_id, t.attr_id, t.value_json, t.created_at";

impl AttrCatalog for SqliteStore {
    fn get_by_app_id(&self, conn: &Connection, app_id: AppId) -> BridgeResult<Attrs> {
        let mut stmt = conn.prepare(
            r#"
            SELECT id, fwd_etype, fwd_label, rev_etype, rev_label, is_unique, is_indexed
            FROM attrs WHERE app_id = ?1
            "#,
        )?;
        let mut rows = stmt.query(params![app_id.to_string()])?;
        let mut attrs = Vec::new();
        while let Some(row) = rows.next()? {
            attrs.push(row_to_attr(row)?);
        }
        Ok(Attrs::new(attrs))
    }
}

impl DatalogEngine for SqliteStore {
    fn fetch_entity_triples(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        etype: &str,
        entity_id: EntityId,
    ) -> BridgeResult<Vec<Triple>> {
        entity_triples(conn, app_id, attrs, etype, entity_id)
    }
}

impl InstaqlEngine for SqliteStore {
    fn query(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        form: &InstaqlForm,
    ) -> BridgeResult<Vec<QueryNode>> {
        let symbol = Symbol::top_level(&form.etype);
        let ids = matching_entities(conn, app_id, attrs, form)?;

        let mut root_bindings = SymbolBindings::new();
        root_bindings.insert(symbol.clone(), ids.iter().copied().collect::<BindingSet>());
        let mut root = QueryNode::new(Vec::new(), root_bindings);

        for id in ids {
            let triples = entity_triples(conn, app_id, attrs, &form.etype, id)?;
            let mut bindings = SymbolBindings::new();
            bindings.insert(symbol.clone(), std::iter::once(id).collect::<BindingSet>());
            root = root.with_child(QueryNode::new(triples, bindings));
        }

        tracing::debug!(%app_id, etype = %form.etype, matched = root.children.len(), "instaql query");
        Ok(vec![root])
    }

    fn query_tree(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        form: &InstaqlForm,
    ) -> BridgeResult<Value> {
        let mut objects = Vec::new();
        for id in matching_entities(conn, app_id, attrs, form)? {
            let mut obj = Map::new();
            for triple in entity_triples(conn, app_id, attrs, &form.etype, id)? {
                let Some(attr) = attrs.seek_by_id(&triple.attr_id) else {
                    continue;
                };
                if attr.forward.label == "id" {
                    obj.insert("$createdAt".to_string(), Value::from(triple.created_at));
                }
                obj.insert(attr.forward.label.clone(), triple.value);
            }
            objects.push(Value::Object(obj));
        }

        let mut root = Map::new();
        root.insert(form.etype.clone(), Value::Array(objects));
        Ok(Value::Object(root))
    }
}

impl TransactionEngine for SqliteStore {
    fn transact(
        &self,
        conn: &Connection,
        app_id: AppId,
        attrs: &Attrs,
        steps: &[TxStep],
    ) -> BridgeResult<TxReport> {
        let now = chrono::Utc::now().timestamp_millis();
        conn.execute(
            "INSERT INTO transactions (app_id, created_at) VALUES (?1, ?2)",
            params![app_id.to_string(), now],
        )?;
        let mut report = TxReport {
            tx_id: conn.last_insert_rowid(),
            ..Default::default()
        };

        for step in steps {
            match step {
                TxStep::AddTriple {
                    entity,
                    attr_id,
                    value,
                } => {
                    let attr = known_attr(attrs, attr_id)?;
                    let entity_id = match resolve_lookup(conn, app_id, entity)? {
                        Some(id) => id,
                        None => {
                            // Unique lookups upsert: the entity is created with its lookup value.
                            let id = EntityId::new();
                            if let Lookup::Unique { attr_id, value } = entity {
                                let lookup_attr = known_attr(attrs, attr_id)?;
                                report.added.push(put_triple(conn, app_id, lookup_attr, id, value, now)?);
                            }
                            id
                        }
                    };
                    report.added.push(put_triple(conn, app_id, attr, entity_id, value, now)?);
                }
                TxStep::RetractTriple {
                    entity,
                    attr_id,
                    value,
                } => {
                    let attr = known_attr(attrs, attr_id)?;
                    if let Some(entity_id) = resolve_lookup(conn, app_id, entity)? {
                        report
                            .deleted
                            .extend(retract_triple(conn, app_id, attr, entity_id, value)?);
                    }
                }
                TxStep::DeleteEntity { entity, etype } => {
                    if let Some(entity_id) = resolve_lookup(conn, app_id, entity)? {
                        report
                            .deleted
                            .extend(delete_entity(conn, app_id, etype, entity_id)?);
                    }
                }
            }
        }

        tracing::debug!(
            %app_id,
            tx_id = report.tx_id,
            steps = steps.len(),
            added = report.added.len(),
            deleted = report.deleted.len(),
            "applied transaction"
        );
        Ok(report)
    }
}

impl AppDirectory for SqliteStore {
    fn get_app(&self, conn: &Connection, app_id: AppId) -> BridgeResult<Option<AppMigrationState>> {
        let row = conn
            .query_row(
                "SELECT id, title, users_in_triples FROM apps WHERE id = ?1",
                params![app_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, title, users_in_triples)| {
            Ok(AppMigrationState {
                app_id: parse_uuid_col(&id)?,
                title,
                users_in_triples,
            })
        })
        .transpose()
    }

    fn set_users_in_triples(
        &self,
        conn: &Connection,
        app_id: AppId,
        users_in_triples: bool,
    ) -> BridgeResult<bool> {
        let changed = conn.execute(
            "UPDATE apps SET users_in_triples = ?2 WHERE id = ?1",
            params![app_id.to_string(), users_in_triples],
        )?;
        Ok(changed > 0)
    }
}

fn known_attr<'a>(attrs: &'a Attrs, attr_id: &AttrId) -> BridgeResult<&'a Attribute> {
    attrs
        .seek_by_id(attr_id)
        .ok_or_else(|| BridgeError::Engine(format!("unknown attribute {attr_id}")))
}

fn value_json(value: &Value) -> BridgeResult<String> {
    Ok(serde_json::to_string(value)?)
}

fn collect_triples(conn: &Connection, sql: &str, args: &[&dyn rusqlite::ToSql]) -> BridgeResult<Vec<Triple>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(row_to_triple(row)?);
    }
    Ok(out)
}

fn entity_triples(
    conn: &Connection,
    app_id: AppId,
    attrs: &Attrs,
    etype: &str,
    entity_id: EntityId,
) -> BridgeResult<Vec<Triple>> {
    let sql = format!(
        "SELECT {TRIPLE_COLUMNS} FROM triples t WHERE t.app_id = ?1 AND t.entity_id = ?2 ORDER BY t.created_at, t.attr_id"
    );
    let triples = collect_triples(conn, &sql, &[&app_id.to_string(), &entity_id.to_string()])?;
    Ok(triples
        .into_iter()
        .filter(|t| {
            attrs
                .seek_by_id(&t.attr_id)
                .is_some_and(|a| a.forward.etype == etype)
        })
        .collect())
}

/// Entity ids holding `attr_id` (with `value`, when given), oldest first
fn entities_with_attr(
    conn: &Connection,
    app_id: AppId,
    attr_id: AttrId,
    value: Option<&Value>,
) -> BridgeResult<Vec<EntityId>> {
    let app = app_id.to_string();
    let attr = attr_id.to_string();
    let mut stmt;
    let mut rows = match value {
        Some(v) => {
            stmt = conn.prepare(
                "SELECT entity_id FROM triples WHERE app_id = ?1 AND attr_id = ?2 AND value_json = ?3 ORDER BY created_at, entity_id",
            )?;
            stmt.query(params![app, attr, value_json(v)?])?
        }
        None => {
            stmt = conn.prepare(
                "SELECT entity_id FROM triples WHERE app_id = ?1 AND attr_id = ?2 ORDER BY created_at, entity_id",
            )?;
            stmt.query(params![app, attr])?
        }
    };

    let mut ids = BindingSet::default();
    while let Some(row) = rows.next()? {
        ids.insert(parse_uuid_col(&row.get::<_, String>(0)?)?);
    }
    Ok(ids.iter().collect())
}

fn matching_entities(
    conn: &Connection,
    app_id: AppId,
    attrs: &Attrs,
    form: &InstaqlForm,
) -> BridgeResult<Vec<EntityId>> {
    let fwd_attr = |label: &str| {
        attrs
            .seek_by_fwd_ident(&form.etype, label)
            .map(|a| a.id)
            .ok_or_else(|| BridgeError::AttributeUnresolved {
                etype: form.etype.clone(),
                label: label.to_string(),
            })
    };

    if form.filter.is_empty() {
        return entities_with_attr(conn, app_id, fwd_attr("id")?, None);
    }

    let mut matched: Option<Vec<EntityId>> = None;
    for (label, value) in form.filter.iter() {
        let ids = entities_with_attr(conn, app_id, fwd_attr(label)?, Some(value))?;
        matched = Some(match matched {
            None => ids,
            Some(prev) => prev.into_iter().filter(|id| ids.contains(id)).collect(),
        });
    }
    Ok(matched.unwrap_or_default())
}

fn resolve_lookup(conn: &Connection, app_id: AppId, lookup: &Lookup) -> BridgeResult<Option<EntityId>> {
    match lookup {
        Lookup::Id { id } => Ok(Some(*id)),
        Lookup::Unique { attr_id, value } => {
            let id: Option<String> = conn
                .query_row(
                    "SELECT entity_id FROM triples WHERE app_id = ?1 AND attr_id = ?2 AND value_json = ?3 LIMIT 1",
                    params![app_id.to_string(), attr_id.to_string(), value_json(value)?],
                    |row| row.get(0),
                )
                .optional()?;
            id.map(|s| parse_uuid_col(&s)).transpose()
        }
    }
}

fn put_triple(
    conn: &Connection,
    app_id: AppId,
    attr: &Attribute,
    entity_id: EntityId,
    value: &Value,
    now: i64,
) -> BridgeResult<Triple> {
    let app = app_id.to_string();
    let attr_col = attr.id.to_string();
    let entity = entity_id.to_string();
    let json = value_json(value)?;

    if attr.unique {
        let taken: Option<String> = conn
            .query_row(
                "SELECT entity_id FROM triples WHERE app_id = ?1 AND attr_id = ?2 AND value_json = ?3 AND entity_id != ?4 LIMIT 1",
                params![app, attr_col, json, entity],
                |row| row.get(0),
            )
            .optional()?;
        if taken.is_some() {
            return Err(BridgeError::Engine(format!(
                "unique constraint violated: {}.{} = {json}",
                attr.forward.etype, attr.forward.label
            )));
        }
    }

    // System attributes hold one value per entity.
    conn.execute(
        "DELETE FROM triples WHERE app_id = ?1 AND entity_id = ?2 AND attr_id = ?3",
        params![app, entity, attr_col],
    )?;
    conn.execute(
        "INSERT INTO triples (app_id, entity_id, attr_id, value_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![app, entity, attr_col, json, now],
    )?;

    Ok(Triple::new(entity_id, attr.id, value.clone(), now))
}

fn retract_triple(
    conn: &Connection,
    app_id: AppId,
    attr: &Attribute,
    entity_id: EntityId,
    value: &Value,
) -> BridgeResult<Vec<Triple>> {
    let app = app_id.to_string();
    let entity = entity_id.to_string();
    let attr_col = attr.id.to_string();
    let json = value_json(value)?;

    let sql = format!(
        "SELECT {TRIPLE_COLUMNS} FROM triples t WHERE t.app_id = ?1 AND t.entity_id = ?2 AND t.attr_id = ?3 AND t.value_json = ?4"
    );
    let removed = collect_triples(conn, &sql, &[&app, &entity, &attr_col, &json])?;
    conn.execute(
        "DELETE FROM triples WHERE app_id = ?1 AND entity_id = ?2 AND attr_id = ?3 AND value_json = ?4",
        params![app, entity, attr_col, json],
    )?;
    Ok(removed)
}

/// Remove an entity's own triples plus every reference pointing at it
fn delete_entity(conn: &Connection, app_id: AppId, etype: &str, entity_id: EntityId) -> BridgeResult<Vec<Triple>> {
    let app = app_id.to_string();
    let entity = entity_id.to_string();
    let entity_ref = value_json(&Value::String(entity.clone()))?;

    let own_sql = format!(
        r#"
        SELECT {TRIPLE_COLUMNS} FROM triples t JOIN attrs a ON a.id = t.attr_id
        WHERE t.app_id = ?1 AND t.entity_id = ?2 AND a.fwd_etype = ?3
        ORDER BY t.created_at, t.attr_id
        "#
    );
    let ref_sql = format!(
        r#"
        SELECT {TRIPLE_COLUMNS} FROM triples t JOIN attrs a ON a.id = t.attr_id
        WHERE t.app_id = ?1 AND a.rev_etype = ?2 AND t.value_json = ?3
        ORDER BY t.created_at, t.attr_id
        "#
    );
    let mut removed = collect_triples(conn, &own_sql, &[&app, &entity, &etype])?;
    removed.extend(collect_triples(conn, &ref_sql, &[&app, &etype, &entity_ref])?);

    for triple in &removed {
        conn.execute(
            "DELETE FROM triples WHERE app_id = ?1 AND entity_id = ?2 AND attr_id = ?3 AND value_json = ?4",
            params![
                app,
                triple.entity_id.to_string(),
                triple.attr_id.to_string(),
                value_json(&triple.value)?
            ],
        )?;
    }
    Ok(removed)
}
