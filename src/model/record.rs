//! Canonical records and per-app migration state

use super::ids::AppId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Typed value of one canonical field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Id(Uuid),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            other => FieldValue::Json(other),
        }
    }
}

/// Flat `column → value` view of one system entity, shaped like the legacy row.
///
/// Built fresh on every read. Always carries `app_id`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct CanonicalRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl CanonicalRecord {
    pub fn new(app_id: AppId) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("app_id".to_string(), FieldValue::Id(app_id.as_uuid()));
        Self { fields }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        self.fields.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get_id(&self, key: &str) -> Option<Uuid> {
        match self.fields.get(key) {
            Some(FieldValue::Id(id)) => Some(*id),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(FieldValue::Json(serde_json::Value::String(s))) => Some(s),
            _ => None,
        }
    }

    pub fn get_bytes(&self, key: &str) -> Option<&[u8]> {
        match self.fields.get(key) {
            Some(FieldValue::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self.fields.get("created_at") {
            Some(FieldValue::Timestamp(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Which representation is authoritative for an app's system entities
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Legacy,
    Triples,
}

/// An app row as seen by the migration gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppMigrationState {
    pub app_id: AppId,
    pub title: String,
    /// Are this app's system entities stored as triples?
    pub users_in_triples: bool,
}

impl AppMigrationState {
    pub fn representation(&self) -> Representation {
        if self.users_in_triples {
            Representation::Triples
        } else {
            Representation::Legacy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_is_seeded_with_app_id() {
        let app_id = AppId::new();
        let record = CanonicalRecord::new(app_id);
        assert_eq!(record.len(), 1);
        assert_eq!(record.get_id("app_id"), Some(app_id.as_uuid()));
    }

    #[test]
    fn json_null_becomes_field_null() {
        assert_eq!(FieldValue::from(json!(null)), FieldValue::Null);
        assert_eq!(FieldValue::from(json!("a")), FieldValue::Json(json!("a")));
    }

    #[test]
    fn representation_follows_flag() {
        let mut state = AppMigrationState {
            app_id: AppId::new(),
            title: "demo".into(),
            users_in_triples: false,
        };
        assert_eq!(state.representation(), Representation::Legacy);
        state.users_in_triples = true;
        assert_eq!(state.representation(), Representation::Triples);
    }
}
