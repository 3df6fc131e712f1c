//! Triples → canonical record decoding

use crate::error::{BridgeError, BridgeResult};
use crate::model::{canonical_key, etype::is_ref_label, AppId, Attrs, CanonicalRecord, FieldValue, Triple};
use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Decode one entity's triples into the legacy row shape for `etype`.
///
/// Triples whose attribute belongs to another etype are ignored. Later
/// triples overwrite earlier ones for the same column.
pub fn decode<'t>(
    app_id: AppId,
    attrs: &Attrs,
    etype: &str,
    triples: impl IntoIterator<Item = &'t Triple>,
) -> BridgeResult<CanonicalRecord> {
    let mut record = CanonicalRecord::new(app_id);

    for triple in triples {
        let Some(attr) = attrs.seek_by_id(&triple.attr_id) else {
            tracing::debug!(attr_id = %triple.attr_id, "skipping triple with unknown attribute");
            continue;
        };
        if attr.forward.etype != etype {
            continue;
        }

        let label = attr.forward.label.as_str();
        let key = canonical_key(etype, label);
        let value = coerce(label, &key, &triple.value)?;

        if key == "id" {
            record.insert("created_at", FieldValue::Timestamp(timestamp(triple.created_at)?));
        }
        record.insert(key.into_owned(), value);
    }

    Ok(record)
}

fn coerce(label: &str, key: &str, value: &Value) -> BridgeResult<FieldValue> {
    if is_ref_label(label) || key == "id" {
        return parse_id(key, value);
    }
    if key == "client_secret" {
        return match value {
            Value::Null => Ok(FieldValue::Null),
            Value::String(s) => hex::decode(s)
                .map(FieldValue::Bytes)
                .map_err(|e| BridgeError::coercion(key, e)),
            other => Err(BridgeError::coercion(
                key,
                format!("expected hex string, got {other}"),
            )),
        };
    }
    Ok(FieldValue::from(value.clone()))
}

fn parse_id(key: &str, value: &Value) -> BridgeResult<FieldValue> {
    match value {
        Value::Null => Ok(FieldValue::Null),
        Value::String(s) => Uuid::parse_str(s)
            .map(FieldValue::Id)
            .map_err(|e| BridgeError::coercion(key, e)),
        other => Err(BridgeError::coercion(
            key,
            format!("expected uuid string, got {other}"),
        )),
    }
}

fn timestamp(millis: i64) -> BridgeResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| BridgeError::coercion("created_at", format!("timestamp {millis} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Attribute, EntityId};
    use serde_json::json;

    const T0: i64 = 1_700_000_000_000;
    const ID: &str = "11111111-1111-1111-1111-111111111111";

    struct Fixture {
        attrs: Attrs,
        app_id: AppId,
    }

    impl Fixture {
        fn new() -> Self {
            let attrs = Attrs::new([
                Attribute::new("$oauthClients", "id").unique(),
                Attribute::new("$oauthClients", "clientId").unique(),
                Attribute::new("$oauthClients", "name"),
                Attribute::new("$oauthClients", "encryptedClientSecret"),
                Attribute::new("$oauthClients", "discoveryEndpoint"),
                Attribute::new("$oauthClients", "$oauthProvider")
                    .with_reverse("$oauthProviders", "$oauthClients"),
                Attribute::new("$oauthProviders", "id").unique(),
                Attribute::new("$oauthProviders", "name"),
            ]);
            Self {
                attrs,
                app_id: AppId::new(),
            }
        }

        fn attr(&self, etype: &str, label: &str) -> crate::model::AttrId {
            self.attrs.seek_by_fwd_ident(etype, label).unwrap().id
        }

        fn client(&self, e: EntityId, label: &str, value: Value, t: i64) -> Triple {
            Triple::new(e, self.attr("$oauthClients", label), value, t)
        }
    }

    #[test]
    fn oauth_client_scenario() {
        let fx = Fixture::new();
        let e1 = EntityId::new();
        let triples = vec![
            fx.client(e1, "id", json!(ID), T0),
            fx.client(e1, "clientId", json!("abc"), T0),
        ];

        let record = decode(fx.app_id, &fx.attrs, "$oauthClients", &triples).unwrap();

        assert_eq!(record.len(), 4);
        assert_eq!(record.get_id("app_id"), Some(fx.app_id.as_uuid()));
        assert_eq!(record.get_id("id"), Some(Uuid::parse_str(ID).unwrap()));
        assert_eq!(record.get_str("client_id"), Some("abc"));
        assert_eq!(record.created_at(), DateTime::from_timestamp_millis(T0));
    }

    #[test]
    fn name_is_renamed_per_etype() {
        let fx = Fixture::new();
        let e = EntityId::new();

        let client = decode(
            fx.app_id,
            &fx.attrs,
            "$oauthClients",
            &[fx.client(e, "name", json!("web"), T0)],
        )
        .unwrap();
        assert_eq!(client.get_str("client_name"), Some("web"));

        let provider_triple = Triple::new(e, fx.attr("$oauthProviders", "name"), json!("google"), T0);
        let provider = decode(fx.app_id, &fx.attrs, "$oauthProviders", [&provider_triple]).unwrap();
        assert_eq!(provider.get_str("provider_name"), Some("google"));
        assert!(!provider.contains_key("name"));
    }

    #[test]
    fn null_secret_stays_null() {
        let fx = Fixture::new();
        let record = decode(
            fx.app_id,
            &fx.attrs,
            "$oauthClients",
            &[fx.client(EntityId::new(), "encryptedClientSecret", json!(null), T0)],
        )
        .unwrap();
        assert_eq!(record.get("client_secret"), Some(&FieldValue::Null));
    }

    #[test]
    fn secret_hex_decoded_to_bytes() {
        let fx = Fixture::new();
        let record = decode(
            fx.app_id,
            &fx.attrs,
            "$oauthClients",
            &[fx.client(EntityId::new(), "encryptedClientSecret", json!("deadbeef"), T0)],
        )
        .unwrap();
        assert_eq!(record.get_bytes("client_secret"), Some(&[0xde, 0xad, 0xbe, 0xef][..]));
    }

    #[test]
    fn malformed_hex_is_a_coercion_error() {
        let fx = Fixture::new();
        let err = decode(
            fx.app_id,
            &fx.attrs,
            "$oauthClients",
            &[fx.client(EntityId::new(), "encryptedClientSecret", json!("zz"), T0)],
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::ValueCoercion { ref key, .. } if key == "client_secret"));
    }

    #[test]
    fn reference_label_parsed_as_foreign_key() {
        let fx = Fixture::new();
        let provider = Uuid::new_v4();
        let record = decode(
            fx.app_id,
            &fx.attrs,
            "$oauthClients",
            &[fx.client(EntityId::new(), "$oauthProvider", json!(provider.to_string()), T0)],
        )
        .unwrap();
        assert_eq!(record.get_id("provider_id"), Some(provider));
    }

    #[test]
    fn other_etype_triples_ignored() {
        let fx = Fixture::new();
        let e = EntityId::new();
        let triples = vec![
            fx.client(e, "clientId", json!("abc"), T0),
            Triple::new(e, fx.attr("$oauthProviders", "name"), json!("google"), T0),
        ];
        let record = decode(fx.app_id, &fx.attrs, "$oauthClients", &triples).unwrap();
        assert_eq!(record.len(), 2);
        assert!(!record.contains_key("provider_name"));
    }

    #[test]
    fn decoding_is_order_independent_for_distinct_keys() {
        let fx = Fixture::new();
        let e = EntityId::new();
        let triples = vec![
            fx.client(e, "id", json!(ID), T0),
            fx.client(e, "clientId", json!("abc"), T0 + 1),
            fx.client(e, "discoveryEndpoint", json!("https://example.com"), T0 + 2),
            fx.client(e, "encryptedClientSecret", json!("00ff"), T0 + 3),
        ];
        let forward = decode(fx.app_id, &fx.attrs, "$oauthClients", &triples).unwrap();
        let reversed = decode(fx.app_id, &fx.attrs, "$oauthClients", triples.iter().rev()).unwrap();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn last_write_wins_per_key() {
        let fx = Fixture::new();
        let e = EntityId::new();
        let triples = vec![
            fx.client(e, "clientId", json!("first"), T0),
            fx.client(e, "clientId", json!("second"), T0),
        ];
        let record = decode(fx.app_id, &fx.attrs, "$oauthClients", &triples).unwrap();
        assert_eq!(record.get_str("client_id"), Some("second"));
    }

    #[test]
    fn unknown_attribute_skipped() {
        let fx = Fixture::new();
        let stray = Triple::new(EntityId::new(), crate::model::AttrId::new(), json!("x"), T0);
        let record = decode(fx.app_id, &fx.attrs, "$oauthClients", [&stray]).unwrap();
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn malformed_id_is_a_coercion_error() {
        let fx = Fixture::new();
        let err = decode(
            fx.app_id,
            &fx.attrs,
            "$oauthClients",
            &[fx.client(EntityId::new(), "id", json!("not-a-uuid"), T0)],
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::ValueCoercion { ref key, .. } if key == "id"));
    }
}
