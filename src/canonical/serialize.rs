//! Canonical serialization of record field mappings.
//!
//! Contract: keys sorted lexicographically at every nesting level, one
//! stable encoding per value kind, excluded keys never present. Two
//! semantically identical mappings produce byte-identical output no matter
//! the insertion order.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::AuditError;

/// Canonical encoder with an explicit, named exclusion set.
///
/// The exclusion set is configuration, not inference: identifier,
/// fingerprint bookkeeping, and volatile timestamp fields are named up
/// front so that storing a fingerprint never perturbs the next one.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    excluded: BTreeSet<String>,
}

impl Canonicalizer {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    pub fn excluded_fields(&self) -> impl Iterator<Item = &str> {
        self.excluded.iter().map(String::as_str)
    }

    /// Canonicalize a field mapping to bytes.
    ///
    /// Excluded keys are dropped at the top level, matching the record
    /// store's column-level exclusion. Output is a compact JSON text with
    /// sorted keys; no partial output is ever returned on error.
    pub fn canonicalize(&self, fields: &Map<String, Value>) -> Result<Vec<u8>, AuditError> {
        let mut out = String::new();
        let mut keys: Vec<&String> = fields
            .keys()
            .filter(|k| !self.excluded.contains(k.as_str()))
            .collect();
        keys.sort();

        out.push('{');
        for (i, key) in keys.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            write_string(&mut out, key)?;
            out.push(':');
            write_value(&mut out, &fields[key.as_str()])?;
        }
        out.push('}');

        Ok(out.into_bytes())
    }

    /// Canonicalize any serializable record.
    ///
    /// Fails closed with `Canonicalization` if the value cannot be
    /// represented as a field mapping (non-object top level, unserializable
    /// types, non-string keys).
    pub fn canonicalize_record<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, AuditError> {
        let value = serde_json::to_value(record)?;
        match value {
            Value::Object(map) => self.canonicalize(&map),
            other => Err(AuditError::Canonicalization(format!(
                "record must serialize to an object, got {}",
                kind_name(&other)
            ))),
        }
    }
}

fn write_value(out: &mut String, value: &Value) -> Result<(), AuditError> {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // serde_json renders numbers as shortest decimal strings, which is
        // stable for a given value.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key)?;
                out.push(':');
                write_value(out, &map[key.as_str()])?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn write_string(out: &mut String, s: &str) -> Result<(), AuditError> {
    let escaped = serde_json::to_string(s)?;
    out.push_str(&escaped);
    Ok(())
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_EXCLUDED_FIELDS;
    use serde_json::json;

    fn canonicalizer() -> Canonicalizer {
        Canonicalizer::new(DEFAULT_EXCLUDED_FIELDS.iter().copied())
    }

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_key_order_does_not_matter() {
        let c = canonicalizer();
        let mut a = Map::new();
        a.insert("b".to_string(), json!(2));
        a.insert("a".to_string(), json!(1));

        let mut b = Map::new();
        b.insert("a".to_string(), json!(1));
        b.insert("b".to_string(), json!(2));

        assert_eq!(c.canonicalize(&a).unwrap(), c.canonicalize(&b).unwrap());
        assert_eq!(c.canonicalize(&a).unwrap(), br#"{"a":1,"b":2}"#.to_vec());
    }

    #[test]
    fn test_excluded_keys_never_appear() {
        let c = canonicalizer();
        let with = fields(json!({
            "name": "John",
            "id": 42,
            "fingerprint": "0xdead",
            "created_at": "2025-01-01T00:00:00Z"
        }));
        let without = fields(json!({"name": "John"}));

        assert_eq!(
            c.canonicalize(&with).unwrap(),
            c.canonicalize(&without).unwrap()
        );
    }

    #[test]
    fn test_nested_objects_are_sorted_recursively() {
        let c = canonicalizer();
        let m = fields(json!({
            "outer": {"z": 1, "a": {"y": true, "b": null}}
        }));
        let bytes = c.canonicalize(&m).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"outer":{"a":{"b":null,"y":true},"z":1}}"#
        );
    }

    #[test]
    fn test_value_kinds_have_stable_encodings() {
        let c = canonicalizer();
        let m = fields(json!({
            "n": null,
            "flag": false,
            "count": 7,
            "ratio": 0.5,
            "note": "a \"quoted\" line",
            "list": [1, "two", null]
        }));
        let text = String::from_utf8(c.canonicalize(&m).unwrap()).unwrap();
        assert_eq!(
            text,
            r#"{"count":7,"flag":false,"list":[1,"two",null],"n":null,"note":"a \"quoted\" line","ratio":0.5}"#
        );
    }

    #[test]
    fn test_non_object_record_fails_closed() {
        let c = canonicalizer();
        let err = c.canonicalize_record(&vec![1, 2, 3]).unwrap_err();
        assert!(matches!(err, AuditError::Canonicalization(_)));
    }

    #[test]
    fn test_serializable_struct_roundtrip() {
        #[derive(serde::Serialize)]
        struct Patient<'a> {
            name: &'a str,
            id: i64,
        }

        let c = canonicalizer();
        let bytes = c
            .canonicalize_record(&Patient { name: "John", id: 9 })
            .unwrap();
        // id is excluded by configuration
        assert_eq!(bytes, br#"{"name":"John"}"#.to_vec());
    }
}
