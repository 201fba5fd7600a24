//! Depth-bounded sanitization of arbitrary metadata values.
//!
//! Index records round-trip through external services, so the metadata that
//! comes back is open-world JSON. Every response path runs it through this
//! walk before serializing: primitives pass through, lists and maps recurse,
//! and anything nested past the depth ceiling is stringified so a response
//! can never fail to serialize because of one pathological field.

use serde_json::Value;
use std::collections::BTreeMap;

/// Nesting depth beyond which values are stringified unconditionally.
pub const MAX_DEPTH: usize = 5;

/// Marker substituted for a field whose stringification failed.
pub const UNSERIALIZABLE: &str = "<unserializable>";

/// A metadata value after sanitization.
#[derive(Debug, Clone, PartialEq)]
pub enum Sanitized {
    /// Null, boolean, number, or string — passed through untouched
    Primitive(Value),
    List(Vec<Sanitized>),
    Map(BTreeMap<String, Sanitized>),
    /// A value flattened to its JSON text (depth ceiling or fallback)
    Stringified(String),
}

impl Sanitized {
    pub fn into_value(self) -> Value {
        match self {
            Sanitized::Primitive(v) => v,
            Sanitized::List(items) => {
                Value::Array(items.into_iter().map(Sanitized::into_value).collect())
            }
            Sanitized::Map(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_value()))
                    .collect(),
            ),
            Sanitized::Stringified(s) => Value::String(s),
        }
    }
}

/// Sanitize a metadata value into the tagged representation.
pub fn sanitize(value: &Value) -> Sanitized {
    walk(value, 0)
}

/// Sanitize a metadata value back into plain JSON, ready for a response body.
pub fn sanitize_value(value: &Value) -> Value {
    sanitize(value).into_value()
}

fn walk(value: &Value, depth: usize) -> Sanitized {
    if depth >= MAX_DEPTH {
        return Sanitized::Stringified(stringify(value));
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {
            Sanitized::Primitive(value.clone())
        }
        Value::Array(items) => {
            Sanitized::List(items.iter().map(|v| walk(v, depth + 1)).collect())
        }
        Value::Object(map) => Sanitized::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), walk(v, depth + 1)))
                .collect(),
        ),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        // A bare string keeps its contents rather than gaining JSON quotes
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_else(|_| UNSERIALIZABLE.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(sanitize(&json!(null)), Sanitized::Primitive(json!(null)));
        assert_eq!(sanitize(&json!(true)), Sanitized::Primitive(json!(true)));
        assert_eq!(sanitize(&json!(42)), Sanitized::Primitive(json!(42)));
        assert_eq!(
            sanitize(&json!("page 3")),
            Sanitized::Primitive(json!("page 3"))
        );
    }

    #[test]
    fn test_list_recurses() {
        let s = sanitize(&json!([1, "two", [3]]));
        match s {
            Sanitized::List(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], Sanitized::Primitive(json!(1)));
                assert!(matches!(items[2], Sanitized::List(_)));
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_map_recurses() {
        let s = sanitize(&json!({"source": "paper.pdf", "page": 3}));
        match s {
            Sanitized::Map(map) => {
                assert_eq!(map["source"], Sanitized::Primitive(json!("paper.pdf")));
                assert_eq!(map["page"], Sanitized::Primitive(json!(3)));
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_depth_ceiling_stringifies() {
        // 6 nested objects: a.b.c.d.e.f — "f"'s value sits at depth 6
        let deep = json!({"a": {"b": {"c": {"d": {"e": {"f": 1}}}}}});
        let v = sanitize_value(&deep);
        // Walk down to depth 4; the object at depth 5 must be a string
        let at_depth_5 = &v["a"]["b"]["c"]["d"]["e"];
        assert!(at_depth_5.is_string(), "expected stringified, got {at_depth_5:?}");
        assert!(at_depth_5.as_str().unwrap().contains("\"f\""));
    }

    #[test]
    fn test_values_within_ceiling_keep_structure() {
        let ok = json!({"a": {"b": {"c": {"d": 1}}}});
        let v = sanitize_value(&ok);
        assert_eq!(v["a"]["b"]["c"]["d"], json!(1));
    }

    #[test]
    fn test_deep_string_keeps_contents_without_quotes() {
        let deep = json!([[[[["inner text"]]]]]);
        let v = sanitize_value(&deep);
        assert_eq!(v[0][0][0][0][0], json!("inner text"));
    }

    #[test]
    fn test_round_trip_is_serializable() {
        let nasty = json!({
            "citations": ["1", "2", {"odd": {"deeper": {"deepest": [1, 2]}}}],
            "score": 0.25,
            "flag": false,
        });
        let v = sanitize_value(&nasty);
        // Whatever the shape, it must serialize
        let s = serde_json::to_string(&v).unwrap();
        assert!(s.contains("citations"));
    }

    #[test]
    fn test_into_value_preserves_order_free_shape() {
        let input = json!({"z": 1, "a": [true, null]});
        let v = sanitize_value(&input);
        assert_eq!(v["z"], json!(1));
        assert_eq!(v["a"][0], json!(true));
        assert_eq!(v["a"][1], json!(null));
    }
}
