//! Request body model.
//!
//! Bodies arrive as arbitrary JSON/YAML and are folded into [`BodyValue`], a
//! closed set of variants the resolver can walk without reflection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// True when `text` contains an expression (both `{{` and `}}`).
pub fn contains_expression(text: &str) -> bool {
    text.contains("{{") && text.contains("}}")
}

/// Declared result kind of a dynamic wrapper.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DynamicKind {
    #[default]
    String,
    Integer,
    Any,
}

impl DynamicKind {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "string" | "str" => Some(DynamicKind::String),
            "integer" | "int" => Some(DynamicKind::Integer),
            "any" => Some(DynamicKind::Any),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicSource {
    Literal(Value),
    Template(String),
}

/// A value produced at send time rather than taken verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicValue {
    pub kind: DynamicKind,
    pub source: DynamicSource,
}

impl DynamicValue {
    pub fn template(kind: DynamicKind, expression: impl Into<String>) -> Self {
        Self {
            kind,
            source: DynamicSource::Template(expression.into()),
        }
    }

    pub fn literal(kind: DynamicKind, value: Value) -> Self {
        Self {
            kind,
            source: DynamicSource::Literal(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BodyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<BodyValue>),
    Map(BTreeMap<String, BodyValue>),
    Dynamic(DynamicValue),
}

impl BodyValue {
    /// Recognise `{"template": "..."}` and `{"template": "...", "type": "integer"}`.
    fn dynamic_wrapper(map: &serde_json::Map<String, Value>) -> Option<DynamicValue> {
        let template = map.get("template")?.as_str()?;
        let kind = match map.get("type") {
            None => DynamicKind::String,
            Some(Value::String(tag)) => DynamicKind::from_tag(tag)?,
            Some(_) => return None,
        };
        let only_known_keys = map.keys().all(|k| k == "template" || k == "type");
        only_known_keys.then(|| DynamicValue::template(kind, template))
    }
}

impl From<Value> for BodyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => BodyValue::Null,
            Value::Bool(b) => BodyValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => BodyValue::Int(i),
                None => BodyValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => BodyValue::String(s),
            Value::Array(items) => {
                BodyValue::List(items.into_iter().map(BodyValue::from).collect())
            }
            Value::Object(map) => match Self::dynamic_wrapper(&map) {
                Some(dynamic) => BodyValue::Dynamic(dynamic),
                None => BodyValue::Map(
                    map.into_iter()
                        .map(|(k, v)| (k, BodyValue::from(v)))
                        .collect(),
                ),
            },
        }
    }
}

impl<'de> Deserialize<'de> for BodyValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(BodyValue::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn marker_needs_both_delimiters() {
        assert!(contains_expression("{{ uuid }}"));
        assert!(contains_expression("id-{{seq}}-x"));
        assert!(!contains_expression("{{ open"));
        assert!(!contains_expression("close }}"));
        assert!(!contains_expression("plain"));
    }

    #[test]
    fn plain_json_maps_to_variants() {
        let body = BodyValue::from(json!({
            "name": "x",
            "count": 3,
            "ratio": 0.5,
            "ok": true,
            "none": null,
            "tags": ["a", "b"]
        }));
        let BodyValue::Map(map) = body else {
            panic!("expected map");
        };
        assert_eq!(map["name"], BodyValue::String("x".into()));
        assert_eq!(map["count"], BodyValue::Int(3));
        assert_eq!(map["ratio"], BodyValue::Float(0.5));
        assert_eq!(map["ok"], BodyValue::Bool(true));
        assert_eq!(map["none"], BodyValue::Null);
        assert_eq!(
            map["tags"],
            BodyValue::List(vec![
                BodyValue::String("a".into()),
                BodyValue::String("b".into())
            ])
        );
    }

    #[test]
    fn template_wrapper_becomes_dynamic() {
        let body = BodyValue::from(json!({"template": "{{ now | unix }}", "type": "integer"}));
        assert_eq!(
            body,
            BodyValue::Dynamic(DynamicValue::template(
                DynamicKind::Integer,
                "{{ now | unix }}"
            ))
        );

        let untyped = BodyValue::from(json!({"template": "{{ uuid }}"}));
        assert!(matches!(
            untyped,
            BodyValue::Dynamic(DynamicValue {
                kind: DynamicKind::String,
                ..
            })
        ));
    }

    #[test]
    fn objects_with_extra_keys_stay_maps() {
        let body = BodyValue::from(json!({"template": "x", "owner": "ops"}));
        assert!(matches!(body, BodyValue::Map(_)));

        let bad_type = BodyValue::from(json!({"template": "x", "type": "date"}));
        assert!(matches!(bad_type, BodyValue::Map(_)));
    }

    #[test]
    fn deserializes_from_yaml() {
        let body: BodyValue = serde_yaml::from_str(
            "id: \"{{ uuid }}\"\nat:\n  template: \"{{ now | unix }}\"\n  type: int\n",
        )
        .unwrap();
        let BodyValue::Map(map) = body else {
            panic!("expected map");
        };
        assert!(matches!(map["at"], BodyValue::Dynamic(_)));
    }
}
