//! Turns an [`HttpTemplate`] into a concrete payload by evaluating every
//! string that carries an expression.

use std::collections::BTreeMap;
use std::fmt;

use reqsched_core::{
    contains_expression, BodyValue, DynamicKind, DynamicSource, DynamicValue, HttpMethod,
    HttpTemplate,
};
use serde_json::Value as Json;
use thiserror::Error;

use crate::engine::TemplateEngine;
use crate::error::TemplateError;

/// Location of a field inside a request: `url`, `header[X-Id]`, `body.items[2].id`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn url() -> Self {
        Self("url".to_string())
    }

    pub fn header(key: &str) -> Self {
        Self(format!("header[{key}]"))
    }

    pub fn body() -> Self {
        Self("body".to_string())
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}.{key}", self.0))
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{index}]", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("failed to resolve {path}: {source}")]
pub struct ResolveError {
    pub path: FieldPath,
    #[source]
    pub source: TemplateError,
}

/// The HTTP parts of a request after every expression has been evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPayload {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Json>,
}

/// Walks URL, headers, and body, evaluating expressions in place.
#[derive(Debug, Clone)]
pub struct DynamicResolver {
    engine: TemplateEngine,
}

impl DynamicResolver {
    pub fn new(engine: TemplateEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Resolve a whole payload. Stops at the first failing field.
    pub fn resolve_payload(&self, http: &HttpTemplate) -> Result<ResolvedPayload, ResolveError> {
        let url = self.text(&http.url, FieldPath::url)?;

        let mut headers = BTreeMap::new();
        for (key, value) in &http.headers {
            let path = || FieldPath::header(key);
            let resolved_key = self.text(key, path)?;
            if headers.contains_key(&resolved_key) {
                return Err(key_collision(path(), &resolved_key));
            }
            let resolved_value = self.text(value, path)?;
            headers.insert(resolved_key, resolved_value);
        }

        let body = match &http.body {
            None | Some(BodyValue::Null) => None,
            Some(body) => Some(self.value(body, &FieldPath::body())?),
        };

        Ok(ResolvedPayload {
            method: http.method,
            url,
            headers,
            body,
        })
    }

    /// Resolve a single body value (exposed for callers that build bodies piecemeal).
    pub fn resolve_value(&self, value: &BodyValue) -> Result<Json, ResolveError> {
        self.value(value, &FieldPath::body())
    }

    fn text(&self, raw: &str, path: impl Fn() -> FieldPath) -> Result<String, ResolveError> {
        if !contains_expression(raw) {
            return Ok(raw.to_string());
        }
        self.engine
            .evaluate_to_string(raw)
            .map_err(|source| ResolveError { path: path(), source })
    }

    fn value(&self, value: &BodyValue, path: &FieldPath) -> Result<Json, ResolveError> {
        Ok(match value {
            BodyValue::Null => Json::Null,
            BodyValue::Bool(b) => Json::Bool(*b),
            BodyValue::Int(i) => Json::from(*i),
            BodyValue::Float(x) => serde_json::Number::from_f64(*x)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            BodyValue::String(s) => Json::String(self.text(s, || path.clone())?),
            BodyValue::List(items) => Json::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.value(item, &path.index(i)))
                    .collect::<Result<_, _>>()?,
            ),
            BodyValue::Map(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    let item_path = path.key(key);
                    let resolved_key = self.text(key, || item_path.clone())?;
                    if out.contains_key(&resolved_key) {
                        return Err(key_collision(item_path, &resolved_key));
                    }
                    out.insert(resolved_key, self.value(item, &item_path)?);
                }
                Json::Object(out)
            }
            BodyValue::Dynamic(dynamic) => self.dynamic(dynamic, path)?,
        })
    }

    fn dynamic(&self, dynamic: &DynamicValue, path: &FieldPath) -> Result<Json, ResolveError> {
        let fail = |source: TemplateError| ResolveError {
            path: path.clone(),
            source,
        };

        match (&dynamic.source, dynamic.kind) {
            (DynamicSource::Template(expr), DynamicKind::Integer) => {
                self.engine.evaluate_to_integer(expr).map(Json::from).map_err(fail)
            }
            (DynamicSource::Template(expr), _) => {
                self.engine.evaluate_to_string(expr).map(Json::String).map_err(fail)
            }

            // Literal strings are still evaluated when they carry an expression.
            (DynamicSource::Literal(Json::String(s)), DynamicKind::Integer) => {
                if contains_expression(s) {
                    self.engine.evaluate_to_integer(s).map(Json::from).map_err(fail)
                } else {
                    s.trim()
                        .parse::<i64>()
                        .map(Json::from)
                        .map_err(|_| fail(TemplateError::NotAnInteger(s.clone())))
                }
            }
            (DynamicSource::Literal(Json::Number(n)), DynamicKind::Integer) => n
                .as_i64()
                .map(Json::from)
                .ok_or_else(|| fail(TemplateError::NotAnInteger(n.to_string()))),
            (DynamicSource::Literal(other), DynamicKind::Integer) => {
                Err(fail(TemplateError::NotAnInteger(other.to_string())))
            }

            (DynamicSource::Literal(Json::String(s)), DynamicKind::String) => {
                self.text(s, || path.clone()).map(Json::String)
            }
            (DynamicSource::Literal(Json::Null), DynamicKind::String) => Ok(Json::Null),
            (DynamicSource::Literal(other), DynamicKind::String) => {
                Ok(Json::String(other.to_string()))
            }

            (DynamicSource::Literal(literal), DynamicKind::Any) => {
                self.value(&BodyValue::from(literal.clone()), path)
            }
        }
    }
}

/// Two keys that resolve to the same text would silently drop one entry.
fn key_collision(path: FieldPath, key: &str) -> ResolveError {
    ResolveError {
        path,
        source: TemplateError::exec(format!("key \"{key}\" collides with an earlier key")),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::{EvaluationContext, FixedClock};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn resolver() -> DynamicResolver {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let ctx = EvaluationContext::with_clock(Arc::new(FixedClock::new(t)));
        DynamicResolver::new(TemplateEngine::new(Arc::new(ctx)))
    }

    fn is_uuid(s: &str) -> bool {
        let lens: Vec<usize> = s.split('-').map(str::len).collect();
        lens == [8, 4, 4, 4, 12] && s.chars().all(|c| c == '-' || c.is_ascii_hexdigit())
    }

    #[test]
    fn literal_payload_is_unchanged() {
        let http = HttpTemplate::new(HttpMethod::Post, "https://example.com/a")
            .with_header("Accept", "application/json")
            .with_body(BodyValue::from(json!({"a": [1, "two", null], "b": {"c": true}})));
        let out = resolver().resolve_payload(&http).unwrap();
        assert_eq!(out.url, "https://example.com/a");
        assert_eq!(out.headers["Accept"], "application/json");
        assert_eq!(out.body, Some(json!({"a": [1, "two", null], "b": {"c": true}})));
    }

    #[test]
    fn body_strings_resolve_individually() {
        let http = HttpTemplate::new(HttpMethod::Post, "https://example.com")
            .with_body(BodyValue::from(json!({"id": "{{ uuid }}", "note": "static"})));
        let body = resolver().resolve_payload(&http).unwrap().body.unwrap();
        assert_eq!(body["note"], "static");
        assert!(is_uuid(body["id"].as_str().unwrap()));
    }

    #[test]
    fn url_and_headers_resolve() {
        let r = resolver();
        r.engine().context().set_variable("tenant", "acme");
        let http = HttpTemplate::new(HttpMethod::Get, "https://{{ .Variables.tenant }}.example.com/{{ seq }}")
            .with_header("X-{{ upper \"req\" }}-Id", "{{ seq }}");
        let out = r.resolve_payload(&http).unwrap();
        assert_eq!(out.url, "https://acme.example.com/1");
        assert_eq!(out.headers.get("X-REQ-Id").map(String::as_str), Some("2"));
    }

    #[test]
    fn dynamic_wrappers_follow_declared_kind() {
        let http = HttpTemplate::new(HttpMethod::Post, "https://example.com").with_body(
            BodyValue::from(json!({
                "at": {"template": "{{ now | unix }}", "type": "integer"},
                "when": {"template": "{{ now | rfc3339 }}"},
            })),
        );
        let body = resolver().resolve_payload(&http).unwrap().body.unwrap();
        assert_eq!(body["at"], json!(1_714_557_600));
        assert_eq!(body["when"], json!("2024-05-01T10:00:00Z"));
    }

    #[test]
    fn literal_dynamic_values() {
        let r = resolver();
        let int_lit = DynamicValue::literal(DynamicKind::Integer, json!("{{ addSeconds 1 now | unix }}"));
        assert_eq!(r.resolve_value(&BodyValue::Dynamic(int_lit)).unwrap(), json!(1_714_557_601));

        let plain = DynamicValue::literal(DynamicKind::Integer, json!("17"));
        assert_eq!(r.resolve_value(&BodyValue::Dynamic(plain)).unwrap(), json!(17));

        let any = DynamicValue::literal(DynamicKind::Any, json!({"n": "{{ 5 }}", "k": [true]}));
        assert_eq!(
            r.resolve_value(&BodyValue::Dynamic(any)).unwrap(),
            json!({"n": "5", "k": [true]})
        );

        let s = DynamicValue::literal(DynamicKind::String, json!(12));
        assert_eq!(r.resolve_value(&BodyValue::Dynamic(s)).unwrap(), json!("12"));
    }

    #[test]
    fn null_body_is_absent() {
        let http = HttpTemplate::new(HttpMethod::Post, "https://example.com").with_body(BodyValue::Null);
        assert_eq!(resolver().resolve_payload(&http).unwrap().body, None);
    }

    #[test]
    fn errors_carry_field_path() {
        let r = resolver();
        let http = HttpTemplate::new(HttpMethod::Post, "https://example.com")
            .with_body(BodyValue::from(json!({"a": [0, 1, {"b": "{{ missingFn }}"}]})));
        let err = r.resolve_payload(&http).unwrap_err();
        assert_eq!(err.path.as_str(), "body.a[2].b");
        assert!(matches!(err.source, TemplateError::UnknownFunction(_)));

        let http = HttpTemplate::new(HttpMethod::Get, "https://x").with_header("X-Bad", "{{ now ");
        // Missing close braces means no marker: left as-is.
        assert!(r.resolve_payload(&http).is_ok());

        let http = HttpTemplate::new(HttpMethod::Get, "https://x").with_header("X-Bad", "{{ unix 5 }}");
        assert_eq!(r.resolve_payload(&http).unwrap_err().path.as_str(), "header[X-Bad]");

        let http = HttpTemplate::new(HttpMethod::Get, "{{ ( }}");
        assert_eq!(r.resolve_payload(&http).unwrap_err().path, FieldPath::url());
    }

    #[test]
    fn colliding_keys_are_rejected() {
        let r = resolver();
        let http = HttpTemplate::new(HttpMethod::Get, "https://example.com")
            .with_header("X-A", "1")
            .with_header("X-{{ upper \"a\" }}", "2");
        let err = r.resolve_payload(&http).unwrap_err();
        assert!(err.path.as_str().starts_with("header[X-{{"), "path {}", err.path);
        assert!(matches!(&err.source, TemplateError::Execution(m) if m.contains("\"X-A\" collides")));

        let http = HttpTemplate::new(HttpMethod::Post, "https://example.com")
            .with_body(BodyValue::from(json!({"k": 1, "{{ lower \"K\" }}": 2})));
        let err = r.resolve_payload(&http).unwrap_err();
        assert!(err.path.as_str().starts_with("body."), "path {}", err.path);
        assert!(err.to_string().contains("\"k\" collides"));
    }

    #[test]
    fn integer_wrapper_rejects_text() {
        let http = HttpTemplate::new(HttpMethod::Post, "https://example.com")
            .with_body(BodyValue::from(json!({"n": {"template": "{{ uuid }}", "type": "integer"}})));
        let err = resolver().resolve_payload(&http).unwrap_err();
        assert_eq!(err.path.as_str(), "body.n");
        assert!(matches!(err.source, TemplateError::NotAnInteger(_)));
    }
}
