//! [`ConfigLoader`]: reads a config file and validates each request definition.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use reqsched_core::{
    contains_expression, BodyValue, DynamicSource, HttpTemplate, RequestDefinition,
    ValidationError,
};
use reqsched_template::TemplateEngine;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::schedule::{ScheduleEngine, ScheduleError};

use super::error::{LoadError, LoadResult, LoadStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Yaml,
    Json,
}

impl Format {
    fn from_path(path: &Path) -> Result<Self, LoadError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "yaml" | "yml" => Ok(Format::Yaml),
            "json" => Ok(Format::Json),
            _ => Err(LoadError::UnsupportedExtension { extension }),
        }
    }
}

/// First-pass view of a config file. Requests stay untyped until pass two.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    requests: Vec<Json>,
    #[serde(default)]
    variables: BTreeMap<String, Json>,
    #[serde(default)]
    seed: Option<u64>,
}

/// Everything a config file contributed.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Valid definitions, in file order.
    pub requests: Vec<RequestDefinition>,
    /// Values for `.Variables.<name>`; scalars are stringified.
    pub variables: BTreeMap<String, String>,
    pub seed: Option<u64>,
    /// One entry per element of `requests`, valid or not.
    pub results: Vec<LoadResult>,
}

impl LoadedConfig {
    pub fn rejected(&self) -> impl Iterator<Item = &LoadResult> {
        self.results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Rejected { .. }))
    }
}

/// Loads request definitions and checks them against a [`ScheduleEngine`].
///
/// Validation never evaluates an expression: schedules are checked for
/// syntax, templates are parsed and their function names resolved.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    schedule: ScheduleEngine,
}

impl ConfigLoader {
    pub fn new(schedule: ScheduleEngine) -> Self {
        Self { schedule }
    }

    /// Load a `.yaml`, `.yml`, or `.json` file.
    pub fn load_file(&self, path: &Path) -> Result<LoadedConfig, LoadError> {
        let format = Format::from_path(path)?;
        let content = fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let raw = match format {
            Format::Yaml => serde_yaml::from_str(&content)?,
            Format::Json => serde_json::from_str(&content)?,
        };
        let loaded = self.load_raw(raw)?;
        info!(
            path = %path.display(),
            loaded = loaded.requests.len(),
            rejected = loaded.rejected().count(),
            "loaded config"
        );
        Ok(loaded)
    }

    pub fn load_yaml(&self, content: &str) -> Result<LoadedConfig, LoadError> {
        self.load_raw(serde_yaml::from_str(content)?)
    }

    pub fn load_json(&self, content: &str) -> Result<LoadedConfig, LoadError> {
        self.load_raw(serde_json::from_str(content)?)
    }

    fn load_raw(&self, raw: RawConfig) -> Result<LoadedConfig, LoadError> {
        let mut loaded = LoadedConfig {
            variables: raw
                .variables
                .into_iter()
                .map(|(k, v)| (k, stringify(v)))
                .collect(),
            seed: raw.seed,
            ..Default::default()
        };
        let mut seen = HashSet::new();

        for (index, entry) in raw.requests.into_iter().enumerate() {
            let name = entry
                .get("name")
                .and_then(Json::as_str)
                .map(str::to_string);

            let outcome = serde_json::from_value::<RequestDefinition>(entry)
                .map_err(|e| e.to_string())
                .and_then(|def| {
                    self.validate(&def).map_err(|e| e.to_string())?;
                    if !seen.insert(def.name.clone()) {
                        return Err(
                            ValidationError::field("name", "duplicate request name").to_string()
                        );
                    }
                    Ok(def)
                });

            let status = match outcome {
                Ok(def) => {
                    debug!(index, request = %def.name, "request loaded");
                    loaded.requests.push(def);
                    LoadStatus::Loaded
                }
                Err(error) => {
                    warn!(index, request = name.as_deref().unwrap_or("<unnamed>"), error = %error, "request rejected");
                    LoadStatus::Rejected { error }
                }
            };
            loaded.results.push(LoadResult {
                index,
                name,
                status,
            });
        }

        if loaded.requests.is_empty() {
            return Err(LoadError::Empty {
                rejected: loaded.results.len(),
            });
        }
        Ok(loaded)
    }

    /// Full check of one definition: shape, schedule, and HTTP templates.
    pub fn validate(&self, def: &RequestDefinition) -> Result<(), ScheduleError> {
        def.validate_shape()?;
        self.schedule.validate(&def.schedule)?;
        validate_http(self.schedule.templates(), &def.http)
    }
}

fn validate_http(engine: &TemplateEngine, http: &HttpTemplate) -> Result<(), ScheduleError> {
    check_text(engine, &http.url, "http.url")?;
    for (key, value) in &http.headers {
        let field = format!("http.headers[{key}]");
        check_text(engine, key, &field)?;
        check_text(engine, value, &field)?;
    }
    match &http.body {
        Some(body) => check_body(engine, body, "http.body"),
        None => Ok(()),
    }
}

fn check_body(engine: &TemplateEngine, value: &BodyValue, field: &str) -> Result<(), ScheduleError> {
    match value {
        BodyValue::String(s) => check_text(engine, s, field),
        BodyValue::List(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_body(engine, item, &format!("{field}[{i}]"))),
        BodyValue::Map(map) => map.iter().try_for_each(|(key, item)| {
            let item_field = format!("{field}.{key}");
            check_text(engine, key, &item_field)?;
            check_body(engine, item, &item_field)
        }),
        BodyValue::Dynamic(dynamic) => match &dynamic.source {
            DynamicSource::Template(expr) => check_expression(engine, expr, field),
            DynamicSource::Literal(literal) => {
                check_body(engine, &BodyValue::from(literal.clone()), field)
            }
        },
        BodyValue::Null | BodyValue::Bool(_) | BodyValue::Int(_) | BodyValue::Float(_) => Ok(()),
    }
}

fn check_text(engine: &TemplateEngine, text: &str, field: &str) -> Result<(), ScheduleError> {
    if contains_expression(text) {
        check_expression(engine, text, field)
    } else {
        Ok(())
    }
}

fn check_expression(engine: &TemplateEngine, expr: &str, field: &str) -> Result<(), ScheduleError> {
    engine
        .validate(expr)
        .map_err(|e| ValidationError::field(field, e.to_string()).into())
}

fn stringify(value: Json) -> String {
    match value {
        Json::String(s) => s,
        Json::Null => String::new(),
        other => other.to_string(),
    }
}
