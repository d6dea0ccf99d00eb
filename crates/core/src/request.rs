use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::body::BodyValue;
use crate::error::ValidationError;
use crate::method::HttpMethod;
use crate::schedule::ScheduleSpec;

/// The HTTP half of a request definition, before expressions are evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpTemplate {
    pub method: HttpMethod,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyValue>,
}

impl HttpTemplate {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: BodyValue) -> Self {
        self.body = Some(body);
        self
    }
}

/// A named request: when to fire and what to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDefinition {
    pub name: String,
    pub schedule: ScheduleSpec,
    pub http: HttpTemplate,
}

impl RequestDefinition {
    pub fn new(name: impl Into<String>, schedule: ScheduleSpec, http: HttpTemplate) -> Self {
        Self {
            name: name.into(),
            schedule,
            http,
        }
    }

    /// Structural checks that need no evaluation context.
    ///
    /// Schedule syntax (durations, cron patterns) is checked by the schedule
    /// engine, which owns the recurrence resolver.
    pub fn validate_shape(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::field("name", "must not be empty"));
        }
        if self.http.url.trim().is_empty() {
            return Err(ValidationError::field("http.url", "must not be empty"));
        }
        if let Some((key, _)) = self.http.headers.iter().find(|(k, _)| k.trim().is_empty()) {
            return Err(ValidationError::field(
                format!("http.headers[{key}]"),
                "header name must not be empty",
            ));
        }
        self.schedule.strategy()?;
        Ok(())
    }
}

/// A request ready to hand to a transport. Built fresh per evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRequest {
    pub name: String,
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    pub scheduled_for: DateTime<Utc>,
}
