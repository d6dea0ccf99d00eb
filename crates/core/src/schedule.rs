use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// When a request should fire.
///
/// Exactly one of `epoch`, `relative`, `template`, `cron` must be set.
/// `jitter` is optional and applies on top of whichever strategy is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSpec {
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<i64>,
    /// Duration from the reference instant, e.g. `"5m"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relative: Option<String>,
    /// Expression evaluating to unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Recurrence pattern, e.g. `"*/5 * * * *"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jitter: Option<String>,
}

/// The one strategy a [`ScheduleSpec`] selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleStrategy<'a> {
    Absolute(i64),
    Relative(&'a str),
    Computed(&'a str),
    Recurring(&'a str),
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl ScheduleSpec {
    pub fn absolute(epoch: i64) -> Self {
        Self {
            epoch: Some(epoch),
            ..Default::default()
        }
    }

    pub fn relative(duration: impl Into<String>) -> Self {
        Self {
            relative: Some(duration.into()),
            ..Default::default()
        }
    }

    pub fn computed(expression: impl Into<String>) -> Self {
        Self {
            template: Some(expression.into()),
            ..Default::default()
        }
    }

    pub fn recurring(pattern: impl Into<String>) -> Self {
        Self {
            cron: Some(pattern.into()),
            ..Default::default()
        }
    }

    pub fn with_jitter(mut self, jitter: impl Into<String>) -> Self {
        self.jitter = Some(jitter.into());
        self
    }

    /// Resolve the one-of view. Blank strings count as unset.
    pub fn strategy(&self) -> Result<ScheduleStrategy<'_>, ValidationError> {
        let mut found = Vec::with_capacity(1);
        if let Some(epoch) = self.epoch {
            found.push(ScheduleStrategy::Absolute(epoch));
        }
        if let Some(d) = non_empty(&self.relative) {
            found.push(ScheduleStrategy::Relative(d));
        }
        if let Some(t) = non_empty(&self.template) {
            found.push(ScheduleStrategy::Computed(t));
        }
        if let Some(c) = non_empty(&self.cron) {
            found.push(ScheduleStrategy::Recurring(c));
        }

        match found.as_slice() {
            [only] => Ok(*only),
            _ => Err(ValidationError::ScheduleCardinality { found: found.len() }),
        }
    }

    pub fn jitter(&self) -> Option<&str> {
        non_empty(&self.jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_strategy() {
        assert_eq!(
            ScheduleSpec::absolute(1_700_000_000).strategy().unwrap(),
            ScheduleStrategy::Absolute(1_700_000_000)
        );
        assert_eq!(
            ScheduleSpec::relative("5m").strategy().unwrap(),
            ScheduleStrategy::Relative("5m")
        );
        assert_eq!(
            ScheduleSpec::computed("{{ now | unix }}").strategy().unwrap(),
            ScheduleStrategy::Computed("{{ now | unix }}")
        );
        assert_eq!(
            ScheduleSpec::recurring("*/5 * * * *").strategy().unwrap(),
            ScheduleStrategy::Recurring("*/5 * * * *")
        );
    }

    #[test]
    fn zero_strategies_rejected() {
        let err = ScheduleSpec::default().strategy().unwrap_err();
        assert_eq!(err, ValidationError::ScheduleCardinality { found: 0 });

        let jitter_only = ScheduleSpec {
            jitter: Some("30s".into()),
            ..Default::default()
        };
        assert!(jitter_only.strategy().is_err());
    }

    #[test]
    fn multiple_strategies_rejected() {
        let spec = ScheduleSpec {
            epoch: Some(10),
            relative: Some("5m".into()),
            cron: Some("* * * * *".into()),
            ..Default::default()
        };
        assert_eq!(
            spec.strategy().unwrap_err(),
            ValidationError::ScheduleCardinality { found: 3 }
        );
    }

    #[test]
    fn blank_strings_are_unset() {
        let spec = ScheduleSpec {
            relative: Some("  ".into()),
            cron: Some("0 * * * *".into()),
            ..Default::default()
        };
        assert_eq!(spec.strategy().unwrap(), ScheduleStrategy::Recurring("0 * * * *"));
    }

    #[test]
    fn deserializes_and_rejects_unknown_keys() {
        let spec: ScheduleSpec =
            serde_yaml::from_str("relative: 10s\njitter: \"±5s\"\n").unwrap();
        assert_eq!(spec.relative.as_deref(), Some("10s"));
        assert_eq!(spec.jitter(), Some("±5s"));

        assert!(serde_yaml::from_str::<ScheduleSpec>("every: 5m\n").is_err());
    }
}
