//! Built-in expression functions.
//!
//! Functions that transform a time take it as their last argument so they
//! compose with pipes: `{{ now | addMinutes 15 | unix }}`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use reqsched_core::parse_duration;

use crate::context::EvaluationContext;
use crate::error::TemplateError;
use crate::value::Value;

pub(crate) const FUNCTION_NAMES: &[&str] = &[
    "now",
    "unix",
    "rfc3339",
    "addSeconds",
    "addMinutes",
    "addHours",
    "parseTime",
    "uuid",
    "randInt",
    "randFloat",
    "env",
    "var",
    "seq",
    "jitter",
    "upper",
    "lower",
    "trim",
];

pub(crate) fn is_known(name: &str) -> bool {
    FUNCTION_NAMES.contains(&name)
}

/// Typed access to a call's argument list.
struct Args<'a> {
    function: &'a str,
    values: Vec<Value>,
}

impl<'a> Args<'a> {
    fn expect(function: &'a str, values: Vec<Value>, want: usize) -> Result<Self, TemplateError> {
        if values.len() != want {
            return Err(TemplateError::exec(format!(
                "wrong number of args for {function}: want {want} got {}",
                values.len()
            )));
        }
        Ok(Self { function, values })
    }

    fn mismatch(&self, index: usize, want: &str) -> TemplateError {
        TemplateError::exec(format!(
            "{}: argument {} must be {want}, got {}",
            self.function,
            index + 1,
            self.values[index].type_name()
        ))
    }

    fn string(&self, index: usize) -> String {
        self.values[index].to_string()
    }

    fn int(&self, index: usize) -> Result<i64, TemplateError> {
        self.values[index]
            .as_int()
            .ok_or_else(|| self.mismatch(index, "an integer"))
    }

    fn time(&self, index: usize) -> Result<DateTime<Utc>, TemplateError> {
        self.values[index]
            .as_time()
            .ok_or_else(|| self.mismatch(index, "a time"))
    }
}

pub(crate) fn call(
    name: &str,
    args: Vec<Value>,
    ctx: &EvaluationContext,
) -> Result<Value, TemplateError> {
    match name {
        "now" => {
            Args::expect(name, args, 0)?;
            Ok(Value::Time(ctx.now()))
        }
        "unix" => {
            let a = Args::expect(name, args, 1)?;
            Ok(Value::Int(a.time(0)?.timestamp()))
        }
        "rfc3339" => {
            let a = Args::expect(name, args, 1)?;
            Ok(Value::Str(a.time(0)?.to_rfc3339_opts(SecondsFormat::Secs, true)))
        }
        "addSeconds" => shift(name, args, TimeDelta::try_seconds),
        "addMinutes" => shift(name, args, TimeDelta::try_minutes),
        "addHours" => shift(name, args, TimeDelta::try_hours),
        "parseTime" => {
            let a = Args::expect(name, args, 2)?;
            parse_time(&a.string(0), &a.string(1)).map(Value::Time)
        }
        "uuid" => {
            Args::expect(name, args, 0)?;
            let id = uuid::Builder::from_random_bytes(ctx.random_bytes()).into_uuid();
            Ok(Value::Str(id.to_string()))
        }
        "randInt" => {
            let a = Args::expect(name, args, 2)?;
            Ok(Value::Int(ctx.random_int(a.int(0)?, a.int(1)?)))
        }
        "randFloat" => {
            Args::expect(name, args, 0)?;
            Ok(Value::Float(ctx.random_float()))
        }
        "env" => {
            let a = Args::expect(name, args, 1)?;
            let key = a.string(0);
            let value = std::env::var(&key).unwrap_or_else(|_| {
                tracing::debug!(var = %key, "env var not set; rendering empty string");
                String::new()
            });
            Ok(Value::Str(value))
        }
        "var" => {
            let a = Args::expect(name, args, 1)?;
            Ok(Value::Str(ctx.variable(&a.string(0))))
        }
        "seq" => {
            Args::expect(name, args, 0)?;
            Ok(Value::Int(ctx.next_sequence()))
        }
        "jitter" => {
            let a = Args::expect(name, args, 2)?;
            let base = a.time(0)?;
            let magnitude = a.string(1);
            match parse_duration(&magnitude) {
                Ok(max) if max > TimeDelta::zero() => Ok(Value::Time(base + ctx.random_offset(max))),
                Ok(_) => Ok(Value::Time(base)),
                Err(e) => {
                    tracing::warn!(error = %e, "jitter magnitude unparsable; leaving time unchanged");
                    Ok(Value::Time(base))
                }
            }
        }
        "upper" => {
            let a = Args::expect(name, args, 1)?;
            Ok(Value::Str(a.string(0).to_uppercase()))
        }
        "lower" => {
            let a = Args::expect(name, args, 1)?;
            Ok(Value::Str(a.string(0).to_lowercase()))
        }
        "trim" => {
            let a = Args::expect(name, args, 1)?;
            Ok(Value::Str(a.string(0).trim().to_string()))
        }
        other => Err(TemplateError::UnknownFunction(other.to_string())),
    }
}

fn shift(
    name: &str,
    args: Vec<Value>,
    unit: fn(i64) -> Option<TimeDelta>,
) -> Result<Value, TemplateError> {
    let a = Args::expect(name, args, 2)?;
    let amount = a.int(0)?;
    let base = a.time(1)?;
    unit(amount)
        .and_then(|delta| base.checked_add_signed(delta))
        .map(Value::Time)
        .ok_or_else(|| TemplateError::exec(format!("{name}: {amount} is out of range")))
}

/// Parse `text` with a strftime `layout` or one of the names `RFC3339` / `RFC2822`.
///
/// Layouts without an offset are read as UTC; date-only layouts yield midnight.
fn parse_time(layout: &str, text: &str) -> Result<DateTime<Utc>, TemplateError> {
    let fail = |e: chrono::ParseError| {
        TemplateError::exec(format!("parseTime: cannot parse {text:?} as {layout:?}: {e}"))
    };

    match layout {
        "RFC3339" | "rfc3339" => {
            return DateTime::parse_from_rfc3339(text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(fail)
        }
        "RFC2822" | "rfc2822" => {
            return DateTime::parse_from_rfc2822(text)
                .map(|t| t.with_timezone(&Utc))
                .map_err(fail)
        }
        _ => {}
    }

    if let Ok(t) = DateTime::parse_from_str(text, layout) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, layout) {
        return Ok(t.and_utc());
    }
    NaiveDate::parse_from_str(text, layout)
        .map(|d| d.and_time(chrono::NaiveTime::MIN).and_utc())
        .map_err(fail)
}
