//! Duration string parsing shared by relative schedules and jitter.
//!
//! Syntax: an optional sign followed by one or more `<number><unit>` groups,
//! e.g. `"90s"`, `"1h30m"`, `"1.5h"`, `"-5m"`. Units: `ns`, `us` (`µs`),
//! `ms`, `s`, `m`, `h`, `d`. The bare string `"0"` is accepted as zero.

use chrono::TimeDelta;

use crate::error::ValidationError;

/// Nanoseconds per unit suffix.
fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(1_000_000_000),
        "m" => Some(60 * 1_000_000_000),
        "h" => Some(3_600 * 1_000_000_000),
        "d" => Some(86_400 * 1_000_000_000),
        _ => None,
    }
}

/// Parse a duration string such as `"5m"` or `"2h30m"` into a signed [`TimeDelta`].
pub fn parse_duration(input: &str) -> Result<TimeDelta, ValidationError> {
    let err = |reason: &str| ValidationError::Duration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let s = input.trim();
    let (negative, mut rest) = if let Some(tail) = s.strip_prefix('-') {
        (true, tail)
    } else if let Some(tail) = s.strip_prefix('+') {
        (false, tail)
    } else {
        (false, s)
    };

    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(err("empty duration"));
    }

    let mut total_nanos: u128 = 0;

    while !rest.is_empty() {
        let int_len = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (int_part, after) = rest.split_at(int_len);

        let (frac_part, after) = match after.strip_prefix('.') {
            Some(tail) => {
                let frac_len = tail
                    .find(|c: char| !c.is_ascii_digit())
                    .unwrap_or(tail.len());
                tail.split_at(frac_len)
            }
            None => ("", after),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err("expected a number"));
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);

        let factor = match unit_nanos(unit) {
            Some(f) => f,
            None if unit.is_empty() => return Err(err("missing unit")),
            None => return Err(err(&format!("unknown unit '{unit}'"))),
        };

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| err("number out of range"))?
        };
        total_nanos = whole
            .checked_mul(factor)
            .and_then(|n| total_nanos.checked_add(n))
            .ok_or_else(|| err("duration out of range"))?;

        if !frac_part.is_empty() {
            // Digits beyond nanosecond precision cannot contribute.
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: u128 = digits.parse().map_err(|_| err("number out of range"))?;
            let scale = 10u128.pow(digits.len() as u32);
            total_nanos = total_nanos
                .checked_add(frac * factor / scale)
                .ok_or_else(|| err("duration out of range"))?;
        }

        rest = tail;
    }

    let nanos = i64::try_from(total_nanos).map_err(|_| err("duration out of range"))?;
    Ok(TimeDelta::nanoseconds(if negative { -nanos } else { nanos }))
}

/// Parse a jitter magnitude.
///
/// A leading `±` or `+` is stripped: jitter is a magnitude and only ever
/// delays a schedule, so `"±30s"` means "up to 30 seconds later".
pub fn parse_jitter(input: &str) -> Result<TimeDelta, ValidationError> {
    let trimmed = input.trim();
    let magnitude = trimmed
        .strip_prefix('±')
        .or_else(|| trimmed.strip_prefix('+'))
        .unwrap_or(trimmed);
    parse_duration(magnitude).map_err(|e| match e {
        ValidationError::Duration { reason, .. } => ValidationError::Duration {
            input: input.to_string(),
            reason,
        },
        other => other,
    })
}
