//! Human-readable rendering of run reports.

use std::fmt::Write;

use reqsched_scheduler::{DispatchOutcome, DryRunEntry};

pub fn format_dry_run(entries: &[DryRunEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(out, "Request: {}", entry.name);
        match (&entry.resolved, &entry.error) {
            (Some(r), _) => {
                let _ = writeln!(out, "  Method: {}", r.method);
                let _ = writeln!(out, "  URL: {}", r.url);
                let _ = writeln!(out, "  Scheduled for: {}", r.scheduled_for.to_rfc3339());
                if !r.headers.is_empty() {
                    let _ = writeln!(out, "  Headers:");
                    for (k, v) in &r.headers {
                        let _ = writeln!(out, "    {k}: {v}");
                    }
                }
                if let Some(body) = &r.body {
                    let _ = writeln!(out, "  Body: {body}");
                }
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "  Error: {error}");
            }
            (None, None) => {}
        }
        out.push('\n');
    }
    out
}

pub fn format_outcomes(outcomes: &[DispatchOutcome]) -> String {
    let width = outcomes.iter().map(|o| o.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for o in outcomes {
        let result = match (&o.status_line, &o.error) {
            (Some(status), _) => status.clone(),
            (None, Some(error)) => format!("error: {error}"),
            (None, None) => "-".to_string(),
        };
        let _ = writeln!(
            out,
            "{:<width$}  {:>7}  {:<6} {}  {}",
            o.name,
            format!("{}ms", o.duration.as_millis()),
            o.method,
            o.url,
            result,
        );
    }
    out
}
