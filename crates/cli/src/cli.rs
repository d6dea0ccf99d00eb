use std::path::PathBuf;

use clap::Parser;
use reqsched_core::Settings;
use reqsched_scheduler::RunMode;

/// Schedules and sends templated HTTP requests.
///
/// Requests are read from a YAML or JSON file. Each one carries a schedule
/// (epoch, relative duration, computed template, or cron) and an HTTP
/// template whose `{{ ... }}` expressions are evaluated at send time.
#[derive(Parser, Debug)]
#[command(name = "reqsched", version, about)]
pub struct CliArgs {
    /// Path to the requests file (.yaml, .yml, or .json).
    #[arg(long, short = 'c', env = "REQSCHED_CONFIG")]
    pub config: Option<PathBuf>,

    /// Resolve and print every request without sending anything.
    #[arg(long, conflicts_with = "once")]
    pub dry_run: bool,

    /// Send every request once, then exit.
    #[arg(long)]
    pub once: bool,

    /// Print dry-run output as JSON.
    #[arg(long, requires = "dry_run")]
    pub json: bool,

    /// Poll loops in continuous mode.
    #[arg(long, env = "REQSCHED_WORKERS")]
    pub workers: Option<usize>,

    /// Maximum simultaneous in-flight requests.
    #[arg(long, env = "REQSCHED_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Continuous-mode poll interval in milliseconds.
    #[arg(long, env = "REQSCHED_POLL_INTERVAL_MS")]
    pub poll_interval_ms: Option<u64>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "REQSCHED_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Seed for random functions and jitter (reproducible runs).
    #[arg(long, env = "REQSCHED_SEED")]
    pub seed: Option<u64>,

    /// Template variable, repeatable: --var tenant=acme
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,
}

impl CliArgs {
    pub fn mode(&self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else if self.once {
            RunMode::Once
        } else {
            RunMode::Continuous
        }
    }

    /// Overlay explicit flags onto env-derived settings. Zero is ignored.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(path) = &self.config {
            settings.config_path = Some(path.clone());
        }
        if let Some(n) = self.workers.filter(|n| *n > 0) {
            settings.workers = n;
        }
        if let Some(n) = self.concurrency.filter(|n| *n > 0) {
            settings.concurrency = n;
        }
        if let Some(ms) = self.poll_interval_ms.filter(|ms| *ms > 0) {
            settings.poll_interval_ms = ms;
        }
        if let Some(secs) = self.timeout_secs.filter(|s| *s > 0) {
            settings.timeout_secs = secs;
        }
        if self.seed.is_some() {
            settings.seed = self.seed;
        }
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}
