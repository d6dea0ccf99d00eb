use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

/// Positive integer or `default` (zero and garbage both fall back).
fn profiled_env_positive(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

/// Runtime settings for the dispatcher, read from the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Active profile name (empty = default).
    pub profile: String,
    pub config_path: Option<PathBuf>,
    pub workers: usize,
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub timeout_secs: u64,
    pub shutdown_grace_secs: u64,
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: String::new(),
            config_path: None,
            workers: DEFAULT_WORKERS,
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            shutdown_grace_secs: DEFAULT_SHUTDOWN_GRACE_SECS,
            seed: None,
        }
    }
}

impl Settings {
    /// Build settings from environment variables (call `load_dotenv()` first).
    /// Profile is read from `REQSCHED_PROFILE`. When set (e.g. `STAGING`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("REQSCHED_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build settings for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            config_path: profiled_env_opt(p, "REQSCHED_CONFIG").map(PathBuf::from),
            workers: profiled_env_positive(p, "REQSCHED_WORKERS", DEFAULT_WORKERS as u64)
                as usize,
            concurrency: profiled_env_positive(
                p,
                "REQSCHED_CONCURRENCY",
                DEFAULT_CONCURRENCY as u64,
            ) as usize,
            poll_interval_ms: profiled_env_positive(
                p,
                "REQSCHED_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            ),
            timeout_secs: profiled_env_positive(p, "REQSCHED_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS),
            shutdown_grace_secs: profiled_env_positive(
                p,
                "REQSCHED_SHUTDOWN_GRACE_SECS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            ),
            seed: profiled_env_opt(p, "REQSCHED_SEED").and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Settings loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  config:      {}",
            self.config_path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "(none)".to_string())
        );
        tracing::info!(
            "  dispatch:    workers={}, concurrency={}, poll={}ms",
            self.workers,
            self.concurrency,
            self.poll_interval_ms
        );
        tracing::info!(
            "  http:        timeout={}s, shutdown_grace={}s",
            self.timeout_secs,
            self.shutdown_grace_secs
        );
        match self.seed {
            Some(seed) => tracing::info!("  random:      seed={}", seed),
            None => tracing::info!("  random:      unseeded"),
        }
    }
}
