//! reqsched: schedule and send templated HTTP requests.
//!
//! Modes:
//! - `--dry-run`: resolve every request and print it; nothing is sent
//! - `--once`: send every request once, then exit
//! - default: poll for due requests until SIGINT/SIGTERM

mod cli;
mod output;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use reqsched_core::config::load_dotenv;
use reqsched_core::Settings;
use reqsched_scheduler::{
    ConfigLoader, DispatchConfig, Dispatcher, LoadStatus, ReqwestTransport, RunMode, RunReport,
    ScheduleEngine,
};
use reqsched_template::{DynamicResolver, TemplateEngine};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let mut settings = Settings::from_env();
    args.apply(&mut settings);
    settings.log_summary();

    let config_path = settings
        .config_path
        .clone()
        .context("no requests file: pass --config or set REQSCHED_CONFIG")?;

    let engine = TemplateEngine::default();
    let schedule = ScheduleEngine::with_cron(engine.clone());

    let loaded = ConfigLoader::new(schedule.clone())
        .load_file(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    for result in &loaded.results {
        if let LoadStatus::Rejected { error } = &result.status {
            warn!(
                index = result.index,
                request = result.name.as_deref().unwrap_or("<unnamed>"),
                error = %error,
                "skipping invalid request"
            );
        }
    }

    let ctx = engine.context();
    for (key, value) in loaded.variables.iter().chain(args.vars.iter().map(|(k, v)| (k, v))) {
        ctx.set_variable(key, value);
    }
    if let Some(seed) = settings.seed.or(loaded.seed) {
        info!(seed, "random functions seeded");
        ctx.set_seed(seed);
    }

    let dispatcher = Dispatcher::new(
        loaded.requests,
        DynamicResolver::new(engine.clone()),
        schedule,
        Arc::new(ReqwestTransport::new()),
        DispatchConfig::from(&settings),
    );

    let mode = args.mode();
    if mode != RunMode::DryRun {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => {
                    info!("shutdown signal received");
                    dispatcher.stop();
                }
                Err(e) => warn!(error = %e, "failed to listen for shutdown signals"),
            }
        });
    }

    match dispatcher.run(mode).await? {
        RunReport::DryRun(entries) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print!("{}", output::format_dry_run(&entries));
            }
        }
        RunReport::Once(outcomes) => {
            print!("{}", output::format_outcomes(&outcomes));
            let failed = outcomes.iter().filter(|o| !o.success).count();
            if failed > 0 {
                warn!(failed, total = outcomes.len(), "some requests did not succeed");
            }
        }
        RunReport::Continuous(stats) => {
            info!(?stats, "shutdown complete");
        }
    }
    Ok(())
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (cross-platform fallback).
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
