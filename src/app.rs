//! Process wiring: build the adapters, start the background tasks and run
//! the dispatcher until shutdown.

use crate::completion::{CompletionService, OpenAiCompletion};
use crate::config::Config;
use crate::governance::{ResetSchedule, run_quota_scheduler};
use crate::ledger::{Ledger, SqliteLedger};
use crate::orchestrator::{Dispatcher, Orchestrator};
use crate::platform::{DiscordPlatform, Platform, backoff_settings, spawn_supervised_listener};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const EVENT_QUEUE_CAPACITY: usize = 256;
const MAX_DB_CONNECTIONS: u32 = 4;

pub async fn load_system_prompt(path: &Path) -> Result<String> {
    let prompt = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read system prompt {}", path.display()))?;
    if prompt.trim().is_empty() {
        tracing::warn!(path = %path.display(), "system prompt file is empty");
    }
    Ok(prompt)
}

/// Open (creating if needed) the SQLite database and its tables.
pub async fn open_ledger(path: &Path) -> Result<Arc<dyn Ledger>> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_DB_CONNECTIONS)
        .connect_with(options)
        .await
        .with_context(|| format!("open database {}", path.display()))?;
    let ledger = SqliteLedger::new(pool)
        .await
        .context("prepare ledger tables")?;
    Ok(Arc::new(ledger))
}

pub async fn run(config: Config) -> Result<()> {
    config.require_credentials()?;

    let system_prompt = load_system_prompt(&config.system_prompt_path).await?;
    let ledger = open_ledger(&config.database_path).await?;
    let schedule = ResetSchedule::from_policy(&config.quota)?;

    let completion: Arc<dyn CompletionService> =
        Arc::new(OpenAiCompletion::new(&config.completion));
    let platform: Arc<dyn Platform> = Arc::new(DiscordPlatform::new(config.discord.clone()));

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&ledger),
        completion,
        Arc::clone(&platform),
        &config.quota,
        schedule,
        config.links.clone(),
        system_prompt,
    ));

    let cancel = CancellationToken::new();
    let (tx, rx) = tokio::sync::mpsc::channel(EVENT_QUEUE_CAPACITY);

    let (initial_backoff, max_backoff) = backoff_settings(&config.reliability);
    let listener = spawn_supervised_listener(
        Arc::clone(&platform),
        tx,
        initial_backoff,
        max_backoff,
        cancel.clone(),
    );
    let scheduler = tokio::spawn(run_quota_scheduler(
        Arc::clone(&ledger),
        schedule,
        cancel.clone(),
    ));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::error!(error = %e, "failed to listen for ctrl-c"),
        }
        shutdown.cancel();
    });

    tracing::info!(
        platform = platform.name(),
        database = %config.database_path.display(),
        allowance = config.quota.daily_allowance,
        "promptwarden running"
    );

    Dispatcher::new(orchestrator, platform, &config.quota)
        .run(rx, cancel.clone())
        .await;

    cancel.cancel();
    for (name, handle) in [("listener", listener), ("scheduler", scheduler)] {
        if let Err(e) = handle.await {
            tracing::error!(task = name, error = %e, "background task aborted");
        }
    }

    tracing::info!("promptwarden stopped");
    Ok(())
}
