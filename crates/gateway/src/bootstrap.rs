//! AppState construction and background-task spawning.

use std::sync::Arc;

use anyhow::Context;
use sha2::{Digest, Sha256};

use tb_domain::config::{Config, ConfigSeverity};
use tb_llm::{ChatModel, LlmGateway, OpenAiCompatClient};
use tb_store::{ConversationRepo, IdReserver, ImageIntake, TicketStore};

use crate::runtime::limits::RateWindows;
use crate::runtime::lock::ConversationLockMap;
use crate::state::AppState;

/// Validate config, initialize every subsystem, and return a fully-wired
/// [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    let storage = &config.storage;
    let repo = Arc::new(
        ConversationRepo::new(&storage.conversations_dir(), storage.cache_capacity)
            .context("initializing conversation repo")?,
    );
    tracing::info!(dir = %storage.conversations_dir().display(), "conversation store ready");

    let ids = Arc::new(
        IdReserver::new(storage.used_ids_file(), storage.used_ids_lock())
            .context("initializing id reserver")?,
    );
    match ids.reclaim_stale_lock() {
        Ok(true) => tracing::warn!("reclaimed an orphaned id lock at startup"),
        Ok(false) => {}
        Err(e) => tracing::warn!(error = %e, "stale id lock check failed"),
    }

    let tickets = Arc::new(TicketStore::new(&storage.tickets_dir()).context("ticket store")?);
    let images = Arc::new(
        ImageIntake::new(&storage.uploads_dir(), storage.upload_max_bytes)
            .context("image intake")?,
    );
    tracing::info!("ticket store + image intake ready");

    // ── LLM gateway ──────────────────────────────────────────────────
    let client = OpenAiCompatClient::from_config(&config.llm).context("LLM client")?;
    if client.is_none() {
        tracing::warn!("no LLM_API_KEY set: pipeline stages answer with deterministic fallbacks");
    }
    let llm = Arc::new(LlmGateway::new(
        client.map(|c| Arc::new(c) as Arc<dyn ChatModel>),
        config.llm.clone(),
    ));
    tracing::info!(
        classifier = %config.llm.model_classifier,
        step = %config.llm.model_step,
        timeout_ms = config.llm.timeout_ms,
        "LLM gateway ready"
    );

    // ── Locks, rate windows ──────────────────────────────────────────
    let locks = Arc::new(ConversationLockMap::new());
    let limits = Arc::new(RateWindows::new());

    // ── Admin token (read once, hash for constant-time comparison) ──
    let admin_token_hash = config
        .server
        .admin_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(|t| Sha256::digest(t.as_bytes()).to_vec());
    if admin_token_hash.is_some() {
        tracing::info!("admin bearer-token auth enabled");
    }

    Ok(AppState {
        config,
        llm,
        repo,
        ids,
        tickets,
        images,
        locks,
        limits,
        admin_token_hash,
    })
}

/// Spawn the long-running housekeeping tasks: idle-lock pruning, rate
/// window cleanup, and the stale ID-lock sweeper.
pub fn spawn_background_tasks(state: &AppState) {
    {
        let locks = state.locks.clone();
        let limits = state.limits.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                locks.prune_idle();
                limits.prune();
            }
        });
    }

    {
        let ids = state.ids.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                interval.tick().await;
                if let Err(e) = ids.reclaim_stale_lock() {
                    tracing::warn!(error = %e, "stale id lock sweep failed");
                }
            }
        });
    }

    tracing::info!("background tasks spawned");
}
