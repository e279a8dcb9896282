//! Tecnibot — conversational support backend for a technical-service help
//! desk. `tecnibot serve` boots the HTTP surface; configuration comes from
//! the environment (see `Config`).

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::Method;
use clap::{Parser, Subcommand};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use tb_domain::config::Config;

use tb_gateway::{api, bootstrap};

#[derive(Parser)]
#[command(name = "tecnibot", about = "Help-desk conversation backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default).
    Serve,
    /// Validate the environment configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Arc::new(Config::from_env());

    match cli.command.unwrap_or(Command::Serve) {
        Command::CheckConfig => {
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues
                .iter()
                .any(|i| i.severity == tb_domain::config::ConfigSeverity::Error)
            {
                anyhow::bail!("configuration invalid");
            }
            println!("configuration OK");
            Ok(())
        }
        Command::Serve => serve(config).await,
    }
}

async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let state = bootstrap::build_app_state(config.clone())?;
    bootstrap::spawn_background_tasks(&state);

    // ── CORS (widget origins) ────────────────────────────────────────
    let cors = build_cors_layer(&config.server.allowed_origins);

    // ── Per-IP rate limiting (token bucket backstop) ────────────────
    let governor_config = tower_governor::governor::GovernorConfigBuilder::default()
        .per_second(config.server.limits.governor_per_second)
        .burst_size(config.server.limits.governor_burst)
        .finish()
        .context("governor: per_second and burst_size must be > 0")?;
    let governor = tower_governor::GovernorLayer {
        config: std::sync::Arc::new(governor_config),
    };
    tracing::info!(
        per_second = config.server.limits.governor_per_second,
        burst = config.server.limits.governor_burst,
        "per-IP rate limiting enabled"
    );

    let app = api::router(state.clone())
        .layer(cors)
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            config.server.limits.max_concurrent,
        ))
        .layer(governor)
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(addr = %addr, "tecnibot listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("axum server error")?;

    Ok(())
}

/// Exact-origin CORS from the configured allow-list; a lone `"*"` opens
/// everything (not recommended outside development).
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    use axum::http::header;

    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION];

    if allowed_origins.len() == 1 && allowed_origins[0] == "*" {
        tracing::warn!("CORS configured with wildcard \"*\" — all origins allowed");
        return CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(methods)
            .allow_headers(headers);
    }

    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|o| o.parse::<axum::http::HeaderValue>().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers(headers)
}
