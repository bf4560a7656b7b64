//! HTTP server shell: routes, startup checks, graceful shutdown.
//!
//! The webhook route is registered for every method so the dispatcher owns
//! the 405 contract; `/health` and `/` are plain liveness probes.

use crate::config::{self, Config};
use crate::max::MaxClient;
use crate::weather::WeatherClient;
use crate::webhook::Dispatcher;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

const SERVICE_NAME: &str = "MAX Weather Bot";
const WEBHOOK_PATH: &str = "/webhook/max";

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
}

/// Run the webhook server; binds to the resolved host:port from config.
/// Fails fast when no bot secret is resolvable — without one no reply can
/// ever be delivered. Blocks until shutdown (Ctrl+C or SIGTERM).
pub async fn run_server(config: Config) -> Result<()> {
    let secret = config::resolve_bot_secret(&config);
    if secret.is_none() {
        anyhow::bail!("no bot secret configured (set BOT_SECRET or bot.secret in the config file)");
    }
    let app = router(&config, secret);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("{} listening on {}", SERVICE_NAME, bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server exited")?;
    log::info!("server stopped");
    Ok(())
}

/// Build the router and its dispatcher. Split out so tests can serve it on a
/// free port without the startup checks.
pub fn router(config: &Config, secret: Option<String>) -> Router {
    let weather = WeatherClient::new(config.weather.base_url.clone());
    let max = MaxClient::new(secret.clone(), None);
    let dispatcher = Dispatcher::new(weather, max, secret, config.bot.signature_policy);
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route(WEBHOOK_PATH, any(webhook))
        .with_state(AppState {
            dispatcher: Arc::new(dispatcher),
        })
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, draining connections");
}

/// Webhook entry point: hands the raw request to the dispatcher.
async fn webhook(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let res = state.dispatcher.dispatch(&method, &headers, &body).await;
    (res.status, Json(res.body))
}

/// GET /health — liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": SERVICE_NAME }))
}

/// GET / — service metadata.
async fn index() -> Json<serde_json::Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "status": "running",
        "webhookUrl": WEBHOOK_PATH,
    }))
}
