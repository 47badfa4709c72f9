mod bootstrap;
mod health;
mod routes;
#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use incident_core::config::{AppConfig, LoadOptions};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::health::HealthState;
use crate::routes::{EventsState, ACK_FALLBACK};

fn init_logging(config: &AppConfig) {
    use incident_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Config first so logging honours its level and format.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let digest_task = app
        .digest
        .as_ref()
        .map(|digest| Arc::clone(digest).spawn_schedule(app.config.digest.hour, shutdown_rx.clone()));

    let events = EventsState {
        dispatcher: Arc::clone(&app.dispatcher),
        verifier: Arc::clone(&app.verifier),
        ack_fallback: ACK_FALLBACK,
    };
    let health_state = HealthState {
        chat: Arc::clone(&app.chat),
        store: Arc::clone(&app.store),
        teams: Arc::clone(&app.teams),
        incidents_database_id: app.config.notion.incidents_database_id.clone(),
    };

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding to {address}"))?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        digest_enabled = app.digest.is_some(),
        "incident bot listening"
    );

    axum::serve(listener, routes::router(events, health_state))
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("http server error")?;

    tracing::info!(event_name = "system.server.stopping", correlation_id = "shutdown", "incident bot stopping");
    app.teams.stop();
    let _ = shutdown_tx.send(true);
    if let Some(task) = digest_task {
        let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
        if tokio::time::timeout(grace, task).await.is_err() {
            tracing::warn!(event_name = "system.server.digest_shutdown_timeout", "digest task did not stop in time");
        }
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "could not listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
