//! # partyline-observability
//!
//! Observability-Crate fuer Partyline:
//! - Prometheus-kompatible Metriken (`/metrics`)
//! - Health-Check-Endpunkt (`/health`)
//! - Structured Logging via tracing-subscriber

pub mod health;
pub mod logging;
pub mod metrics;

pub use health::{health_router, HealthResponse, HealthState, HealthStatus};
pub use logging::logging_initialisieren;
pub use metrics::{metrics_router, PartylineMetrics};

use anyhow::Result;
use std::net::SocketAddr;
use tokio::sync::watch;

/// Startet den Observability-HTTP-Server (Metriken + Health)
///
/// Endpunkte:
/// - `GET /metrics` – Prometheus scrape format
/// - `GET /health`  – Health-Check JSON
///
/// Laeuft bis `shutdown_rx` `true` meldet.
pub async fn observability_server_starten(
    bind_addr: SocketAddr,
    metriken: PartylineMetrics,
    health: HealthState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    use axum::Router;

    let app = Router::new()
        .merge(metrics_router(metriken))
        .merge(health_router(health));

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Observability-Server gestartet");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while shutdown_rx.changed().await.is_ok() {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        })
        .await?;

    tracing::info!("Observability-Server gestoppt");
    Ok(())
}
