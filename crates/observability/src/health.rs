//! Health-Check-Endpunkt fuer Partyline
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime und aktueller Peer-Phase

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub phase: String,
}

type PhasenQuelle = Arc<dyn Fn() -> &'static str + Send + Sync>;

/// Geteilter Zustand fuer den Health-Check-Handler
///
/// Die Phase wird bei jeder Anfrage frisch beim Peer abgefragt.
#[derive(Clone)]
pub struct HealthState {
    start_time: Instant,
    gestartet_um: DateTime<Utc>,
    phase: PhasenQuelle,
}

impl HealthState {
    pub fn neu(phase: impl Fn() -> &'static str + Send + Sync + 'static) -> Self {
        Self {
            start_time: Instant::now(),
            gestartet_um: Utc::now(),
            phase: Arc::new(phase),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn antwort(&self) -> HealthResponse {
        let phase = (self.phase)();
        // Vor `starten()` nimmt der Peer keine Verhandlungen an
        let status = if phase == "Null" {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
        HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: self.gestartet_um,
            uptime_seconds: self.uptime_seconds(),
            phase: phase.to_string(),
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// `GET /health` – 200 auch bei degraded, damit Health-Checks nicht failen
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.antwort()))
}
