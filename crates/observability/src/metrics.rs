//! Prometheus-kompatible Metriken fuer Partyline
//!
//! Registrierte Metriken:
//! - `partyline_negotiations_started_total` – Counter: Begonnene Verhandlungen
//! - `partyline_negotiations_completed_total` – Counter: Erfolgreiche Verhandlungen
//! - `partyline_negotiations_aborted_total` – Counter: Abgebrochene Verhandlungen
//! - `partyline_peers_skipped_total` – Counter: Uebersprungene Kandidaten
//! - `partyline_discovered_peers_total` – Counter: Per Discovery gefundene Peers
//! - `partyline_remote_peers` – Gauge: Remotes im laufenden Anruf

use anyhow::Result;
use axum::{extract::State, response::IntoResponse, routing::get, Router};
use partyline_core::CallEvent;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Partyline-Prometheus-Metriken
#[derive(Clone)]
pub struct PartylineMetrics {
    pub registry: Arc<Registry>,

    // Verhandlung
    pub negotiations_started: IntCounter,
    pub negotiations_completed: IntCounter,
    pub negotiations_aborted: IntCounter,
    pub peers_skipped: IntCounter,

    // Discovery und Anruf
    pub discovered_peers: IntCounter,
    pub remote_peers: IntGauge,
}

impl PartylineMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let negotiations_started = zaehler(
            &registry,
            "partyline_negotiations_started_total",
            "Anzahl begonnener Verhandlungen (beide Rollen)",
        )?;
        let negotiations_completed = zaehler(
            &registry,
            "partyline_negotiations_completed_total",
            "Anzahl erfolgreich abgeschlossener Verhandlungen",
        )?;
        let negotiations_aborted = zaehler(
            &registry,
            "partyline_negotiations_aborted_total",
            "Anzahl abgebrochener Verhandlungen",
        )?;
        let peers_skipped = zaehler(
            &registry,
            "partyline_peers_skipped_total",
            "Anzahl uebersprungener Kandidaten",
        )?;
        let discovered_peers = zaehler(
            &registry,
            "partyline_discovered_peers_total",
            "Anzahl per Discovery gemeldeter Peers",
        )?;

        let remote_peers = IntGauge::with_opts(Opts::new(
            "partyline_remote_peers",
            "Remote-Peers im laufenden Anruf",
        ))?;
        registry.register(Box::new(remote_peers.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            negotiations_started,
            negotiations_completed,
            negotiations_aborted,
            peers_skipped,
            discovered_peers,
            remote_peers,
        })
    }

    /// Zaehlt ein Anruf-Ereignis in die passenden Counter
    ///
    /// Das Gauge `partyline_remote_peers` setzt der Aufrufer selbst, da
    /// Ereignisse nicht die ganze Remote-Liste tragen.
    pub fn ereignis_erfassen(&self, ereignis: &CallEvent) {
        match ereignis {
            CallEvent::VerhandlungGestartet { .. } => self.negotiations_started.inc(),
            CallEvent::VerhandlungAbgeschlossen { .. } => self.negotiations_completed.inc(),
            CallEvent::VerhandlungAbgebrochen { .. } => self.negotiations_aborted.inc(),
            CallEvent::PeerUebersprungen { .. } => self.peers_skipped.inc(),
            CallEvent::AnrufBeendet { .. } => self.remote_peers.set(0),
            CallEvent::AnrufPausiert { .. }
            | CallEvent::AnrufFortgesetzt { .. }
            | CallEvent::RemoteEntfernt { .. } => {}
        }
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn zaehler(registry: &Registry, name: &str, hilfe: &str) -> Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, hilfe))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: PartylineMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<PartylineMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            axum::http::StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4",
            )],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            axum::http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partyline_core::{CallId, PeerId};

    #[test]
    fn metriken_erstellen_erfolgreich() {
        let metriken = PartylineMetrics::neu().unwrap();
        assert!(!metriken.registry.gather().is_empty());
    }

    #[test]
    fn ereignisse_werden_gezaehlt() {
        let metriken = PartylineMetrics::neu().unwrap();
        metriken.ereignis_erfassen(&CallEvent::VerhandlungGestartet {
            call_id: CallId(1),
            negotiator: true,
        });
        metriken.ereignis_erfassen(&CallEvent::PeerUebersprungen {
            call_id: CallId(1),
            adresse: "127.0.0.1:9".parse().unwrap(),
            grund: "Timeout".into(),
        });
        metriken.ereignis_erfassen(&CallEvent::VerhandlungAbgeschlossen {
            call_id: CallId(1),
            teilnehmer: vec![PeerId::from("b")],
        });

        assert_eq!(metriken.negotiations_started.get(), 1);
        assert_eq!(metriken.peers_skipped.get(), 1);
        assert_eq!(metriken.negotiations_completed.get(), 1);
        assert_eq!(metriken.negotiations_aborted.get(), 0);
    }

    #[test]
    fn anruf_ende_setzt_remotes_zurueck() {
        let metriken = PartylineMetrics::neu().unwrap();
        metriken.remote_peers.set(3);
        metriken.ereignis_erfassen(&CallEvent::AnrufBeendet { call_id: CallId(2) });
        assert_eq!(metriken.remote_peers.get(), 0);
    }

    #[test]
    fn metriken_export_prometheus_format() {
        let metriken = PartylineMetrics::neu().unwrap();
        metriken.discovered_peers.inc();
        metriken.remote_peers.set(2);

        let output = metriken.exportieren().unwrap();
        assert!(output.contains("partyline_discovered_peers_total 1"));
        assert!(output.contains("partyline_remote_peers 2"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn alle_metriken_in_registry_registriert() {
        let metriken = PartylineMetrics::neu().unwrap();
        let families = metriken.registry.gather();
        let namen: Vec<&str> = families.iter().map(|f| f.get_name()).collect();

        for name in [
            "partyline_negotiations_started_total",
            "partyline_negotiations_completed_total",
            "partyline_negotiations_aborted_total",
            "partyline_peers_skipped_total",
            "partyline_discovered_peers_total",
            "partyline_remote_peers",
        ] {
            assert!(namen.contains(&name), "{} fehlt", name);
        }
    }
}
