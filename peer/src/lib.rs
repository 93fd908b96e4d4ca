//! partyline-peer – Bibliotheks-Root
//!
//! Verdrahtet Listener, lokalen Peer, Discovery und Observability zu einem
//! lauffaehigen Daemon. `main.rs` liest nur Argumente und Konfiguration.

pub mod config;

use anyhow::{Context, Result};
use config::PeerConfig;
use partyline_core::{CallEvent, NullMedia};
use partyline_discovery::DiscoveryService;
use partyline_negotiation::{Listener, LocalPeer};
use partyline_observability::{observability_server_starten, HealthState, PartylineMetrics};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

/// Wie lange nach dem Start entdeckte Peers in den ersten Anruf kommen
const ENTDECKUNGS_FENSTER: Duration = Duration::from_secs(2);

/// Wie lange beim Herunterfahren auf Hintergrund-Tasks gewartet wird
const ABSCHALT_FRIST: Duration = Duration::from_secs(3);

/// Haelt Konfiguration und Anrufziele bis zum Start zusammen
pub struct Daemon {
    pub config: PeerConfig,
    /// Ziele aus `--call`, noch unaufgeloest (`host:port`)
    pub ziele: Vec<String>,
}

/// Laufende Subsysteme eines gestarteten Daemons
pub struct LaufenderPeer {
    pub peer: LocalPeer,
    pub metriken: PartylineMetrics,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Daemon {
    pub fn neu(config: PeerConfig, ziele: Vec<String>) -> Self {
        Self { config, ziele }
    }

    /// Startet alle Subsysteme und laeuft bis Ctrl-C / SIGTERM
    pub async fn starten(self) -> Result<()> {
        let laufend = self.hochfahren().await?;
        tracing::info!("Peer laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        shutdown_signal().await?;
        tracing::info!("Shutdown-Signal empfangen, Peer wird beendet");
        laufend.herunterfahren().await;
        Ok(())
    }

    /// Startet alle Subsysteme und kehrt sofort zurueck
    ///
    /// Reihenfolge:
    /// 1. TCP-Listener binden, Peer erzeugen und starten
    /// 2. Ereignis-Bruecke zu den Metriken
    /// 3. Observability-Server (optional)
    /// 4. Liveness-Pruefung (optional)
    /// 5. Discovery (optional)
    /// 6. Verhandlung mit den `--call`-Zielen
    pub async fn hochfahren(self) -> Result<LaufenderPeer> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let listener = Listener::binden(self.config.bind_adresse()?)
            .await
            .context("TCP-Listener konnte nicht gebunden werden")?;
        let adresse = listener.lokale_adresse();

        let media = Arc::new(NullMedia::neu(self.config.capabilities()));
        let peer = LocalPeer::neu(self.config.verhandlungs_config(), adresse, media);
        tasks.push(tokio::spawn(listener.starten(peer.clone(), shutdown_rx.clone())));
        peer.starten()?;

        tracing::info!(
            peer_id = %peer.id(),
            adresse = %adresse,
            "Peer startet"
        );

        let metriken = PartylineMetrics::neu()?;
        tasks.push(tokio::spawn(ereignisse_erfassen(
            peer.clone(),
            peer.ereignisse_abonnieren(),
            metriken.clone(),
            shutdown_rx.clone(),
        )));

        if self.config.observability.aktiviert {
            let bind_addr = self.config.observability_bind_adresse()?;
            let phasen_peer = peer.clone();
            let health = HealthState::neu(move || phasen_peer.zustand().phase.name());
            let metriken = metriken.clone();
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(bind_addr, metriken, health, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server beendet");
                }
            }));
        }

        if let Some(timeout) = self.config.liveness_timeout() {
            tasks.push(tokio::spawn(liveness_pruefen(
                peer.clone(),
                timeout,
                shutdown_rx.clone(),
            )));
        }

        if self.config.discovery.aktiviert {
            match DiscoveryService::binden(self.config.discovery.clone(), adresse).await {
                Ok(service) => {
                    let (entdeckt_tx, entdeckt_rx) = mpsc::channel(64);
                    tasks.push(tokio::spawn(service.starten(entdeckt_tx, shutdown_rx.clone())));
                    tasks.push(tokio::spawn(entdeckte_verarbeiten(
                        peer.clone(),
                        entdeckt_rx,
                        metriken.clone(),
                        self.config.verhandlung.entdeckte_anrufen,
                    )));
                }
                Err(e) => {
                    tracing::warn!(fehler = %e, "Discovery nicht verfuegbar, Peer laeuft ohne");
                }
            }
        }

        if !self.ziele.is_empty() {
            let ziele = ziele_aufloesen(&self.ziele).await;
            let peer = peer.clone();
            tasks.push(tokio::spawn(async move {
                if !ziele.is_empty() {
                    anrufen(&peer, &ziele).await;
                }
            }));
        }

        Ok(LaufenderPeer {
            peer,
            metriken,
            shutdown_tx,
            tasks,
        })
    }
}

impl LaufenderPeer {
    /// Adresse des TCP-Listeners
    pub fn adresse(&self) -> SocketAddr {
        self.peer.adresse()
    }

    /// Bricht laufende Verhandlungen ab, beendet einen aktiven Anruf und
    /// stoppt alle Subsysteme
    pub async fn herunterfahren(self) {
        if self.peer.verhandlung_abbrechen().await {
            tracing::info!("Laufende Verhandlung abgebrochen");
        }
        if !self.peer.aktive_call_id().ist_keine() {
            if let Err(e) = self.peer.anruf_beenden().await {
                tracing::warn!(fehler = %e, "Anruf konnte nicht sauber beendet werden");
            }
        }

        let _ = self.shutdown_tx.send(true);
        for mut task in self.tasks {
            if tokio::time::timeout(ABSCHALT_FRIST, &mut task).await.is_err() {
                tracing::warn!("Task nicht rechtzeitig beendet, wird abgebrochen");
                task.abort();
            }
        }
        tracing::info!("Peer beendet");
    }
}

// ---------------------------------------------------------------------------
// Hintergrund-Tasks
// ---------------------------------------------------------------------------

/// Zaehlt Anruf-Ereignisse in die Metriken und fuehrt das Remote-Gauge nach
async fn ereignisse_erfassen(
    peer: LocalPeer,
    mut ereignisse: broadcast::Receiver<CallEvent>,
    metriken: PartylineMetrics,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            ereignis = ereignisse.recv() => {
                match ereignis {
                    Ok(ereignis) => {
                        tracing::debug!(ereignis = ?ereignis, "Anruf-Ereignis");
                        metriken.ereignis_erfassen(&ereignis);
                        metriken.remote_peers.set(peer.remote_anzahl() as i64);
                    }
                    Err(broadcast::error::RecvError::Lagged(verpasst)) => {
                        tracing::warn!(verpasst, "Ereignisse verpasst");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Entfernt einmal pro Sekunde Remotes ohne Aktivitaet
async fn liveness_pruefen(peer: LocalPeer, timeout: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut takt = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = takt.tick() => {
                let entfernt = peer.inaktive_entfernen(timeout);
                if entfernt > 0 {
                    tracing::info!(entfernt, "Inaktive Remotes entfernt");
                }
            }

            Ok(()) = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// Nimmt entdeckte Peers entgegen und verhandelt auf Wunsch mit denen aus
/// dem ersten Fenster nach dem Start
async fn entdeckte_verarbeiten(
    peer: LocalPeer,
    mut entdeckt_rx: mpsc::Receiver<SocketAddr>,
    metriken: PartylineMetrics,
    anrufen_aktiv: bool,
) {
    let mut bekannt: HashSet<SocketAddr> = HashSet::new();
    let mut erstes_fenster: Vec<SocketAddr> = Vec::new();
    let fenster_ende = tokio::time::sleep(ENTDECKUNGS_FENSTER);
    tokio::pin!(fenster_ende);
    let mut fenster_offen = anrufen_aktiv;

    loop {
        tokio::select! {
            adresse = entdeckt_rx.recv() => {
                let Some(adresse) = adresse else { break };
                if !bekannt.insert(adresse) {
                    continue;
                }
                metriken.discovered_peers.inc();
                tracing::info!(peer = %adresse, bekannt = bekannt.len(), "Neuer Peer im Netz");
                if fenster_offen {
                    erstes_fenster.push(adresse);
                }
            }

            _ = &mut fenster_ende, if fenster_offen => {
                fenster_offen = false;
                if erstes_fenster.is_empty() {
                    tracing::info!("Keine Peers im ersten Discovery-Fenster entdeckt");
                } else {
                    let kandidaten = std::mem::take(&mut erstes_fenster);
                    let peer = peer.clone();
                    tokio::spawn(async move { anrufen(&peer, &kandidaten).await });
                }
            }
        }
    }
}

/// Verhandelt mit den Kandidaten und protokolliert das Ergebnis
async fn anrufen(peer: &LocalPeer, kandidaten: &[SocketAddr]) {
    tracing::info!(kandidaten = kandidaten.len(), "Anruf wird verhandelt");
    match peer.verhandeln(kandidaten).await {
        Ok(call_id) => {
            tracing::info!(call_id = %call_id, teilnehmer = peer.remote_anzahl(), "Anruf laeuft");
        }
        Err(e) => {
            tracing::warn!(fehler = %e, "Anruf nicht zustande gekommen");
        }
    }
}

/// Loest `host:port`-Ziele auf; nicht aufloesbare Ziele werden uebersprungen
pub async fn ziele_aufloesen(ziele: &[String]) -> Vec<SocketAddr> {
    let mut adressen = Vec::with_capacity(ziele.len());
    for ziel in ziele {
        match tokio::net::lookup_host(ziel.as_str()).await {
            Ok(gefunden) => {
                // Discovery und Verhandlung laufen ueber IPv4
                let alle: Vec<SocketAddr> = gefunden.collect();
                match alle.iter().find(|a| a.is_ipv4()).or(alle.first()) {
                    Some(adresse) => adressen.push(*adresse),
                    None => tracing::warn!(ziel = %ziel, "Ziel ohne Adresse"),
                }
            }
            Err(e) => {
                tracing::warn!(ziel = %ziel, fehler = %e, "Ziel nicht aufloesbar");
            }
        }
    }
    adressen
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate())?;
        tokio::select! {
            ergebnis = tokio::signal::ctrl_c() => ergebnis?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use partyline_negotiation::Phase;

    fn test_config() -> PeerConfig {
        let mut config = PeerConfig::default();
        config.peer.bind_adresse = "127.0.0.1".into();
        config.peer.tcp_port = 0;
        config.discovery.aktiviert = false;
        config.observability.aktiviert = false;
        config
    }

    async fn warten_bis(mut bedingung: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if bedingung() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[tokio::test]
    async fn zwei_daemons_verbinden_sich() {
        let b = Daemon::neu(test_config(), vec![]).hochfahren().await.unwrap();
        let a = Daemon::neu(test_config(), vec![b.adresse().to_string()])
            .hochfahren()
            .await
            .unwrap();

        assert!(warten_bis(|| a.peer.zustand().phase == Phase::Playing).await);
        assert!(warten_bis(|| b.peer.zustand().phase == Phase::Playing).await);
        assert_eq!(a.peer.aktive_call_id(), b.peer.aktive_call_id());
        assert!(warten_bis(|| a.metriken.negotiations_completed.get() == 1).await);
        assert!(warten_bis(|| a.metriken.remote_peers.get() == 1).await);

        // Herunterfahren beendet den Anruf auch beim Gegenueber
        a.herunterfahren().await;
        assert!(warten_bis(|| b.peer.zustand().phase == Phase::Started).await);
        b.herunterfahren().await;
    }

    #[tokio::test]
    async fn unaufloesbare_ziele_werden_uebersprungen() {
        let ziele = vec![
            "127.0.0.1:4000".to_string(),
            "kein-gueltiges-ziel".to_string(),
        ];
        let adressen = ziele_aufloesen(&ziele).await;
        assert_eq!(adressen, vec!["127.0.0.1:4000".parse().unwrap()]);
    }

    #[tokio::test]
    async fn ohne_ziele_bleibt_peer_gestartet() {
        let laufend = Daemon::neu(test_config(), vec![]).hochfahren().await.unwrap();
        assert_eq!(laufend.peer.zustand().phase, Phase::Started);
        laufend.herunterfahren().await;
    }
}
