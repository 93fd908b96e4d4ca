//! Lokaler Peer
//!
//! `LocalPeer` ist ein guenstig klonbares Handle auf den gemeinsamen
//! Zustand eines Peers. Alle Zustandsuebergaenge laufen unter genau einem
//! Mutex. Netzwerk-IO und Aufrufe der Medienschicht passieren nie mit
//! gehaltenem Lock.
//!
//! ## Aufgaben
//! - Identitaet und Listen-Adresse
//! - Phase, Rolle und Flags (`PeerState`)
//! - Registry der Remotes des laufenden Anrufs inkl. Port-Vergabe
//! - die (hoechstens eine) laufende Verhandlungs-Session
//! - Anrufsteuerung nach erfolgreicher Verhandlung (Pause, Fortsetzen, Ende)
//! - Liveness-Pruefung der Remotes

use parking_lot::{Mutex, MutexGuard};
use partyline_core::media::MediaBackend;
use partyline_core::types::{CallId, CapabilitySet, MediaCaps, PeerId};
use partyline_core::CallEvent;
use partyline_protocol::{ControlMessage, Payload};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use crate::config::VerhandlungsConfig;
use crate::error::{NegotiationError, NegotiationResult};
use crate::registry::{PeerRegistry, RemotePeer};
use crate::rpc;
use crate::session::NegotiationSession;
use crate::state::{Phase, PeerState, RemoteState};

/// Kapazitaet des Ereignis-Kanals
const EREIGNIS_KAPAZITAET: usize = 256;

/// Veraenderlicher Zustand, nur unter dem Lock zugreifbar
#[derive(Debug)]
pub(crate) struct PeerInner {
    pub(crate) state: PeerState,
    pub(crate) aktive_call_id: CallId,
    pub(crate) session: Option<NegotiationSession>,
    pub(crate) registry: PeerRegistry,
    /// Vereinbarte eigene Sende-Capabilities des laufenden Anrufs
    pub(crate) ausgehandelt: Option<MediaCaps>,
}

impl PeerInner {
    /// Session des Negotiators fuer `call_id`, sofern nicht abgebrochen
    pub(crate) fn negotiator_teile(
        &mut self,
        call_id: CallId,
    ) -> NegotiationResult<(&mut NegotiationSession, &mut PeerRegistry)> {
        let session = match self.session.as_mut() {
            Some(s) if s.call_id == call_id && s.ist_negotiator() => s,
            _ => return Err(NegotiationError::abgebrochen("Session nicht mehr aktiv")),
        };
        if session.ist_abgebrochen() {
            return Err(NegotiationError::abgebrochen("Verhandlung abgebrochen"));
        }
        Ok((session, &mut self.registry))
    }

    /// Session des Negotiatees fuer `call_id`
    pub(crate) fn negotiatee_teile(
        &mut self,
        call_id: CallId,
    ) -> NegotiationResult<(&mut NegotiationSession, &mut PeerRegistry)> {
        match self.session.as_mut() {
            Some(s) if s.call_id == call_id && s.ist_negotiatee() => Ok((s, &mut self.registry)),
            _ => Err(NegotiationError::UnbekannteCallId(call_id)),
        }
    }
}

struct PeerShared {
    id: PeerId,
    adresse: SocketAddr,
    config: VerhandlungsConfig,
    lokale_caps: CapabilitySet,
    media: Arc<dyn MediaBackend>,
    events: broadcast::Sender<CallEvent>,
    zustand: Mutex<PeerInner>,
}

/// Handle auf den lokalen Peer (Clone teilt denselben Zustand)
#[derive(Clone)]
pub struct LocalPeer {
    inner: Arc<PeerShared>,
}

impl std::fmt::Debug for LocalPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPeer")
            .field("id", &self.inner.id)
            .field("adresse", &self.inner.adresse)
            .finish_non_exhaustive()
    }
}

impl LocalPeer {
    /// Erzeugt einen Peer in Phase Null
    ///
    /// Die lokalen Capabilities werden einmalig von der Medienschicht
    /// abgefragt.
    pub fn neu(
        config: VerhandlungsConfig,
        adresse: SocketAddr,
        media: Arc<dyn MediaBackend>,
    ) -> Self {
        let id = PeerId::erzeugen(&config.hostname, adresse.port());
        let lokale_caps = media.lokale_capabilities();
        let (events, _) = broadcast::channel(EREIGNIS_KAPAZITAET);
        let zustand = PeerInner {
            state: PeerState::neu(),
            aktive_call_id: CallId::KEINE,
            session: None,
            registry: PeerRegistry::neu(config.port_basis()),
            ausgehandelt: None,
        };

        tracing::debug!(peer_id = %id, adresse = %adresse, "Lokaler Peer erzeugt");

        Self {
            inner: Arc::new(PeerShared {
                id,
                adresse,
                config,
                lokale_caps,
                media,
                events,
                zustand: Mutex::new(zustand),
            }),
        }
    }

    /// Null/Stopped -> Started
    pub fn starten(&self) -> NegotiationResult<()> {
        let mut z = self.lock();
        match z.state.phase {
            Phase::Null | Phase::Stopped => {
                z.state.phase = Phase::Started;
                tracing::info!(peer_id = %self.inner.id, adresse = %self.inner.adresse, "Peer gestartet");
                Ok(())
            }
            Phase::Started => Ok(()),
            andere => Err(NegotiationError::invariante(format!(
                "Start in Phase {} nicht moeglich",
                andere.name()
            ))),
        }
    }

    // -----------------------------------------------------------------------
    // Abfragen
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &PeerId {
        &self.inner.id
    }

    pub fn adresse(&self) -> SocketAddr {
        self.inner.adresse
    }

    pub fn config(&self) -> &VerhandlungsConfig {
        &self.inner.config
    }

    pub fn lokale_capabilities(&self) -> &CapabilitySet {
        &self.inner.lokale_caps
    }

    pub fn zustand(&self) -> PeerState {
        self.lock().state
    }

    pub fn aktive_call_id(&self) -> CallId {
        self.lock().aktive_call_id
    }

    /// Momentaufnahme der Remotes des laufenden Anrufs
    pub fn remote_peers(&self) -> Vec<RemotePeer> {
        self.lock().registry.remotes().to_vec()
    }

    pub fn remote_anzahl(&self) -> usize {
        self.lock().registry.remotes().len()
    }

    /// Call-ID der laufenden Verhandlung, falls vorhanden
    pub fn session_call_id(&self) -> Option<CallId> {
        self.lock().session.as_ref().map(|s| s.call_id)
    }

    /// Anzahl der Kandidaten in der laufenden Verhandlung
    pub fn session_kandidaten(&self) -> usize {
        self.lock().session.as_ref().map_or(0, |s| s.remotes.len())
    }

    /// Aktuell reservierte Empfangsports (sortiert)
    pub fn belegte_ports(&self) -> Vec<u16> {
        self.lock().registry.ports().belegt().collect()
    }

    pub fn ausgehandelte_caps(&self) -> Option<MediaCaps> {
        self.lock().ausgehandelt.clone()
    }

    /// Abonniert alle kuenftigen Anruf-Ereignisse
    pub fn ereignisse_abonnieren(&self) -> broadcast::Receiver<CallEvent> {
        self.inner.events.subscribe()
    }

    // -----------------------------------------------------------------------
    // Interne Helfer
    // -----------------------------------------------------------------------

    pub(crate) fn lock(&self) -> MutexGuard<'_, PeerInner> {
        self.inner.zustand.lock()
    }

    pub(crate) fn media(&self) -> &dyn MediaBackend {
        self.inner.media.as_ref()
    }

    pub(crate) fn ereignis(&self, ereignis: CallEvent) {
        // Ohne Abonnenten ist das Senden ein Fehler, der ignoriert werden kann
        let _ = self.inner.events.send(ereignis);
    }

    // -----------------------------------------------------------------------
    // Anrufsteuerung
    // -----------------------------------------------------------------------

    /// Playing -> Paused; PAUSE_CALL an alle Remotes
    pub async fn anruf_pausieren(&self) -> NegotiationResult<()> {
        self.pause_umschalten(true).await
    }

    /// Paused -> Playing; RESUME_CALL an alle Remotes
    pub async fn anruf_fortsetzen(&self) -> NegotiationResult<()> {
        self.pause_umschalten(false).await
    }

    async fn pause_umschalten(&self, pausieren: bool) -> NegotiationResult<()> {
        let (von, nach) = if pausieren {
            (Phase::Playing, Phase::Paused)
        } else {
            (Phase::Paused, Phase::Playing)
        };

        let (call_id, remotes) = {
            let mut z = self.lock();
            if z.state.phase != von {
                return Err(NegotiationError::invariante(format!(
                    "Phase {} statt {}",
                    z.state.phase.name(),
                    von.name()
                )));
            }
            z.state.phase = nach;
            let remotes: Vec<(Option<PeerId>, SocketAddr)> = z
                .registry
                .remotes()
                .iter()
                .map(|r| (r.id.clone(), r.adresse))
                .collect();
            (z.aktive_call_id, remotes)
        };

        for id in remotes.iter().filter_map(|(id, _)| id.as_ref()) {
            if pausieren {
                self.media().remote_pausieren(id);
            } else {
                self.media().remote_fortsetzen(id);
            }
        }

        let ziele: Vec<SocketAddr> = remotes.iter().map(|(_, a)| *a).collect();
        let eigene_id = self.id().clone();
        rpc::an_alle(&ziele, self.config().rundlauf_timeout, |_| {
            let payload = if pausieren {
                Payload::PauseCall {
                    call_id,
                    peer_id: eigene_id.clone(),
                }
            } else {
                Payload::ResumeCall {
                    call_id,
                    peer_id: eigene_id.clone(),
                }
            };
            ControlMessage::neu(payload)
        })
        .await;

        tracing::info!(call_id = %call_id, phase = nach.name(), "Anruf umgeschaltet");
        Ok(())
    }

    /// Beendet den laufenden Anruf
    ///
    /// END_CALL geht Best-Effort an alle Remotes; lokal werden alle Remotes
    /// entfernt und die Medienschicht gestoppt.
    pub async fn anruf_beenden(&self) -> NegotiationResult<()> {
        let call_id = self.aktive_call_id();
        if call_id.ist_keine() {
            return Err(NegotiationError::invariante("Kein aktiver Anruf"));
        }
        let remotes = self
            .anruf_abbauen(call_id)
            .ok_or(NegotiationError::UnbekannteCallId(call_id))?;

        let ziele: Vec<SocketAddr> = remotes.iter().map(|r| r.adresse).collect();
        let eigene_id = self.id().clone();
        rpc::an_alle(&ziele, self.config().kurz_timeout, |_| {
            ControlMessage::neu(Payload::EndCall {
                call_id,
                peer_id: eigene_id.clone(),
            })
        })
        .await;
        Ok(())
    }

    /// Baut den Anruf lokal ab, ohne Nachrichten zu senden
    ///
    /// Gibt die entfernten Remotes zurueck, `None` wenn `call_id` nicht aktiv ist.
    pub(crate) fn anruf_abbauen(&self, call_id: CallId) -> Option<Vec<RemotePeer>> {
        let remotes = {
            let mut z = self.lock();
            if call_id.ist_keine() || z.aktive_call_id != call_id {
                return None;
            }
            let remotes = z.registry.alle_entfernen();
            z.aktive_call_id = CallId::KEINE;
            z.ausgehandelt = None;
            z.state.phase = Phase::Stopped;
            z.state.rolle = None;
            remotes
        };

        self.media().transport_stoppen();

        {
            let mut z = self.lock();
            if z.state.phase == Phase::Stopped {
                z.state.phase = Phase::Started;
            }
        }

        tracing::info!(call_id = %call_id, remotes = remotes.len(), "Anruf beendet");
        self.ereignis(CallEvent::AnrufBeendet { call_id });
        Some(remotes)
    }

    /// Entfernt einzelne Remotes aus dem laufenden Anruf
    ///
    /// Bleibt kein Remote uebrig, endet der Anruf lokal.
    pub(crate) fn remotes_entfernen(&self, call_id: CallId, ids: &[PeerId]) -> usize {
        let (entfernt, leer) = {
            let mut z = self.lock();
            if call_id.ist_keine() || z.aktive_call_id != call_id {
                return 0;
            }
            let entfernt: Vec<RemotePeer> =
                ids.iter().filter_map(|id| z.registry.entfernen(id)).collect();
            (entfernt, z.registry.ist_leer())
        };

        for remote in &entfernt {
            if let Some(id) = &remote.id {
                self.media().remote_entfernen(id);
                tracing::info!(call_id = %call_id, peer_id = %id, "Remote entfernt");
                self.ereignis(CallEvent::RemoteEntfernt {
                    call_id,
                    peer_id: id.clone(),
                });
            }
        }

        if !entfernt.is_empty() && leer {
            self.anruf_abbauen(call_id);
        }
        entfernt.len()
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    /// Aktivitaetssignal der Medienschicht fuer einen Remote
    pub fn remote_aktivitaet(&self, peer_id: &PeerId) -> bool {
        let mut z = self.lock();
        match z.registry.finden_mut(peer_id) {
            Some(remote) => {
                remote.zuletzt_gesehen = Instant::now();
                true
            }
            None => false,
        }
    }

    /// Entfernt alle Remotes, die laenger als `timeout` inaktiv sind
    ///
    /// Wirkt wie ein END_CALL der betroffenen Remotes.
    pub fn inaktive_entfernen(&self, timeout: Duration) -> usize {
        let (call_id, inaktiv) = {
            let mut z = self.lock();
            let jetzt = Instant::now();
            let inaktiv: Vec<PeerId> = z
                .registry
                .remotes_mut()
                .filter(|r| jetzt.duration_since(r.zuletzt_gesehen) > timeout)
                .filter_map(|r| {
                    r.zustand = RemoteState::Failed;
                    r.id.clone()
                })
                .collect();
            (z.aktive_call_id, inaktiv)
        };

        if inaktiv.is_empty() {
            return 0;
        }
        tracing::warn!(call_id = %call_id, anzahl = inaktiv.len(), "Inaktive Remotes werden entfernt");
        self.remotes_entfernen(call_id, &inaktiv)
    }
}

// ---------------------------------------------------------------------------
// Negotiatee: Timeout und Abbruch
// ---------------------------------------------------------------------------

impl LocalPeer {
    /// Startet den Tick-Timer einer Negotiatee-Session
    pub(crate) fn timer_starten(&self, call_id: CallId) -> AbortHandle {
        let peer = self.clone();
        let intervall = self.config().tick_intervall;
        let task = tokio::spawn(async move {
            let mut takt = tokio::time::interval_at(tokio::time::Instant::now() + intervall, intervall);
            loop {
                takt.tick().await;
                if !peer.timeout_tick(call_id).await {
                    break;
                }
            }
        });
        task.abort_handle()
    }

    /// Ein Tick ohne Fortschritt; gibt false zurueck wenn der Timer enden soll
    async fn timeout_tick(&self, call_id: CallId) -> bool {
        let ticks = {
            let mut z = self.lock();
            match z.session.as_mut() {
                Some(s) if s.call_id == call_id && s.ist_negotiatee() => s.tick(),
                _ => return false,
            }
        };

        let limit = self.config().tick_limit;
        if ticks < limit {
            tracing::trace!(call_id = %call_id, ticks, limit, "Negotiatee-Tick");
            return true;
        }

        {
            let mut z = self.lock();
            if let Some(s) = z.session.as_mut().filter(|s| s.call_id == call_id) {
                s.timer_loesen();
            }
        }
        self.negotiatee_abbrechen(
            call_id,
            NegotiationError::Timeout(format!("{} Ticks ohne Fortschritt", ticks)),
        )
        .await;
        false
    }

    /// Verwirft die Negotiatee-Session ohne Nachricht an den Negotiator
    ///
    /// Gibt die Adresse des Negotiators zurueck, `None` wenn keine passende
    /// Session existiert.
    pub(crate) fn negotiatee_session_verwerfen(
        &self,
        call_id: CallId,
        fehler: bool,
        timeout: bool,
    ) -> Option<SocketAddr> {
        let mut z = self.lock();
        let passt = z
            .session
            .as_ref()
            .is_some_and(|s| s.call_id == call_id && s.ist_negotiatee());
        if !passt {
            return None;
        }
        let session = z.session.take()?;
        let adresse = session.negotiator_adresse();
        session.verwerfen(&mut z.registry);
        z.state.zuruecksetzen(fehler, timeout);
        adresse
    }

    /// Bricht die Negotiatee-Session ab und meldet das dem Negotiator
    pub(crate) async fn negotiatee_abbrechen(&self, call_id: CallId, fehler: NegotiationError) {
        let timeout = fehler.ist_timeout();
        let Some(negotiator) = self.negotiatee_session_verwerfen(call_id, true, timeout) else {
            return;
        };

        tracing::warn!(call_id = %call_id, fehler = %fehler, "Verhandlung als Negotiatee abgebrochen");

        let abbruch = ControlMessage::neu(Payload::CancelNegotiate {
            call_id,
            sender_id: self.id().clone(),
        });
        rpc::best_effort(negotiator, abbruch, self.config().kurz_timeout).await;

        self.ereignis(CallEvent::VerhandlungAbgebrochen {
            call_id,
            grund: fehler.to_string(),
            timeout,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partyline_core::NullMedia;

    fn test_peer() -> LocalPeer {
        LocalPeer::neu(
            VerhandlungsConfig {
                hostname: "testhost".into(),
                ..Default::default()
            },
            SocketAddr::from(([127, 0, 0, 1], 4000)),
            Arc::new(NullMedia::default()),
        )
    }

    /// Richtet einen laufenden Anruf mit den angegebenen Remotes ein
    fn anruf_einrichten(peer: &LocalPeer, call_id: CallId, ids: &[&str]) {
        let mut z = peer.lock();
        for (n, id) in ids.iter().enumerate() {
            let adresse = SocketAddr::from(([127, 0, 0, 1], 5000 + n as u16));
            let mut r = z
                .registry
                .remote_erzeugen(adresse, Some(PeerId::from(*id)))
                .unwrap();
            r.zustand = RemoteState::Playing;
            z.registry.hinzufuegen(r).unwrap();
        }
        z.aktive_call_id = call_id;
        z.state.phase = Phase::Playing;
    }

    #[test]
    fn id_aus_hostname_und_port() {
        let peer = test_peer();
        assert!(peer.id().as_str().starts_with("testhost:4000-"));
        assert_eq!(peer.zustand().phase, Phase::Null);
    }

    #[test]
    fn starten_nur_aus_null() {
        let peer = test_peer();
        peer.starten().unwrap();
        assert_eq!(peer.zustand().phase, Phase::Started);
        peer.lock().state.phase = Phase::Negotiating;
        assert!(peer.starten().is_err());
    }

    #[test]
    fn letzter_entfernter_remote_beendet_anruf() {
        let peer = test_peer();
        peer.starten().unwrap();
        anruf_einrichten(&peer, CallId(9), &["a", "b"]);
        let mut events = peer.ereignisse_abonnieren();

        assert_eq!(peer.remotes_entfernen(CallId(9), &[PeerId::from("a")]), 1);
        assert_eq!(peer.remote_anzahl(), 1);
        assert_eq!(peer.belegte_ports().len(), 4);

        assert_eq!(peer.remotes_entfernen(CallId(9), &[PeerId::from("b")]), 1);
        assert_eq!(peer.aktive_call_id(), CallId::KEINE);
        assert_eq!(peer.zustand().phase, Phase::Started);
        assert!(peer.belegte_ports().is_empty());

        let mut beendet = false;
        while let Ok(e) = events.try_recv() {
            if matches!(e, CallEvent::AnrufBeendet { call_id } if call_id == CallId(9)) {
                beendet = true;
            }
        }
        assert!(beendet);
    }

    #[test]
    fn fremde_call_id_entfernt_nichts() {
        let peer = test_peer();
        anruf_einrichten(&peer, CallId(9), &["a"]);
        assert_eq!(peer.remotes_entfernen(CallId(8), &[PeerId::from("a")]), 0);
        assert_eq!(peer.remote_anzahl(), 1);
    }

    #[test]
    fn inaktive_remotes_entfernt() {
        let peer = test_peer();
        anruf_einrichten(&peer, CallId(3), &["a", "b"]);
        {
            let mut z = peer.lock();
            let vergangen = Instant::now()
                .checked_sub(Duration::from_secs(60))
                .unwrap_or_else(Instant::now);
            z.registry.finden_mut(&PeerId::from("a")).unwrap().zuletzt_gesehen = vergangen;
        }
        assert!(peer.remote_aktivitaet(&PeerId::from("b")));
        assert_eq!(peer.inaktive_entfernen(Duration::from_secs(30)), 1);
        assert_eq!(peer.remote_anzahl(), 1);
        assert!(!peer.remote_aktivitaet(&PeerId::from("a")));
    }

    #[tokio::test]
    async fn pausieren_nur_aus_playing() {
        let peer = test_peer();
        peer.starten().unwrap();
        assert!(peer.anruf_pausieren().await.is_err());
        anruf_einrichten(&peer, CallId(4), &[]);
        peer.anruf_pausieren().await.unwrap();
        assert_eq!(peer.zustand().phase, Phase::Paused);
        assert!(peer.anruf_pausieren().await.is_err());
        peer.anruf_fortsetzen().await.unwrap();
        assert_eq!(peer.zustand().phase, Phase::Playing);
    }

    #[tokio::test]
    async fn beenden_ohne_anruf_ist_fehler() {
        let peer = test_peer();
        peer.starten().unwrap();
        assert!(peer.anruf_beenden().await.is_err());
    }
}
