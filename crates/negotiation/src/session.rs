//! Verhandlungs-Session
//!
//! Transienter Zustand einer laufenden Verhandlung. Pro `LocalPeer`
//! existiert hoechstens eine Session; sie lebt nur in den Phasen
//! Negotiating und Negotiated. Die Kandidaten der Session sind von den
//! Remotes des laufenden Anrufs getrennt, bis START_CALL sie uebernimmt.

use partyline_core::types::{CallId, PeerId};
use partyline_protocol::CallDetails;
use std::net::SocketAddr;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{NegotiationError, NegotiationResult};
use crate::registry::{PeerRegistry, RemotePeer};

/// Rollenspezifische Daten der Session
#[derive(Debug)]
pub enum SessionRolle {
    /// Wir treiben die Verhandlung
    Negotiator {
        abbruch: CancellationToken,
        /// Kandidaten die bereits START_NEGOTIATE erhalten haben
        kontaktiert: Vec<SocketAddr>,
    },
    /// Wir wurden angefragt
    Negotiatee {
        negotiator_adresse: SocketAddr,
        /// Ticks ohne Fortschritt
        ticks: u32,
        timer: Option<AbortHandle>,
    },
}

/// Eine laufende Verhandlung
#[derive(Debug)]
pub struct NegotiationSession {
    pub call_id: CallId,
    pub rolle: SessionRolle,
    /// Kandidaten, geschluesselt ueber ID bzw. Adresse solange keine ID bekannt ist
    pub remotes: Vec<RemotePeer>,
}

impl NegotiationSession {
    pub fn als_negotiator(
        call_id: CallId,
        abbruch: CancellationToken,
        remotes: Vec<RemotePeer>,
    ) -> Self {
        Self {
            call_id,
            rolle: SessionRolle::Negotiator {
                abbruch,
                kontaktiert: Vec::new(),
            },
            remotes,
        }
    }

    /// Session eines Negotiatees; der Negotiator ist der erste Kandidat
    pub fn als_negotiatee(call_id: CallId, negotiator: RemotePeer) -> Self {
        Self {
            call_id,
            rolle: SessionRolle::Negotiatee {
                negotiator_adresse: negotiator.adresse,
                ticks: 0,
                timer: None,
            },
            remotes: vec![negotiator],
        }
    }

    pub fn ist_negotiator(&self) -> bool {
        matches!(self.rolle, SessionRolle::Negotiator { .. })
    }

    pub fn ist_negotiatee(&self) -> bool {
        matches!(self.rolle, SessionRolle::Negotiatee { .. })
    }

    /// Abbruch-Token des Negotiators
    pub fn abbruch_token(&self) -> Option<&CancellationToken> {
        match &self.rolle {
            SessionRolle::Negotiator { abbruch, .. } => Some(abbruch),
            SessionRolle::Negotiatee { .. } => None,
        }
    }

    /// Gibt true zurueck wenn der Negotiator abgebrochen wurde
    pub fn ist_abgebrochen(&self) -> bool {
        self.abbruch_token().is_some_and(|t| t.is_cancelled())
    }

    pub fn negotiator_adresse(&self) -> Option<SocketAddr> {
        match &self.rolle {
            SessionRolle::Negotiatee {
                negotiator_adresse, ..
            } => Some(*negotiator_adresse),
            SessionRolle::Negotiator { .. } => None,
        }
    }

    pub fn kontaktiert_markieren(&mut self, adresse: SocketAddr) {
        if let SessionRolle::Negotiator { kontaktiert, .. } = &mut self.rolle {
            if !kontaktiert.contains(&adresse) {
                kontaktiert.push(adresse);
            }
        }
    }

    pub fn kontaktiert_entfernen(&mut self, adresse: SocketAddr) {
        if let SessionRolle::Negotiator { kontaktiert, .. } = &mut self.rolle {
            kontaktiert.retain(|a| *a != adresse);
        }
    }

    /// Adressen, die beim Abbruch ein CANCEL_NEGOTIATE bekommen
    pub fn abbruch_empfaenger(&self) -> Vec<SocketAddr> {
        match &self.rolle {
            SessionRolle::Negotiator { kontaktiert, .. } => kontaktiert.clone(),
            SessionRolle::Negotiatee {
                negotiator_adresse, ..
            } => vec![*negotiator_adresse],
        }
    }

    pub fn timer_setzen(&mut self, handle: AbortHandle) {
        if let SessionRolle::Negotiatee { timer, .. } = &mut self.rolle {
            *timer = Some(handle);
        }
    }

    /// Loest den Timer von der Session, ohne ihn zu stoppen
    ///
    /// Noetig wenn der Timer-Task selbst die Session beendet.
    pub fn timer_loesen(&mut self) {
        if let SessionRolle::Negotiatee { timer, .. } = &mut self.rolle {
            *timer = None;
        }
    }

    /// Fortschritt: Tick-Zaehler auf 0
    pub fn ticks_zuruecksetzen(&mut self) {
        if let SessionRolle::Negotiatee { ticks, .. } = &mut self.rolle {
            *ticks = 0;
        }
    }

    /// Zaehlt einen Tick und gibt den neuen Stand zurueck
    pub fn tick(&mut self) -> u32 {
        match &mut self.rolle {
            SessionRolle::Negotiatee { ticks, .. } => {
                *ticks += 1;
                *ticks
            }
            SessionRolle::Negotiator { .. } => 0,
        }
    }

    pub fn remote(&self, id: &PeerId) -> Option<&RemotePeer> {
        self.remotes.iter().find(|r| r.hat_id(id))
    }

    pub fn remote_mut(&mut self, id: &PeerId) -> Option<&mut RemotePeer> {
        self.remotes.iter_mut().find(|r| r.hat_id(id))
    }

    pub fn remote_per_adresse_mut(&mut self, adresse: SocketAddr) -> Option<&mut RemotePeer> {
        self.remotes.iter_mut().find(|r| r.adresse == adresse)
    }

    /// Uebernimmt personalisierte CALL_DETAILS auf die Kandidaten
    ///
    /// Jeder Kandidat muss genau einmal vorkommen, die eigene ID nie.
    /// Erst wenn alles passt, werden Ports und Capabilities gesetzt.
    pub fn details_anwenden(
        &mut self,
        details: &CallDetails,
        eigene_id: &PeerId,
    ) -> NegotiationResult<()> {
        let mut gesehen: Vec<&PeerId> = Vec::with_capacity(details.eintraege.len());
        for eintrag in &details.eintraege {
            if &eintrag.peer_id == eigene_id {
                return Err(NegotiationError::protokoll(
                    "CALL_DETAILS enthaelt die eigene ID",
                ));
            }
            if gesehen.contains(&&eintrag.peer_id) {
                return Err(NegotiationError::DoppelterPeer(eintrag.peer_id.clone()));
            }
            if self.remote(&eintrag.peer_id).is_none() {
                return Err(NegotiationError::protokoll(format!(
                    "Unbekannter Peer {} in CALL_DETAILS",
                    eintrag.peer_id
                )));
            }
            gesehen.push(&eintrag.peer_id);
        }

        let fehlend = self
            .remotes
            .iter()
            .find(|r| r.id.as_ref().map_or(true, |id| !gesehen.contains(&id)));
        if let Some(remote) = fehlend {
            return Err(NegotiationError::protokoll(format!(
                "CALL_DETAILS ohne Eintrag fuer {}",
                remote.kennung()
            )));
        }

        for eintrag in &details.eintraege {
            if let Some(remote) = self.remote_mut(&eintrag.peer_id) {
                remote.sende_ports = eintrag.ports;
                remote.empfangs_caps = eintrag.sende_caps.clone();
                remote.sende_caps = details.sende_caps.clone();
            }
        }
        Ok(())
    }

    /// Nimmt einen Kandidaten heraus und gibt seine Ports frei
    pub fn remote_verwerfen(
        &mut self,
        adresse: SocketAddr,
        registry: &mut PeerRegistry,
    ) -> Option<RemotePeer> {
        let pos = self.remotes.iter().position(|r| r.adresse == adresse)?;
        let remote = self.remotes.remove(pos);
        registry.remote_verwerfen(&remote);
        self.kontaktiert_entfernen(adresse);
        Some(remote)
    }

    /// Beendet die Session: Timer stoppen, Ports aller Kandidaten freigeben
    pub fn verwerfen(mut self, registry: &mut PeerRegistry) {
        if let SessionRolle::Negotiatee {
            timer: Some(timer), ..
        } = &self.rolle
        {
            timer.abort();
        }
        for remote in self.remotes.drain(..) {
            registry.remote_verwerfen(&remote);
        }
    }

    /// Beendet die Session nach START_CALL: Timer stoppen, Kandidaten herausgeben
    pub fn abschliessen(mut self) -> Vec<RemotePeer> {
        if let SessionRolle::Negotiatee {
            timer: Some(timer), ..
        } = &self.rolle
        {
            timer.abort();
        }
        std::mem::take(&mut self.remotes)
    }
}
