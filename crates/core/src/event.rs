//! Anruf-Ereignisse
//!
//! Statt Callbacks meldet die Verhandlung ihren Fortschritt ueber
//! explizite Ereigniswerte. Die Zustellung erfolgt im Verhandlungs-Crate
//! ueber einen tokio-Broadcast-Kanal.

use crate::types::{CallId, PeerId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Alle Ereignisse rund um Verhandlung und laufenden Anruf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CallEvent {
    // --- Verhandlung ---
    /// Eine Verhandlung hat begonnen (`negotiator` = wir treiben sie)
    VerhandlungGestartet { call_id: CallId, negotiator: bool },
    /// Ein Kandidat hat nicht oder ablehnend geantwortet und wurde entfernt
    PeerUebersprungen {
        call_id: CallId,
        adresse: SocketAddr,
        grund: String,
    },
    /// Verhandlung erfolgreich, Anruf laeuft
    VerhandlungAbgeschlossen {
        call_id: CallId,
        teilnehmer: Vec<PeerId>,
    },
    /// Verhandlung abgebrochen (lokal, durch Timeout oder von der Gegenseite)
    VerhandlungAbgebrochen {
        call_id: CallId,
        grund: String,
        timeout: bool,
    },

    // --- Laufender Anruf ---
    /// Ein entfernter Peer hat pausiert
    AnrufPausiert { call_id: CallId, peer_id: PeerId },
    /// Ein entfernter Peer hat fortgesetzt
    AnrufFortgesetzt { call_id: CallId, peer_id: PeerId },
    /// Ein entfernter Peer wurde aus dem Anruf entfernt
    RemoteEntfernt { call_id: CallId, peer_id: PeerId },
    /// Der Anruf ist lokal beendet
    AnrufBeendet { call_id: CallId },
}

impl CallEvent {
    /// Gibt die Call-ID zurueck, auf die sich das Ereignis bezieht
    pub fn call_id(&self) -> CallId {
        match self {
            CallEvent::VerhandlungGestartet { call_id, .. }
            | CallEvent::PeerUebersprungen { call_id, .. }
            | CallEvent::VerhandlungAbgeschlossen { call_id, .. }
            | CallEvent::VerhandlungAbgebrochen { call_id, .. }
            | CallEvent::AnrufPausiert { call_id, .. }
            | CallEvent::AnrufFortgesetzt { call_id, .. }
            | CallEvent::RemoteEntfernt { call_id, .. }
            | CallEvent::AnrufBeendet { call_id } => *call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = CallEvent::VerhandlungAbgeschlossen {
            call_id: CallId(7),
            teilnehmer: vec![PeerId::from("a"), PeerId::from("b")],
        };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: CallEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn call_id_aus_event() {
        let event = CallEvent::AnrufBeendet { call_id: CallId(3) };
        assert_eq!(event.call_id(), CallId(3));
    }
}
