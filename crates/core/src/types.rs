//! Gemeinsame Identifikationstypen fuer Partyline
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Peer-IDs, Call-IDs und Nachrichten-IDs zur Compilezeit auszuschliessen.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Anzahl der Empfangs-Ports pro Peer-Paar (RTP/RTCP fuer Audio und Video)
pub const RECV_PORT_ANZAHL: usize = 4;

/// Anzahl der Ziel-Ports pro Peer-Paar (4 Medien-Ports + 2 RTCP-Empfangsports)
pub const SEND_PORT_ANZAHL: usize = 6;

/// Lokale Ports, auf denen die Medien eines bestimmten Peers ankommen
pub type ReceivePorts = [u16; RECV_PORT_ANZAHL];

/// Entfernte Ports, an die Medien fuer einen bestimmten Peer gesendet werden
pub type SendPorts = [u16; SEND_PORT_ANZAHL];

/// Die zwei gemeinsam genutzten RTCP-Empfangsports eines Peers
pub type RtcpPorts = [u16; 2];

// ---------------------------------------------------------------------------
// PeerId
// ---------------------------------------------------------------------------

/// Selbstgewaehlte Kennung eines Peers
///
/// Wird einmal beim Erzeugen des lokalen Peers vergeben und danach nicht
/// mehr veraendert. Entfernte Peers teilen ihre ID waehrend der
/// Verhandlung selbst mit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    /// Erzeugt eine neue ID aus Hostname, Port und einer zufaelligen GUID
    pub fn erzeugen(hostname: &str, port: u16) -> Self {
        Self(format!("{}:{}-{}", hostname, port, Uuid::new_v4()))
    }

    /// Gibt die ID als String-Slice zurueck
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PeerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// CallId
// ---------------------------------------------------------------------------

/// Kennung einer Verhandlung bzw. eines Anrufs
///
/// `0` bedeutet "kein Anruf".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CallId(pub i64);

impl CallId {
    /// Kein aktiver Anruf
    pub const KEINE: CallId = CallId(0);

    /// Erzeugt eine neue zufaellige, positive Call-ID (nie 0)
    pub fn zufaellig() -> Self {
        loop {
            let wert = rand::random::<i64>() & i64::MAX;
            if wert != 0 {
                return Self(wert);
            }
        }
    }

    /// Gibt true zurueck wenn dies keine gueltige Call-ID ist
    pub fn ist_keine(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "call:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Prozessweiter Zaehler fuer Nachrichten-IDs
///
/// Beginnt bei 1 und steigt monoton.
static NACHRICHTEN_ZAEHLER: AtomicU64 = AtomicU64::new(1);

/// Vom Sender gewaehlte Nachrichten-ID (nur fuer Korrelation in Logs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Gibt die naechste freie Nachrichten-ID zurueck
    pub fn naechste() -> Self {
        Self(NACHRICHTEN_ZAEHLER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "msg:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Opake Capability-Beschreibungen fuer Audio und Video
///
/// Der Inhalt wird nur ausgetauscht, nie interpretiert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCaps {
    pub audio: String,
    pub video: String,
}

impl MediaCaps {
    pub fn neu(audio: impl Into<String>, video: impl Into<String>) -> Self {
        Self {
            audio: audio.into(),
            video: video.into(),
        }
    }
}

/// Sende- und Empfangs-Capabilities eines Peers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySet {
    pub senden: MediaCaps,
    pub empfangen: MediaCaps,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_enthaelt_host_und_port() {
        let id = PeerId::erzeugen("kiste", 5555);
        assert!(id.as_str().starts_with("kiste:5555-"));
    }

    #[test]
    fn peer_ids_eindeutig() {
        assert_ne!(PeerId::erzeugen("a", 1), PeerId::erzeugen("a", 1));
    }

    #[test]
    fn call_id_nie_null_und_positiv() {
        for _ in 0..100 {
            let id = CallId::zufaellig();
            assert!(!id.ist_keine());
            assert!(id.0 > 0);
        }
    }

    #[test]
    fn nachrichten_ids_monoton() {
        let a = MessageId::naechste();
        let b = MessageId::naechste();
        assert!(b.0 > a.0);
    }

    #[test]
    fn call_id_display() {
        assert_eq!(CallId(42).to_string(), "call:42");
    }

    #[test]
    fn capabilities_serde_round_trip() {
        let caps = CapabilitySet {
            senden: MediaCaps::neu("audio/x-opus", "video/x-vp8"),
            empfangen: MediaCaps::neu("audio/x-opus", ""),
        };
        let json = serde_json::to_string(&caps).unwrap();
        let decoded: CapabilitySet = serde_json::from_str(&json).unwrap();
        assert_eq!(caps, decoded);
    }
}
