//! Schnittstelle zur Medienschicht
//!
//! Die eigentliche Medienuebertragung (RTP/RTCP, Encoding, Wiedergabe)
//! liegt ausserhalb von Partyline. Die Verhandlung ruft die Medienschicht
//! nur ueber diesen Trait auf:
//! - lokale Capabilities abfragen
//! - Transport starten sobald Ports und Formate feststehen
//! - einzelne Peers pausieren, fortsetzen oder entfernen
//! - Transport stoppen

use crate::error::Result;
use crate::types::{CapabilitySet, MediaCaps, PeerId, ReceivePorts, SendPorts};
use std::net::IpAddr;

/// Alles was die Medienschicht ueber einen Gegenpeer wissen muss
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEndpoint {
    pub peer_id: PeerId,
    /// Host des Gegenpeers (Ziel fuer ausgehende Medien)
    pub host: IpAddr,
    /// Lokale Ports fuer eingehende Medien dieses Peers
    pub empfangs_ports: ReceivePorts,
    /// Ports des Gegenpeers fuer unsere ausgehenden Medien
    pub sende_ports: SendPorts,
    /// Was wir von diesem Peer erwarten
    pub empfangs_caps: MediaCaps,
    /// Was wir an diesen Peer senden
    pub sende_caps: MediaCaps,
}

/// Von der Verhandlung konsumierte Medienschicht
///
/// Alle Methoden werden ohne gehaltenen Peer-Lock aufgerufen.
pub trait MediaBackend: Send + Sync + 'static {
    /// Lokal unterstuetzte Sende- und Empfangs-Capabilities
    fn lokale_capabilities(&self) -> CapabilitySet;

    /// Startet Senden/Empfangen fuer alle Gegenpeers des Anrufs
    fn transport_starten(&self, endpunkte: &[MediaEndpoint]) -> Result<()>;

    /// Stoppt den gesamten Medientransport
    fn transport_stoppen(&self);

    /// Baut den Transport fuer einen einzelnen Peer ab
    fn remote_entfernen(&self, peer_id: &PeerId);

    fn remote_pausieren(&self, peer_id: &PeerId);

    fn remote_fortsetzen(&self, peer_id: &PeerId);
}

/// Medienschicht ohne Wirkung – meldet feste Capabilities und loggt
#[derive(Debug, Clone, Default)]
pub struct NullMedia {
    capabilities: CapabilitySet,
}

impl NullMedia {
    pub fn neu(capabilities: CapabilitySet) -> Self {
        Self { capabilities }
    }
}

impl MediaBackend for NullMedia {
    fn lokale_capabilities(&self) -> CapabilitySet {
        self.capabilities.clone()
    }

    fn transport_starten(&self, endpunkte: &[MediaEndpoint]) -> Result<()> {
        for e in endpunkte {
            tracing::info!(
                peer_id = %e.peer_id,
                host = %e.host,
                empfangs_ports = ?e.empfangs_ports,
                sende_ports = ?e.sende_ports,
                "Medientransport (Null) gestartet"
            );
        }
        Ok(())
    }

    fn transport_stoppen(&self) {
        tracing::info!("Medientransport (Null) gestoppt");
    }

    fn remote_entfernen(&self, peer_id: &PeerId) {
        tracing::debug!(peer_id = %peer_id, "Medientransport (Null) fuer Peer abgebaut");
    }

    fn remote_pausieren(&self, peer_id: &PeerId) {
        tracing::debug!(peer_id = %peer_id, "Medien (Null) pausiert");
    }

    fn remote_fortsetzen(&self, peer_id: &PeerId) {
        tracing::debug!(peer_id = %peer_id, "Medien (Null) fortgesetzt");
    }
}
