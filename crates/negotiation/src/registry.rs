//! Peer-Registry und Port-Vergabe
//!
//! Die Registry besitzt alle entfernten Peers eines laufenden Anrufs und
//! den Port-Allokator. Sie wird ausschliesslich unter dem Lock des
//! `LocalPeer` veraendert; die Medienschicht ruft der Aufrufer nach dem
//! Freigeben des Locks auf.
//!
//! ## Port-Bloecke
//! Jeder entfernte Peer bekommt einen zusammenhaengenden Block aus 4
//! Empfangsports. Bloecke werden immer als Einheit reserviert und
//! freigegeben; der niedrigste freie Block ab der Basis gewinnt.

use partyline_core::media::MediaEndpoint;
use partyline_core::types::{
    MediaCaps, PeerId, ReceivePorts, SendPorts, RECV_PORT_ANZAHL, SEND_PORT_ANZAHL,
};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Instant;

use crate::error::{NegotiationError, NegotiationResult};
use crate::state::RemoteState;

// ---------------------------------------------------------------------------
// PortAllocator
// ---------------------------------------------------------------------------

/// Vergibt Bloecke aus 4 aufeinanderfolgenden Empfangsports
#[derive(Debug, Clone)]
pub struct PortAllocator {
    basis: u16,
    belegt: BTreeSet<u16>,
}

impl PortAllocator {
    pub fn neu(basis: u16) -> Self {
        Self {
            basis,
            belegt: BTreeSet::new(),
        }
    }

    /// Reserviert den niedrigsten freien Block ab der Basis
    ///
    /// Deterministisch: gleiche Belegung ergibt gleichen Block.
    pub fn reservieren(&mut self) -> NegotiationResult<ReceivePorts> {
        let block = RECV_PORT_ANZAHL as u32;
        let mut kandidat = self.basis as u32;

        for &port in self.belegt.range(self.basis..) {
            let port = port as u32;
            if port < kandidat {
                continue;
            }
            if port - kandidat >= block {
                break;
            }
            kandidat = port + 1;
        }

        if kandidat + block - 1 > u16::MAX as u32 {
            return Err(NegotiationError::PortsErschoepft);
        }

        let erster = kandidat as u16;
        let ports = [erster, erster + 1, erster + 2, erster + 3];
        self.belegt.extend(ports);
        Ok(ports)
    }

    /// Gibt einen zuvor reservierten Block frei
    pub fn freigeben(&mut self, ports: &ReceivePorts) {
        for port in ports {
            self.belegt.remove(port);
        }
    }

    pub fn belegt(&self) -> impl Iterator<Item = u16> + '_ {
        self.belegt.iter().copied()
    }

    pub fn anzahl_belegt(&self) -> usize {
        self.belegt.len()
    }
}

// ---------------------------------------------------------------------------
// RemotePeer
// ---------------------------------------------------------------------------

/// Ein anderer Teilnehmer, bekannt oder Kandidat
#[derive(Debug, Clone)]
pub struct RemotePeer {
    /// Adresse unter der wir den Peer erreichen
    pub adresse: SocketAddr,
    /// Vom Peer selbst gewaehlte ID (erst nach OK_NEGOTIATE bzw. QUERY_CAPS bekannt)
    pub id: Option<PeerId>,
    pub zustand: RemoteState,
    /// Lokale Ports fuer eingehende Medien dieses Peers
    pub empfangs_ports: ReceivePorts,
    /// Ports des Peers fuer unsere ausgehenden Medien
    pub sende_ports: SendPorts,
    /// Was dieser Peer an uns sendet
    pub empfangs_caps: MediaCaps,
    /// Was wir an diesen Peer senden
    pub sende_caps: MediaCaps,
    pub zuletzt_gesehen: Instant,
}

impl RemotePeer {
    /// Neuer Peer mit bereits reservierten Empfangsports
    pub fn neu(adresse: SocketAddr, id: Option<PeerId>, empfangs_ports: ReceivePorts) -> Self {
        Self {
            adresse,
            id,
            zustand: RemoteState::Allocated,
            empfangs_ports,
            sende_ports: [0; SEND_PORT_ANZAHL],
            empfangs_caps: MediaCaps::default(),
            sende_caps: MediaCaps::default(),
            zuletzt_gesehen: Instant::now(),
        }
    }

    /// Gibt true zurueck wenn der Peer diese ID traegt
    pub fn hat_id(&self, id: &PeerId) -> bool {
        self.id.as_ref() == Some(id)
    }

    /// Anzeige-Kennung fuer Logs: ID falls bekannt, sonst Adresse
    pub fn kennung(&self) -> String {
        match &self.id {
            Some(id) => id.to_string(),
            None => self.adresse.to_string(),
        }
    }

    /// Beschreibung fuer die Medienschicht (nur mit bekannter ID)
    pub fn media_endpunkt(&self) -> Option<MediaEndpoint> {
        let peer_id = self.id.clone()?;
        Some(MediaEndpoint {
            peer_id,
            host: self.adresse.ip(),
            empfangs_ports: self.empfangs_ports,
            sende_ports: self.sende_ports,
            empfangs_caps: self.empfangs_caps.clone(),
            sende_caps: self.sende_caps.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// PeerRegistry
// ---------------------------------------------------------------------------

/// Entfernte Peers des laufenden Anrufs plus Port-Allokator
#[derive(Debug)]
pub struct PeerRegistry {
    remotes: Vec<RemotePeer>,
    ports: PortAllocator,
}

impl PeerRegistry {
    pub fn neu(port_basis: u16) -> Self {
        Self {
            remotes: Vec::new(),
            ports: PortAllocator::neu(port_basis),
        }
    }

    /// Erzeugt einen Peer mit frisch reservierten Ports (noch nicht eingetragen)
    pub fn remote_erzeugen(
        &mut self,
        adresse: SocketAddr,
        id: Option<PeerId>,
    ) -> NegotiationResult<RemotePeer> {
        let ports = self.ports.reservieren()?;
        Ok(RemotePeer::neu(adresse, id, ports))
    }

    /// Gibt die Ports eines nicht eingetragenen Peers frei
    pub fn remote_verwerfen(&mut self, remote: &RemotePeer) {
        self.ports.freigeben(&remote.empfangs_ports);
    }

    /// Traegt einen Peer ein; IDs sind eindeutig
    pub fn hinzufuegen(&mut self, remote: RemotePeer) -> NegotiationResult<()> {
        if let Some(id) = &remote.id {
            if self.finden(id).is_some() {
                return Err(NegotiationError::DoppelterPeer(id.clone()));
            }
        }
        self.remotes.push(remote);
        Ok(())
    }

    /// Entfernt einen Peer und gibt seine Ports frei
    pub fn entfernen(&mut self, id: &PeerId) -> Option<RemotePeer> {
        let pos = self.remotes.iter().position(|r| r.hat_id(id))?;
        let remote = self.remotes.remove(pos);
        self.ports.freigeben(&remote.empfangs_ports);
        Some(remote)
    }

    /// Entfernt alle Peers und gibt alle ihre Ports frei
    pub fn alle_entfernen(&mut self) -> Vec<RemotePeer> {
        let remotes = std::mem::take(&mut self.remotes);
        for r in &remotes {
            self.ports.freigeben(&r.empfangs_ports);
        }
        remotes
    }

    pub fn finden(&self, id: &PeerId) -> Option<&RemotePeer> {
        self.remotes.iter().find(|r| r.hat_id(id))
    }

    pub fn finden_mut(&mut self, id: &PeerId) -> Option<&mut RemotePeer> {
        self.remotes.iter_mut().find(|r| r.hat_id(id))
    }

    pub fn remotes(&self) -> &[RemotePeer] {
        &self.remotes
    }

    pub fn remotes_mut(&mut self) -> impl Iterator<Item = &mut RemotePeer> {
        self.remotes.iter_mut()
    }

    pub fn ist_leer(&self) -> bool {
        self.remotes.is_empty()
    }

    pub fn ports(&self) -> &PortAllocator {
        &self.ports
    }

    pub fn media_endpunkte(&self) -> Vec<MediaEndpoint> {
        self.remotes
            .iter()
            .filter_map(RemotePeer::media_endpunkt)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn erster_block_ab_basis() {
        let mut alloc = PortAllocator::neu(10002);
        assert_eq!(alloc.reservieren().unwrap(), [10002, 10003, 10004, 10005]);
        assert_eq!(alloc.reservieren().unwrap(), [10006, 10007, 10008, 10009]);
    }

    #[test]
    fn luecke_wird_wiederverwendet() {
        let mut alloc = PortAllocator::neu(100);
        let a = alloc.reservieren().unwrap();
        let b = alloc.reservieren().unwrap();
        let c = alloc.reservieren().unwrap();
        alloc.freigeben(&b);
        assert_eq!(alloc.reservieren().unwrap(), b);
        alloc.freigeben(&a);
        alloc.freigeben(&c);
        assert_eq!(alloc.reservieren().unwrap(), a);
    }

    #[test]
    fn bloecke_ueberlappen_nie() {
        // Deterministische Folge aus Reservieren und Freigeben
        let mut alloc = PortAllocator::neu(2000);
        let mut aktiv: Vec<ReceivePorts> = Vec::new();
        for schritt in 0..200usize {
            if schritt % 3 == 2 && !aktiv.is_empty() {
                let idx = (schritt * 7) % aktiv.len();
                let block = aktiv.remove(idx);
                alloc.freigeben(&block);
            } else {
                let block = alloc.reservieren().unwrap();
                // niedrigster freier Block: kein freier 4er-Block darunter
                let niedrigster = (2000u16..block[0]).find(|&p| (p..p + 4).all(|q| !alloc.belegt.contains(&q)));
                assert!(niedrigster.is_none(), "Block {:?} nicht minimal", block);
                aktiv.push(block);
            }
            let erwartet: usize = aktiv.len() * 4;
            assert_eq!(alloc.anzahl_belegt(), erwartet);
            let mut alle: Vec<u16> = aktiv.iter().flatten().copied().collect();
            alle.sort_unstable();
            alle.dedup();
            assert_eq!(alle.len(), erwartet);
        }
    }

    #[test]
    fn ports_erschoepft() {
        let mut alloc = PortAllocator::neu(u16::MAX - 5);
        assert!(alloc.reservieren().is_ok());
        assert!(matches!(
            alloc.reservieren(),
            Err(NegotiationError::PortsErschoepft)
        ));
    }

    #[test]
    fn registry_entfernen_gibt_ports_frei() {
        let mut reg = PeerRegistry::neu(500);
        let r = reg.remote_erzeugen(addr(1), Some(PeerId::from("a"))).unwrap();
        reg.hinzufuegen(r).unwrap();
        assert_eq!(reg.ports().anzahl_belegt(), 4);
        let entfernt = reg.entfernen(&PeerId::from("a")).unwrap();
        assert_eq!(entfernt.empfangs_ports, [500, 501, 502, 503]);
        assert_eq!(reg.ports().anzahl_belegt(), 0);
        assert!(reg.ist_leer());
    }

    #[test]
    fn doppelte_id_abgelehnt() {
        let mut reg = PeerRegistry::neu(500);
        let a = reg.remote_erzeugen(addr(1), Some(PeerId::from("a"))).unwrap();
        let b = reg.remote_erzeugen(addr(2), Some(PeerId::from("a"))).unwrap();
        reg.hinzufuegen(a).unwrap();
        assert!(matches!(
            reg.hinzufuegen(b),
            Err(NegotiationError::DoppelterPeer(_))
        ));
    }

    #[test]
    fn endpunkt_nur_mit_id() {
        let r = RemotePeer::neu(addr(9), None, [1, 2, 3, 4]);
        assert!(r.media_endpunkt().is_none());
        assert_eq!(r.kennung(), "127.0.0.1:9");
    }
}
