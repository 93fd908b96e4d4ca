//! UDP-Discovery-Datagramme
//!
//! Gleicher 20-Byte-Header wie auf TCP. Beide Discovery-Typen tragen
//! keine Nutzdaten; ein Datagramm darf hoechstens 4096 Bytes gross sein.

use bytes::BytesMut;
use partyline_core::types::MessageId;

use crate::control::MessageType;
use crate::error::{WireError, WireResult};
use crate::wire::{MessageHeader, HEADER_GROESSE};

/// Maximale Datagramm-Groesse in Bytes
pub const MAX_DATAGRAMM: usize = 4096;

/// Art der Discovery-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryTyp {
    /// "Wer ist da?" an die Multicast-Gruppe
    Discover,
    /// Unicast-Antwort auf ein Discover
    HiThere,
}

impl DiscoveryTyp {
    pub fn message_type(self) -> MessageType {
        match self {
            DiscoveryTyp::Discover => MessageType::MulticastDiscover,
            DiscoveryTyp::HiThere => MessageType::UnicastHiThere,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryMessage {
    pub id: MessageId,
    pub typ: DiscoveryTyp,
}

impl DiscoveryMessage {
    /// Neue Nachricht mit frischer Nachrichten-ID
    pub fn neu(typ: DiscoveryTyp) -> Self {
        Self {
            id: MessageId::naechste(),
            typ,
        }
    }

    pub fn kodieren(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HEADER_GROESSE);
        MessageHeader::neu(self.id, self.typ.message_type(), 0).kodieren(&mut buf);
        buf
    }

    /// Dekodiert ein empfangenes Datagramm
    ///
    /// TCP-Typen und nicht-leere Nutzdaten werden abgelehnt.
    pub fn dekodieren(daten: &[u8]) -> WireResult<Self> {
        if daten.len() > MAX_DATAGRAMM {
            return Err(WireError::ZuGross(daten.len()));
        }
        let header = MessageHeader::dekodieren(daten)?;
        let typ = match header.message_type()? {
            MessageType::MulticastDiscover => DiscoveryTyp::Discover,
            MessageType::UnicastHiThere => DiscoveryTyp::HiThere,
            _ => return Err(WireError::UnbekannterTyp(header.typ)),
        };
        let rest = daten.len() - HEADER_GROESSE;
        if header.groesse as usize != rest {
            return Err(WireError::Abgeschnitten);
        }
        if rest != 0 {
            return Err(WireError::typ_fehler("", format!("{} Bytes", rest)));
        }
        Ok(Self { id: header.id, typ })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlMessage;
    use crate::wire;

    #[test]
    fn discover_round_trip() {
        let msg = DiscoveryMessage::neu(DiscoveryTyp::Discover);
        let buf = msg.kodieren();
        assert_eq!(buf.len(), HEADER_GROESSE);
        assert_eq!(DiscoveryMessage::dekodieren(&buf).unwrap(), msg);
    }

    #[test]
    fn hi_there_typ_code() {
        let buf = DiscoveryMessage::neu(DiscoveryTyp::HiThere).kodieren();
        assert_eq!(&buf[12..16], &101u32.to_be_bytes());
    }

    #[test]
    fn tcp_nachricht_ist_kein_datagramm() {
        let mut buf = BytesMut::new();
        wire::kodieren(&ControlMessage::ack(MessageId(1)), &mut buf).unwrap();
        assert!(matches!(
            DiscoveryMessage::dekodieren(&buf),
            Err(WireError::UnbekannterTyp(1))
        ));
    }

    #[test]
    fn nutzdaten_bei_discovery_abgelehnt() {
        let mut buf = BytesMut::new();
        MessageHeader::neu(MessageId(3), MessageType::MulticastDiscover, 2).kodieren(&mut buf);
        buf.extend_from_slice(&[0, 0]);
        assert!(matches!(
            DiscoveryMessage::dekodieren(&buf),
            Err(WireError::TypFehler { .. })
        ));
    }

    #[test]
    fn zu_kurz() {
        assert!(matches!(
            DiscoveryMessage::dekodieren(&[0, 0, 0, 1]),
            Err(WireError::Abgeschnitten)
        ));
    }
}
