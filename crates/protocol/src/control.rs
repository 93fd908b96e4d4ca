//! Steuernachrichten des Verhandlungsprotokolls (TCP)
//!
//! Definiert alle Nachrichtentypen mit stabilem Code, lesbarem Namen und
//! festem Nutzdaten-Schema pro Protokollversion.
//!
//! ## Design
//! - Request/Response: jede Verbindung traegt genau eine Anfrage und eine Antwort
//! - Typisierte Payload-Varianten, Umwandlung in/aus [`Wert`] ueber das Schema
//! - Ein Schema-Verstoss ist ein Dekodierfehler, kein Panic

use partyline_core::types::{
    CallId, MediaCaps, MessageId, PeerId, ReceivePorts, RtcpPorts, SendPorts,
};

use crate::error::{WireError, WireResult};
use crate::variant::{TupelLeser, Wert};

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Alle Nachrichtentypen (TCP und UDP) mit stabilem Code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    Ack = 1,
    Error = 2,
    ErrorCall = 3,
    StartNegotiate = 10,
    OkNegotiate = 11,
    CancelNegotiate = 12,
    QueryCaps = 13,
    ReplyCaps = 14,
    CallDetails = 15,
    StartCall = 16,
    PauseCall = 20,
    ResumeCall = 21,
    EndCall = 22,
    MulticastDiscover = 100,
    UnicastHiThere = 101,
}

impl MessageType {
    /// Konvertiert einen Code in einen `MessageType`
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Ack,
            2 => Self::Error,
            3 => Self::ErrorCall,
            10 => Self::StartNegotiate,
            11 => Self::OkNegotiate,
            12 => Self::CancelNegotiate,
            13 => Self::QueryCaps,
            14 => Self::ReplyCaps,
            15 => Self::CallDetails,
            16 => Self::StartCall,
            20 => Self::PauseCall,
            21 => Self::ResumeCall,
            22 => Self::EndCall,
            100 => Self::MulticastDiscover,
            101 => Self::UnicastHiThere,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Lesbarer Name (nur fuer Diagnose)
    pub fn name(self) -> &'static str {
        match self {
            Self::Ack => "ACK",
            Self::Error => "ERROR",
            Self::ErrorCall => "ERROR_CALL",
            Self::StartNegotiate => "START_NEGOTIATE",
            Self::OkNegotiate => "OK_NEGOTIATE",
            Self::CancelNegotiate => "CANCEL_NEGOTIATE",
            Self::QueryCaps => "QUERY_CAPS",
            Self::ReplyCaps => "REPLY_CAPS",
            Self::CallDetails => "CALL_DETAILS",
            Self::StartCall => "START_CALL",
            Self::PauseCall => "PAUSE_CALL",
            Self::ResumeCall => "RESUME_CALL",
            Self::EndCall => "END_CALL",
            Self::MulticastDiscover => "MULTICAST_DISCOVER",
            Self::UnicastHiThere => "UNICAST_HI_THERE",
        }
    }

    /// Nutzdaten-Schema fuer eine Protokollversion
    ///
    /// `None` bei unbekannter Version, `Some("")` fuer Typen ohne Nutzdaten.
    pub fn schema(self, version: u32) -> Option<&'static str> {
        if version != 1 {
            return None;
        }
        Some(match self {
            Self::Ack => "(t)",
            Self::Error => "(ts)",
            Self::ErrorCall => "(xs)",
            Self::StartNegotiate => "(xsq)",
            Self::OkNegotiate => "(xs)",
            Self::CancelNegotiate => "(xs)",
            Self::QueryCaps => "(xa(ss))",
            Self::ReplyCaps => "(xqqssssa(sqqqq))",
            Self::CallDetails => "(xssa(sssqqqqqq))",
            Self::StartCall => "(xas)",
            Self::PauseCall | Self::ResumeCall | Self::EndCall => "(xs)",
            Self::MulticastDiscover | Self::UnicastHiThere => "",
        })
    }

    /// Gibt true zurueck wenn der Typ ueber die Discovery (UDP) laeuft
    pub fn ist_discovery(self) -> bool {
        matches!(self, Self::MulticastDiscover | Self::UnicastHiThere)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Nutzdaten-Strukturen
// ---------------------------------------------------------------------------

/// Ein Kandidat in QUERY_CAPS: ID und Adresse unter der ihn der Negotiator erreicht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEintrag {
    pub peer_id: PeerId,
    pub adresse: String,
}

/// Die 4 Empfangs-Ports, die ein Peer fuer einen bestimmten anderen Peer reserviert hat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerPorts {
    pub peer_id: PeerId,
    pub ports: ReceivePorts,
}

/// Antwort eines Kandidaten auf QUERY_CAPS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyCaps {
    pub call_id: CallId,
    pub rtcp_ports: RtcpPorts,
    pub sende_caps: MediaCaps,
    pub empfangs_caps: MediaCaps,
    pub peer_ports: Vec<PeerPorts>,
}

/// Ein Gegenpeer in CALL_DETAILS aus Sicht des Empfaengers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDetailsEintrag {
    pub peer_id: PeerId,
    /// Was dieser Gegenpeer senden wird (= was der Empfaenger erwartet)
    pub sende_caps: MediaCaps,
    /// Wohin der Empfaenger senden muss, um diesen Gegenpeer zu erreichen
    pub ports: SendPorts,
}

/// Personalisierte Anrufdetails fuer einen Kandidaten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDetails {
    pub call_id: CallId,
    /// Vereinbarte eigene Sende-Capabilities des Empfaengers
    pub sende_caps: MediaCaps,
    pub eintraege: Vec<CallDetailsEintrag>,
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Typisierte Nutzdaten aller TCP-Steuernachrichten
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Ack { message_id: MessageId },
    Error { message_id: MessageId, text: String },
    ErrorCall { call_id: CallId, text: String },
    StartNegotiate { call_id: CallId, negotiator_id: PeerId, negotiator_port: u16 },
    OkNegotiate { call_id: CallId, peer_id: PeerId },
    CancelNegotiate { call_id: CallId, sender_id: PeerId },
    QueryCaps { call_id: CallId, peers: Vec<PeerEintrag> },
    ReplyCaps(ReplyCaps),
    CallDetails(CallDetails),
    StartCall { call_id: CallId, peer_ids: Vec<PeerId> },
    PauseCall { call_id: CallId, peer_id: PeerId },
    ResumeCall { call_id: CallId, peer_id: PeerId },
    EndCall { call_id: CallId, peer_id: PeerId },
}

impl Payload {
    pub fn message_type(&self) -> MessageType {
        match self {
            Payload::Ack { .. } => MessageType::Ack,
            Payload::Error { .. } => MessageType::Error,
            Payload::ErrorCall { .. } => MessageType::ErrorCall,
            Payload::StartNegotiate { .. } => MessageType::StartNegotiate,
            Payload::OkNegotiate { .. } => MessageType::OkNegotiate,
            Payload::CancelNegotiate { .. } => MessageType::CancelNegotiate,
            Payload::QueryCaps { .. } => MessageType::QueryCaps,
            Payload::ReplyCaps(_) => MessageType::ReplyCaps,
            Payload::CallDetails(_) => MessageType::CallDetails,
            Payload::StartCall { .. } => MessageType::StartCall,
            Payload::PauseCall { .. } => MessageType::PauseCall,
            Payload::ResumeCall { .. } => MessageType::ResumeCall,
            Payload::EndCall { .. } => MessageType::EndCall,
        }
    }

    /// Call-ID der Nachricht, falls sie eine traegt
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            Payload::Ack { .. } | Payload::Error { .. } => None,
            Payload::ErrorCall { call_id, .. }
            | Payload::StartNegotiate { call_id, .. }
            | Payload::OkNegotiate { call_id, .. }
            | Payload::CancelNegotiate { call_id, .. }
            | Payload::QueryCaps { call_id, .. }
            | Payload::StartCall { call_id, .. }
            | Payload::PauseCall { call_id, .. }
            | Payload::ResumeCall { call_id, .. }
            | Payload::EndCall { call_id, .. } => Some(*call_id),
            Payload::ReplyCaps(r) => Some(r.call_id),
            Payload::CallDetails(d) => Some(d.call_id),
        }
    }

    /// Wandelt die Nutzdaten in einen schema-konformen Wert
    pub fn zu_wert(&self) -> Wert {
        match self {
            Payload::Ack { message_id } => Wert::Tupel(vec![Wert::U64(message_id.0)]),
            Payload::Error { message_id, text } => {
                Wert::Tupel(vec![Wert::U64(message_id.0), Wert::Str(text.clone())])
            }
            Payload::ErrorCall { call_id, text } => call_und_text(*call_id, text),
            Payload::StartNegotiate {
                call_id,
                negotiator_id,
                negotiator_port,
            } => Wert::Tupel(vec![
                Wert::I64(call_id.0),
                Wert::Str(negotiator_id.0.clone()),
                Wert::U16(*negotiator_port),
            ]),
            Payload::OkNegotiate { call_id, peer_id } => call_und_text(*call_id, &peer_id.0),
            Payload::CancelNegotiate { call_id, sender_id } => {
                call_und_text(*call_id, &sender_id.0)
            }
            Payload::QueryCaps { call_id, peers } => Wert::Tupel(vec![
                Wert::I64(call_id.0),
                Wert::Array(
                    peers
                        .iter()
                        .map(|p| {
                            Wert::Tupel(vec![
                                Wert::Str(p.peer_id.0.clone()),
                                Wert::Str(p.adresse.clone()),
                            ])
                        })
                        .collect(),
                ),
            ]),
            Payload::ReplyCaps(r) => Wert::Tupel(vec![
                Wert::I64(r.call_id.0),
                Wert::U16(r.rtcp_ports[0]),
                Wert::U16(r.rtcp_ports[1]),
                Wert::Str(r.sende_caps.audio.clone()),
                Wert::Str(r.sende_caps.video.clone()),
                Wert::Str(r.empfangs_caps.audio.clone()),
                Wert::Str(r.empfangs_caps.video.clone()),
                Wert::Array(
                    r.peer_ports
                        .iter()
                        .map(|p| {
                            let mut felder = vec![Wert::Str(p.peer_id.0.clone())];
                            felder.extend(p.ports.iter().map(|port| Wert::U16(*port)));
                            Wert::Tupel(felder)
                        })
                        .collect(),
                ),
            ]),
            Payload::CallDetails(d) => Wert::Tupel(vec![
                Wert::I64(d.call_id.0),
                Wert::Str(d.sende_caps.audio.clone()),
                Wert::Str(d.sende_caps.video.clone()),
                Wert::Array(
                    d.eintraege
                        .iter()
                        .map(|e| {
                            let mut felder = vec![
                                Wert::Str(e.peer_id.0.clone()),
                                Wert::Str(e.sende_caps.audio.clone()),
                                Wert::Str(e.sende_caps.video.clone()),
                            ];
                            felder.extend(e.ports.iter().map(|port| Wert::U16(*port)));
                            Wert::Tupel(felder)
                        })
                        .collect(),
                ),
            ]),
            Payload::StartCall { call_id, peer_ids } => Wert::Tupel(vec![
                Wert::I64(call_id.0),
                Wert::Array(peer_ids.iter().map(|id| Wert::Str(id.0.clone())).collect()),
            ]),
            Payload::PauseCall { call_id, peer_id }
            | Payload::ResumeCall { call_id, peer_id }
            | Payload::EndCall { call_id, peer_id } => call_und_text(*call_id, &peer_id.0),
        }
    }

    /// Baut typisierte Nutzdaten aus einem bereits schema-geprueften Wert
    pub fn aus_wert(typ: MessageType, wert: Wert) -> WireResult<Self> {
        let mut t = TupelLeser::neu(wert)?;
        let payload = match typ {
            MessageType::Ack => Payload::Ack {
                message_id: MessageId(t.u64()?),
            },
            MessageType::Error => Payload::Error {
                message_id: MessageId(t.u64()?),
                text: t.string()?,
            },
            MessageType::ErrorCall => Payload::ErrorCall {
                call_id: CallId(t.i64()?),
                text: t.string()?,
            },
            MessageType::StartNegotiate => Payload::StartNegotiate {
                call_id: CallId(t.i64()?),
                negotiator_id: PeerId(t.string()?),
                negotiator_port: t.u16()?,
            },
            MessageType::OkNegotiate => Payload::OkNegotiate {
                call_id: CallId(t.i64()?),
                peer_id: PeerId(t.string()?),
            },
            MessageType::CancelNegotiate => Payload::CancelNegotiate {
                call_id: CallId(t.i64()?),
                sender_id: PeerId(t.string()?),
            },
            MessageType::QueryCaps => {
                let call_id = CallId(t.i64()?);
                let mut peers = Vec::new();
                for eintrag in t.array()? {
                    let mut e = TupelLeser::neu(eintrag)?;
                    peers.push(PeerEintrag {
                        peer_id: PeerId(e.string()?),
                        adresse: e.string()?,
                    });
                }
                Payload::QueryCaps { call_id, peers }
            }
            MessageType::ReplyCaps => {
                let call_id = CallId(t.i64()?);
                let rtcp_ports = [t.u16()?, t.u16()?];
                let sende_caps = MediaCaps::neu(t.string()?, t.string()?);
                let empfangs_caps = MediaCaps::neu(t.string()?, t.string()?);
                let mut peer_ports = Vec::new();
                for eintrag in t.array()? {
                    let mut e = TupelLeser::neu(eintrag)?;
                    peer_ports.push(PeerPorts {
                        peer_id: PeerId(e.string()?),
                        ports: [e.u16()?, e.u16()?, e.u16()?, e.u16()?],
                    });
                }
                Payload::ReplyCaps(ReplyCaps {
                    call_id,
                    rtcp_ports,
                    sende_caps,
                    empfangs_caps,
                    peer_ports,
                })
            }
            MessageType::CallDetails => {
                let call_id = CallId(t.i64()?);
                let sende_caps = MediaCaps::neu(t.string()?, t.string()?);
                let mut eintraege = Vec::new();
                for eintrag in t.array()? {
                    let mut e = TupelLeser::neu(eintrag)?;
                    eintraege.push(CallDetailsEintrag {
                        peer_id: PeerId(e.string()?),
                        sende_caps: MediaCaps::neu(e.string()?, e.string()?),
                        ports: [
                            e.u16()?,
                            e.u16()?,
                            e.u16()?,
                            e.u16()?,
                            e.u16()?,
                            e.u16()?,
                        ],
                    });
                }
                Payload::CallDetails(CallDetails {
                    call_id,
                    sende_caps,
                    eintraege,
                })
            }
            MessageType::StartCall => {
                let call_id = CallId(t.i64()?);
                let mut peer_ids = Vec::new();
                for id in t.array()? {
                    match id {
                        Wert::Str(s) => peer_ids.push(PeerId(s)),
                        andere => return Err(WireError::typ_fehler("s", andere.signatur())),
                    }
                }
                Payload::StartCall { call_id, peer_ids }
            }
            MessageType::PauseCall => Payload::PauseCall {
                call_id: CallId(t.i64()?),
                peer_id: PeerId(t.string()?),
            },
            MessageType::ResumeCall => Payload::ResumeCall {
                call_id: CallId(t.i64()?),
                peer_id: PeerId(t.string()?),
            },
            MessageType::EndCall => Payload::EndCall {
                call_id: CallId(t.i64()?),
                peer_id: PeerId(t.string()?),
            },
            MessageType::MulticastDiscover | MessageType::UnicastHiThere => {
                return Err(WireError::UnbekannterTyp(typ.code()))
            }
        };
        Ok(payload)
    }
}

fn call_und_text(call_id: CallId, text: &str) -> Wert {
    Wert::Tupel(vec![Wert::I64(call_id.0), Wert::Str(text.to_string())])
}

// ---------------------------------------------------------------------------
// ControlMessage
// ---------------------------------------------------------------------------

/// Eine vollstaendige Steuernachricht: Nachrichten-ID und Nutzdaten
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    pub id: MessageId,
    pub payload: Payload,
}

impl ControlMessage {
    /// Erstellt eine Nachricht mit frischer Nachrichten-ID
    pub fn neu(payload: Payload) -> Self {
        Self {
            id: MessageId::naechste(),
            payload,
        }
    }

    /// Bestaetigung einer Anfrage
    pub fn ack(antwort_auf: MessageId) -> Self {
        Self::neu(Payload::Ack {
            message_id: antwort_auf,
        })
    }

    /// Allgemeine Fehlerantwort
    pub fn error(antwort_auf: MessageId, text: impl Into<String>) -> Self {
        Self::neu(Payload::Error {
            message_id: antwort_auf,
            text: text.into(),
        })
    }

    /// Fehlerantwort bezogen auf eine Verhandlung
    pub fn error_call(call_id: CallId, text: impl Into<String>) -> Self {
        Self::neu(Payload::ErrorCall {
            call_id,
            text: text.into(),
        })
    }

    pub fn message_type(&self) -> MessageType {
        self.payload.message_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Signatur;

    #[test]
    fn codes_sind_umkehrbar() {
        for code in 0..200u32 {
            if let Some(typ) = MessageType::from_code(code) {
                assert_eq!(typ.code(), code);
                assert!(!typ.name().is_empty());
            }
        }
    }

    #[test]
    fn alle_schemas_parsebar() {
        for code in 0..200u32 {
            if let Some(typ) = MessageType::from_code(code) {
                let schema = typ.schema(1).unwrap();
                if typ.ist_discovery() {
                    assert!(schema.is_empty());
                } else {
                    assert!(Signatur::parsen(schema).is_ok(), "{}", typ);
                }
            }
        }
    }

    #[test]
    fn unbekannte_version_hat_kein_schema() {
        assert!(MessageType::Ack.schema(2).is_none());
    }

    #[test]
    fn call_id_extraktion() {
        let p = Payload::StartCall {
            call_id: CallId(9),
            peer_ids: vec![],
        };
        assert_eq!(p.call_id(), Some(CallId(9)));
        let ack = Payload::Ack {
            message_id: MessageId(1),
        };
        assert_eq!(ack.call_id(), None);
    }

    #[test]
    fn discovery_typ_ist_keine_tcp_payload() {
        let err = Payload::aus_wert(MessageType::UnicastHiThere, Wert::Tupel(vec![Wert::U64(1)]))
            .unwrap_err();
        assert!(matches!(err, WireError::UnbekannterTyp(101)));
    }
}
