//! Message-Dispatcher – Routet eingehende Steuernachrichten an die Handler
//!
//! Jede Anfrage bekommt genau eine Antwort. Fehler eines Handlers werden
//! zu ERROR_CALL (mit Call-ID) bzw. ERROR (ohne Call-ID). Antworttypen
//! (ACK, ERROR, OK_NEGOTIATE, REPLY_CAPS, ...) werden als Anfrage nicht
//! akzeptiert.

use partyline_core::types::{CallId, MessageId};
use partyline_protocol::{ControlMessage, Payload};
use std::net::SocketAddr;

use crate::error::NegotiationError;
use crate::handlers::{anruf_handler, verhandlung_handler};
use crate::peer::LocalPeer;

impl LocalPeer {
    /// Verarbeitet eine Anfrage von `quelle` und gibt die Antwort zurueck
    pub fn nachricht_verarbeiten(&self, nachricht: ControlMessage, quelle: SocketAddr) -> ControlMessage {
        let nachricht_id = nachricht.id;
        let typ = nachricht.message_type();
        let call_id = nachricht.payload.call_id();

        tracing::debug!(
            quelle = %quelle,
            nachricht_id = %nachricht_id,
            typ = %typ,
            "Nachricht empfangen"
        );

        let ergebnis = match nachricht.payload {
            Payload::StartNegotiate {
                call_id,
                negotiator_id,
                negotiator_port,
            } => verhandlung_handler::start_negotiate(
                self,
                quelle,
                call_id,
                negotiator_id,
                negotiator_port,
            ),
            Payload::QueryCaps { call_id, peers } => {
                verhandlung_handler::query_caps(self, call_id, peers)
            }
            Payload::CallDetails(details) => {
                verhandlung_handler::call_details(self, nachricht_id, details)
            }
            Payload::StartCall { call_id, peer_ids } => {
                verhandlung_handler::start_call(self, nachricht_id, call_id, peer_ids)
            }
            Payload::CancelNegotiate { call_id, sender_id } => {
                verhandlung_handler::cancel_negotiate(self, nachricht_id, call_id, sender_id)
            }
            Payload::PauseCall { call_id, peer_id } => {
                anruf_handler::pause_resume(self, nachricht_id, call_id, peer_id, true)
            }
            Payload::ResumeCall { call_id, peer_id } => {
                anruf_handler::pause_resume(self, nachricht_id, call_id, peer_id, false)
            }
            Payload::EndCall { call_id, peer_id } => {
                anruf_handler::end_call(self, nachricht_id, call_id, peer_id)
            }
            Payload::Ack { .. }
            | Payload::Error { .. }
            | Payload::ErrorCall { .. }
            | Payload::OkNegotiate { .. }
            | Payload::ReplyCaps(_) => {
                tracing::warn!(quelle = %quelle, typ = %typ, "Antworttyp als Anfrage erhalten");
                return ControlMessage::error(
                    nachricht_id,
                    format!("{} ist keine Anfrage", typ),
                );
            }
        };

        match ergebnis {
            Ok(antwort) => antwort,
            Err(e) => fehler_antwort(nachricht_id, call_id, &e, quelle),
        }
    }
}

fn fehler_antwort(
    nachricht_id: MessageId,
    call_id: Option<CallId>,
    fehler: &NegotiationError,
    quelle: SocketAddr,
) -> ControlMessage {
    if matches!(fehler, NegotiationError::Busy) {
        tracing::debug!(quelle = %quelle, "Busy");
    } else {
        tracing::warn!(quelle = %quelle, nachricht_id = %nachricht_id, fehler = %fehler, "Anfrage abgelehnt");
    }
    match call_id {
        Some(call_id) if !call_id.ist_keine() => ControlMessage::error_call(call_id, fehler.to_string()),
        _ => ControlMessage::error(nachricht_id, fehler.to_string()),
    }
}
