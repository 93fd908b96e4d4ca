//! Fehlertypen fuer die Verhandlung

use partyline_core::{CallId, PartylineError, PeerId};
use partyline_protocol::WireError;
use thiserror::Error;

/// Fehlertyp fuer Verhandlung und Anrufsteuerung
#[derive(Debug, Error)]
pub enum NegotiationError {
    /// IO-Fehler (Verbindungsaufbau, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Keine Antwort innerhalb der Frist
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Nachricht konnte nicht gelesen oder geschrieben werden
    #[error("Wire-Fehler: {0}")]
    Wire(#[from] WireError),

    /// Unerwartete oder inhaltlich falsche Nachricht
    #[error("Protokollfehler: {0}")]
    Protokoll(String),

    /// Peer ist nicht bereit fuer eine neue Verhandlung
    #[error("Busy")]
    Busy,

    #[error("Unbekannte Call-ID: {0}")]
    UnbekannteCallId(CallId),

    /// Peer-ID kommt in einer Kandidatenliste doppelt vor
    #[error("Doppelter Peer: {0}")]
    DoppelterPeer(PeerId),

    /// Gegenseite hat mit ERROR oder ERROR_CALL geantwortet
    #[error("Fehlerantwort: {0}")]
    FehlerAntwort(String),

    /// Interner Widerspruch im Verhandlungszustand
    #[error("Invariante verletzt: {0}")]
    Invariante(String),

    /// Verhandlung wurde abgebrochen (lokal oder von der Gegenseite)
    #[error("Abgebrochen: {0}")]
    Abgebrochen(String),

    #[error("Keine Kandidaten uebrig")]
    KeineKandidaten,

    #[error("Keine freien Ports mehr")]
    PortsErschoepft,

    #[error("Medienschicht: {0}")]
    Medien(#[from] PartylineError),
}

impl NegotiationError {
    pub fn protokoll(msg: impl Into<String>) -> Self {
        Self::Protokoll(msg.into())
    }

    pub fn invariante(msg: impl Into<String>) -> Self {
        Self::Invariante(msg.into())
    }

    pub fn abgebrochen(msg: impl Into<String>) -> Self {
        Self::Abgebrochen(msg.into())
    }

    /// Transportfehler: der betroffene Peer wird uebersprungen statt die
    /// ganze Verhandlung abzubrechen
    pub fn ist_transport(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_) | Self::Wire(_))
    }

    pub fn ist_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Result-Typ fuer die Verhandlung
pub type NegotiationResult<T> = Result<T, NegotiationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_text_ist_stabil() {
        assert_eq!(NegotiationError::Busy.to_string(), "Busy");
    }

    #[test]
    fn transport_klassifikation() {
        assert!(NegotiationError::Timeout("x".into()).ist_transport());
        assert!(NegotiationError::Wire(WireError::Abgeschnitten).ist_transport());
        assert!(!NegotiationError::Busy.ist_transport());
        assert!(!NegotiationError::invariante("x").ist_transport());
    }
}
