//! Fehlertypen fuer die Discovery

use partyline_protocol::WireError;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("Wire-Fehler: {0}")]
    Wire(#[from] WireError),

    /// Discovery arbeitet nur mit IPv4
    #[error("Keine IPv4-Adresse: {0}")]
    KeinIpv4(IpAddr),

    #[error("{0} ist keine Multicast-Adresse")]
    KeineMulticastGruppe(Ipv4Addr),

    /// Beitritt zur Gruppe ist auf keinem Interface gelungen
    #[error("Multicast-Gruppe {0} auf keinem Interface beigetreten")]
    KeinInterface(Ipv4Addr),

    #[error("DISCOVER konnte auf keinem Interface gesendet werden")]
    KeinVersand,
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
