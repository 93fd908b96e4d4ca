//! partyline-discovery – Peers im lokalen Netz finden
//!
//! Ein Peer ruft per Multicast "wer ist da?" (MULTICAST_DISCOVER), andere
//! Peers antworten per Unicast (UNICAST_HI_THERE). Die Absenderadresse der
//! Antwort ist die Verhandlungsadresse des Antwortenden.
//!
//! Discovery veraendert keinen Peer-Zustand, sie meldet nur Adressen ueber
//! einen Kanal. Ob mit einer Adresse verhandelt wird, entscheidet der Aufrufer.

pub mod config;
pub mod error;
pub mod service;

pub use config::DiscoveryConfig;
pub use error::{DiscoveryError, DiscoveryResult};
pub use service::{entscheiden, Aktion, DiscoveryService, EigeneAdressen};
