//! partyline-core – Gemeinsame Typen, Fehler und Kollaborator-Traits
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Partyline-Crates gemeinsam genutzt werden: Identifikationstypen,
//! Capability- und Port-Typen, Anruf-Ereignisse und die Schnittstelle
//! zur (externen) Medienschicht.

pub mod error;
pub mod event;
pub mod media;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{PartylineError, Result};
pub use event::CallEvent;
pub use media::{MediaBackend, MediaEndpoint, NullMedia};
pub use types::{
    CallId, CapabilitySet, MediaCaps, MessageId, PeerId, ReceivePorts, RtcpPorts, SendPorts,
};
