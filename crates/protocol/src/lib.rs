//! partyline-protocol – Wire-Format des Verhandlungsprotokolls
//!
//! Dieses Crate definiert alle Nachrichtentypen, ihre Nutzdaten-Schemas
//! und die Kodierung fuer TCP-Steuernachrichten und UDP-Discovery.

pub mod control;
pub mod datagram;
pub mod error;
pub mod variant;
pub mod wire;

pub use control::{
    CallDetails, CallDetailsEintrag, ControlMessage, MessageType, Payload, PeerEintrag,
    PeerPorts, ReplyCaps,
};
pub use datagram::{DiscoveryMessage, DiscoveryTyp, MAX_DATAGRAMM};
pub use error::{WireError, WireResult};
pub use wire::{ControlCodec, MessageHeader, HEADER_GROESSE, MAX_NUTZDATEN, PROTOKOLL_VERSION};
