//! partyline-negotiation – Verhandlung von Mehrparteien-Anrufen
//!
//! Dieser Crate implementiert das Verhandlungsprotokoll zwischen Peers:
//! ein Peer (Negotiator) fuehrt alle anderen (Negotiatees) durch mehrere
//! RPC-Runden, vergibt Ports pro Peer-Paar und verteilt am Ende jedem
//! Teilnehmer seine personalisierten Anrufdetails.
//!
//! ## Architektur
//!
//! ```text
//! Listener (TCP, begrenzter Pool)
//!     |
//!     v
//! Dispatcher (LocalPeer::nachricht_verarbeiten)
//!     |
//!     +-- VerhandlungHandler (START_NEGOTIATE, QUERY_CAPS, CALL_DETAILS,
//!     |                       START_CALL, CANCEL_NEGOTIATE)
//!     +-- AnrufHandler       (PAUSE_CALL, RESUME_CALL, END_CALL)
//!
//! LocalPeer (ein Mutex)
//!     +-- PeerState          Phase, Rolle, Failed/Timeout
//!     +-- NegotiationSession hoechstens eine, mit Kandidaten
//!     +-- PeerRegistry       Remotes des laufenden Anrufs + PortAllocator
//!
//! Negotiator (eigener Task) --rpc--> Listener der Kandidaten
//! ```

pub mod aggregation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod listener;
pub mod negotiator;
pub mod peer;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod state;

// Bequeme Re-Exporte
pub use config::VerhandlungsConfig;
pub use error::{NegotiationError, NegotiationResult};
pub use listener::Listener;
pub use negotiator::VerhandlungsHandle;
pub use peer::LocalPeer;
pub use registry::{PeerRegistry, PortAllocator, RemotePeer};
pub use state::{Phase, PeerState, RemoteState, Rolle};
