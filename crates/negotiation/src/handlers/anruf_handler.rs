//! Anruf-Handler – PAUSE_CALL, RESUME_CALL, END_CALL
//!
//! Nur fuer den aktiven Anruf; eine fremde Call-ID ist ein Fehler.

use partyline_core::types::{CallId, MessageId, PeerId};
use partyline_core::CallEvent;
use partyline_protocol::ControlMessage;

use crate::error::{NegotiationError, NegotiationResult};
use crate::peer::LocalPeer;
use crate::state::RemoteState;

/// Prueft Call-ID und Remote und setzt dessen Zustand
fn remote_umschalten(
    peer: &LocalPeer,
    call_id: CallId,
    peer_id: &PeerId,
    zustand: RemoteState,
) -> NegotiationResult<()> {
    let mut z = peer.lock();
    if call_id.ist_keine() || z.aktive_call_id != call_id {
        return Err(NegotiationError::UnbekannteCallId(call_id));
    }
    let remote = z
        .registry
        .finden_mut(peer_id)
        .ok_or_else(|| NegotiationError::protokoll(format!("Unbekannter Peer {}", peer_id)))?;
    remote.zustand = zustand;
    Ok(())
}

/// PAUSE_CALL bzw. RESUME_CALL eines Remotes
pub(crate) fn pause_resume(
    peer: &LocalPeer,
    nachricht_id: MessageId,
    call_id: CallId,
    peer_id: PeerId,
    pausieren: bool,
) -> NegotiationResult<ControlMessage> {
    let zustand = if pausieren {
        RemoteState::Paused
    } else {
        RemoteState::Playing
    };
    remote_umschalten(peer, call_id, &peer_id, zustand)?;

    if pausieren {
        peer.media().remote_pausieren(&peer_id);
        tracing::info!(call_id = %call_id, peer_id = %peer_id, "Remote pausiert");
        peer.ereignis(CallEvent::AnrufPausiert { call_id, peer_id });
    } else {
        peer.media().remote_fortsetzen(&peer_id);
        tracing::info!(call_id = %call_id, peer_id = %peer_id, "Remote setzt fort");
        peer.ereignis(CallEvent::AnrufFortgesetzt { call_id, peer_id });
    }
    Ok(ControlMessage::ack(nachricht_id))
}

/// END_CALL: der Remote verlaesst den Anruf
pub(crate) fn end_call(
    peer: &LocalPeer,
    nachricht_id: MessageId,
    call_id: CallId,
    peer_id: PeerId,
) -> NegotiationResult<ControlMessage> {
    {
        let z = peer.lock();
        if call_id.ist_keine() || z.aktive_call_id != call_id {
            return Err(NegotiationError::UnbekannteCallId(call_id));
        }
        if z.registry.finden(&peer_id).is_none() {
            return Err(NegotiationError::protokoll(format!(
                "Unbekannter Peer {}",
                peer_id
            )));
        }
    }
    peer.remotes_entfernen(call_id, std::slice::from_ref(&peer_id));
    Ok(ControlMessage::ack(nachricht_id))
}
