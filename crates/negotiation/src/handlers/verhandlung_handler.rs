//! Verhandlungs-Handler – Negotiatee-Seite
//!
//! START_NEGOTIATE, QUERY_CAPS, CALL_DETAILS, START_CALL und
//! CANCEL_NEGOTIATE. Jeder Handler laeuft synchron unter dem Peer-Lock
//! und liefert die Antwortnachricht; Fehler wandelt der Dispatcher in
//! ERROR_CALL um.

use partyline_core::types::{CallId, MessageId, PeerId};
use partyline_core::CallEvent;
use partyline_protocol::{CallDetails, ControlMessage, PeerEintrag, PeerPorts, Payload, ReplyCaps};
use std::net::SocketAddr;

use crate::error::{NegotiationError, NegotiationResult};
use crate::peer::LocalPeer;
use crate::registry::RemotePeer;
use crate::session::NegotiationSession;
use crate::state::{Phase, RemoteState, Rolle};

/// START_NEGOTIATE: neue Session als Negotiatee
///
/// Der Host des Negotiators kommt aus der Verbindung, nur der Port aus
/// der Nachricht.
pub(crate) fn start_negotiate(
    peer: &LocalPeer,
    quelle: SocketAddr,
    call_id: CallId,
    negotiator_id: PeerId,
    negotiator_port: u16,
) -> NegotiationResult<ControlMessage> {
    if call_id.ist_keine() {
        return Err(NegotiationError::protokoll("START_NEGOTIATE ohne Call-ID"));
    }
    if &negotiator_id == peer.id() {
        return Err(NegotiationError::protokoll("START_NEGOTIATE von uns selbst"));
    }
    let negotiator_adresse = SocketAddr::new(quelle.ip(), negotiator_port);

    {
        let mut z = peer.lock();
        if z.state.phase != Phase::Started || z.session.is_some() {
            tracing::debug!(
                call_id = %call_id,
                phase = z.state.phase.name(),
                "START_NEGOTIATE abgelehnt"
            );
            return Err(NegotiationError::Busy);
        }

        let negotiator = z
            .registry
            .remote_erzeugen(negotiator_adresse, Some(negotiator_id))?;
        let mut session = NegotiationSession::als_negotiatee(call_id, negotiator);
        session.timer_setzen(peer.timer_starten(call_id));
        z.session = Some(session);
        z.state.verhandlung_beginnen(Rolle::Negotiatee);
    }

    tracing::info!(call_id = %call_id, negotiator = %negotiator_adresse, "Verhandlung als Negotiatee gestartet");
    peer.ereignis(CallEvent::VerhandlungGestartet {
        call_id,
        negotiator: false,
    });

    Ok(ControlMessage::neu(Payload::OkNegotiate {
        call_id,
        peer_id: peer.id().clone(),
    }))
}

/// QUERY_CAPS: Kandidaten anlegen, Ports vergeben, eigene Caps melden
pub(crate) fn query_caps(
    peer: &LocalPeer,
    call_id: CallId,
    peers: Vec<PeerEintrag>,
) -> NegotiationResult<ControlMessage> {
    // Erst alles pruefen, dann anlegen
    let mut kandidaten: Vec<(PeerId, SocketAddr)> = Vec::with_capacity(peers.len());
    for eintrag in peers {
        let adresse: SocketAddr = eintrag.adresse.parse().map_err(|_| {
            NegotiationError::protokoll(format!("Ungueltige Adresse {:?}", eintrag.adresse))
        })?;
        if &eintrag.peer_id == peer.id() {
            return Err(NegotiationError::protokoll("QUERY_CAPS nennt uns selbst"));
        }
        if kandidaten.iter().any(|(id, _)| id == &eintrag.peer_id) {
            return Err(NegotiationError::DoppelterPeer(eintrag.peer_id));
        }
        kandidaten.push((eintrag.peer_id, adresse));
    }

    let caps = peer.lokale_capabilities();
    let rtcp_ports = peer.config().rtcp_ports();

    let mut z = peer.lock();
    if z.state.phase != Phase::Negotiating {
        return Err(NegotiationError::protokoll(format!(
            "QUERY_CAPS in Phase {}",
            z.state.phase.name()
        )));
    }
    let inner = &mut *z;
    let (session, registry) = inner.negotiatee_teile(call_id)?;
    if session.remotes.len() > 1 {
        return Err(NegotiationError::protokoll("QUERY_CAPS wurde bereits beantwortet"));
    }
    if let Some((id, _)) = kandidaten
        .iter()
        .find(|(id, _)| session.remote(id).is_some())
    {
        return Err(NegotiationError::DoppelterPeer(id.clone()));
    }

    let mut neue: Vec<RemotePeer> = Vec::with_capacity(kandidaten.len());
    for (id, adresse) in kandidaten {
        match registry.remote_erzeugen(adresse, Some(id)) {
            Ok(remote) => neue.push(remote),
            Err(e) => {
                for remote in &neue {
                    registry.remote_verwerfen(remote);
                }
                return Err(e);
            }
        }
    }
    session.remotes.extend(neue);
    session.ticks_zuruecksetzen();

    let peer_ports = session
        .remotes
        .iter()
        .filter_map(|r| {
            r.id.clone().map(|peer_id| PeerPorts {
                peer_id,
                ports: r.empfangs_ports,
            })
        })
        .collect();

    tracing::debug!(call_id = %call_id, kandidaten = session.remotes.len(), "QUERY_CAPS beantwortet");

    Ok(ControlMessage::neu(Payload::ReplyCaps(ReplyCaps {
        call_id,
        rtcp_ports,
        sende_caps: caps.senden.clone(),
        empfangs_caps: caps.empfangen.clone(),
        peer_ports,
    })))
}

/// CALL_DETAILS: Zielports und erwartete Caps uebernehmen
pub(crate) fn call_details(
    peer: &LocalPeer,
    nachricht_id: MessageId,
    details: CallDetails,
) -> NegotiationResult<ControlMessage> {
    let call_id = details.call_id;
    let mut z = peer.lock();
    if z.state.phase != Phase::Negotiating {
        return Err(NegotiationError::protokoll(format!(
            "CALL_DETAILS in Phase {}",
            z.state.phase.name()
        )));
    }
    let inner = &mut *z;
    let (session, _) = inner.negotiatee_teile(call_id)?;
    session.details_anwenden(&details, peer.id())?;
    session.ticks_zuruecksetzen();
    inner.ausgehandelt = Some(details.sende_caps);
    inner.state.phase = Phase::Negotiated;

    tracing::debug!(call_id = %call_id, "CALL_DETAILS uebernommen");
    Ok(ControlMessage::ack(nachricht_id))
}

/// START_CALL: Kandidaten werden Remotes, Medien starten
pub(crate) fn start_call(
    peer: &LocalPeer,
    nachricht_id: MessageId,
    call_id: CallId,
    peer_ids: Vec<PeerId>,
) -> NegotiationResult<ControlMessage> {
    let uebernahme = {
        let mut z = peer.lock();
        if z.state.phase != Phase::Negotiated {
            return Err(NegotiationError::protokoll(format!(
                "START_CALL in Phase {}",
                z.state.phase.name()
            )));
        }
        let inner = &mut *z;
        let (session, _) = inner.negotiatee_teile(call_id)?;
        let unbekannt = peer_ids
            .iter()
            .find(|id| *id != peer.id() && session.remote(id).is_none())
            .cloned();
        let Some(session) = inner.session.take() else {
            return Err(NegotiationError::UnbekannteCallId(call_id));
        };

        if let Some(id) = unbekannt {
            session.verwerfen(&mut inner.registry);
            inner.state.zuruecksetzen(true, false);
            Err(NegotiationError::invariante(format!(
                "START_CALL nennt unbekannten Peer {}",
                id
            )))
        } else {
            let mut teilnehmer = Vec::with_capacity(peer_ids.len());
            for mut remote in session.abschliessen() {
                let gelistet = remote.id.as_ref().is_some_and(|id| peer_ids.contains(id));
                let schon_da = remote
                    .id
                    .as_ref()
                    .is_some_and(|id| inner.registry.finden(id).is_some());
                if !gelistet || schon_da {
                    inner.registry.remote_verwerfen(&remote);
                    continue;
                }
                remote.zustand = RemoteState::Ready;
                if let Some(id) = &remote.id {
                    teilnehmer.push(id.clone());
                }
                inner.registry.hinzufuegen(remote)?;
            }
            inner.aktive_call_id = call_id;
            inner.state.anruf_bereit();
            Ok((inner.registry.media_endpunkte(), teilnehmer))
        }
    };

    let (endpunkte, teilnehmer) = match uebernahme {
        Ok(uebernahme) => uebernahme,
        Err(fehler) => {
            tracing::warn!(call_id = %call_id, fehler = %fehler, "Verhandlung als Negotiatee abgebrochen");
            peer.ereignis(CallEvent::VerhandlungAbgebrochen {
                call_id,
                grund: fehler.to_string(),
                timeout: false,
            });
            return Err(fehler);
        }
    };

    if let Err(e) = peer.media().transport_starten(&endpunkte) {
        tracing::error!(call_id = %call_id, fehler = %e, "Medientransport konnte nicht starten");
        peer.anruf_abbauen(call_id);
        return Err(e.into());
    }

    {
        let mut z = peer.lock();
        if z.aktive_call_id == call_id && z.state.phase == Phase::Ready {
            z.state.phase = Phase::Playing;
            for remote in z.registry.remotes_mut() {
                remote.zustand = RemoteState::Playing;
            }
        }
    }

    tracing::info!(call_id = %call_id, teilnehmer = teilnehmer.len(), "Anruf als Negotiatee gestartet");
    peer.ereignis(CallEvent::VerhandlungAbgeschlossen {
        call_id,
        teilnehmer,
    });
    Ok(ControlMessage::ack(nachricht_id))
}

/// CANCEL_NEGOTIATE: Session verwerfen bzw. laufende Verhandlung abbrechen
///
/// Scheitert START_CALL nur bei einem Teil der Kandidaten, haben die
/// uebrigen den Anruf bereits uebernommen. Kommt der Abbruch von einem
/// Remote dieses Anrufs, wird der Anruf wieder abgebaut.
pub(crate) fn cancel_negotiate(
    peer: &LocalPeer,
    nachricht_id: MessageId,
    call_id: CallId,
    sender_id: PeerId,
) -> NegotiationResult<ControlMessage> {
    let (token, im_anruf) = {
        let z = peer.lock();
        match z.session.as_ref() {
            Some(s) if s.call_id == call_id => (Some(s.abbruch_token().cloned()), false),
            _ => {
                let im_anruf = !call_id.ist_keine()
                    && z.aktive_call_id == call_id
                    && z.registry.finden(&sender_id).is_some();
                (None, im_anruf)
            }
        }
    };

    let Some(token) = token else {
        if im_anruf && peer.anruf_abbauen(call_id).is_some() {
            tracing::info!(call_id = %call_id, sender = %sender_id, "Uebernommener Anruf vom Negotiator zurueckgenommen");
            peer.ereignis(CallEvent::VerhandlungAbgebrochen {
                call_id,
                grund: format!("von {} nach START_CALL abgebrochen", sender_id),
                timeout: false,
            });
            return Ok(ControlMessage::ack(nachricht_id));
        }
        return Err(NegotiationError::UnbekannteCallId(call_id));
    };

    match token {
        Some(token) => {
            tracing::info!(call_id = %call_id, sender = %sender_id, "Kandidat bricht Verhandlung ab");
            token.cancel();
        }
        None => {
            if peer.negotiatee_session_verwerfen(call_id, false, false).is_none() {
                return Err(NegotiationError::UnbekannteCallId(call_id));
            }
            tracing::info!(call_id = %call_id, sender = %sender_id, "Verhandlung vom Negotiator abgebrochen");
            peer.ereignis(CallEvent::VerhandlungAbgebrochen {
                call_id,
                grund: format!("von {} abgebrochen", sender_id),
                timeout: false,
            });
        }
    }
    Ok(ControlMessage::ack(nachricht_id))
}
