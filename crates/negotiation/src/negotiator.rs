//! Negotiator-Rolle
//!
//! Der Negotiator treibt die Verhandlung in festen Schritten. Innerhalb
//! eines Schritts gehen die Anfragen parallel an alle Kandidaten, der
//! naechste Schritt beginnt erst wenn alle Antworten vorliegen:
//!
//! ```text
//! START_NEGOTIATE -> QUERY_CAPS -> Aggregation -> CALL_DETAILS -> START_CALL
//!      (Kandidaten ohne Antwort
//!       werden uebersprungen)      (jeder Fehler ab hier bricht ab)
//! ```
//!
//! Ein Abbruch schickt CANCEL_NEGOTIATE an alle bereits kontaktierten
//! Kandidaten und setzt den Peer auf `Started|Failed` zurueck.

use futures_util::future::join_all;
use partyline_core::types::{CallId, MessageId, PeerId};
use partyline_core::CallEvent;
use partyline_protocol::{CallDetails, ControlMessage, PeerEintrag, PeerPorts, Payload, ReplyCaps};
use std::future::Future;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::aggregation::{aggregieren, Teilnehmer};
use crate::error::{NegotiationError, NegotiationResult};
use crate::peer::LocalPeer;
use crate::rpc;
use crate::session::NegotiationSession;
use crate::state::{Phase, RemoteState, Rolle};

/// Handle auf eine im Hintergrund laufende Verhandlung
#[derive(Debug)]
pub struct VerhandlungsHandle {
    call_id: CallId,
    abbruch: CancellationToken,
    task: JoinHandle<NegotiationResult<CallId>>,
}

impl VerhandlungsHandle {
    pub fn call_id(&self) -> CallId {
        self.call_id
    }

    /// Fordert den Abbruch an; wirkt zu Beginn des naechsten Schritts
    /// oder sofort waehrend ein Schritt auf Antworten wartet
    pub fn abbrechen(&self) {
        self.abbruch.cancel();
    }

    /// Wartet auf das Ende der Verhandlung
    pub async fn ergebnis(self) -> NegotiationResult<CallId> {
        match self.task.await {
            Ok(ergebnis) => ergebnis,
            Err(e) => Err(NegotiationError::invariante(format!(
                "Verhandlungs-Task beendet: {}",
                e
            ))),
        }
    }
}

/// Was `verhandlung_abbrechen` vorfindet
enum LaufendeSession {
    Negotiator(CancellationToken),
    Negotiatee(CallId),
}

impl LocalPeer {
    // -----------------------------------------------------------------------
    // Oeffentliche API
    // -----------------------------------------------------------------------

    /// Verhandelt mit den Kandidaten und wartet auf das Ergebnis
    pub async fn verhandeln(&self, kandidaten: &[SocketAddr]) -> NegotiationResult<CallId> {
        let (call_id, abbruch) = self.verhandlung_vorbereiten(kandidaten)?;
        self.verhandlung_ausfuehren(call_id, abbruch).await
    }

    /// Startet die Verhandlung als eigenen Task
    ///
    /// Fehler bei der Vorbereitung (Busy, keine Kandidaten, keine Ports)
    /// kommen sofort zurueck.
    pub fn verhandlung_starten(
        &self,
        kandidaten: &[SocketAddr],
    ) -> NegotiationResult<VerhandlungsHandle> {
        let (call_id, abbruch) = self.verhandlung_vorbereiten(kandidaten)?;
        let peer = self.clone();
        let token = abbruch.clone();
        let task = tokio::spawn(async move { peer.verhandlung_ausfuehren(call_id, token).await });
        Ok(VerhandlungsHandle {
            call_id,
            abbruch,
            task,
        })
    }

    /// Bricht die laufende Verhandlung ab, egal in welcher Rolle
    ///
    /// Gibt false zurueck wenn keine Verhandlung laeuft.
    pub async fn verhandlung_abbrechen(&self) -> bool {
        let laufend = {
            let z = self.lock();
            z.session.as_ref().map(|s| match s.abbruch_token() {
                Some(token) => LaufendeSession::Negotiator(token.clone()),
                None => LaufendeSession::Negotiatee(s.call_id),
            })
        };

        match laufend {
            Some(LaufendeSession::Negotiator(token)) => {
                token.cancel();
                true
            }
            Some(LaufendeSession::Negotiatee(call_id)) => {
                self.negotiatee_abbrechen(call_id, NegotiationError::abgebrochen("lokal abgebrochen"))
                    .await;
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Ablauf
    // -----------------------------------------------------------------------

    /// Legt Session und Ports an; alles oder nichts
    fn verhandlung_vorbereiten(
        &self,
        kandidaten: &[SocketAddr],
    ) -> NegotiationResult<(CallId, CancellationToken)> {
        let eigene_adresse = self.adresse();
        let mut ziele: Vec<SocketAddr> = Vec::with_capacity(kandidaten.len());
        for kandidat in kandidaten {
            if *kandidat != eigene_adresse && !ziele.contains(kandidat) {
                ziele.push(*kandidat);
            }
        }
        if ziele.is_empty() {
            return Err(NegotiationError::KeineKandidaten);
        }

        let call_id = CallId::zufaellig();
        let abbruch = CancellationToken::new();
        {
            let mut z = self.lock();
            if z.state.phase != Phase::Started || z.session.is_some() {
                return Err(NegotiationError::Busy);
            }

            let mut remotes = Vec::with_capacity(ziele.len());
            for ziel in &ziele {
                match z.registry.remote_erzeugen(*ziel, None) {
                    Ok(remote) => remotes.push(remote),
                    Err(e) => {
                        for remote in &remotes {
                            z.registry.remote_verwerfen(remote);
                        }
                        return Err(e);
                    }
                }
            }

            z.session = Some(NegotiationSession::als_negotiator(
                call_id,
                abbruch.clone(),
                remotes,
            ));
            z.state.verhandlung_beginnen(Rolle::Negotiator);
        }

        tracing::info!(call_id = %call_id, kandidaten = ziele.len(), "Verhandlung als Negotiator gestartet");
        self.ereignis(CallEvent::VerhandlungGestartet {
            call_id,
            negotiator: true,
        });
        Ok((call_id, abbruch))
    }

    async fn verhandlung_ausfuehren(
        &self,
        call_id: CallId,
        abbruch: CancellationToken,
    ) -> NegotiationResult<CallId> {
        match self.schritte(call_id, &abbruch).await {
            Ok(()) => Ok(call_id),
            Err(e) => {
                self.negotiator_abbrechen(call_id, &e).await;
                Err(e)
            }
        }
    }

    async fn schritte(&self, call_id: CallId, abbruch: &CancellationToken) -> NegotiationResult<()> {
        self.start_negotiate_runde(call_id, abbruch).await?;
        let antworten = self.query_caps_runde(call_id, abbruch).await?;
        let details = self.aggregation_anwenden(call_id, antworten)?;
        self.call_details_runde(call_id, abbruch, details).await?;
        self.start_call_runde(call_id, abbruch).await?;
        self.anruf_uebernehmen(call_id).await
    }

    /// Wartet auf `zukunft`, solange die Verhandlung nicht abgebrochen wird
    async fn mit_abbruch<T>(
        abbruch: &CancellationToken,
        zukunft: impl Future<Output = T>,
    ) -> NegotiationResult<T> {
        tokio::select! {
            _ = abbruch.cancelled() => Err(NegotiationError::abgebrochen("Verhandlung abgebrochen")),
            ergebnis = zukunft => Ok(ergebnis),
        }
    }

    // -----------------------------------------------------------------------
    // Schritt 1: START_NEGOTIATE
    // -----------------------------------------------------------------------

    async fn start_negotiate_runde(
        &self,
        call_id: CallId,
        abbruch: &CancellationToken,
    ) -> NegotiationResult<()> {
        let ziele: Vec<SocketAddr> = {
            let mut z = self.lock();
            let (session, _) = z.negotiator_teile(call_id)?;
            let ziele: Vec<SocketAddr> = session.remotes.iter().map(|r| r.adresse).collect();
            for ziel in &ziele {
                session.kontaktiert_markieren(*ziel);
            }
            ziele
        };

        let frist = self.config().rundlauf_timeout;
        let port = self.adresse().port();
        let anfragen = ziele.iter().map(|&ziel| {
            let nachricht = ControlMessage::neu(Payload::StartNegotiate {
                call_id,
                negotiator_id: self.id().clone(),
                negotiator_port: port,
            });
            async move {
                let antwort = rpc::anfrage(ziel, nachricht, frist).await;
                (ziel, antwort.and_then(|a| ok_negotiate_pruefen(call_id, a)))
            }
        });
        let antworten = Self::mit_abbruch(abbruch, join_all(anfragen)).await?;

        // (Adresse, Grund, CANCEL senden)
        let mut uebersprungen: Vec<(SocketAddr, NegotiationError, bool)> = Vec::new();
        let verbleibend = {
            let mut z = self.lock();
            let (session, registry) = z.negotiator_teile(call_id)?;
            for (ziel, ergebnis) in antworten {
                let ergebnis = ergebnis.and_then(|peer_id| {
                    if &peer_id == self.id() || session.remote(&peer_id).is_some() {
                        Err(NegotiationError::DoppelterPeer(peer_id))
                    } else {
                        Ok(peer_id)
                    }
                });
                match ergebnis {
                    Ok(peer_id) => {
                        if let Some(remote) = session.remote_per_adresse_mut(ziel) {
                            remote.id = Some(peer_id);
                        }
                    }
                    Err(e) => {
                        // Wer eine Session angelegt haben koennte, bekommt ein CANCEL
                        let abbrechen = e.ist_timeout()
                            || matches!(
                                e,
                                NegotiationError::DoppelterPeer(_) | NegotiationError::Protokoll(_)
                            );
                        session.remote_verwerfen(ziel, registry);
                        uebersprungen.push((ziel, e, abbrechen));
                    }
                }
            }
            session.remotes.len()
        };

        for (adresse, grund, _) in &uebersprungen {
            tracing::warn!(call_id = %call_id, peer = %adresse, fehler = %grund, "Kandidat uebersprungen");
            self.ereignis(CallEvent::PeerUebersprungen {
                call_id,
                adresse: *adresse,
                grund: grund.to_string(),
            });
        }

        let abbruch_ziele: Vec<SocketAddr> = uebersprungen
            .iter()
            .filter(|(_, _, abbrechen)| *abbrechen)
            .map(|(adresse, _, _)| *adresse)
            .collect();
        let eigene_id = self.id().clone();
        rpc::an_alle(&abbruch_ziele, self.config().kurz_timeout, |_| {
            ControlMessage::neu(Payload::CancelNegotiate {
                call_id,
                sender_id: eigene_id.clone(),
            })
        })
        .await;

        if verbleibend == 0 {
            return Err(NegotiationError::KeineKandidaten);
        }
        tracing::debug!(call_id = %call_id, verbleibend, "START_NEGOTIATE abgeschlossen");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Schritt 2: QUERY_CAPS
    // -----------------------------------------------------------------------

    async fn query_caps_runde(
        &self,
        call_id: CallId,
        abbruch: &CancellationToken,
    ) -> NegotiationResult<Vec<(SocketAddr, PeerId, ReplyCaps)>> {
        let kandidaten: Vec<(SocketAddr, PeerId)> = {
            let mut z = self.lock();
            let (session, _) = z.negotiator_teile(call_id)?;
            session
                .remotes
                .iter()
                .map(|r| {
                    r.id.clone().map(|id| (r.adresse, id)).ok_or_else(|| {
                        NegotiationError::invariante(format!("Kandidat {} ohne ID", r.adresse))
                    })
                })
                .collect::<NegotiationResult<_>>()?
        };

        let frist = self.config().rundlauf_timeout;
        let anfragen = kandidaten.iter().map(|(ziel, id)| {
            let peers = kandidaten
                .iter()
                .filter(|(_, anderer)| anderer != id)
                .map(|(adresse, anderer)| PeerEintrag {
                    peer_id: anderer.clone(),
                    adresse: adresse.to_string(),
                })
                .collect();
            let nachricht = ControlMessage::neu(Payload::QueryCaps { call_id, peers });
            let ziel = *ziel;
            let id = id.clone();
            async move {
                let antwort = rpc::anfrage(ziel, nachricht, frist).await;
                (ziel, id, antwort.and_then(|a| reply_caps_pruefen(call_id, a)))
            }
        });
        let antworten = Self::mit_abbruch(abbruch, join_all(anfragen)).await?;

        let mut ergebnis = Vec::with_capacity(antworten.len());
        for (ziel, id, antwort) in antworten {
            match antwort {
                Ok(caps) => ergebnis.push((ziel, id, caps)),
                Err(e) => {
                    tracing::warn!(call_id = %call_id, peer = %ziel, fehler = %e, "QUERY_CAPS fehlgeschlagen");
                    return Err(e);
                }
            }
        }
        Ok(ergebnis)
    }

    // -----------------------------------------------------------------------
    // Schritt 3: Aggregation
    // -----------------------------------------------------------------------

    /// Aggregiert alle Antworten plus den eigenen Beitrag
    ///
    /// Die eigenen Details werden direkt auf die Session angewendet, die
    /// uebrigen gehen mit Zieladresse zurueck.
    fn aggregation_anwenden(
        &self,
        call_id: CallId,
        antworten: Vec<(SocketAddr, PeerId, ReplyCaps)>,
    ) -> NegotiationResult<Vec<(SocketAddr, CallDetails)>> {
        let mut z = self.lock();
        let inner = &mut *z;
        let (session, _) = inner.negotiator_teile(call_id)?;

        let eigene_ports: Vec<PeerPorts> = session
            .remotes
            .iter()
            .filter_map(|r| {
                r.id.clone().map(|peer_id| PeerPorts {
                    peer_id,
                    ports: r.empfangs_ports,
                })
            })
            .collect();

        let mut teilnehmer = Vec::with_capacity(antworten.len() + 1);
        teilnehmer.push(Teilnehmer {
            id: self.id().clone(),
            sende_caps: self.lokale_capabilities().senden.clone(),
            rtcp_ports: self.config().rtcp_ports(),
            peer_ports: eigene_ports,
        });
        let mut adressen = Vec::with_capacity(antworten.len());
        for (adresse, id, antwort) in antworten {
            adressen.push((id.clone(), adresse));
            teilnehmer.push(Teilnehmer::aus_antwort(id, antwort));
        }

        let mut alle_details = aggregieren(call_id, &teilnehmer)?;
        let eigene_position = alle_details
            .iter()
            .position(|(id, _)| id == self.id())
            .ok_or_else(|| NegotiationError::invariante("Keine eigenen CALL_DETAILS"))?;
        let (_, eigene_details) = alle_details.remove(eigene_position);
        session.details_anwenden(&eigene_details, self.id())?;
        inner.ausgehandelt = Some(eigene_details.sende_caps);

        let mut ergebnis = Vec::with_capacity(alle_details.len());
        for (id, details) in alle_details {
            let adresse = adressen
                .iter()
                .find(|(kandidat, _)| kandidat == &id)
                .map(|(_, adresse)| *adresse)
                .ok_or_else(|| NegotiationError::invariante(format!("Keine Adresse fuer {}", id)))?;
            ergebnis.push((adresse, details));
        }
        Ok(ergebnis)
    }

    // -----------------------------------------------------------------------
    // Schritt 4: CALL_DETAILS
    // -----------------------------------------------------------------------

    async fn call_details_runde(
        &self,
        call_id: CallId,
        abbruch: &CancellationToken,
        details: Vec<(SocketAddr, CallDetails)>,
    ) -> NegotiationResult<()> {
        {
            let mut z = self.lock();
            z.negotiator_teile(call_id)?;
        }

        let frist = self.config().rundlauf_timeout;
        let anfragen = details.into_iter().map(|(ziel, d)| {
            let nachricht = ControlMessage::neu(Payload::CallDetails(d));
            let id = nachricht.id;
            async move {
                let antwort = rpc::anfrage(ziel, nachricht, frist).await;
                (ziel, antwort.and_then(|a| ack_pruefen(id, a)))
            }
        });
        let antworten = Self::mit_abbruch(abbruch, join_all(anfragen)).await?;
        alle_erfolgreich(call_id, "CALL_DETAILS", antworten)?;

        let mut z = self.lock();
        z.negotiator_teile(call_id)?;
        z.state.phase = Phase::Negotiated;
        tracing::debug!(call_id = %call_id, "Alle CALL_DETAILS bestaetigt");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Schritt 5: START_CALL
    // -----------------------------------------------------------------------

    async fn start_call_runde(
        &self,
        call_id: CallId,
        abbruch: &CancellationToken,
    ) -> NegotiationResult<()> {
        let (ziele, peer_ids) = {
            let mut z = self.lock();
            let (session, _) = z.negotiator_teile(call_id)?;
            let ziele: Vec<SocketAddr> = session.remotes.iter().map(|r| r.adresse).collect();
            let mut peer_ids: Vec<PeerId> =
                session.remotes.iter().filter_map(|r| r.id.clone()).collect();
            peer_ids.push(self.id().clone());
            (ziele, peer_ids)
        };

        let frist = self.config().rundlauf_timeout;
        let anfragen = ziele.iter().map(|&ziel| {
            let nachricht = ControlMessage::neu(Payload::StartCall {
                call_id,
                peer_ids: peer_ids.clone(),
            });
            let id = nachricht.id;
            async move {
                let antwort = rpc::anfrage(ziel, nachricht, frist).await;
                (ziel, antwort.and_then(|a| ack_pruefen(id, a)))
            }
        });
        let antworten = Self::mit_abbruch(abbruch, join_all(anfragen)).await?;
        alle_erfolgreich(call_id, "START_CALL", antworten)
    }

    // -----------------------------------------------------------------------
    // Schritt 6: Anruf uebernehmen
    // -----------------------------------------------------------------------

    /// Uebernimmt die Kandidaten als Remotes und startet die Medien
    ///
    /// Nach bestaetigtem START_CALL wird ein Abbruch nicht mehr beachtet.
    async fn anruf_uebernehmen(&self, call_id: CallId) -> NegotiationResult<()> {
        let (endpunkte, teilnehmer) = {
            let mut z = self.lock();
            let passt = z
                .session
                .as_ref()
                .is_some_and(|s| s.call_id == call_id && s.ist_negotiator());
            let session = match z.session.take() {
                Some(s) if passt => s,
                andere => {
                    z.session = andere;
                    return Err(NegotiationError::abgebrochen("Session nicht mehr aktiv"));
                }
            };

            let mut teilnehmer = Vec::with_capacity(session.remotes.len());
            for mut remote in session.abschliessen() {
                if let Some(id) = &remote.id {
                    if z.registry.finden(id).is_some() {
                        tracing::warn!(call_id = %call_id, peer_id = %id, "Remote bereits im Anruf");
                        z.registry.remote_verwerfen(&remote);
                        continue;
                    }
                    teilnehmer.push(id.clone());
                }
                remote.zustand = RemoteState::Ready;
                z.registry.hinzufuegen(remote)?;
            }

            z.aktive_call_id = call_id;
            z.state.anruf_bereit();
            (z.registry.media_endpunkte(), teilnehmer)
        };

        if let Err(e) = self.media().transport_starten(&endpunkte) {
            tracing::error!(call_id = %call_id, fehler = %e, "Medientransport konnte nicht starten");
            if let Err(beenden) = self.anruf_beenden().await {
                tracing::warn!(call_id = %call_id, fehler = %beenden, "Anruf nicht sauber beendet");
            }
            return Err(e.into());
        }

        {
            let mut z = self.lock();
            if z.aktive_call_id == call_id && z.state.phase == Phase::Ready {
                z.state.phase = Phase::Playing;
                for remote in z.registry.remotes_mut() {
                    remote.zustand = RemoteState::Playing;
                }
            }
        }

        tracing::info!(call_id = %call_id, teilnehmer = teilnehmer.len(), "Verhandlung abgeschlossen, Anruf laeuft");
        self.ereignis(CallEvent::VerhandlungAbgeschlossen {
            call_id,
            teilnehmer,
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Abbruch
    // -----------------------------------------------------------------------

    async fn negotiator_abbrechen(&self, call_id: CallId, fehler: &NegotiationError) {
        let empfaenger = {
            let mut z = self.lock();
            let passt = z
                .session
                .as_ref()
                .is_some_and(|s| s.call_id == call_id && s.ist_negotiator());
            if passt {
                z.session.take().map(|session| {
                    let empfaenger = session.abbruch_empfaenger();
                    session.verwerfen(&mut z.registry);
                    z.state.zuruecksetzen(true, false);
                    empfaenger
                })
            } else {
                // Die Session wurde bereits uebernommen (Medienfehler nach START_CALL)
                z.state.fehlgeschlagen = true;
                None
            }
        };

        let Some(empfaenger) = empfaenger else {
            return;
        };

        tracing::warn!(
            call_id = %call_id,
            fehler = %fehler,
            kontaktiert = empfaenger.len(),
            "Verhandlung als Negotiator abgebrochen"
        );

        let eigene_id = self.id().clone();
        rpc::an_alle(&empfaenger, self.config().kurz_timeout, |_| {
            ControlMessage::neu(Payload::CancelNegotiate {
                call_id,
                sender_id: eigene_id.clone(),
            })
        })
        .await;

        self.ereignis(CallEvent::VerhandlungAbgebrochen {
            call_id,
            grund: fehler.to_string(),
            timeout: false,
        });
    }
}

// ---------------------------------------------------------------------------
// Antwortpruefung
// ---------------------------------------------------------------------------

fn fehler_oder_unerwartet(payload: Payload) -> NegotiationError {
    match payload {
        Payload::Error { text, .. } | Payload::ErrorCall { text, .. } => {
            NegotiationError::FehlerAntwort(text)
        }
        andere => NegotiationError::protokoll(format!(
            "Unerwartete Antwort {}",
            andere.message_type()
        )),
    }
}

fn ok_negotiate_pruefen(call_id: CallId, antwort: ControlMessage) -> NegotiationResult<PeerId> {
    match antwort.payload {
        Payload::OkNegotiate {
            call_id: erhalten,
            peer_id,
        } if erhalten == call_id => Ok(peer_id),
        Payload::OkNegotiate { call_id: erhalten, .. } => Err(NegotiationError::protokoll(
            format!("OK_NEGOTIATE fuer {} statt {}", erhalten, call_id),
        )),
        andere => Err(fehler_oder_unerwartet(andere)),
    }
}

fn reply_caps_pruefen(call_id: CallId, antwort: ControlMessage) -> NegotiationResult<ReplyCaps> {
    match antwort.payload {
        Payload::ReplyCaps(caps) if caps.call_id == call_id => Ok(caps),
        Payload::ReplyCaps(caps) => Err(NegotiationError::protokoll(format!(
            "REPLY_CAPS fuer {} statt {}",
            caps.call_id, call_id
        ))),
        andere => Err(fehler_oder_unerwartet(andere)),
    }
}

fn ack_pruefen(anfrage: MessageId, antwort: ControlMessage) -> NegotiationResult<()> {
    match antwort.payload {
        Payload::Ack { message_id } if message_id == anfrage => Ok(()),
        Payload::Ack { message_id } => Err(NegotiationError::protokoll(format!(
            "ACK fuer {} statt {}",
            message_id, anfrage
        ))),
        andere => Err(fehler_oder_unerwartet(andere)),
    }
}

/// Erster Fehler eines Schritts bricht die Verhandlung ab
fn alle_erfolgreich(
    call_id: CallId,
    schritt: &str,
    antworten: Vec<(SocketAddr, NegotiationResult<()>)>,
) -> NegotiationResult<()> {
    for (ziel, antwort) in antworten {
        if let Err(e) = antwort {
            tracing::warn!(call_id = %call_id, peer = %ziel, schritt, fehler = %e, "Schritt fehlgeschlagen");
            return Err(e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_negotiate_mit_falscher_call_id() {
        let antwort = ControlMessage::neu(Payload::OkNegotiate {
            call_id: CallId(2),
            peer_id: PeerId::from("x"),
        });
        assert!(matches!(
            ok_negotiate_pruefen(CallId(1), antwort),
            Err(NegotiationError::Protokoll(_))
        ));
    }

    #[test]
    fn busy_wird_fehlerantwort() {
        let antwort = ControlMessage::error_call(CallId(1), "Busy");
        match ok_negotiate_pruefen(CallId(1), antwort) {
            Err(NegotiationError::FehlerAntwort(text)) => assert_eq!(text, "Busy"),
            andere => panic!("unerwartet: {:?}", andere),
        }
    }

    #[test]
    fn ack_muss_zur_anfrage_passen() {
        assert!(ack_pruefen(MessageId(7), ControlMessage::ack(MessageId(7))).is_ok());
        assert!(ack_pruefen(MessageId(7), ControlMessage::ack(MessageId(8))).is_err());
        assert!(ack_pruefen(MessageId(7), ControlMessage::error(MessageId(7), "nein")).is_err());
    }
}
