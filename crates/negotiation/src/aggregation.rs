//! Capability-Aggregation des Negotiators
//!
//! Aus den REPLY_CAPS aller Kandidaten (plus dem Negotiator selbst als
//! virtuellem Teilnehmer) entsteht pro Teilnehmer P eine personalisierte
//! CALL_DETAILS-Nachricht. Sie listet fuer jeden anderen Teilnehmer Q:
//! - Q's ID
//! - was Q senden wird (Q's Sende-Capabilities)
//! - die 6 Zielports fuer P -> Q: die 4 Ports die Q fuer P reserviert hat,
//!   gefolgt von Q's zwei RTCP-Empfangsports
//!
//! Fuer jedes P wird fuer jedes Q dessen Portliste nach P durchsucht.
//! Bei den ueblichen Teilnehmerzahlen ist das unkritisch.

use partyline_core::types::{CallId, MediaCaps, PeerId, RtcpPorts, SendPorts};
use partyline_protocol::{CallDetails, CallDetailsEintrag, PeerPorts, ReplyCaps};

use crate::error::{NegotiationError, NegotiationResult};

/// Was ein Teilnehmer zur Aggregation beitraegt
#[derive(Debug, Clone)]
pub struct Teilnehmer {
    pub id: PeerId,
    pub sende_caps: MediaCaps,
    pub rtcp_ports: RtcpPorts,
    /// Fuer jeden anderen Teilnehmer die 4 Ports, auf denen dieser empfaengt
    pub peer_ports: Vec<PeerPorts>,
}

impl Teilnehmer {
    /// Teilnehmer aus einer REPLY_CAPS-Antwort
    pub fn aus_antwort(id: PeerId, antwort: ReplyCaps) -> Self {
        Self {
            id,
            sende_caps: antwort.sende_caps,
            rtcp_ports: antwort.rtcp_ports,
            peer_ports: antwort.peer_ports,
        }
    }

    /// Zielports fuer Medien von `von` an diesen Teilnehmer
    fn ziel_ports_fuer(&self, von: &PeerId) -> Option<SendPorts> {
        let eintrag = self.peer_ports.iter().find(|p| &p.peer_id == von)?;
        let [a, b, c, d] = eintrag.ports;
        Some([a, b, c, d, self.rtcp_ports[0], self.rtcp_ports[1]])
    }
}

/// Berechnet die personalisierten CALL_DETAILS fuer alle Teilnehmer
///
/// Ergebnis in der Reihenfolge der Eingabe. Meldet ein Teilnehmer keine
/// Ports fuer einen anderen, schlaegt die gesamte Aggregation fehl.
pub fn aggregieren(
    call_id: CallId,
    teilnehmer: &[Teilnehmer],
) -> NegotiationResult<Vec<(PeerId, CallDetails)>> {
    for (i, t) in teilnehmer.iter().enumerate() {
        if teilnehmer[..i].iter().any(|v| v.id == t.id) {
            return Err(NegotiationError::DoppelterPeer(t.id.clone()));
        }
    }

    let mut ergebnis = Vec::with_capacity(teilnehmer.len());
    for p in teilnehmer {
        let mut eintraege = Vec::with_capacity(teilnehmer.len().saturating_sub(1));
        for q in teilnehmer.iter().filter(|q| q.id != p.id) {
            let ports = q.ziel_ports_fuer(&p.id).ok_or_else(|| {
                NegotiationError::protokoll(format!(
                    "{} meldet keine Empfangsports fuer {}",
                    q.id, p.id
                ))
            })?;
            eintraege.push(CallDetailsEintrag {
                peer_id: q.id.clone(),
                sende_caps: q.sende_caps.clone(),
                ports,
            });
        }
        ergebnis.push((
            p.id.clone(),
            CallDetails {
                call_id,
                sende_caps: p.sende_caps.clone(),
                eintraege,
            },
        ));
    }
    Ok(ergebnis)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> PeerId {
        PeerId::from(s)
    }

    /// Teilnehmer `name` mit RTCP-Basis `basis`; fuer den n-ten anderen
    /// Teilnehmer werden die Ports basis+2+4n..basis+5+4n gemeldet
    fn teilnehmer(name: &str, basis: u16, andere: &[&str]) -> Teilnehmer {
        Teilnehmer {
            id: id(name),
            sende_caps: MediaCaps::neu(format!("audio-{}", name), format!("video-{}", name)),
            rtcp_ports: [basis, basis + 1],
            peer_ports: andere
                .iter()
                .enumerate()
                .map(|(n, a)| {
                    let erster = basis + 2 + 4 * n as u16;
                    PeerPorts {
                        peer_id: id(a),
                        ports: [erster, erster + 1, erster + 2, erster + 3],
                    }
                })
                .collect(),
        }
    }

    fn vier_teilnehmer() -> Vec<Teilnehmer> {
        vec![
            teilnehmer("A", 1000, &["B", "C", "D"]),
            teilnehmer("B", 2000, &["A", "C", "D"]),
            teilnehmer("C", 3000, &["D", "A", "B"]),
            // D ist der Negotiator
            teilnehmer("D", 4000, &["A", "B", "C"]),
        ]
    }

    #[test]
    fn details_fuer_a() {
        let ergebnis = aggregieren(CallId(1), &vier_teilnehmer()).unwrap();
        let (ziel, details) = &ergebnis[0];
        assert_eq!(ziel, &id("A"));
        assert_eq!(details.sende_caps, MediaCaps::neu("audio-A", "video-A"));
        assert_eq!(details.eintraege.len(), 3);

        let b = details.eintraege.iter().find(|e| e.peer_id == id("B")).unwrap();
        // B hat fuer A (Index 0) die Ports 2002..2005 reserviert
        assert_eq!(b.ports, [2002, 2003, 2004, 2005, 2000, 2001]);
        assert_eq!(b.sende_caps, MediaCaps::neu("audio-B", "video-B"));

        let c = details.eintraege.iter().find(|e| e.peer_id == id("C")).unwrap();
        // C meldet A an Index 1
        assert_eq!(c.ports, [3006, 3007, 3008, 3009, 3000, 3001]);

        let d = details.eintraege.iter().find(|e| e.peer_id == id("D")).unwrap();
        assert_eq!(d.ports, [4002, 4003, 4004, 4005, 4000, 4001]);
    }

    #[test]
    fn nie_selbstbezueglich() {
        let ergebnis = aggregieren(CallId(1), &vier_teilnehmer()).unwrap();
        assert_eq!(ergebnis.len(), 4);
        for (ziel, details) in &ergebnis {
            assert_eq!(details.eintraege.len(), 3);
            assert!(details.eintraege.iter().all(|e| &e.peer_id != ziel));
            assert_eq!(details.call_id, CallId(1));
        }
    }

    #[test]
    fn fehlender_eintrag_bricht_ab() {
        let mut alle = vier_teilnehmer();
        // B vergisst C
        alle[1].peer_ports.retain(|p| p.peer_id != id("C"));
        let err = aggregieren(CallId(1), &alle).unwrap_err();
        assert!(matches!(err, NegotiationError::Protokoll(_)));
    }

    #[test]
    fn doppelte_teilnehmer_abgelehnt() {
        let alle = vec![
            teilnehmer("A", 1000, &["A"]),
            teilnehmer("A", 2000, &["A"]),
        ];
        assert!(matches!(
            aggregieren(CallId(1), &alle),
            Err(NegotiationError::DoppelterPeer(_))
        ));
    }

    #[test]
    fn einzelner_teilnehmer_ohne_eintraege() {
        let ergebnis = aggregieren(CallId(5), &[teilnehmer("A", 1000, &[])]).unwrap();
        assert!(ergebnis[0].1.eintraege.is_empty());
    }
}
