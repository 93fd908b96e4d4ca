//! TCP-Listener – nimmt Steuerverbindungen an
//!
//! Jede Verbindung traegt genau einen Zyklus: Anfrage lesen, verarbeiten,
//! Antwort schreiben, schliessen. Die Zahl gleichzeitig bearbeiteter
//! Verbindungen ist durch `pool_groesse` begrenzt; weitere Verbindungen
//! warten auf einen freien Platz.

use partyline_core::types::MessageId;
use partyline_protocol::{wire, ControlMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

use crate::error::{NegotiationError, NegotiationResult};
use crate::peer::LocalPeer;

/// Gebundener Listener fuer Steuernachrichten
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    adresse: SocketAddr,
}

impl Listener {
    /// Bindet den Socket; Port 0 waehlt einen freien Port
    pub async fn binden(adresse: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(adresse).await?;
        let adresse = listener.local_addr()?;
        Ok(Self { listener, adresse })
    }

    /// Tatsaechlich gebundene Adresse
    pub fn lokale_adresse(&self) -> SocketAddr {
        self.adresse
    }

    /// Accept-Loop bis `shutdown_rx` `true` meldet
    pub async fn starten(self, peer: LocalPeer, mut shutdown_rx: watch::Receiver<bool>) {
        let plaetze = Arc::new(Semaphore::new(peer.config().pool_groesse.max(1)));

        tracing::info!(
            adresse = %self.adresse,
            pool = peer.config().pool_groesse,
            "Listener gestartet"
        );

        loop {
            // Erst einen freien Platz, dann die naechste Verbindung annehmen
            let platz = tokio::select! {
                platz = Arc::clone(&plaetze).acquire_owned() => match platz {
                    Ok(platz) => platz,
                    Err(_) => break,
                },

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Listener: Shutdown-Signal empfangen");
                        break;
                    }
                    continue;
                }
            };

            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, quelle)) => {
                            let peer = peer.clone();
                            tokio::spawn(async move {
                                verbindung_bearbeiten(&peer, stream, quelle).await;
                                drop(platz);
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Listener: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!(adresse = %self.adresse, "Listener gestoppt");
    }
}

/// Ein vollstaendiger Zyklus unter der Rundlauf-Frist
async fn verbindung_bearbeiten(peer: &LocalPeer, mut stream: TcpStream, quelle: SocketAddr) {
    let frist = peer.config().rundlauf_timeout;
    let ergebnis = tokio::time::timeout(frist, zyklus(peer, &mut stream, quelle))
        .await
        .map_err(|_| NegotiationError::Timeout(format!("Verbindung von {}", quelle)))
        .and_then(|r| r);

    if let Err(e) = ergebnis {
        tracing::warn!(quelle = %quelle, fehler = %e, "Verbindung abgebrochen");
    }
}

async fn zyklus(peer: &LocalPeer, stream: &mut TcpStream, quelle: SocketAddr) -> NegotiationResult<()> {
    let header = wire::header_lesen(stream).await?;
    let antwort = match wire::body_lesen(stream, &header).await {
        Ok(nachricht) => peer.nachricht_verarbeiten(nachricht, quelle),
        Err(e) if e.ist_dekodierfehler() => {
            tracing::warn!(quelle = %quelle, fehler = %e, "Nachricht nicht dekodierbar");
            ControlMessage::error(header.id, e.to_string())
        }
        Err(e) => return Err(e.into()),
    };
    tracing::trace!(quelle = %quelle, antwort = %antwort.message_type(), "Antwort wird gesendet");
    wire::nachricht_schreiben(stream, &antwort).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VerhandlungsConfig;
    use crate::rpc;
    use partyline_core::NullMedia;
    use partyline_protocol::{MessageType, Payload};
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn gestartet() -> (LocalPeer, SocketAddr, watch::Sender<bool>) {
        let listener = Listener::binden(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let adresse = listener.lokale_adresse();
        let peer = LocalPeer::neu(
            VerhandlungsConfig::default(),
            adresse,
            Arc::new(NullMedia::default()),
        );
        peer.starten().unwrap();
        let (tx, rx) = watch::channel(false);
        tokio::spawn(listener.starten(peer.clone(), rx));
        (peer, adresse, tx)
    }

    #[tokio::test]
    async fn antwortet_auf_anfrage() {
        let (_peer, adresse, _tx) = gestartet().await;
        let antwort = rpc::anfrage(
            adresse,
            ControlMessage::ack(MessageId(1)),
            Duration::from_secs(2),
        )
        .await
        .unwrap();
        assert_eq!(antwort.message_type(), MessageType::Error);
    }

    #[tokio::test]
    async fn falsches_schema_ergibt_error() {
        let (_peer, adresse, _tx) = gestartet().await;
        let mut stream = TcpStream::connect(adresse).await.unwrap();

        // START_NEGOTIATE-Header mit ACK-Nutzdaten
        let ack = ControlMessage::ack(MessageId(3));
        let mut puffer = bytes::BytesMut::new();
        wire::kodieren(&ack, &mut puffer).unwrap();
        puffer[12..16].copy_from_slice(&MessageType::StartNegotiate.code().to_be_bytes());
        stream.write_all(&puffer).await.unwrap();

        let antwort = wire::nachricht_lesen(&mut stream).await.unwrap();
        match antwort.payload {
            Payload::Error { message_id, .. } => assert_eq!(message_id, ack.id),
            andere => panic!("unerwartet: {:?}", andere),
        }
    }

    #[tokio::test]
    async fn shutdown_bei_vollem_pool() {
        let listener = Listener::binden(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let adresse = listener.lokale_adresse();
        let config = VerhandlungsConfig {
            pool_groesse: 1,
            rundlauf_timeout: Duration::from_secs(30),
            ..VerhandlungsConfig::default()
        };
        let peer = LocalPeer::neu(config, adresse, Arc::new(NullMedia::default()));
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(listener.starten(peer, rx));

        // Beide Verbindungen senden nichts: die erste belegt den einzigen Platz
        let _erste = TcpStream::connect(adresse).await.unwrap();
        let _zweite = TcpStream::connect(adresse).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("Listener reagiert nicht auf Shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_beendet_listener() {
        let (_peer, adresse, tx) = gestartet().await;
        tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        // Nach dem Stopp nimmt niemand mehr Verbindungen an
        let verbunden = TcpStream::connect(adresse).await;
        if let Ok(mut stream) = verbunden {
            let mut puffer = [0u8; 1];
            let gelesen = stream.read(&mut puffer).await.unwrap_or(0);
            assert_eq!(gelesen, 0);
        }
    }
}
