//! RPC-Client fuer Steuernachrichten
//!
//! Jeder Austausch oeffnet eine frische TCP-Verbindung, schreibt genau
//! eine Anfrage und liest genau eine Antwort. Der gesamte Zyklus laeuft
//! unter einer einzigen Frist.

use futures_util::{SinkExt, StreamExt};
use partyline_protocol::{ControlCodec, ControlMessage, WireError};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::error::{NegotiationError, NegotiationResult};

/// Sendet eine Anfrage und wartet auf die Antwort
///
/// # Fehler
/// - `Timeout` wenn Verbindungsaufbau, Schreiben und Lesen zusammen laenger als `frist` dauern
/// - `Io`/`Wire` bei Verbindungs- oder Dekodierfehlern
pub async fn anfrage(
    ziel: SocketAddr,
    nachricht: ControlMessage,
    frist: Duration,
) -> NegotiationResult<ControlMessage> {
    let typ = nachricht.message_type();
    let id = nachricht.id;

    let antwort = tokio::time::timeout(frist, austausch(ziel, nachricht))
        .await
        .map_err(|_| NegotiationError::Timeout(format!("{} an {}", typ, ziel)))??;

    tracing::trace!(
        ziel = %ziel,
        anfrage = %typ,
        nachricht_id = %id,
        antwort = %antwort.message_type(),
        "RPC abgeschlossen"
    );
    Ok(antwort)
}

async fn austausch(ziel: SocketAddr, nachricht: ControlMessage) -> NegotiationResult<ControlMessage> {
    let stream = TcpStream::connect(ziel).await?;
    let mut framed = Framed::new(stream, ControlCodec::new());
    framed.send(nachricht).await?;
    match framed.next().await {
        Some(antwort) => Ok(antwort?),
        None => Err(WireError::Abgeschnitten.into()),
    }
}

/// Best-Effort-Versand: Fehler werden nur geloggt
pub async fn best_effort(ziel: SocketAddr, nachricht: ControlMessage, frist: Duration) {
    let typ = nachricht.message_type();
    if let Err(e) = anfrage(ziel, nachricht, frist).await {
        tracing::warn!(ziel = %ziel, nachricht = %typ, fehler = %e, "Best-Effort-Nachricht fehlgeschlagen");
    }
}

/// Sendet dieselbe Art Nachricht parallel an mehrere Ziele (Best-Effort)
pub async fn an_alle<F>(ziele: &[SocketAddr], frist: Duration, nachricht_fuer: F)
where
    F: Fn(SocketAddr) -> ControlMessage,
{
    let sendungen = ziele
        .iter()
        .map(|ziel| best_effort(*ziel, nachricht_fuer(*ziel), frist));
    futures_util::future::join_all(sendungen).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use partyline_core::types::MessageId;
    use partyline_protocol::wire;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn anfrage_liest_antwort() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let anfrage = wire::nachricht_lesen(&mut stream).await.unwrap();
            wire::nachricht_schreiben(&mut stream, &ControlMessage::ack(anfrage.id))
                .await
                .unwrap();
        });

        let anfrage_msg = ControlMessage::error(MessageId(1), "test");
        let id = anfrage_msg.id;
        let antwort = anfrage(adresse, anfrage_msg, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            antwort.payload,
            partyline_protocol::Payload::Ack { message_id: id }
        );
    }

    #[tokio::test]
    async fn stumme_gegenseite_ergibt_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let err = anfrage(
            adresse,
            ControlMessage::ack(MessageId(1)),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(err.ist_timeout());
    }

    #[tokio::test]
    async fn geschlossene_verbindung_ist_transportfehler() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let adresse = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let err = anfrage(
            adresse,
            ControlMessage::ack(MessageId(1)),
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert!(err.ist_transport());
    }
}
