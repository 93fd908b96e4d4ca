//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: fester 20-Byte-Header + typisierte Nutzdaten.
//!
//! ## Header-Format
//!
//! ```text
//! +----------------+--------------------------------+----------------+----------------+
//! | Version (u32)  | Nachrichten-ID (u64)           | Typ (u32)      | Groesse (u32)  |
//! +----------------+--------------------------------+----------------+----------------+
//! ```
//!
//! Alle Felder big-endian. Die Groesse gibt die Anzahl der Nutzdaten-Bytes
//! an (ohne Header). Maximale Nutzdaten-Groesse: 1 MB.

use bytes::{Buf, BufMut, BytesMut};
use partyline_core::types::MessageId;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::{ControlMessage, MessageType, Payload};
use crate::error::{WireError, WireResult};
use crate::variant::{nutzdaten_dekodieren, nutzdaten_kodieren};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Einzige unterstuetzte Protokollversion
pub const PROTOKOLL_VERSION: u32 = 1;

/// Groesse des festen Headers in Bytes
pub const HEADER_GROESSE: usize = 20;

/// Maximale Nutzdaten-Groesse einer TCP-Nachricht (1 MB)
pub const MAX_NUTZDATEN: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// MessageHeader
// ---------------------------------------------------------------------------

/// Fester Header jeder Nachricht (TCP und UDP)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub version: u32,
    pub id: MessageId,
    /// Roher Typ-Code; wird erst beim Body-Dekodieren interpretiert
    pub typ: u32,
    pub groesse: u32,
}

impl MessageHeader {
    pub fn neu(id: MessageId, typ: MessageType, groesse: u32) -> Self {
        Self {
            version: PROTOKOLL_VERSION,
            id,
            typ: typ.code(),
            groesse,
        }
    }

    /// Schreibt den Header in den Puffer
    pub fn kodieren(&self, buf: &mut BytesMut) {
        buf.reserve(HEADER_GROESSE);
        buf.put_u32(self.version);
        buf.put_u64(self.id.0);
        buf.put_u32(self.typ);
        buf.put_u32(self.groesse);
    }

    /// Liest den Header aus genau `HEADER_GROESSE` oder mehr Bytes
    ///
    /// Prueft nur die Version; Typ und Groesse prueft der Aufrufer.
    pub fn dekodieren(mut daten: &[u8]) -> WireResult<Self> {
        if daten.len() < HEADER_GROESSE {
            return Err(WireError::Abgeschnitten);
        }
        let version = daten.get_u32();
        if version != PROTOKOLL_VERSION {
            return Err(WireError::VersionNichtUnterstuetzt(version));
        }
        Ok(Self {
            version,
            id: MessageId(daten.get_u64()),
            typ: daten.get_u32(),
            groesse: daten.get_u32(),
        })
    }

    /// Typ-Code als bekannter `MessageType`
    pub fn message_type(&self) -> WireResult<MessageType> {
        MessageType::from_code(self.typ).ok_or(WireError::UnbekannterTyp(self.typ))
    }
}

// ---------------------------------------------------------------------------
// Kodieren / Dekodieren
// ---------------------------------------------------------------------------

/// Serialisiert eine Steuernachricht (Header + Nutzdaten)
pub fn kodieren(nachricht: &ControlMessage, dst: &mut BytesMut) -> WireResult<()> {
    let typ = nachricht.message_type();
    let schema = typ
        .schema(PROTOKOLL_VERSION)
        .ok_or(WireError::VersionNichtUnterstuetzt(PROTOKOLL_VERSION))?;

    let mut nutzdaten = BytesMut::new();
    nutzdaten_kodieren(schema, &nachricht.payload.zu_wert(), &mut nutzdaten)?;
    if nutzdaten.len() > MAX_NUTZDATEN {
        return Err(WireError::ZuGross(nutzdaten.len()));
    }

    MessageHeader::neu(nachricht.id, typ, nutzdaten.len() as u32).kodieren(dst);
    dst.put_slice(&nutzdaten);
    Ok(())
}

/// Interpretiert die Nutzdaten gemaess Typ und Version aus dem Header
pub fn body_dekodieren(header: &MessageHeader, daten: &[u8]) -> WireResult<ControlMessage> {
    let typ = header.message_type()?;
    if typ.ist_discovery() {
        return Err(WireError::UnbekannterTyp(header.typ));
    }
    if daten.len() != header.groesse as usize {
        return Err(WireError::Abgeschnitten);
    }
    let schema = typ
        .schema(header.version)
        .ok_or(WireError::VersionNichtUnterstuetzt(header.version))?;
    let wert = nutzdaten_dekodieren(schema, daten)?;
    Ok(ControlMessage {
        id: header.id,
        payload: Payload::aus_wert(typ, wert)?,
    })
}

// ---------------------------------------------------------------------------
// ControlCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer Steuernachrichten
///
/// Implementiert `Encoder<ControlMessage>` und `Decoder` fuer die
/// Verwendung mit `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct ControlCodec {
    max_nutzdaten: usize,
}

impl ControlCodec {
    pub fn new() -> Self {
        Self {
            max_nutzdaten: MAX_NUTZDATEN,
        }
    }

    /// Codec mit abweichender maximaler Nutzdaten-Groesse
    pub fn with_max_size(max_nutzdaten: usize) -> Self {
        Self { max_nutzdaten }
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = ControlMessage;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_GROESSE {
            return Ok(None);
        }

        let header = MessageHeader::dekodieren(&src[..HEADER_GROESSE])?;
        let groesse = header.groesse as usize;
        if groesse > self.max_nutzdaten {
            return Err(WireError::ZuGross(groesse));
        }

        let gesamt = HEADER_GROESSE + groesse;
        if src.len() < gesamt {
            src.reserve(gesamt - src.len());
            return Ok(None);
        }

        src.advance(HEADER_GROESSE);
        let nutzdaten = src.split_to(groesse);
        body_dekodieren(&header, &nutzdaten).map(Some)
    }
}

impl Encoder<ControlMessage> for ControlCodec {
    type Error = WireError;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut buf = BytesMut::new();
        kodieren(&item, &mut buf)?;
        let groesse = buf.len() - HEADER_GROESSE;
        if groesse > self.max_nutzdaten {
            return Err(WireError::ZuGross(groesse));
        }
        dst.extend_from_slice(&buf);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Direktes async Lesen/Schreiben
// ---------------------------------------------------------------------------

/// Liest den festen Header
///
/// # Fehler
/// - `Abgeschnitten` wenn die Verbindung vor 20 Bytes endet
/// - `VersionNichtUnterstuetzt` bei fremder Protokollversion
pub async fn header_lesen<R>(reader: &mut R) -> WireResult<MessageHeader>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; HEADER_GROESSE];
    reader.read_exact(&mut buf).await.map_err(WireError::aus_io)?;
    MessageHeader::dekodieren(&buf)
}

/// Liest genau `header.groesse` Bytes und interpretiert sie
pub async fn body_lesen<R>(reader: &mut R, header: &MessageHeader) -> WireResult<ControlMessage>
where
    R: AsyncRead + Unpin,
{
    let groesse = header.groesse as usize;
    if groesse > MAX_NUTZDATEN {
        return Err(WireError::ZuGross(groesse));
    }
    let mut nutzdaten = vec![0u8; groesse];
    reader
        .read_exact(&mut nutzdaten)
        .await
        .map_err(WireError::aus_io)?;
    body_dekodieren(header, &nutzdaten)
}

/// Liest eine vollstaendige Steuernachricht
pub async fn nachricht_lesen<R>(reader: &mut R) -> WireResult<ControlMessage>
where
    R: AsyncRead + Unpin,
{
    let header = header_lesen(reader).await?;
    body_lesen(reader, &header).await
}

/// Schreibt eine vollstaendige Steuernachricht und flusht
pub async fn nachricht_schreiben<W>(writer: &mut W, nachricht: &ControlMessage) -> WireResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    kodieren(nachricht, &mut buf)?;
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
