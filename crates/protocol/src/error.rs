//! Fehlertypen fuer Kodierung und Dekodierung
//!
//! Fehler werden immer als Wert zurueckgegeben; ein fehlerhaftes Paket
//! fuehrt nie zu einem Panic.

use thiserror::Error;

/// Fehler beim Lesen, Schreiben oder Interpretieren einer Nachricht
#[derive(Debug, Error)]
pub enum WireError {
    /// IO-Fehler (Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Weniger Bytes als Header oder Nutzdaten verlangen
    #[error("Nachricht abgeschnitten")]
    Abgeschnitten,

    /// Header traegt eine nicht unterstuetzte Protokollversion
    #[error("Protokollversion {0} nicht unterstuetzt")]
    VersionNichtUnterstuetzt(u32),

    /// Unbekannter oder an dieser Stelle unzulaessiger Nachrichtentyp
    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterTyp(u32),

    /// Nutzdaten passen nicht zum Schema des Nachrichtentyps
    #[error("Typfehler: erwartet '{erwartet}', erhalten '{erhalten}'")]
    TypFehler { erwartet: String, erhalten: String },

    /// Syntaktisch ungueltige Typsignatur
    #[error("Ungueltige Signatur: {0}")]
    Signatur(String),

    /// Nutzdaten sind formal korrekt aber inhaltlich ungueltig
    #[error("Ungueltige Nutzdaten: {0}")]
    Ungueltig(String),

    /// Nutzdaten ueberschreiten die maximale Groesse
    #[error("Nachricht zu gross: {0} Bytes")]
    ZuGross(usize),
}

impl WireError {
    pub fn typ_fehler(erwartet: impl Into<String>, erhalten: impl Into<String>) -> Self {
        Self::TypFehler {
            erwartet: erwartet.into(),
            erhalten: erhalten.into(),
        }
    }

    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::Ungueltig(msg.into())
    }

    /// Nutzdaten vollstaendig gelesen, aber nicht interpretierbar
    ///
    /// Die Verbindung ist danach noch synchron und kann eine Antwort tragen.
    pub fn ist_dekodierfehler(&self) -> bool {
        matches!(
            self,
            Self::UnbekannterTyp(_) | Self::TypFehler { .. } | Self::Signatur(_) | Self::Ungueltig(_)
        )
    }

    /// Wandelt einen vorzeitigen Verbindungsabbruch in `Abgeschnitten` um
    pub(crate) fn aus_io(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::Abgeschnitten
        } else {
            Self::Io(e)
        }
    }
}

/// Result-Typ fuer das Wire-Format
pub type WireResult<T> = Result<T, WireError>;
