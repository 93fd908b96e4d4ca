//! Fehlertypen fuer Partyline
//!
//! Gemeinsamer Fehler-Enum fuer die Kollaborator-Schnittstellen
//! (Medienschicht, Adressermittlung). Die Fach-Crates definieren eigene
//! Fehler und konvertieren bei Bedarf via `#[from]`.

use thiserror::Error;

/// Globaler Result-Alias fuer Partyline
pub type Result<T> = std::result::Result<T, PartylineError>;

/// Fehler der Kollaborator-Schnittstellen
#[derive(Debug, Error)]
pub enum PartylineError {
    #[error("Medienfehler: {0}")]
    Medien(String),

    #[error("Ungueltige Adresse: {0}")]
    Adresse(String),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl PartylineError {
    /// Erstellt einen Medienfehler aus einer beliebigen Nachricht
    pub fn medien(msg: impl Into<String>) -> Self {
        Self::Medien(msg.into())
    }

    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fehler_anzeige() {
        let e = PartylineError::medien("Pipeline nicht bereit");
        assert_eq!(e.to_string(), "Medienfehler: Pipeline nicht bereit");
    }
}
