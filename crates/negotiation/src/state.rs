//! Zustandsmodell des lokalen Peers
//!
//! ## State Machine
//! ```text
//! Null -> Started -> Negotiating -> Negotiated -> Ready -> Playing <-> Paused
//!            ^            |              |                    |
//!            +---- Abbruch (Failed) -----+                    |
//!            +-------------------- Stopped <------------------+
//! ```
//!
//! Die Phase wird um die Rolle (Negotiator/Negotiatee) und zwei
//! unabhaengige Flags ergaenzt: `fehlgeschlagen` und `timeout`.

/// Phase des lokalen Peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Null,
    Started,
    Negotiating,
    Negotiated,
    Ready,
    Playing,
    Paused,
    Stopped,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Null => "Null",
            Phase::Started => "Started",
            Phase::Negotiating => "Negotiating",
            Phase::Negotiated => "Negotiated",
            Phase::Ready => "Ready",
            Phase::Playing => "Playing",
            Phase::Paused => "Paused",
            Phase::Stopped => "Stopped",
        }
    }

    /// Gibt true zurueck wenn eine Verhandlung laeuft
    pub fn ist_verhandlung(self) -> bool {
        matches!(self, Phase::Negotiating | Phase::Negotiated)
    }

    /// Gibt true zurueck wenn ein Anruf steht
    pub fn ist_anruf(self) -> bool {
        matches!(self, Phase::Ready | Phase::Playing | Phase::Paused)
    }
}

/// Rolle waehrend einer Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rolle {
    Negotiator,
    Negotiatee,
}

/// Vollstaendiger Zustand: Phase, Rolle und Flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerState {
    pub phase: Phase,
    pub rolle: Option<Rolle>,
    /// Letzte Verhandlung ist fehlgeschlagen; wird erst beim naechsten Erfolg geloescht
    pub fehlgeschlagen: bool,
    /// Letzter Abbruch war ein Timeout
    pub timeout: bool,
}

impl PeerState {
    pub fn neu() -> Self {
        Self {
            phase: Phase::Null,
            rolle: None,
            fehlgeschlagen: false,
            timeout: false,
        }
    }

    /// Beginn einer Verhandlung in der angegebenen Rolle
    pub(crate) fn verhandlung_beginnen(&mut self, rolle: Rolle) {
        self.phase = Phase::Negotiating;
        self.rolle = Some(rolle);
    }

    /// Ruecksprung nach Started; `fehler` setzt Failed, `timeout` zusaetzlich Timeout
    pub(crate) fn zuruecksetzen(&mut self, fehler: bool, timeout: bool) {
        self.phase = Phase::Started;
        self.rolle = None;
        if fehler {
            self.fehlgeschlagen = true;
            self.timeout = timeout;
        }
    }

    /// Erfolgreicher Abschluss: Ready, Flags geloescht
    pub(crate) fn anruf_bereit(&mut self) {
        self.phase = Phase::Ready;
        self.rolle = None;
        self.fehlgeschlagen = false;
        self.timeout = false;
    }
}

impl Default for PeerState {
    fn default() -> Self {
        Self::neu()
    }
}

impl std::fmt::Display for PeerState {
    /// Schreibt den Zustand als `Phase|Modifier|...`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.phase.name())?;
        match self.rolle {
            Some(Rolle::Negotiator) => f.write_str("|Negotiator")?,
            Some(Rolle::Negotiatee) => f.write_str("|Negotiatee")?,
            None => {}
        }
        if self.fehlgeschlagen {
            f.write_str("|Failed")?;
        }
        if self.timeout {
            f.write_str("|Timeout")?;
        }
        Ok(())
    }
}

/// Lebenszyklus eines entfernten Peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteState {
    /// Empfangsports reserviert
    Allocated,
    Ready,
    Playing,
    Paused,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anzeige_mit_modifiern() {
        let mut s = PeerState::neu();
        s.phase = Phase::Started;
        assert_eq!(s.to_string(), "Started");
        s.zuruecksetzen(true, true);
        assert_eq!(s.to_string(), "Started|Failed|Timeout");
        s.verhandlung_beginnen(Rolle::Negotiatee);
        assert_eq!(s.to_string(), "Negotiating|Negotiatee|Failed|Timeout");
    }

    #[test]
    fn failed_bleibt_bis_zum_erfolg() {
        let mut s = PeerState::neu();
        s.zuruecksetzen(true, false);
        s.verhandlung_beginnen(Rolle::Negotiator);
        assert!(s.fehlgeschlagen);
        s.zuruecksetzen(false, false);
        assert!(s.fehlgeschlagen);
        s.anruf_bereit();
        assert!(!s.fehlgeschlagen);
        assert_eq!(s.rolle, None);
    }

    #[test]
    fn phasen_klassifikation() {
        assert!(Phase::Negotiated.ist_verhandlung());
        assert!(!Phase::Ready.ist_verhandlung());
        assert!(Phase::Paused.ist_anruf());
        assert!(!Phase::Stopped.ist_anruf());
    }
}
