//! Laufzeit-Konfiguration der Verhandlung

use std::time::Duration;

/// Konfiguration fuer einen lokalen Peer
#[derive(Debug, Clone)]
pub struct VerhandlungsConfig {
    /// Hostname fuer die Peer-ID
    pub hostname: String,
    /// Erster der zwei gemeinsamen RTCP-Empfangsports; Medienports folgen ab `rtcp_basis + 2`
    pub rtcp_basis: u16,
    /// Frist fuer einen vollstaendigen Anfrage/Antwort-Zyklus
    pub rundlauf_timeout: Duration,
    /// Frist fuer Best-Effort-Nachrichten (CANCEL_NEGOTIATE, END_CALL)
    pub kurz_timeout: Duration,
    /// Abstand der Timeout-Ticks auf Negotiatee-Seite
    pub tick_intervall: Duration,
    /// Ticks ohne Fortschritt bis zum Abbruch
    pub tick_limit: u32,
    /// Gleichzeitig bearbeitete eingehende Verbindungen
    pub pool_groesse: usize,
}

impl VerhandlungsConfig {
    /// Die zwei gemeinsam genutzten RTCP-Empfangsports
    pub fn rtcp_ports(&self) -> [u16; 2] {
        [self.rtcp_basis, self.rtcp_basis.saturating_add(1)]
    }

    /// Kleinster Port fuer Medien-Empfangsbloecke
    pub fn port_basis(&self) -> u16 {
        self.rtcp_basis.saturating_add(2)
    }
}

impl Default for VerhandlungsConfig {
    fn default() -> Self {
        Self {
            hostname: "peer".to_string(),
            rtcp_basis: 10000,
            rundlauf_timeout: Duration::from_secs(5),
            kurz_timeout: Duration::from_secs(1),
            tick_intervall: Duration::from_secs(1),
            tick_limit: 5,
            pool_groesse: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ports_aus_basis() {
        let config = VerhandlungsConfig {
            rtcp_basis: 20000,
            ..Default::default()
        };
        assert_eq!(config.rtcp_ports(), [20000, 20001]);
        assert_eq!(config.port_basis(), 20002);
    }
}
