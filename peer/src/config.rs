//! Peer-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Peer ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::Context;
use partyline_core::{CapabilitySet, MediaCaps};
use partyline_discovery::DiscoveryConfig;
use partyline_negotiation::VerhandlungsConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Vollstaendige Peer-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Identitaet und Listen-Adresse
    pub peer: PeerEinstellungen,
    /// Ports und lokale Capabilities der Medienschicht
    pub medien: MedienEinstellungen,
    /// Fristen und Grenzen der Verhandlung
    pub verhandlung: VerhandlungEinstellungen,
    /// Multicast-Discovery
    pub discovery: DiscoveryConfig,
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerEinstellungen {
    /// Hostname-Teil der Peer-ID
    pub hostname: String,
    /// Bind-Adresse fuer den TCP-Listener
    pub bind_adresse: String,
    /// Port fuer Steuerverbindungen (0 = beliebig)
    pub tcp_port: u16,
}

impl Default for PeerEinstellungen {
    fn default() -> Self {
        Self {
            hostname: "partyline".into(),
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 7777,
        }
    }
}

/// Medien-Einstellungen
///
/// Die Capability-Strings werden nur ausgetauscht, nie interpretiert.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MedienEinstellungen {
    /// Erster RTCP-Empfangsport; Medienports folgen ab `rtcp_basis + 2`
    pub rtcp_basis: u16,
    pub audio_senden: String,
    pub video_senden: String,
    pub audio_empfangen: String,
    pub video_empfangen: String,
}

impl Default for MedienEinstellungen {
    fn default() -> Self {
        Self {
            rtcp_basis: 10000,
            audio_senden: "audio/x-raw,rate=48000".into(),
            video_senden: String::new(),
            audio_empfangen: "audio/x-raw,rate=48000".into(),
            video_empfangen: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerhandlungEinstellungen {
    /// Frist fuer einen Anfrage/Antwort-Zyklus in Millisekunden
    pub rundlauf_timeout_ms: u64,
    /// Frist fuer Best-Effort-Nachrichten in Millisekunden
    pub kurz_timeout_ms: u64,
    /// Sekunden ohne Fortschritt bis ein Negotiatee abbricht
    pub tick_limit: u32,
    /// Gleichzeitig bearbeitete eingehende Verbindungen
    pub pool_groesse: usize,
    /// Remotes ohne Aktivitaet werden nach so vielen Sekunden entfernt (0 = aus)
    pub liveness_timeout_sek: u64,
    /// Mit den bei der ersten Ankuendigung entdeckten Peers verhandeln
    pub entdeckte_anrufen: bool,
}

impl Default for VerhandlungEinstellungen {
    fn default() -> Self {
        Self {
            rundlauf_timeout_ms: 5000,
            kurz_timeout_ms: 1000,
            tick_limit: 5,
            pool_groesse: 10,
            liveness_timeout_sek: 0,
            entdeckte_anrufen: false,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl PeerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Adresse fuer den TCP-Listener
    pub fn bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let text = format!("{}:{}", self.peer.bind_adresse, self.peer.tcp_port);
        text.parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{text}'"))
    }

    /// Adresse fuer den Observability-Server
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        let text = format!("{}:{}", self.peer.bind_adresse, self.observability.port);
        text.parse()
            .with_context(|| format!("Ungueltige Observability-Adresse '{text}'"))
    }

    pub fn verhandlungs_config(&self) -> VerhandlungsConfig {
        VerhandlungsConfig {
            hostname: self.peer.hostname.clone(),
            rtcp_basis: self.medien.rtcp_basis,
            rundlauf_timeout: Duration::from_millis(self.verhandlung.rundlauf_timeout_ms),
            kurz_timeout: Duration::from_millis(self.verhandlung.kurz_timeout_ms),
            tick_limit: self.verhandlung.tick_limit,
            pool_groesse: self.verhandlung.pool_groesse,
            ..VerhandlungsConfig::default()
        }
    }

    /// Lokale Capabilities fuer die Medienschicht
    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            senden: MediaCaps::neu(&self.medien.audio_senden, &self.medien.video_senden),
            empfangen: MediaCaps::neu(&self.medien.audio_empfangen, &self.medien.video_empfangen),
        }
    }

    /// `None` wenn die Liveness-Pruefung abgeschaltet ist
    pub fn liveness_timeout(&self) -> Option<Duration> {
        (self.verhandlung.liveness_timeout_sek > 0)
            .then(|| Duration::from_secs(self.verhandlung.liveness_timeout_sek))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.peer.tcp_port, 7777);
        assert_eq!(cfg.medien.rtcp_basis, 10000);
        assert_eq!(cfg.verhandlung.tick_limit, 5);
        assert_eq!(cfg.discovery.port, 7788);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.liveness_timeout().is_none());
    }

    #[test]
    fn bind_adressen() {
        let cfg = PeerConfig::default();
        assert_eq!(cfg.bind_adresse().unwrap(), "0.0.0.0:7777".parse().unwrap());
        assert_eq!(
            cfg.observability_bind_adresse().unwrap(),
            "0.0.0.0:9300".parse().unwrap()
        );
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = PeerConfig::default();
        cfg.peer.bind_adresse = "kein-host".into();
        assert!(cfg.bind_adresse().is_err());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [peer]
            hostname = "kiste"
            tcp_port = 6000

            [medien]
            audio_senden = "opus"

            [verhandlung]
            rundlauf_timeout_ms = 2500
            liveness_timeout_sek = 30

            [discovery]
            aktiviert = false
            interfaces = ["192.168.1.10"]
        "#;
        let cfg: PeerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.peer.hostname, "kiste");
        assert_eq!(cfg.peer.tcp_port, 6000);
        assert!(!cfg.discovery.aktiviert);
        assert_eq!(cfg.discovery.interfaces, vec!["192.168.1.10".parse::<std::net::Ipv4Addr>().unwrap()]);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.peer.bind_adresse, "0.0.0.0");
        assert_eq!(cfg.discovery.port, 7788);

        let verhandlung = cfg.verhandlungs_config();
        assert_eq!(verhandlung.hostname, "kiste");
        assert_eq!(verhandlung.rundlauf_timeout, Duration::from_millis(2500));
        assert_eq!(verhandlung.tick_intervall, Duration::from_secs(1));
        assert_eq!(cfg.liveness_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.capabilities().senden.audio, "opus");
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = PeerConfig::laden("/nicht/vorhanden/partyline.toml").unwrap();
        assert_eq!(cfg.peer.tcp_port, 7777);
    }
}
