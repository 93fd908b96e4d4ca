//! Discovery-Konfiguration

use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Standard-Multicast-Gruppe
pub const STANDARD_GRUPPE: Ipv4Addr = Ipv4Addr::new(239, 255, 77, 77);

/// Kanonischer Discovery-Port
pub const STANDARD_PORT: u16 = 7788;

/// Abschnitt `[discovery]` der Peer-Konfiguration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub aktiviert: bool,
    pub gruppe: Ipv4Addr,
    pub port: u16,
    /// Lokale Interface-Adressen; leer = Adresse des Listeners
    pub interfaces: Vec<Ipv4Addr>,
    /// Abstand zwischen zwei Ankuendigungen; 0 = nur einmal
    pub intervall_sek: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            aktiviert: true,
            gruppe: STANDARD_GRUPPE,
            port: STANDARD_PORT,
            interfaces: Vec::new(),
            intervall_sek: 30,
        }
    }
}

impl DiscoveryConfig {
    /// Zieladresse fuer MULTICAST_DISCOVER
    pub fn ziel(&self) -> SocketAddr {
        SocketAddr::from((self.gruppe, self.port))
    }

    /// `None` wenn nur einmal angekuendigt wird
    pub fn intervall(&self) -> Option<Duration> {
        (self.intervall_sek > 0).then(|| Duration::from_secs(self.intervall_sek))
    }

    /// Interfaces fuer Beitritt und Versand
    ///
    /// Ohne konfigurierte Interfaces wird die Adresse des Listeners
    /// verwendet, bei "any" entscheidet das Betriebssystem.
    pub fn interfaces_fuer(&self, listen: Ipv4Addr) -> Vec<Ipv4Addr> {
        if !self.interfaces.is_empty() {
            self.interfaces.clone()
        } else {
            vec![listen]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.ziel(), "239.255.77.77:7788".parse().unwrap());
        assert_eq!(config.intervall(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn intervall_null_heisst_einmal() {
        let config = DiscoveryConfig {
            intervall_sek: 0,
            ..Default::default()
        };
        assert_eq!(config.intervall(), None);
    }

    #[test]
    fn konfigurierte_interfaces_haben_vorrang() {
        let config = DiscoveryConfig {
            interfaces: vec![Ipv4Addr::new(10, 0, 0, 2)],
            ..Default::default()
        };
        assert_eq!(
            config.interfaces_fuer(Ipv4Addr::UNSPECIFIED),
            vec![Ipv4Addr::new(10, 0, 0, 2)]
        );
        assert_eq!(
            DiscoveryConfig::default().interfaces_fuer(Ipv4Addr::LOCALHOST),
            vec![Ipv4Addr::LOCALHOST]
        );
    }
}
