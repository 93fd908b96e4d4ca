//! Discovery-Service – Multicast-Listener, Unicast-Antworten, Ankuendigung
//!
//! ## Ablauf
//!
//! ```text
//! Multicast-Socket (0.0.0.0:port, Gruppe beigetreten)
//!     |  MULTICAST_DISCOVER
//!     v
//! entscheiden()  -- eigenes Datagramm? --> ignorieren
//!     |
//!     +--> Unicast-Socket (listen-ip:tcp-port) --UNICAST_HI_THERE--> Absender
//!
//! Unicast-Socket <--UNICAST_HI_THERE-- andere Peers
//!     |
//!     v
//! mpsc::Sender<SocketAddr>  (Kandidaten fuer den Aufrufer)
//! ```
//!
//! Der Unicast-Socket liegt auf IP und Portnummer des TCP-Listeners. Damit
//! ist die Absenderadresse eines HI_THERE direkt die Verhandlungsadresse
//! des Antwortenden.

use partyline_core::types::MessageId;
use partyline_protocol::{DiscoveryMessage, DiscoveryTyp, MAX_DATAGRAMM};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, DiscoveryResult};

/// Wie viele eigene DISCOVER-IDs gemerkt werden
const GEMERKTE_IDS: usize = 16;

// ---------------------------------------------------------------------------
// Entscheidung pro Datagramm
// ---------------------------------------------------------------------------

/// Reaktion auf ein empfangenes Datagramm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aktion {
    Ignorieren,
    /// Mit UNICAST_HI_THERE an den Absender antworten
    Antworten(SocketAddr),
    /// Absender als entdeckten Peer melden
    Melden(SocketAddr),
}

/// Woran eigene Datagramme erkannt werden
///
/// Bei Listen-Adresse "any" ist die Absender-IP des eigenen Multicasts
/// nicht vorher bekannt. Dann entscheiden Port und Nachrichten-ID.
#[derive(Debug, Clone, Default)]
pub struct EigeneAdressen {
    adressen: Vec<SocketAddr>,
    port: u16,
    gesendet: VecDeque<MessageId>,
}

impl EigeneAdressen {
    pub fn neu(listen: SocketAddr, interfaces: &[Ipv4Addr]) -> Self {
        let mut adressen = vec![listen];
        for interface in interfaces.iter().filter(|ip| !ip.is_unspecified()) {
            let adresse = SocketAddr::from((*interface, listen.port()));
            if !adressen.contains(&adresse) {
                adressen.push(adresse);
            }
        }
        Self {
            adressen,
            port: listen.port(),
            gesendet: VecDeque::with_capacity(GEMERKTE_IDS),
        }
    }

    /// Merkt sich die ID eines selbst gesendeten DISCOVER
    pub fn gesendet(&mut self, id: MessageId) {
        if self.gesendet.len() == GEMERKTE_IDS {
            self.gesendet.pop_front();
        }
        self.gesendet.push_back(id);
    }

    pub fn ist_eigene(&self, quelle: SocketAddr, id: MessageId) -> bool {
        self.adressen.contains(&quelle) || (quelle.port() == self.port && self.gesendet.contains(&id))
    }
}

/// Entscheidet ohne Seiteneffekte, was mit einem Datagramm passiert
pub fn entscheiden(
    nachricht: &DiscoveryMessage,
    quelle: SocketAddr,
    eigene: &EigeneAdressen,
) -> Aktion {
    if eigene.ist_eigene(quelle, nachricht.id) {
        return Aktion::Ignorieren;
    }
    match nachricht.typ {
        DiscoveryTyp::Discover => Aktion::Antworten(quelle),
        DiscoveryTyp::HiThere => Aktion::Melden(quelle),
    }
}

// ---------------------------------------------------------------------------
// DiscoveryService
// ---------------------------------------------------------------------------

/// Gebundene Discovery-Sockets samt Konfiguration
pub struct DiscoveryService {
    config: DiscoveryConfig,
    unicast: UdpSocket,
    multicast: Option<UdpSocket>,
    interfaces: Vec<Ipv4Addr>,
    eigene: EigeneAdressen,
}

impl DiscoveryService {
    /// Bindet Multicast- und Unicast-Socket
    ///
    /// `listen` ist die tatsaechlich gebundene Adresse des TCP-Listeners.
    /// Scheitert der Gruppenbeitritt auf einzelnen Interfaces, wird nur
    /// gewarnt; erst wenn kein Interface beitreten konnte, gibt es einen
    /// Fehler.
    pub async fn binden(config: DiscoveryConfig, listen: SocketAddr) -> DiscoveryResult<Self> {
        let listen_ip = match listen.ip() {
            IpAddr::V4(ip) => ip,
            andere => return Err(DiscoveryError::KeinIpv4(andere)),
        };
        if !config.gruppe.is_multicast() {
            return Err(DiscoveryError::KeineMulticastGruppe(config.gruppe));
        }

        let interfaces = config.interfaces_fuer(listen_ip);
        let multicast = multicast_socket(&config, &interfaces)?;
        let unicast = unicast_socket(listen)?;

        tracing::info!(
            gruppe = %config.ziel(),
            unicast = %listen,
            interfaces = interfaces.len(),
            "Discovery gebunden"
        );

        Self::aus_sockets(config, unicast, Some(multicast), interfaces)
    }

    fn aus_sockets(
        config: DiscoveryConfig,
        unicast: UdpSocket,
        multicast: Option<UdpSocket>,
        interfaces: Vec<Ipv4Addr>,
    ) -> DiscoveryResult<Self> {
        let lokal = unicast.local_addr()?;
        let eigene = EigeneAdressen::neu(lokal, &interfaces);
        Ok(Self {
            config,
            unicast,
            multicast,
            interfaces,
            eigene,
        })
    }

    /// Adresse, von der HI_THERE-Antworten kommen
    pub fn unicast_adresse(&self) -> std::io::Result<SocketAddr> {
        self.unicast.local_addr()
    }

    /// Sendet MULTICAST_DISCOVER auf jedem Interface
    ///
    /// Gibt die Zahl der Interfaces zurueck, auf denen gesendet wurde.
    pub async fn ankuendigen(&mut self) -> DiscoveryResult<usize> {
        let nachricht = DiscoveryMessage::neu(DiscoveryTyp::Discover);
        let daten = nachricht.kodieren();
        self.eigene.gesendet(nachricht.id);

        let ziel = self.config.ziel();
        let mut gesendet = 0usize;
        for interface in &self.interfaces {
            if !interface.is_unspecified() {
                if let Err(e) = SockRef::from(&self.unicast).set_multicast_if_v4(interface) {
                    tracing::warn!(interface = %interface, fehler = %e, "Multicast-Interface nicht setzbar");
                    continue;
                }
            }
            match self.unicast.send_to(&daten, ziel).await {
                Ok(_) => gesendet += 1,
                Err(e) => {
                    tracing::warn!(interface = %interface, fehler = %e, "DISCOVER nicht gesendet");
                }
            }
        }

        if gesendet == 0 {
            return Err(DiscoveryError::KeinVersand);
        }
        tracing::debug!(id = %nachricht.id, ziel = %ziel, interfaces = gesendet, "DISCOVER gesendet");
        Ok(gesendet)
    }

    /// Empfangs- und Ankuendigungs-Loop bis `shutdown_rx` `true` meldet
    ///
    /// Entdeckte Peers gehen an `entdeckt_tx`. Ist der Empfaenger
    /// geschlossen, laeuft die Discovery trotzdem weiter und beantwortet
    /// fremde DISCOVER-Anfragen.
    pub async fn starten(
        mut self,
        entdeckt_tx: mpsc::Sender<SocketAddr>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut multicast_puffer = vec![0u8; MAX_DATAGRAMM];
        let mut unicast_puffer = vec![0u8; MAX_DATAGRAMM];

        let wiederholen = self.config.intervall().is_some();
        let mut takt = tokio::time::interval(
            self.config
                .intervall()
                .unwrap_or(Duration::from_secs(3600)),
        );
        let mut angekuendigt = false;

        tracing::info!(wiederholen, "Discovery gestartet");

        loop {
            tokio::select! {
                _ = takt.tick(), if wiederholen || !angekuendigt => {
                    angekuendigt = true;
                    if let Err(e) = self.ankuendigen().await {
                        tracing::warn!(fehler = %e, "Ankuendigung fehlgeschlagen");
                    }
                }

                ergebnis = empfangen(self.multicast.as_ref(), &mut multicast_puffer) => {
                    match ergebnis {
                        Ok((n, quelle)) => {
                            self.datagramm_verarbeiten(&multicast_puffer[..n], quelle, &entdeckt_tx).await;
                        }
                        Err(e) => empfangsfehler(e).await,
                    }
                }

                ergebnis = self.unicast.recv_from(&mut unicast_puffer) => {
                    match ergebnis {
                        Ok((n, quelle)) => {
                            self.datagramm_verarbeiten(&unicast_puffer[..n], quelle, &entdeckt_tx).await;
                        }
                        Err(e) => empfangsfehler(e).await,
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Discovery: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Discovery gestoppt");
    }

    async fn datagramm_verarbeiten(
        &self,
        daten: &[u8],
        quelle: SocketAddr,
        entdeckt_tx: &mpsc::Sender<SocketAddr>,
    ) {
        let nachricht = match DiscoveryMessage::dekodieren(daten) {
            Ok(nachricht) => nachricht,
            Err(e) => {
                tracing::debug!(quelle = %quelle, fehler = %e, "Datagramm verworfen");
                return;
            }
        };

        match entscheiden(&nachricht, quelle, &self.eigene) {
            Aktion::Ignorieren => {
                tracing::trace!(quelle = %quelle, "Eigenes Datagramm ignoriert");
            }
            Aktion::Antworten(ziel) => {
                let antwort = DiscoveryMessage::neu(DiscoveryTyp::HiThere).kodieren();
                match self.unicast.send_to(&antwort, ziel).await {
                    Ok(_) => tracing::debug!(ziel = %ziel, "HI_THERE gesendet"),
                    Err(e) => tracing::warn!(ziel = %ziel, fehler = %e, "HI_THERE nicht gesendet"),
                }
            }
            Aktion::Melden(adresse) => {
                tracing::info!(peer = %adresse, "Peer entdeckt");
                if entdeckt_tx.send(adresse).await.is_err() {
                    tracing::debug!(peer = %adresse, "Niemand wartet auf entdeckte Peers");
                }
            }
        }
    }
}

async fn empfangen(
    socket: Option<&UdpSocket>,
    puffer: &mut [u8],
) -> std::io::Result<(usize, SocketAddr)> {
    match socket {
        Some(socket) => socket.recv_from(puffer).await,
        None => std::future::pending().await,
    }
}

async fn empfangsfehler(e: std::io::Error) {
    tracing::warn!(fehler = %e, "UDP-Empfangsfehler");
    tokio::time::sleep(Duration::from_millis(10)).await;
}

// ---------------------------------------------------------------------------
// Sockets
// ---------------------------------------------------------------------------

fn multicast_socket(config: &DiscoveryConfig, interfaces: &[Ipv4Addr]) -> DiscoveryResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    // Mehrere Peers auf einem Host teilen sich den Discovery-Port
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)).into())?;

    let mut beigetreten = 0usize;
    for interface in interfaces {
        match socket.join_multicast_v4(&config.gruppe, interface) {
            Ok(()) => {
                beigetreten += 1;
                tracing::debug!(gruppe = %config.gruppe, interface = %interface, "Multicast-Gruppe beigetreten");
            }
            Err(e) => {
                tracing::warn!(
                    gruppe = %config.gruppe,
                    interface = %interface,
                    fehler = %e,
                    "Multicast-Beitritt fehlgeschlagen"
                );
            }
        }
    }
    if beigetreten == 0 {
        return Err(DiscoveryError::KeinInterface(config.gruppe));
    }

    Ok(UdpSocket::from_std(socket.into())?)
}

fn unicast_socket(listen: SocketAddr) -> DiscoveryResult<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.set_multicast_ttl_v4(1)?;
    socket.set_multicast_loop_v4(true)?;
    socket.bind(&listen.into())?;
    Ok(UdpSocket::from_std(socket.into())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adresse(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn eigenes_discover_wird_ignoriert() {
        let eigene = EigeneAdressen::neu(adresse("192.168.1.5:6000"), &[]);
        let discover = DiscoveryMessage::neu(DiscoveryTyp::Discover);
        assert_eq!(
            entscheiden(&discover, adresse("192.168.1.5:6000"), &eigene),
            Aktion::Ignorieren
        );
    }

    #[test]
    fn eigene_id_bei_any_adresse() {
        let mut eigene = EigeneAdressen::neu(adresse("0.0.0.0:6000"), &[Ipv4Addr::UNSPECIFIED]);
        let discover = DiscoveryMessage::neu(DiscoveryTyp::Discover);
        eigene.gesendet(discover.id);

        assert_eq!(
            entscheiden(&discover, adresse("10.1.1.1:6000"), &eigene),
            Aktion::Ignorieren
        );
        // Gleiche ID von einem anderen Port ist ein anderer Peer
        assert_eq!(
            entscheiden(&discover, adresse("10.1.1.1:6001"), &eigene),
            Aktion::Antworten(adresse("10.1.1.1:6001"))
        );
    }

    #[test]
    fn konfigurierte_interfaces_zaehlen_als_eigene() {
        let eigene = EigeneAdressen::neu(
            adresse("0.0.0.0:6000"),
            &[Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 1, 2)],
        );
        let discover = DiscoveryMessage::neu(DiscoveryTyp::Discover);
        assert_eq!(
            entscheiden(&discover, adresse("10.0.1.2:6000"), &eigene),
            Aktion::Ignorieren
        );
    }

    #[test]
    fn fremdes_discover_und_hi_there() {
        let eigene = EigeneAdressen::neu(adresse("127.0.0.1:6000"), &[]);
        let quelle = adresse("127.0.0.1:6001");
        assert_eq!(
            entscheiden(&DiscoveryMessage::neu(DiscoveryTyp::Discover), quelle, &eigene),
            Aktion::Antworten(quelle)
        );
        assert_eq!(
            entscheiden(&DiscoveryMessage::neu(DiscoveryTyp::HiThere), quelle, &eigene),
            Aktion::Melden(quelle)
        );
    }

    #[test]
    fn alte_ids_werden_vergessen() {
        let mut eigene = EigeneAdressen::neu(adresse("0.0.0.0:6000"), &[]);
        let erste = MessageId::naechste();
        eigene.gesendet(erste);
        for _ in 0..GEMERKTE_IDS {
            eigene.gesendet(MessageId::naechste());
        }
        assert!(!eigene.ist_eigene(adresse("10.0.0.9:6000"), erste));
    }

    async fn service_ohne_multicast() -> (SocketAddr, mpsc::Receiver<SocketAddr>, watch::Sender<bool>) {
        let unicast = unicast_socket(adresse("127.0.0.1:0")).unwrap();
        let config = DiscoveryConfig {
            intervall_sek: 0,
            ..Default::default()
        };
        let service =
            DiscoveryService::aus_sockets(config, unicast, None, vec![Ipv4Addr::LOCALHOST]).unwrap();
        let lokal = service.unicast_adresse().unwrap();
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(service.starten(tx, shutdown_rx));
        (lokal, rx, shutdown_tx)
    }

    #[tokio::test]
    async fn discover_wird_mit_hi_there_beantwortet() {
        let (service, _rx, _shutdown) = service_ohne_multicast().await;
        let fremder = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let discover = DiscoveryMessage::neu(DiscoveryTyp::Discover).kodieren();
        fremder.send_to(&discover, service).await.unwrap();

        let mut puffer = [0u8; MAX_DATAGRAMM];
        let (n, quelle) = tokio::time::timeout(Duration::from_secs(2), fremder.recv_from(&mut puffer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(quelle, service);
        let antwort = DiscoveryMessage::dekodieren(&puffer[..n]).unwrap();
        assert_eq!(antwort.typ, DiscoveryTyp::HiThere);
    }

    #[tokio::test]
    async fn hi_there_wird_gemeldet() {
        let (service, mut rx, _shutdown) = service_ohne_multicast().await;
        let fremder = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let hi = DiscoveryMessage::neu(DiscoveryTyp::HiThere).kodieren();
        fremder.send_to(&hi, service).await.unwrap();

        let gemeldet = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gemeldet, fremder.local_addr().unwrap());
    }

    #[tokio::test]
    async fn muell_wird_verworfen() {
        let (service, mut rx, _shutdown) = service_ohne_multicast().await;
        let fremder = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        fremder.send_to(b"kein header", service).await.unwrap();
        let hi = DiscoveryMessage::neu(DiscoveryTyp::HiThere).kodieren();
        fremder.send_to(&hi, service).await.unwrap();

        // Der Service laeuft nach dem kaputten Datagramm weiter
        let gemeldet = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(gemeldet, fremder.local_addr().unwrap());
    }

    #[tokio::test]
    async fn ipv6_wird_abgelehnt() {
        let ergebnis = DiscoveryService::binden(DiscoveryConfig::default(), adresse("[::1]:0")).await;
        assert!(matches!(ergebnis, Err(DiscoveryError::KeinIpv4(_))));
    }

    #[tokio::test]
    async fn gruppe_muss_multicast_sein() {
        let config = DiscoveryConfig {
            gruppe: Ipv4Addr::new(10, 0, 0, 1),
            ..Default::default()
        };
        let ergebnis = DiscoveryService::binden(config, adresse("127.0.0.1:0")).await;
        assert!(matches!(ergebnis, Err(DiscoveryError::KeineMulticastGruppe(_))));
    }
}
