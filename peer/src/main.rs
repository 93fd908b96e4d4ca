//! Partyline Peer – Einstiegspunkt
//!
//! Liest Argumente und Konfiguration, initialisiert das Logging und startet
//! den Daemon.

use anyhow::Result;
use clap::Parser;
use partyline_observability::logging_initialisieren;
use partyline_peer::{config::PeerConfig, Daemon};

/// P2P-Verhandlung von Mehrparteien-Anrufen
#[derive(Parser, Debug)]
#[command(name = "partyline-peer", version)]
struct Argumente {
    /// Pfad zur TOML-Konfiguration
    #[arg(long, env = "PL_CONFIG", default_value = "partyline.toml")]
    config: String,

    /// Peer anrufen (`host:port`), mehrfach angebbar
    #[arg(long = "call", value_name = "HOST:PORT")]
    ziele: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let argumente = Argumente::parse();

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = PeerConfig::laden(&argumente.config)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %argumente.config,
        ziele = argumente.ziele.len(),
        "Partyline Peer wird initialisiert"
    );

    Daemon::neu(config, argumente.ziele).starten().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mehrere_ziele() {
        let argumente = Argumente::try_parse_from([
            "partyline-peer",
            "--config",
            "x.toml",
            "--call",
            "a:1",
            "--call",
            "b:2",
        ])
        .unwrap();
        assert_eq!(argumente.config, "x.toml");
        assert_eq!(argumente.ziele, vec!["a:1", "b:2"]);
    }

    #[test]
    fn clap_definition_ist_konsistent() {
        use clap::CommandFactory;
        Argumente::command().debug_assert();
    }
}
