//! palaver-server – Bibliotheks-Root
//!
//! Deklariert die Server-Module und verdrahtet Registry, TLS-Transport und
//! Relay-Acceptor zu einem lauffaehigen Prozess.

pub mod config;

use anyhow::{Context, Result};
use config::ServerConfig;
use palaver_relay::{Registry, RelayServer};
use palaver_transport::{acceptor_erstellen, zertifikate_laden, TlsIdentitaet};
use std::net::SocketAddr;
use std::path::Path;
use tokio_rustls::TlsAcceptor;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet den Relay-Server und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. TLS-Identitaet laden (oder Dev-Zertifikat generieren)
    /// 2. TLS-Acceptor bauen (optional mit Client-CA fuer mTLS)
    /// 3. Relay-Acceptor starten
    /// 4. Auf Ctrl-C warten, dann Shutdown-Signal verteilen
    pub async fn starten(self) -> Result<()> {
        tracing::info!(
            server_name = %self.config.server.name,
            adresse = %self.config.bind_adresse(),
            "Server startet"
        );

        let tls_acceptor = self.tls_acceptor_bauen()?;

        let bind_addr: SocketAddr = self
            .config
            .bind_adresse()
            .parse()
            .with_context(|| format!("Ungueltige Bind-Adresse '{}'", self.config.bind_adresse()))?;

        let registry = Registry::neu();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let relay = RelayServer::neu(registry, bind_addr);
        let mut relay_task = tokio::spawn(relay.starten(tls_acceptor, shutdown_rx));

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");

        tokio::select! {
            // Der Relay-Task endet von selbst nur bei einem Startfehler
            ergebnis = &mut relay_task => {
                ergebnis.context("Relay-Task abgestuerzt")??;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown-Signal empfangen, Server wird beendet");
                let _ = shutdown_tx.send(true);
                relay_task.await.context("Relay-Task abgestuerzt")??;
            }
        }

        Ok(())
    }

    /// Baut den TLS-Acceptor aus der Konfiguration
    fn tls_acceptor_bauen(&self) -> Result<TlsAcceptor> {
        let netzwerk = &self.config.netzwerk;

        let identitaet = match (&netzwerk.tls_zertifikat, &netzwerk.tls_schluessel) {
            (Some(zertifikat), Some(schluessel)) => {
                tracing::info!(zertifikat = %zertifikat, "TLS-Identitaet wird geladen");
                TlsIdentitaet::laden(Path::new(zertifikat), Path::new(schluessel))
                    .context("TLS-Identitaet nicht ladbar")?
            }
            _ => {
                tracing::warn!(
                    "Kein TLS-Zertifikat konfiguriert – selbstsigniertes Dev-Zertifikat wird generiert"
                );
                TlsIdentitaet::selbstsigniert("localhost")
                    .context("Dev-Zertifikat nicht generierbar")?
            }
        };

        let client_ca = match &netzwerk.client_ca {
            Some(pfad) => {
                tracing::info!(client_ca = %pfad, "Gegenseitige Authentifizierung aktiv");
                Some(zertifikate_laden(Path::new(pfad)).context("Client-CA nicht ladbar")?)
            }
            None => None,
        };

        acceptor_erstellen(identitaet, client_ca).context("TLS-Acceptor nicht baubar")
    }
}
