//! TCP/TLS-Acceptor – Bindet Socket, akzeptiert Verbindungen
//!
//! Der `RelayServer` bindet einen TCP-Socket und startet fuer jede
//! eingehende Verbindung einen eigenen tokio-Task. TLS-Handshake und
//! Session-Verarbeitung laufen vollstaendig in diesem Task – die
//! Accept-Loop haengt nie hinter dem Lebenszyklus einer Session.
//!
//! Es gibt bewusst keine Obergrenze fuer gleichzeitige Sessions; das ist
//! eine dokumentierte Einschraenkung dieses Kerns, kein Versehen.

use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use crate::registry::Registry;
use crate::session::ClientSession;

/// TCP/TLS-Relay-Server
///
/// Bindet einen TCP-Socket und akzeptiert Verbindungen in einer Loop.
/// Die Registry wird geteilt in jede Session gereicht.
pub struct RelayServer {
    registry: Registry,
    bind_addr: SocketAddr,
}

impl RelayServer {
    /// Erstellt einen neuen RelayServer
    pub fn neu(registry: Registry, bind_addr: SocketAddr) -> Self {
        Self {
            registry,
            bind_addr,
        }
    }

    /// Startet den Listener und akzeptiert Verbindungen
    ///
    /// Laeuft bis `shutdown_rx` ein `true`-Signal empfaengt. Nur das Binden
    /// des Sockets kann diesen Aufruf scheitern lassen; alles danach wird
    /// pro Verbindung behandelt.
    pub async fn starten(
        self,
        tls_acceptor: TlsAcceptor,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let lokale_addr = listener.local_addr()?;

        tracing::info!(adresse = %lokale_addr, "Relay-Server gestartet");

        loop {
            tokio::select! {
                // Neue eingehende Verbindung
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            tracing::debug!(peer = %peer_addr, "Verbindung akzeptiert");

                            let tls_acceptor = tls_acceptor.clone();
                            let session = ClientSession::neu(
                                self.registry.clone(),
                                peer_addr.to_string(),
                            );
                            let shutdown_rx_clone = shutdown_rx.clone();

                            tokio::spawn(async move {
                                match tls_acceptor.accept(stream).await {
                                    Ok(tls_stream) => {
                                        session.verarbeiten(tls_stream, shutdown_rx_clone).await;
                                    }
                                    Err(e) => {
                                        // Nur dieser Verbindungsversuch wird verworfen
                                        tracing::warn!(
                                            peer = %peer_addr,
                                            fehler = %e,
                                            "TLS-Handshake fehlgeschlagen"
                                        );
                                    }
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "TCP-Accept-Fehler");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        }
                    }
                }

                // Shutdown-Signal
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Relay-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Relay-Server gestoppt");
        Ok(())
    }

    /// Gibt die Bind-Adresse zurueck
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}
