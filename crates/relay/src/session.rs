//! Client-Session – Verwaltet eine einzelne Verbindung
//!
//! Jede akzeptierte Verbindung bekommt eine `ClientSession` in einem eigenen
//! tokio-Task. Die State Machine verwaltet den Session-Zustand:
//!
//! ```text
//! Verhandlung -> Aktiv -> Beendet
//!      |                    ^
//!      +---- EOF/Fehler ----+   (ohne Registrierung, kein Rollback noetig)
//! ```
//!
//! ## Verhandlung
//! Der Server sendet `SUBMIT_NAME` und liest eine Zeile als Kandidaten.
//! Kollisionen fuehren zu einer erneuten Aufforderung – ohne Obergrenze,
//! ein Client kann beliebig oft kollidieren. Leere Kandidaten werden wie
//! Kollisionen behandelt, die Registry enthaelt nie einen leeren Namen.
//!
//! ## Aktiv
//! Jede eingehende Zeile, die nicht das Sentinel `EXIT` ist, wird als
//! `MESSAGE <name>: <zeile>` an alle verteilt. Ausgehende Frame-Laeufe
//! kommen aus der Registry-Queue und werden sequenziell geschrieben – die
//! Zeilenreihenfolge pro Absender bleibt dadurch erhalten.
//!
//! ## Beendet
//! Best-effort `EXIT`-Echo, dann Abmeldung bei der Registry. Die Abmeldung
//! ist idempotent; nur wenn der Name tatsaechlich freigegeben wurde, geht
//! der Abschieds-Broadcast raus.

use futures_util::{SinkExt, StreamExt};
use palaver_protocol::{Frame, ZeilenCodec, EXIT_SENTINEL};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;

use crate::registry::Registry;

// ---------------------------------------------------------------------------
// Session-Zustand
// ---------------------------------------------------------------------------

/// Zustand einer Client-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitzungsZustand {
    /// Verbunden, Name noch nicht ausgehandelt
    Verhandlung,
    /// Name belegt, Session nimmt am Broadcast teil
    Aktiv,
    /// Session ist abgeschlossen (terminal)
    Beendet,
}

// ---------------------------------------------------------------------------
// ClientSession
// ---------------------------------------------------------------------------

/// Verarbeitet eine einzelne Verbindung
///
/// Generisch ueber den Stream, damit Sessions in Tests ueber In-Memory-
/// Streams laufen koennen. Der Stream gehoert exklusiv der Session; die
/// Registry wird von allen Sessions geteilt.
pub struct ClientSession {
    registry: Registry,
    peer: String,
    zustand: SitzungsZustand,
}

impl ClientSession {
    /// Erstellt eine neue ClientSession
    pub fn neu(registry: Registry, peer: impl Into<String>) -> Self {
        Self {
            registry,
            peer: peer.into(),
            zustand: SitzungsZustand::Verhandlung,
        }
    }

    /// Gibt den aktuellen Session-Zustand zurueck
    pub fn zustand(&self) -> SitzungsZustand {
        self.zustand
    }

    /// Startet die Session-Verarbeitungsschleife
    ///
    /// Laeuft bis die Verbindung endet, ein Fehler auftritt oder das
    /// Shutdown-Signal eingeht. Fehler bleiben in der Session: nichts
    /// hiervon erreicht den Acceptor oder andere Sessions.
    pub async fn verarbeiten<S>(mut self, stream: S, mut shutdown_rx: watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer = self.peer.clone();
        let mut framed = Framed::new(stream, ZeilenCodec::neu());

        tracing::debug!(peer = %peer, "Neue Session");

        // Phase 1: Namensverhandlung. Ohne Claim gibt es nichts abzumelden –
        // der Stream wird einfach geschlossen (Drop).
        let (name, mut empfang) = match self.verhandeln(&mut framed, &mut shutdown_rx).await {
            Some(ergebnis) => ergebnis,
            None => {
                self.zustand = SitzungsZustand::Beendet;
                tracing::debug!(peer = %peer, "Getrennt ohne Namen");
                return;
            }
        };

        self.zustand = SitzungsZustand::Aktiv;

        // NAME_ACCEPTED direkt auf die Leitung, bevor die Queue-Frames
        // (der eigene Beitritts-Lauf wartet dort bereits) geschrieben werden
        if framed.send(Frame::NameAccepted).await.is_err() {
            self.abschliessen(&mut framed, &name).await;
            return;
        }

        tracing::info!(peer = %peer, name = %name, "Session aktiv");

        // Phase 2: Relay-Schleife
        loop {
            tokio::select! {
                eingehend = framed.next() => {
                    match eingehend {
                        Some(Ok(zeile)) if zeile == EXIT_SENTINEL => {
                            tracing::debug!(peer = %peer, name = %name, "EXIT empfangen");
                            break;
                        }
                        Some(Ok(zeile)) => {
                            self.registry.nachricht_verteilen(&name, &zeile);
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %peer, name = %name, fehler = %e, "Lesefehler");
                            break;
                        }
                        None => {
                            tracing::debug!(peer = %peer, name = %name, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                ausgehend = empfang.recv() => {
                    match ausgehend {
                        Some(lauf) => {
                            if let Err(e) = lauf_schreiben(&mut framed, lauf).await {
                                tracing::warn!(peer = %peer, name = %name, fehler = %e, "Schreibfehler");
                                break;
                            }
                        }
                        // Queue geschlossen: die Registry hat diese Session
                        // bereits entfernt (z. B. vollgelaufene Queue)
                        None => break,
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(peer = %peer, name = %name, "Shutdown-Signal – Session wird beendet");
                        break;
                    }
                }
            }
        }

        self.abschliessen(&mut framed, &name).await;
    }

    /// Namensverhandlung: `SUBMIT_NAME` senden, Kandidaten lesen, claimen
    ///
    /// Gibt bei Erfolg den belegten Namen und die Registry-Empfangs-Queue
    /// zurueck; `None` bei EOF, Fehler oder Shutdown vor einem Claim.
    async fn verhandeln<S>(
        &self,
        framed: &mut Framed<S, ZeilenCodec>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Option<(String, mpsc::Receiver<Vec<Frame>>)>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            if let Err(e) = framed.send(Frame::SubmitName).await {
                tracing::warn!(peer = %self.peer, fehler = %e, "SUBMIT_NAME nicht sendbar");
                return None;
            }

            tokio::select! {
                zeile = framed.next() => {
                    match zeile {
                        Some(Ok(kandidat)) => {
                            if kandidat.is_empty() {
                                tracing::debug!(peer = %self.peer, "Leerer Namenskandidat");
                                continue;
                            }
                            match self.registry.beitreten(&kandidat) {
                                Some(empfang) => return Some((kandidat, empfang)),
                                None => {
                                    tracing::debug!(
                                        peer = %self.peer,
                                        kandidat = %kandidat,
                                        "Name bereits vergeben"
                                    );
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(peer = %self.peer, fehler = %e, "Lesefehler in der Verhandlung");
                            return None;
                        }
                        None => return None,
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        return None;
                    }
                }
            }
        }
    }

    /// Terminaler Teardown fuer Sessions, die Aktiv erreicht haben
    ///
    /// Laeuft genau einmal pro registrierter Session. Das `EXIT`-Echo ist
    /// best effort; der Abschieds-Broadcast haengt an der idempotenten
    /// Abmeldung in der Registry.
    async fn abschliessen<S>(&mut self, framed: &mut Framed<S, ZeilenCodec>, name: &str)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        self.zustand = SitzungsZustand::Beendet;

        let _ = framed.send(Frame::Exit).await;

        if self.registry.verlassen(name) {
            tracing::info!(peer = %self.peer, name = %name, "Session beendet");
        }
    }
}

/// Schreibt einen kompletten Frame-Lauf sequenziell auf die Leitung
async fn lauf_schreiben<S>(
    framed: &mut Framed<S, ZeilenCodec>,
    lauf: Vec<Frame>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    for frame in lauf {
        framed.send(frame).await?;
    }
    Ok(())
}
