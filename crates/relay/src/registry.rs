//! Registry – Alleiniger Eigentuemer des geteilten Zustands
//!
//! Die Registry haelt genau EINE Abbildung von belegtem Anzeigenamen auf die
//! Send-Queue der zugehoerigen Session. Damit ist das Invariant "jeder Writer
//! gehoert zu genau einem Namen und umgekehrt" strukturell erzwungen statt
//! nebenlaeufig gepflegt.
//!
//! ## Synchronisation
//! Ein einziger Mutex schuetzt die Abbildung. Alle Check-then-Act-Sequenzen
//! (atomarer Namens-Claim) und alle Snapshot-then-Iterate-Sequenzen
//! (Broadcast, Roster) laufen unter diesem einen Lock. Das Fan-out selbst
//! passiert ebenfalls unter dem Lock, aber ausschliesslich mit
//! nicht-blockierendem `try_send` – ein langsamer Client kann den Lock also
//! nie laenger als einen Queue-Push halten. Dadurch sind Join/Leave-
//! Broadcasts mit der ausloesenden Mutation linearisiert.
//!
//! ## Frame-Laeufe
//! Queue-Einheit ist der komplette Frame-Lauf (`NEW_USER`/`REMOVE_USER` plus
//! Roster, oder eine einzelne `MESSAGE`-Zeile), nicht das einzelne Frame.
//! Ein Roster-Lauf kann dadurch unabhaengig von der Queue-Tiefe nie
//! angerissen bei einem Client ankommen, und Laeufe zweier gleichzeitiger
//! Beitritte koennen sich auf keiner Empfaenger-Queue verschraenken.
//! Laeuft die Queue eines Mitglieds dennoch voll (64 ungelesene Laeufe),
//! wird das Mitglied aus der Abbildung entfernt und sein Abschied an die
//! verbleibenden Mitglieder verkuendet; seine Session beobachtet die
//! geschlossene Queue und beendet sich selbst.

use palaver_protocol::Frame;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Konfiguration
// ---------------------------------------------------------------------------

/// Groesse der Send-Queue pro Session, in ganzen Frame-Laeufen
const SEND_QUEUE_GROESSE: usize = 64;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Zentrale Registry fuer Namen und Broadcast-Queues
///
/// Thread-safe via Arc + Mutex. Clone teilt den inneren Zustand. Wird einmal
/// pro Server-Prozess erstellt und in den Acceptor und jede Session gereicht.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Belegter Anzeigename -> Send-Queue der Session
    mitglieder: Mutex<HashMap<String, mpsc::Sender<Vec<Frame>>>>,
}

impl Registry {
    /// Erstellt eine neue, leere Registry
    pub fn neu() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                mitglieder: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Atomarer Namens-Claim mit Registrierung der Send-Queue
    ///
    /// Prueft und belegt den Namen in einem Schritt. Bei Erfolg wird die
    /// Empfangs-Queue der Session zurueckgegeben und der Beitritt sofort an
    /// alle Mitglieder (inklusive der neuen Session) verkuendet:
    /// `NEW_USER <name>` gefolgt vom vollstaendigen Roster.
    ///
    /// Gibt `None` zurueck wenn der Name bereits vergeben ist; die Abbildung
    /// bleibt dann unveraendert.
    pub fn beitreten(&self, name: &str) -> Option<mpsc::Receiver<Vec<Frame>>> {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_GROESSE);

        let mut mitglieder = self.inner.mitglieder.lock();
        if mitglieder.contains_key(name) {
            return None;
        }
        mitglieder.insert(name.to_string(), tx);

        let lauf = Frame::beitritts_lauf(name, &roster_von(&mitglieder));
        fan_out(&mut mitglieder, &lauf);

        tracing::debug!(name = %name, online = mitglieder.len(), "Name belegt");
        Some(rx)
    }

    /// Gibt einen Namen frei und verkuendet den Abschied
    ///
    /// Idempotent: war der Name nicht (mehr) belegt, passiert nichts und es
    /// wird `false` zurueckgegeben – insbesondere wird kein zweites
    /// `REMOVE_USER` verschickt. Bei Erfolg erhalten alle verbleibenden
    /// Mitglieder `REMOVE_USER <name>` plus das aktualisierte Roster.
    pub fn verlassen(&self, name: &str) -> bool {
        let mut mitglieder = self.inner.mitglieder.lock();
        if mitglieder.remove(name).is_none() {
            return false;
        }

        let lauf = Frame::abschieds_lauf(name, &roster_von(&mitglieder));
        fan_out(&mut mitglieder, &lauf);

        tracing::debug!(name = %name, online = mitglieder.len(), "Name freigegeben");
        true
    }

    /// Verteilt eine Chat-Zeile als `MESSAGE <absender>: <text>` an alle
    ///
    /// Gibt die Anzahl der Mitglieder zurueck, deren Queue die Nachricht
    /// angenommen hat. Ein Fehlschlag bei einem Empfaenger beeintraechtigt
    /// die Zustellung an die uebrigen nicht.
    pub fn nachricht_verteilen(&self, absender: &str, text: &str) -> usize {
        let frame = Frame::Message {
            absender: absender.to_string(),
            text: text.to_string(),
        };
        let mut mitglieder = self.inner.mitglieder.lock();
        fan_out(&mut mitglieder, std::slice::from_ref(&frame))
    }

    /// Gibt die aktuell belegten Namen als sortierte Liste zurueck
    pub fn roster_schnappschuss(&self) -> Vec<String> {
        roster_von(&self.inner.mitglieder.lock())
    }

    /// Prueft ob ein Name aktuell belegt ist
    pub fn ist_belegt(&self, name: &str) -> bool {
        self.inner.mitglieder.lock().contains_key(name)
    }

    /// Gibt die Anzahl der aktiven, benannten Sessions zurueck
    pub fn anzahl(&self) -> usize {
        self.inner.mitglieder.lock().len()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::neu()
    }
}

// ---------------------------------------------------------------------------
// Interne Hilfsfunktionen
// ---------------------------------------------------------------------------

/// Sortierter Roster-Schnappschuss der aktuellen Abbildung
fn roster_von(mitglieder: &HashMap<String, mpsc::Sender<Vec<Frame>>>) -> Vec<String> {
    let mut namen: Vec<String> = mitglieder.keys().cloned().collect();
    namen.sort();
    namen
}

/// Stellt einen Frame-Lauf in jede Mitglieder-Queue ein
///
/// Gibt die Anzahl der Mitglieder zurueck, deren Queue den Lauf angenommen
/// hat. Mitglieder mit voller Queue werden anschliessend entfernt und ihr
/// Abschied verkuendet (kaskadierend, falls dabei weitere Queues
/// volllaufen).
fn fan_out(mitglieder: &mut HashMap<String, mpsc::Sender<Vec<Frame>>>, lauf: &[Frame]) -> usize {
    let (zugestellt, tote) = lauf_einstellen(mitglieder, lauf);
    tote_entfernen(mitglieder, tote);
    zugestellt
}

/// Nicht-blockierender Push eines Laufs in jede Queue
///
/// Der Lauf ist ein einzelnes Queue-Element und kommt daher entweder ganz
/// oder gar nicht an. Volle Queues landen in der Totenliste; geschlossene
/// Queues gehoeren zu Sessions, die bereits im Teardown stecken und sich
/// selbst abmelden.
fn lauf_einstellen(
    mitglieder: &HashMap<String, mpsc::Sender<Vec<Frame>>>,
    lauf: &[Frame],
) -> (usize, Vec<String>) {
    let mut zugestellt = 0;
    let mut tote = Vec::new();

    for (name, tx) in mitglieder.iter() {
        match tx.try_send(lauf.to_vec()) {
            Ok(()) => zugestellt += 1,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tote.push(name.clone());
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(name = %name, "Send-Queue geschlossen (Session getrennt)");
            }
        }
    }

    (zugestellt, tote)
}

/// Entfernt Mitglieder mit vollgelaufener Queue und verkuendet ihren Abschied
///
/// Das Entfernen schliesst die Send-Queue; die betroffene Session sieht
/// `None` auf ihrer Empfangsseite und beendet sich. Ihre eigene Abmeldung
/// ist danach ein No-op (idempotentes `verlassen`).
fn tote_entfernen(
    mitglieder: &mut HashMap<String, mpsc::Sender<Vec<Frame>>>,
    mut tote: Vec<String>,
) {
    while let Some(name) = tote.pop() {
        if mitglieder.remove(&name).is_none() {
            continue;
        }
        tracing::warn!(name = %name, "Send-Queue voll – Mitglied wird entfernt");

        let lauf = Frame::abschieds_lauf(&name, &roster_von(mitglieder));
        let (_, weitere) = lauf_einstellen(mitglieder, &lauf);
        tote.extend(weitere);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
