//! Integrationstests fuer den Relay-Kern
//!
//! Treibt echte `ClientSession`s ueber In-Memory-Duplex-Streams gegen eine
//! geteilte Registry – ohne TCP und ohne TLS, aber mit dem vollstaendigen
//! Zeilenprotokoll auf der Leitung.

use palaver_relay::{ClientSession, Registry};
use std::time::Duration;
use tokio::io::{
    duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const ZEITLIMIT: Duration = Duration::from_secs(5);

/// Client-Seite einer In-Memory-Verbindung zu einer laufenden Session
struct TestClient {
    leser: BufReader<ReadHalf<DuplexStream>>,
    schreiber: WriteHalf<DuplexStream>,
    task: JoinHandle<()>,
}

impl TestClient {
    /// Startet eine Session auf dem Server-Ende und gibt das Client-Ende zurueck
    fn verbinden(registry: &Registry, shutdown: &watch::Sender<bool>) -> Self {
        let (client_ende, server_ende) = duplex(16 * 1024);
        let session = ClientSession::neu(registry.clone(), "test-peer");
        let task = tokio::spawn(session.verarbeiten(server_ende, shutdown.subscribe()));
        let (lese_haelfte, schreib_haelfte) = tokio::io::split(client_ende);
        Self {
            leser: BufReader::new(lese_haelfte),
            schreiber: schreib_haelfte,
            task,
        }
    }

    /// Liest die naechste Protokollzeile (ohne Terminator)
    async fn zeile(&mut self) -> String {
        let mut puffer = String::new();
        let gelesen = timeout(ZEITLIMIT, self.leser.read_line(&mut puffer))
            .await
            .expect("Zeitlimit beim Lesen ueberschritten")
            .expect("Lesefehler");
        assert!(gelesen > 0, "Stream unerwartet geschlossen");
        puffer.trim_end_matches(['\n', '\r']).to_string()
    }

    /// Liest alle restlichen Zeilen bis zum Stream-Ende
    async fn lese_bis_ende(&mut self) -> Vec<String> {
        let mut zeilen = Vec::new();
        loop {
            let mut puffer = String::new();
            let gelesen = timeout(ZEITLIMIT, self.leser.read_line(&mut puffer))
                .await
                .expect("Zeitlimit beim Lesen ueberschritten")
                .expect("Lesefehler");
            if gelesen == 0 {
                return zeilen;
            }
            zeilen.push(puffer.trim_end_matches(['\n', '\r']).to_string());
        }
    }

    /// Sendet eine Zeile inklusive Terminator
    async fn sende(&mut self, zeile: &str) {
        self.schreiber.write_all(zeile.as_bytes()).await.unwrap();
        self.schreiber.write_all(b"\n").await.unwrap();
    }

    /// Fuehrt die Namensverhandlung bis `NAME_ACCEPTED` durch
    async fn anmelden(&mut self, name: &str) {
        assert_eq!(self.zeile().await, "SUBMIT_NAME");
        self.sende(name).await;
        assert_eq!(self.zeile().await, "NAME_ACCEPTED");
    }

    /// Erwartet einen vollstaendigen Roster-Lauf mit genau diesen Namen
    async fn erwarte_roster(&mut self, namen: &[&str]) {
        assert_eq!(self.zeile().await, "USERLIST_BEGIN");
        for name in namen {
            assert_eq!(self.zeile().await, *name);
        }
        assert_eq!(self.zeile().await, "USERLIST_END");
    }

    /// Trennt die Verbindung abrupt und wartet auf das Session-Ende
    async fn abrupt_trennen(self) {
        let Self { leser, schreiber, task } = self;
        drop(leser);
        drop(schreiber);
        timeout(ZEITLIMIT, task)
            .await
            .expect("Session-Task muss enden")
            .unwrap();
    }
}

#[tokio::test]
async fn erste_anmeldung_mit_beitritts_broadcast() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut alice = TestClient::verbinden(&registry, &shutdown);
    alice.anmelden("alice").await;

    // Eigener Beitritt kommt als Broadcast zurueck
    assert_eq!(alice.zeile().await, "NEW_USER alice");
    alice.erwarte_roster(&["alice"]).await;

    assert!(registry.ist_belegt("alice"));
    assert_eq!(registry.anzahl(), 1);
}

#[tokio::test]
async fn kollision_fuehrt_zu_erneuter_aufforderung() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut alice = TestClient::verbinden(&registry, &shutdown);
    alice.anmelden("alice").await;
    assert_eq!(alice.zeile().await, "NEW_USER alice");
    alice.erwarte_roster(&["alice"]).await;

    let mut bob = TestClient::verbinden(&registry, &shutdown);
    assert_eq!(bob.zeile().await, "SUBMIT_NAME");
    bob.sende("alice").await;
    // Kollision: keine Fehlermeldung, nur eine neue Aufforderung
    assert_eq!(bob.zeile().await, "SUBMIT_NAME");
    bob.sende("bob").await;
    assert_eq!(bob.zeile().await, "NAME_ACCEPTED");

    // Beide sehen den Beitritt von bob mit identischem Roster
    for client in [&mut alice, &mut bob] {
        assert_eq!(client.zeile().await, "NEW_USER bob");
        client.erwarte_roster(&["alice", "bob"]).await;
    }
}

#[tokio::test]
async fn leerer_name_fuehrt_zu_erneuter_aufforderung() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut client = TestClient::verbinden(&registry, &shutdown);
    assert_eq!(client.zeile().await, "SUBMIT_NAME");

    // Leere Zeile als Kandidat: kein Claim, nur eine neue Aufforderung
    client.sende("").await;
    assert_eq!(client.zeile().await, "SUBMIT_NAME");
    assert_eq!(registry.anzahl(), 0);

    client.sende("alice").await;
    assert_eq!(client.zeile().await, "NAME_ACCEPTED");
    assert!(registry.ist_belegt("alice"));
}

#[tokio::test]
async fn nachricht_wird_an_alle_verteilt() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut alice = TestClient::verbinden(&registry, &shutdown);
    alice.anmelden("alice").await;
    assert_eq!(alice.zeile().await, "NEW_USER alice");
    alice.erwarte_roster(&["alice"]).await;

    let mut bob = TestClient::verbinden(&registry, &shutdown);
    bob.anmelden("bob").await;
    for client in [&mut alice, &mut bob] {
        assert_eq!(client.zeile().await, "NEW_USER bob");
        client.erwarte_roster(&["alice", "bob"]).await;
    }

    alice.sende("hello").await;
    assert_eq!(alice.zeile().await, "MESSAGE alice: hello");
    assert_eq!(bob.zeile().await, "MESSAGE alice: hello");
}

#[tokio::test]
async fn exit_beendet_session_mit_abschieds_broadcast() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut alice = TestClient::verbinden(&registry, &shutdown);
    alice.anmelden("alice").await;
    assert_eq!(alice.zeile().await, "NEW_USER alice");
    alice.erwarte_roster(&["alice"]).await;

    let mut bob = TestClient::verbinden(&registry, &shutdown);
    bob.anmelden("bob").await;
    for client in [&mut alice, &mut bob] {
        assert_eq!(client.zeile().await, "NEW_USER bob");
        client.erwarte_roster(&["alice", "bob"]).await;
    }

    bob.sende("EXIT").await;

    // Bob bekommt das EXIT-Echo, danach schliesst sein Stream
    let rest = bob.lese_bis_ende().await;
    assert_eq!(rest, vec!["EXIT".to_string()]);
    timeout(ZEITLIMIT, bob.task)
        .await
        .expect("Session-Task muss enden")
        .unwrap();

    // Alice sieht den Abschied mit aktualisiertem Roster
    assert_eq!(alice.zeile().await, "REMOVE_USER bob");
    alice.erwarte_roster(&["alice"]).await;

    assert!(!registry.ist_belegt("bob"));
    assert_eq!(registry.anzahl(), 1);
}

#[tokio::test]
async fn abrupte_trennung_wird_wie_abschied_behandelt() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut alice = TestClient::verbinden(&registry, &shutdown);
    alice.anmelden("alice").await;
    assert_eq!(alice.zeile().await, "NEW_USER alice");
    alice.erwarte_roster(&["alice"]).await;

    let mut bob = TestClient::verbinden(&registry, &shutdown);
    bob.anmelden("bob").await;
    for client in [&mut alice, &mut bob] {
        assert_eq!(client.zeile().await, "NEW_USER bob");
        client.erwarte_roster(&["alice", "bob"]).await;
    }

    // Kein EXIT – der Stream wird einfach gekappt
    bob.abrupt_trennen().await;

    assert_eq!(alice.zeile().await, "REMOVE_USER bob");
    alice.erwarte_roster(&["alice"]).await;
    assert_eq!(registry.anzahl(), 1);
}

#[tokio::test]
async fn trennung_waehrend_der_verhandlung_registriert_nichts() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut client = TestClient::verbinden(&registry, &shutdown);
    assert_eq!(client.zeile().await, "SUBMIT_NAME");
    client.abrupt_trennen().await;

    assert_eq!(registry.anzahl(), 0);
}

#[tokio::test]
async fn gleichzeitige_claims_auf_denselben_namen() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut erster = TestClient::verbinden(&registry, &shutdown);
    let mut zweiter = TestClient::verbinden(&registry, &shutdown);

    assert_eq!(erster.zeile().await, "SUBMIT_NAME");
    assert_eq!(zweiter.zeile().await, "SUBMIT_NAME");

    erster.sende("carol").await;
    zweiter.sende("carol").await;

    // Genau einer gewinnt, der andere sieht eine zweite Aufforderung
    let mut antworten = vec![erster.zeile().await, zweiter.zeile().await];
    antworten.sort();
    assert_eq!(antworten, vec!["NAME_ACCEPTED".to_string(), "SUBMIT_NAME".to_string()]);
    assert_eq!(registry.anzahl(), 1);
}

#[tokio::test]
async fn zeilenreihenfolge_pro_absender_bleibt_erhalten() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut alice = TestClient::verbinden(&registry, &shutdown);
    alice.anmelden("alice").await;
    assert_eq!(alice.zeile().await, "NEW_USER alice");
    alice.erwarte_roster(&["alice"]).await;

    let mut bob = TestClient::verbinden(&registry, &shutdown);
    bob.anmelden("bob").await;
    for client in [&mut alice, &mut bob] {
        assert_eq!(client.zeile().await, "NEW_USER bob");
        client.erwarte_roster(&["alice", "bob"]).await;
    }

    for nachricht in ["erste", "zweite", "dritte"] {
        alice.sende(nachricht).await;
    }

    for nachricht in ["erste", "zweite", "dritte"] {
        assert_eq!(bob.zeile().await, format!("MESSAGE alice: {nachricht}"));
        assert_eq!(alice.zeile().await, format!("MESSAGE alice: {nachricht}"));
    }
}

#[tokio::test]
async fn shutdown_beendet_alle_sessions() {
    let registry = Registry::neu();
    let (shutdown, _rx) = watch::channel(false);

    let mut alice = TestClient::verbinden(&registry, &shutdown);
    alice.anmelden("alice").await;
    assert_eq!(alice.zeile().await, "NEW_USER alice");
    alice.erwarte_roster(&["alice"]).await;

    let mut bob = TestClient::verbinden(&registry, &shutdown);
    bob.anmelden("bob").await;
    for client in [&mut alice, &mut bob] {
        assert_eq!(client.zeile().await, "NEW_USER bob");
        client.erwarte_roster(&["alice", "bob"]).await;
    }

    shutdown.send(true).unwrap();

    // Beide Sessions enden; das EXIT-Echo ist best effort, die genaue
    // Frame-Abfolge der beiden Teardowns ist nicht deterministisch
    for client in [alice, bob] {
        let TestClient { mut leser, schreiber, task } = client;
        let mut rest = Vec::new();
        loop {
            let mut puffer = String::new();
            let gelesen = timeout(ZEITLIMIT, leser.read_line(&mut puffer))
                .await
                .expect("Zeitlimit beim Lesen ueberschritten")
                .expect("Lesefehler");
            if gelesen == 0 {
                break;
            }
            rest.push(puffer.trim_end_matches('\n').to_string());
        }
        assert!(rest.contains(&"EXIT".to_string()));
        drop(schreiber);
        timeout(ZEITLIMIT, task)
            .await
            .expect("Session-Task muss enden")
            .unwrap();
    }

    assert_eq!(registry.anzahl(), 0);
}
