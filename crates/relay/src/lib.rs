//! palaver-relay – Session-Lebenszyklus und Broadcast-Registry
//!
//! Dieser Crate implementiert den nebenlaeufigen Kern von Palaver: er
//! akzeptiert TLS-Verbindungen, fuehrt pro Client die Namensverhandlung
//! durch, haelt die konsistente Sicht auf "wer ist online" und verteilt
//! Broadcast-Zeilen an alle aktiven Sessions.
//!
//! ## Architektur
//!
//! ```text
//! TCP/TLS Listener (RelayServer)
//!     |
//!     v
//! ClientSession (pro Verbindung ein Task)
//!     |  State Machine: Verhandlung -> Aktiv -> Beendet
//!     |
//!     v
//! Registry – eine Abbildung Name -> Send-Queue unter einem Lock
//!     |  atomarer Namens-Claim, idempotente Abmeldung,
//!     |  snapshot-konsistente Broadcasts (Beitritt/Abschied/Nachricht)
//!     v
//! Send-Queues – je Session eine mpsc-Queue ganzer Frame-Laeufe, geschrieben
//!               von der Registry, geleert von der Session in ihrer eigenen
//!               Select-Loop
//! ```

pub mod registry;
pub mod session;
pub mod tcp;

// Bequeme Re-Exporte
pub use registry::Registry;
pub use session::{ClientSession, SitzungsZustand};
pub use tcp::RelayServer;
