//! palaver-transport – TLS-Transportaufbau
//!
//! Dieses Crate kapselt das Laden von Zertifikat und Schluessel sowie den
//! Aufbau des `TlsAcceptor`s. Der Relay-Kern konsumiert die Verbindung nur
//! noch als fertigen, verschluesselten Byte-Strom.
//!
//! ## Module
//! - `acceptor` - PEM-Laden, selbstsignierte Dev-Zertifikate, Acceptor-Aufbau
//! - `error` - Fehlertypen

pub mod acceptor;
pub mod error;

// Bequeme Re-Exporte
pub use acceptor::{acceptor_erstellen, zertifikate_laden, TlsIdentitaet};
pub use error::{TransportError, TransportResult};
