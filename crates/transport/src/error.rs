//! Fehlertypen fuer den Transportaufbau

use thiserror::Error;

/// Fehlertyp fuer den TLS-Transportaufbau
#[derive(Debug, Error)]
pub enum TransportError {
    /// IO-Fehler (Dateizugriff, PEM-Lesen)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Fehler aus der TLS-Bibliothek (Konfiguration, Schluesselmaterial)
    #[error("TLS-Fehler: {0}")]
    Tls(#[from] rustls::Error),

    /// Zertifikat fehlt oder ist unbrauchbar
    #[error("Zertifikatsfehler: {0}")]
    Zertifikat(String),

    /// Privater Schluessel fehlt oder ist unbrauchbar
    #[error("Schluesselfehler: {0}")]
    Schluessel(String),

    /// Selbstsignierte Zertifikat-Generierung fehlgeschlagen
    #[error("Zertifikat-Generierung fehlgeschlagen: {0}")]
    Generierung(String),
}

/// Result-Typ fuer den Transportaufbau
pub type TransportResult<T> = Result<T, TransportError>;
