//! TLS-Acceptor-Aufbau aus PEM-Schluesselmaterial
//!
//! Laedt Zertifikatskette und privaten Schluessel aus PEM-Dateien und baut
//! daraus den `TlsAcceptor` fuer die Accept-Loop. Optional erzwingt ein
//! Client-CA-Buendel gegenseitige Authentifizierung: ohne gueltiges
//! Client-Zertifikat scheitert dann bereits der Handshake.
//!
//! Fuer Development und Tests werden selbstsignierte Zertifikate via rcgen
//! generiert. In Produktion gehoeren echte CA-Zertifikate hinein.

use rcgen::{CertificateParams, DistinguishedName, KeyPair as RcgenKeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

use crate::error::{TransportError, TransportResult};

// ---------------------------------------------------------------------------
// TlsIdentitaet
// ---------------------------------------------------------------------------

/// Server-Identitaet: Zertifikatskette plus privater Schluessel
pub struct TlsIdentitaet {
    /// DER-kodierte Zertifikatskette (Leaf zuerst)
    pub zertifikate: Vec<CertificateDer<'static>>,
    /// DER-kodierter privater Schluessel
    pub schluessel: PrivateKeyDer<'static>,
}

impl TlsIdentitaet {
    /// Laedt die Identitaet aus PEM-Dateien
    pub fn laden(zertifikat_pfad: &Path, schluessel_pfad: &Path) -> TransportResult<Self> {
        let zertifikate = zertifikate_laden(zertifikat_pfad)?;

        let mut leser = BufReader::new(File::open(schluessel_pfad)?);
        let schluessel = rustls_pemfile::private_key(&mut leser)?.ok_or_else(|| {
            TransportError::Schluessel(format!(
                "Kein privater Schluessel in '{}'",
                schluessel_pfad.display()
            ))
        })?;

        Ok(Self {
            zertifikate,
            schluessel,
        })
    }

    /// Generiert eine selbstsignierte Identitaet fuer Development/Testing
    pub fn selbstsigniert(common_name: &str) -> TransportResult<Self> {
        let mut params = CertificateParams::new(vec![common_name.to_string()])
            .map_err(|e| TransportError::Generierung(e.to_string()))?;

        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(rcgen::DnType::CommonName, common_name);
        params.distinguished_name = distinguished_name;

        let key_pair =
            RcgenKeyPair::generate().map_err(|e| TransportError::Generierung(e.to_string()))?;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| TransportError::Generierung(e.to_string()))?;

        tracing::debug!(common_name = %common_name, "Selbstsigniertes Zertifikat generiert");

        Ok(Self {
            zertifikate: vec![cert.der().clone()],
            schluessel: PrivateKeyDer::Pkcs8(key_pair.serialize_der().into()),
        })
    }
}

// ---------------------------------------------------------------------------
// PEM-Laden
// ---------------------------------------------------------------------------

/// Laedt alle Zertifikate aus einer PEM-Datei
pub fn zertifikate_laden(pfad: &Path) -> TransportResult<Vec<CertificateDer<'static>>> {
    let mut leser = BufReader::new(File::open(pfad)?);
    let zertifikate = zertifikate_lesen(&mut leser)?;
    if zertifikate.is_empty() {
        return Err(TransportError::Zertifikat(format!(
            "Keine Zertifikate in '{}'",
            pfad.display()
        )));
    }
    Ok(zertifikate)
}

/// Liest alle Zertifikate aus einem PEM-Reader
fn zertifikate_lesen(
    leser: &mut dyn std::io::BufRead,
) -> TransportResult<Vec<CertificateDer<'static>>> {
    rustls_pemfile::certs(leser)
        .collect::<Result<Vec<_>, _>>()
        .map_err(TransportError::Io)
}

// ---------------------------------------------------------------------------
// Acceptor-Aufbau
// ---------------------------------------------------------------------------

/// Baut den `TlsAcceptor` fuer die Accept-Loop
///
/// Mit `client_ca` wird gegenseitige Authentifizierung erzwungen: nur
/// Clients mit einem von diesem Buendel signierten Zertifikat kommen durch
/// den Handshake. Ohne `client_ca` authentifiziert sich nur der Server.
pub fn acceptor_erstellen(
    identitaet: TlsIdentitaet,
    client_ca: Option<Vec<CertificateDer<'static>>>,
) -> TransportResult<TlsAcceptor> {
    // rustls verlangt einen prozessweiten CryptoProvider; ein bereits
    // installierter Provider bleibt unveraendert
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = match client_ca {
        None => ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(identitaet.zertifikate, identitaet.schluessel)?,
        Some(ca_zertifikate) => {
            let mut wurzeln = RootCertStore::empty();
            for zertifikat in ca_zertifikate {
                wurzeln.add(zertifikat)?;
            }
            let pruefer = WebPkiClientVerifier::builder(Arc::new(wurzeln))
                .build()
                .map_err(|e| {
                    TransportError::Zertifikat(format!("Client-CA unbrauchbar: {e}"))
                })?;
            ServerConfig::builder()
                .with_client_cert_verifier(pruefer)
                .with_single_cert(identitaet.zertifikate, identitaet.schluessel)?
        }
    };

    Ok(TlsAcceptor::from(Arc::new(config)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
