//! TLS setup for the tunnel stream
//!
//! The tunnel engine is transport-agnostic; these builders produce the
//! encrypted stream collaborators from PEM files loaded once at startup.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::RootCertStore;
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::error::ConnectionError;

/// Build the responder-side acceptor from a certificate chain and key
pub fn acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ConnectionError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConnectionError::TlsSetup(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build the initiator-side connector trusting the given CA bundle.
///
/// When a client certificate and key are configured they are presented to
/// the server; the reference server does not require them.
pub fn connector(
    ca_path: &Path,
    client_pair: Option<(&Path, &Path)>,
) -> Result<TlsConnector, ConnectionError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots
            .add(cert)
            .map_err(|e| ConnectionError::TlsSetup(e.to_string()))?;
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(roots);
    let config = match client_pair {
        Some((cert_path, key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| ConnectionError::TlsSetup(e.to_string()))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Parse a host string into a TLS server name
pub fn server_name(host: &str) -> Result<ServerName<'static>, ConnectionError> {
    ServerName::try_from(host.to_string())
        .map_err(|_| ConnectionError::InvalidServerName(host.to_string()))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConnectionError> {
    let file = File::open(path)
        .map_err(|e| ConnectionError::TlsSetup(format!("{}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConnectionError::TlsSetup(format!("{}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(ConnectionError::TlsSetup(format!(
            "No certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConnectionError> {
    let file = File::open(path)
        .map_err(|e| ConnectionError::TlsSetup(format!("{}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);
    let key = rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ConnectionError::TlsSetup(format!("{}: {}", path.display(), e)))?;

    key.ok_or_else(|| {
        ConnectionError::TlsSetup(format!("No private key found in {}", path.display()))
    })
}
