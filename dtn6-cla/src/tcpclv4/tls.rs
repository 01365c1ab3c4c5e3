//! Certificate loading and rustls config construction for the optional
//! TLS upgrade described in §4.9. Kept deliberately close to how the
//! plain-TCP engine loads its own link parameters: paths in, a ready
//! `ClientConfig`/`ServerConfig` pair out.

use rustls_pemfile::{certs, pkcs8_private_keys};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS error: {0}")]
    Rustls(#[from] rustls::Error),
    #[error("{0}")]
    CertificateLoad(String),
    #[error("{0}")]
    PrivateKeyLoad(String),
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub ca_bundle: Option<PathBuf>,
    pub server_cert: Option<PathBuf>,
    pub server_key: Option<PathBuf>,
}

pub struct TlsConfig {
    pub server_config: Option<Arc<ServerConfig>>,
    pub client_config: Arc<ClientConfig>,
}

impl TlsConfig {
    pub fn new(paths: &TlsPaths) -> Result<Self, TlsError> {
        let server_config = match (&paths.server_cert, &paths.server_key) {
            (Some(cert), Some(key)) => {
                let certs = load_certs(cert)?;
                let key = load_private_key(key)?;
                Some(Arc::new(
                    ServerConfig::builder()
                        .with_no_client_auth()
                        .with_single_cert(certs, key)
                        .map_err(|e| TlsError::CertificateLoad(e.to_string()))?,
                ))
            }
            (None, None) => None,
            _ => {
                return Err(TlsError::CertificateLoad(
                    "server_cert and server_key must be configured together".to_string(),
                ));
            }
        };

        let mut root_store = RootCertStore::empty();
        if let Some(ca_bundle) = &paths.ca_bundle {
            load_ca_certs(&mut root_store, ca_bundle)?;
        }
        if root_store.is_empty() {
            return Err(TlsError::CertificateLoad(
                "TLS CA store is empty; configure ca_bundle for TLS-capable links".to_string(),
            ));
        }
        let client_config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        Ok(TlsConfig {
            server_config,
            client_config: Arc::new(client_config),
        })
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let data = std::fs::read(path)
        .map_err(|e| TlsError::CertificateLoad(format!("{}: {e}", path.display())))?;
    certs(&mut data.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::CertificateLoad(format!("{}: {e}", path.display())))
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let data = std::fs::read(path)
        .map_err(|e| TlsError::PrivateKeyLoad(format!("{}: {e}", path.display())))?;
    let mut keys = pkcs8_private_keys(&mut data.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::PrivateKeyLoad(format!("{}: {e}", path.display())))?;
    if keys.is_empty() {
        return Err(TlsError::PrivateKeyLoad(format!(
            "no PKCS8 private keys found in {}",
            path.display()
        )));
    }
    Ok(PrivateKeyDer::Pkcs8(keys.remove(0)))
}

fn load_ca_certs(store: &mut RootCertStore, path: &Path) -> Result<(), TlsError> {
    let data = std::fs::read(path)
        .map_err(|e| TlsError::CertificateLoad(format!("{}: {e}", path.display())))?;
    for cert in certs(&mut data.as_slice()) {
        let cert = cert.map_err(|e| TlsError::CertificateLoad(format!("{}: {e}", path.display())))?;
        store
            .add(cert)
            .map_err(|e| TlsError::CertificateLoad(format!("{}: {e}", path.display())))?;
    }
    Ok(())
}
