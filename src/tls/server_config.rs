//! rustls server configuration fed by a certificate distributor.
//!
//! [`ServerTlsConfig`] watches both facets of one certificate name and
//! rebuilds a `rustls::ServerConfig` on every update.  A failed rebuild or
//! a distributor error leaves the previous config in place, so handshakes
//! keep working on the last good credentials.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustls::ServerConfig;
use rustls::server::WebPkiClientVerifier;
use tracing::{debug, info, warn};

use super::distributor::{CertificateDistributor, CertificateError, CertificateWatcher, WatchHandle};
use super::material::{CertificateMaterial, parse_certificates, parse_private_key};
use crate::{Error, Result};

/// Build a `rustls::ServerConfig` from distributor material.
///
/// The first identity pair becomes the server certificate.  When a root
/// bundle is present, client certificates are verified against it; with
/// `require_client_cert` they are mandatory.
///
/// # Errors
///
/// Returns `Error::Config` when the identity is missing, a PEM blob does not
/// parse, the key does not match the certificate, or client certificates
/// are required without a root bundle.
pub fn build_server_config(
    material: &CertificateMaterial,
    require_client_cert: bool,
) -> Result<ServerConfig> {
    let pair = material
        .identity_pairs()
        .and_then(<[_]>::first)
        .ok_or_else(|| Error::Config("No identity certificate available".to_string()))?;
    let server_certs = parse_certificates(pair.certificate_chain())
        .map_err(|e| Error::Config(format!("Bad identity certificate chain: {e}")))?;
    let server_key = parse_private_key(pair.private_key())
        .map_err(|e| Error::Config(format!("Bad identity private key: {e}")))?;

    let builder = ServerConfig::builder();
    let builder = match material.root_certificate() {
        Some(root) => {
            let mut root_store = rustls::RootCertStore::empty();
            for cert in parse_certificates(root)
                .map_err(|e| Error::Config(format!("Bad root certificate: {e}")))?
            {
                root_store.add(cert).map_err(|e| {
                    Error::Config(format!("Failed to add CA cert to trust store: {e}"))
                })?;
            }
            let verifier = WebPkiClientVerifier::builder(Arc::new(root_store));
            let verifier = if require_client_cert {
                verifier.build()
            } else {
                verifier.allow_unauthenticated().build()
            }
            .map_err(|e| Error::Config(format!("Failed to build client verifier: {e}")))?;
            builder.with_client_cert_verifier(verifier)
        }
        None if require_client_cert => {
            return Err(Error::Config(
                "Client certificates required but no root certificate available".to_string(),
            ));
        }
        None => builder.with_no_client_auth(),
    };

    let mut config = builder
        .with_single_cert(server_certs, server_key)
        .map_err(|e| Error::Config(format!("TLS config error (cert/key mismatch?): {e}")))?;
    config.alpn_protocols = vec![b"h2".to_vec()];
    Ok(config)
}

struct ConfigSlot {
    cert_name: String,
    require_client_cert: bool,
    current: RwLock<Option<Arc<ServerConfig>>>,
    last_error: RwLock<Option<String>>,
}

impl CertificateWatcher for ConfigSlot {
    fn on_certificates_changed(&self, material: Arc<CertificateMaterial>) {
        match build_server_config(&material, self.require_client_cert) {
            Ok(config) => {
                *self.current.write() = Some(Arc::new(config));
                *self.last_error.write() = None;
                info!(cert_name = %self.cert_name, "TLS server config rebuilt");
            }
            Err(e) => {
                warn!(cert_name = %self.cert_name, error = %e, "Keeping previous TLS server config");
                *self.last_error.write() = Some(e.to_string());
            }
        }
    }

    fn on_error(&self, error: &CertificateError) {
        let message = [error.root_error.as_deref(), error.identity_error.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join("; ");
        warn!(cert_name = %self.cert_name, error = %message, "Certificate provider reported an error");
        *self.last_error.write() = Some(message);
    }
}

/// Live `rustls::ServerConfig` kept in sync with a distributor.
pub struct ServerTlsConfig {
    distributor: Arc<CertificateDistributor>,
    slot: Arc<ConfigSlot>,
    handle: Mutex<Option<WatchHandle>>,
}

impl ServerTlsConfig {
    /// Start watching `cert_name` for root and identity material.
    ///
    /// Material already in the distributor is applied before this returns.
    pub fn watch(
        distributor: Arc<CertificateDistributor>,
        cert_name: &str,
        require_client_cert: bool,
    ) -> Result<Self> {
        let slot = Arc::new(ConfigSlot {
            cert_name: cert_name.to_string(),
            require_client_cert,
            current: RwLock::new(None),
            last_error: RwLock::new(None),
        });
        let handle = distributor.watch(cert_name, true, true, &slot)?;
        debug!(cert_name, require_client_cert, "Watching certificates for TLS server config");

        Ok(Self {
            distributor,
            slot,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Latest successfully built config, if any.
    #[must_use]
    pub fn current(&self) -> Option<Arc<ServerConfig>> {
        self.slot.current.read().clone()
    }

    /// Most recent build or provider error since the last good config.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.slot.last_error.read().clone()
    }
}

impl Drop for ServerTlsConfig {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.lock().take() {
            self.distributor.unwatch(handle);
        }
    }
}
