//! Certificate providers and the static (in-memory) provider.
//!
//! A provider owns a [`CertificateDistributor`] and fills it on demand: it
//! installs a watch-status callback and publishes material for a
//! certificate name once somebody starts watching it.

use std::collections::HashSet;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::distributor::{CertificateDistributor, WatchStatus};
use super::material::{
    IDENTITY_NOT_CONFIGURED_ERROR, PemKeyCertPair, ROOT_NOT_CONFIGURED_ERROR,
    validate_identity_pair, validate_root_certificate,
};
use crate::Result;

/// Source of certificate material for TLS credentials.
pub trait CertificateProvider: Send + Sync {
    /// Distributor consumers subscribe to.
    fn distributor(&self) -> Arc<CertificateDistributor>;

    /// Check the configured material is well-formed PEM.
    ///
    /// Credentials are not usable when this fails.
    fn validate_credentials(&self) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Static provider
// ─────────────────────────────────────────────────────────────────────────────

/// Serves fixed, in-memory PEM material under every certificate name.
///
/// Material is pushed into the distributor the first time a name is
/// watched; invalid material is reported as a per-facet error instead.
pub struct StaticCertificateProvider {
    distributor: Arc<CertificateDistributor>,
    material: Arc<StaticMaterial>,
}

struct StaticMaterial {
    root_certificate: Option<Bytes>,
    identity_pairs: Option<Vec<PemKeyCertPair>>,
    published: Mutex<HashSet<String>>,
}

impl StaticMaterial {
    fn validate(&self) -> Result<()> {
        if let Some(root) = &self.root_certificate {
            validate_root_certificate(root)?;
        }
        for pair in self.identity_pairs.iter().flatten() {
            validate_identity_pair(pair)?;
        }
        Ok(())
    }

    fn on_watch_status(&self, distributor: &CertificateDistributor, cert_name: &str, status: WatchStatus) {
        if status.is_idle() || !self.published.lock().insert(cert_name.to_string()) {
            return;
        }

        if let Err(e) = self.validate() {
            warn!(cert_name, error = %e, "Static certificate material is invalid");
            let message = e.to_string();
            distributor.set_error_for_cert(
                cert_name,
                self.root_certificate.as_ref().map(|_| message.clone()),
                self.identity_pairs.as_ref().map(|_| message.clone()),
            );
            return;
        }

        if let Err(e) = distributor.set_key_materials(
            cert_name,
            self.root_certificate.clone(),
            self.identity_pairs.clone(),
        ) {
            warn!(cert_name, error = %e, "Failed to publish static certificate material");
            return;
        }
        debug!(cert_name, "Published static certificate material");

        // Missing facets are stored as errors so later watchers hear them too.
        let root_error = self
            .root_certificate
            .is_none()
            .then(|| ROOT_NOT_CONFIGURED_ERROR.to_string());
        let identity_error = self
            .identity_pairs
            .is_none()
            .then(|| IDENTITY_NOT_CONFIGURED_ERROR.to_string());
        if root_error.is_some() || identity_error.is_some() {
            distributor.set_error_for_cert(cert_name, root_error, identity_error);
        }
    }
}

impl StaticCertificateProvider {
    /// Create a provider for the given root bundle and identity pairs.
    ///
    /// An empty identity list is treated as no identity at all.
    pub fn new(root_certificate: Option<Bytes>, identity_pairs: Option<Vec<PemKeyCertPair>>) -> Self {
        let material = Arc::new(StaticMaterial {
            root_certificate,
            identity_pairs: identity_pairs.filter(|pairs| !pairs.is_empty()),
            published: Mutex::new(HashSet::new()),
        });

        let distributor = Arc::new(CertificateDistributor::new());
        let callback_material = Arc::clone(&material);
        distributor.set_watch_status_callback(Some(Arc::new(
            move |distributor: &CertificateDistributor, cert_name: &str, status: WatchStatus| {
                callback_material.on_watch_status(distributor, cert_name, status);
            },
        )));

        Self {
            distributor,
            material,
        }
    }
}

impl CertificateProvider for StaticCertificateProvider {
    fn distributor(&self) -> Arc<CertificateDistributor> {
        Arc::clone(&self.distributor)
    }

    fn validate_credentials(&self) -> Result<()> {
        self.material.validate()
    }
}

impl Drop for StaticCertificateProvider {
    fn drop(&mut self) {
        self.distributor.set_watch_status_callback(None);
    }
}
