//! File-watching certificate provider.
//!
//! Polls a root bundle and/or an identity key + chain on disk at a fixed
//! interval.  Each facet is hashed after a successful read; only a changed
//! digest leads to a distributor update.  Failed reads never evict material
//! that was loaded earlier.
//!
//! # Usage
//!
//! ```rust,ignore
//! let provider = FileWatcherCertificateProvider::start(FileWatcherOptions {
//!     root_cert_path: Some("/etc/guard/ca.pem".into()),
//!     identity_key_path: Some("/etc/guard/server.key".into()),
//!     identity_cert_path: Some("/etc/guard/server.pem".into()),
//!     refresh_interval: Duration::from_secs(600),
//! })?;
//! let distributor = provider.distributor();
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::distributor::{CertificateDistributor, WatchStatus};
use super::material::{
    IDENTITY_NOT_CONFIGURED_ERROR, PemKeyCertPair, ROOT_NOT_CONFIGURED_ERROR, read_pem_file,
    validate_identity_pair, validate_root_certificate,
};
use super::provider::CertificateProvider;
use crate::error::StatusCode;
use crate::{Error, Result};

/// Error published when no root bundle has ever been read successfully.
pub const ROOT_UNAVAILABLE_ERROR: &str = "unable to get latest root certificates";
/// Error published when no identity pair has ever been read successfully.
pub const IDENTITY_UNAVAILABLE_ERROR: &str = "unable to get latest identity certificates";

/// Shortest refresh interval honoured; anything below is raised to this.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Default refresh interval.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

// ─────────────────────────────────────────────────────────────────────────────
// Options and refresh outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Paths and polling interval for [`FileWatcherCertificateProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWatcherOptions {
    /// PEM root bundle to watch.
    pub root_cert_path: Option<PathBuf>,
    /// PEM private key of the identity.
    pub identity_key_path: Option<PathBuf>,
    /// PEM certificate chain of the identity.
    pub identity_cert_path: Option<PathBuf>,
    /// How often the files are re-read.
    pub refresh_interval: Duration,
}

impl Default for FileWatcherOptions {
    fn default() -> Self {
        Self {
            root_cert_path: None,
            identity_key_path: None,
            identity_cert_path: None,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl FileWatcherOptions {
    fn identity_paths(&self) -> Option<(&Path, &Path)> {
        Some((self.identity_key_path.as_deref()?, self.identity_cert_path.as_deref()?))
    }

    fn check(&self) -> Result<()> {
        if self.identity_key_path.is_some() != self.identity_cert_path.is_some() {
            return Err(Error::InvalidArgument(
                "identity_key_path and identity_cert_path must be set together".to_string(),
            ));
        }
        if self.root_cert_path.is_none() && self.identity_key_path.is_none() {
            return Err(Error::InvalidArgument(
                "at least one of root_cert_path or identity paths must be set".to_string(),
            ));
        }
        Ok(())
    }
}

/// What a refresh did to one facet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Read succeeded and content matched the previous digest.
    Unchanged,
    /// Read succeeded with new content.
    Reloaded,
    /// Read or PEM validation failed.
    Fail(String),
}

/// Result of one refresh pass; `None` means the facet is not configured.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefreshReport {
    /// Root bundle outcome.
    pub root: Option<RefreshOutcome>,
    /// Identity pair outcome.
    pub identity: Option<RefreshOutcome>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared state
// ─────────────────────────────────────────────────────────────────────────────

/// Last read failure of a facet, kept by status code so it can be re-raised.
struct Failure {
    code: StatusCode,
    message: String,
}

impl Failure {
    fn to_error(&self) -> Error {
        Error::from_status(self.code, self.message.clone())
    }
}

impl From<&Error> for Failure {
    fn from(error: &Error) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
        }
    }
}

#[derive(Default)]
struct FileCache {
    root: Option<Bytes>,
    root_digest: Option<String>,
    root_failure: Option<Failure>,
    identity: Option<PemKeyCertPair>,
    identity_digest: Option<String>,
    identity_failure: Option<Failure>,
}

struct WatcherState {
    options: FileWatcherOptions,
    cache: Mutex<FileCache>,
    watching: Mutex<HashMap<String, WatchStatus>>,
}

/// Changes one refresh owes to the distributor.
#[derive(Default)]
struct Publication {
    root: Option<Bytes>,
    identity: Option<PemKeyCertPair>,
    root_error: bool,
    identity_error: bool,
}

impl WatcherState {
    fn read_root(&self) -> Option<Result<Bytes>> {
        let path = self.options.root_cert_path.as_deref()?;
        Some(read_pem_file(path).and_then(|pem| validate_root_certificate(&pem).map(|()| pem)))
    }

    fn read_identity(&self) -> Option<Result<PemKeyCertPair>> {
        let (key_path, cert_path) = self.options.identity_paths()?;
        Some(
            read_pem_file(key_path)
                .and_then(|key| Ok(PemKeyCertPair::new(key, read_pem_file(cert_path)?)))
                .and_then(|pair| validate_identity_pair(&pair).map(|()| pair)),
        )
    }

    /// Re-read configured files and fold the results into the cache.
    ///
    /// File IO happens before the cache lock is taken.
    fn reload(&self) -> (RefreshReport, Publication) {
        let root_read = self.read_root();
        let identity_read = self.read_identity();

        let mut cache = self.cache.lock();
        let mut publication = Publication::default();

        let root = root_read.map(|read| match read {
            Ok(pem) => {
                let digest = digest(&[&pem[..]]);
                cache.root_failure = None;
                if cache.root_digest.as_deref() == Some(digest.as_str()) {
                    RefreshOutcome::Unchanged
                } else {
                    cache.root_digest = Some(digest);
                    cache.root = Some(pem.clone());
                    publication.root = Some(pem);
                    RefreshOutcome::Reloaded
                }
            }
            Err(e) => {
                publication.root_error = cache.root.is_none();
                cache.root_failure = Some(Failure::from(&e));
                RefreshOutcome::Fail(e.to_string())
            }
        });

        let identity = identity_read.map(|read| match read {
            Ok(pair) => {
                let digest = digest(&[&pair.private_key()[..], &pair.certificate_chain()[..]]);
                cache.identity_failure = None;
                if cache.identity_digest.as_deref() == Some(digest.as_str()) {
                    RefreshOutcome::Unchanged
                } else {
                    cache.identity_digest = Some(digest);
                    cache.identity = Some(pair.clone());
                    publication.identity = Some(pair);
                    RefreshOutcome::Reloaded
                }
            }
            Err(e) => {
                publication.identity_error = cache.identity.is_none();
                cache.identity_failure = Some(Failure::from(&e));
                RefreshOutcome::Fail(e.to_string())
            }
        });

        (RefreshReport { root, identity }, publication)
    }

    /// Push a refresh result to every watched certificate name.
    fn publish(&self, distributor: &CertificateDistributor, publication: &Publication) {
        let watching: Vec<(String, WatchStatus)> = self
            .watching
            .lock()
            .iter()
            .map(|(name, status)| (name.clone(), *status))
            .collect();

        for (cert_name, status) in watching {
            let root = status
                .root_being_watched
                .then(|| publication.root.clone())
                .flatten();
            let identity = status
                .identity_being_watched
                .then(|| publication.identity.clone().map(|pair| vec![pair]))
                .flatten();
            if root.is_some() || identity.is_some() {
                if let Err(e) = distributor.set_key_materials(&cert_name, root, identity) {
                    warn!(cert_name, error = %e, "Failed to publish reloaded certificates");
                }
            }

            let root_error = (status.root_being_watched && publication.root_error)
                .then(|| ROOT_UNAVAILABLE_ERROR.to_string());
            let identity_error = (status.identity_being_watched && publication.identity_error)
                .then(|| IDENTITY_UNAVAILABLE_ERROR.to_string());
            if root_error.is_some() || identity_error.is_some() {
                distributor.set_error_for_cert(&cert_name, root_error, identity_error);
            }
        }
    }

    fn refresh(&self, distributor: &CertificateDistributor) -> RefreshReport {
        let (report, publication) = self.reload();
        if let Some(RefreshOutcome::Fail(reason)) = &report.root {
            warn!(error = %reason, "Root certificate refresh failed");
        }
        if let Some(RefreshOutcome::Fail(reason)) = &report.identity {
            warn!(error = %reason, "Identity certificate refresh failed");
        }
        if publication.root.is_some() || publication.identity.is_some() {
            info!(
                root = publication.root.is_some(),
                identity = publication.identity.is_some(),
                "Certificate files changed, publishing"
            );
        }
        self.publish(distributor, &publication);
        report
    }

    /// Serve newly watched facets from the cache; forget idle names.
    fn on_watch_status(&self, distributor: &CertificateDistributor, cert_name: &str, status: WatchStatus) {
        let root_configured = self.options.root_cert_path.is_some();
        let identity_configured = self.options.identity_paths().is_some();

        let previous = {
            let mut watching = self.watching.lock();
            let previous = watching.get(cert_name).copied().unwrap_or_default();
            if status.is_idle() {
                watching.remove(cert_name);
            } else {
                watching.insert(cert_name.to_string(), status);
            }
            previous
        };

        let starts_root = status.root_being_watched && !previous.root_being_watched;
        let starts_identity = status.identity_being_watched && !previous.identity_being_watched;
        if !starts_root && !starts_identity {
            return;
        }

        let (root, identity) = {
            let cache = self.cache.lock();
            (
                starts_root.then(|| cache.root.clone()).flatten(),
                starts_identity.then(|| cache.identity.clone()).flatten(),
            )
        };

        // Facets this provider was not configured for get a config error.
        let root_error = if starts_root && root.is_none() {
            Some(if root_configured {
                ROOT_UNAVAILABLE_ERROR.to_string()
            } else {
                ROOT_NOT_CONFIGURED_ERROR.to_string()
            })
        } else {
            None
        };
        let identity_error = if starts_identity && identity.is_none() {
            Some(if identity_configured {
                IDENTITY_UNAVAILABLE_ERROR.to_string()
            } else {
                IDENTITY_NOT_CONFIGURED_ERROR.to_string()
            })
        } else {
            None
        };

        if root.is_some() || identity.is_some() {
            if let Err(e) = distributor.set_key_materials(cert_name, root, identity.map(|pair| vec![pair])) {
                warn!(cert_name, error = %e, "Failed to publish cached certificates");
            }
        }
        if root_error.is_some() || identity_error.is_some() {
            distributor.set_error_for_cert(cert_name, root_error, identity_error);
        }
    }

    fn validate(&self) -> Result<()> {
        let cache = self.cache.lock();
        if self.options.root_cert_path.is_some() {
            match (&cache.root, &cache.root_failure) {
                (Some(root), _) => validate_root_certificate(root)?,
                (None, Some(failure)) => return Err(failure.to_error()),
                (None, None) => {
                    return Err(Error::FailedPrecondition(ROOT_UNAVAILABLE_ERROR.to_string()));
                }
            }
        }
        if self.options.identity_paths().is_some() {
            match (&cache.identity, &cache.identity_failure) {
                (Some(pair), _) => validate_identity_pair(pair)?,
                (None, Some(failure)) => return Err(failure.to_error()),
                (None, None) => {
                    return Err(Error::FailedPrecondition(IDENTITY_UNAVAILABLE_ERROR.to_string()));
                }
            }
        }
        Ok(())
    }
}

fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hex::encode(hasher.finalize())
}

// ─────────────────────────────────────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────────────────────────────────────

/// Provider that keeps a distributor in sync with PEM files on disk.
pub struct FileWatcherCertificateProvider {
    distributor: Arc<CertificateDistributor>,
    state: Arc<WatcherState>,
    shutdown: CancellationToken,
}

impl FileWatcherCertificateProvider {
    /// Create a provider and read the files once, without a refresh task.
    ///
    /// Call [`refresh`](Self::refresh) to poll manually.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` when only one identity path is set or
    /// no path is set at all.  Unreadable files are not an error here.
    pub fn new(mut options: FileWatcherOptions) -> Result<Self> {
        options.check()?;
        if options.refresh_interval < MIN_REFRESH_INTERVAL {
            warn!(
                requested = ?options.refresh_interval,
                minimum = ?MIN_REFRESH_INTERVAL,
                "Refresh interval too small, using minimum"
            );
            options.refresh_interval = MIN_REFRESH_INTERVAL;
        }

        let state = Arc::new(WatcherState {
            options,
            cache: Mutex::new(FileCache::default()),
            watching: Mutex::new(HashMap::new()),
        });
        let distributor = Arc::new(CertificateDistributor::new());

        let callback_state = Arc::clone(&state);
        distributor.set_watch_status_callback(Some(Arc::new(
            move |distributor: &CertificateDistributor, cert_name: &str, status: WatchStatus| {
                callback_state.on_watch_status(distributor, cert_name, status);
            },
        )));

        let provider = Self {
            distributor,
            state,
            shutdown: CancellationToken::new(),
        };
        provider.refresh();
        Ok(provider)
    }

    /// Create a provider and spawn its periodic refresh task.
    ///
    /// Must be called inside a tokio runtime.  File reads run on the blocking
    /// pool.  The task stops when the provider is dropped.
    pub fn start(options: FileWatcherOptions) -> Result<Self> {
        let provider = Self::new(options)?;

        let state = Arc::clone(&provider.state);
        let distributor = Arc::clone(&provider.distributor);
        let shutdown = provider.shutdown.clone();
        let period = state.options.refresh_interval;
        debug!(?period, "Starting certificate refresh task");

        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let state = Arc::clone(&state);
                        let distributor = Arc::clone(&distributor);
                        let refresh = tokio::task::spawn_blocking(move || state.refresh(&distributor));
                        if let Err(e) = refresh.await {
                            warn!(error = %e, "Certificate refresh did not finish");
                        }
                    }
                    () = shutdown.cancelled() => {
                        debug!("Certificate refresh task stopped");
                        break;
                    }
                }
            }
        });

        Ok(provider)
    }

    /// Re-read the files now and publish whatever changed.
    pub fn refresh(&self) -> RefreshReport {
        self.state.refresh(&self.distributor)
    }

    /// Effective refresh interval after clamping.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        self.state.options.refresh_interval
    }
}

impl CertificateProvider for FileWatcherCertificateProvider {
    fn distributor(&self) -> Arc<CertificateDistributor> {
        Arc::clone(&self.distributor)
    }

    fn validate_credentials(&self) -> Result<()> {
        self.state.validate()
    }
}

impl Drop for FileWatcherCertificateProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.distributor.set_watch_status_callback(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::distributor::{CertificateError, CertificateWatcher};
    use crate::tls::material::{CertificateMaterial, KEY_PEM_ERROR};
    use rcgen::{CertificateParams, KeyPair};
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        materials: Mutex<Vec<Arc<CertificateMaterial>>>,
        errors: Mutex<Vec<CertificateError>>,
    }

    impl CertificateWatcher for Recorder {
        fn on_certificates_changed(&self, material: Arc<CertificateMaterial>) {
            self.materials.lock().push(material);
        }
        fn on_error(&self, error: &CertificateError) {
            self.errors.lock().push(error.clone());
        }
    }

    fn self_signed(name: &str) -> (String, String) {
        let key = KeyPair::generate().unwrap();
        let cert = CertificateParams::new(vec![name.to_string()])
            .unwrap()
            .self_signed(&key)
            .unwrap();
        (cert.pem(), key.serialize_pem())
    }

    fn root_only(dir: &TempDir) -> FileWatcherOptions {
        FileWatcherOptions {
            root_cert_path: Some(dir.path().join("ca.pem")),
            ..FileWatcherOptions::default()
        }
    }

    #[test]
    fn options_require_both_identity_paths() {
        let options = FileWatcherOptions {
            identity_key_path: Some("key.pem".into()),
            ..FileWatcherOptions::default()
        };
        assert!(matches!(
            FileWatcherCertificateProvider::new(options),
            Err(Error::InvalidArgument(_))
        ));
        assert!(FileWatcherCertificateProvider::new(FileWatcherOptions::default()).is_err());
    }

    #[test]
    fn refresh_interval_is_clamped() {
        let dir = TempDir::new().unwrap();
        let mut options = root_only(&dir);
        options.refresh_interval = Duration::from_millis(10);
        let provider = FileWatcherCertificateProvider::new(options).unwrap();
        assert_eq!(provider.refresh_interval(), MIN_REFRESH_INTERVAL);
    }

    #[test]
    fn unchanged_file_is_not_republished() {
        // GIVEN: a root file on disk and a watcher
        let dir = TempDir::new().unwrap();
        let (ca, _) = self_signed("ca.test");
        fs::write(dir.path().join("ca.pem"), &ca).unwrap();
        let provider = FileWatcherCertificateProvider::new(root_only(&dir)).unwrap();
        let recorder = Arc::new(Recorder::default());
        let _h = provider
            .distributor()
            .watch("default", true, false, &recorder)
            .unwrap();
        assert_eq!(recorder.materials.lock().len(), 1);

        // WHEN: refreshing without touching the file
        let report = provider.refresh();

        // THEN: nothing new is delivered
        assert_eq!(report.root, Some(RefreshOutcome::Unchanged));
        assert_eq!(report.identity, None);
        assert_eq!(recorder.materials.lock().len(), 1);
    }

    #[test]
    fn changed_file_is_republished() {
        let dir = TempDir::new().unwrap();
        let (ca1, _) = self_signed("one.test");
        let (ca2, _) = self_signed("two.test");
        fs::write(dir.path().join("ca.pem"), &ca1).unwrap();
        let provider = FileWatcherCertificateProvider::new(root_only(&dir)).unwrap();
        let recorder = Arc::new(Recorder::default());
        let _h = provider
            .distributor()
            .watch("default", true, false, &recorder)
            .unwrap();

        fs::write(dir.path().join("ca.pem"), &ca2).unwrap();
        assert_eq!(provider.refresh().root, Some(RefreshOutcome::Reloaded));

        let materials = recorder.materials.lock();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[1].root_certificate().unwrap().as_ref(), ca2.as_bytes());
    }

    #[test]
    fn deleted_file_keeps_previous_material() {
        let dir = TempDir::new().unwrap();
        let (ca, _) = self_signed("ca.test");
        fs::write(dir.path().join("ca.pem"), &ca).unwrap();
        let provider = FileWatcherCertificateProvider::new(root_only(&dir)).unwrap();
        let recorder = Arc::new(Recorder::default());
        let _h = provider
            .distributor()
            .watch("default", true, false, &recorder)
            .unwrap();

        fs::remove_file(dir.path().join("ca.pem")).unwrap();
        assert!(matches!(provider.refresh().root, Some(RefreshOutcome::Fail(_))));

        assert!(recorder.errors.lock().is_empty());
        assert!(provider.distributor().snapshot("default").is_some());
        assert!(provider.validate_credentials().is_ok());
    }

    #[test]
    fn missing_file_from_start_reports_unavailable() {
        let dir = TempDir::new().unwrap();
        let provider = FileWatcherCertificateProvider::new(root_only(&dir)).unwrap();
        let recorder = Arc::new(Recorder::default());
        let _h = provider
            .distributor()
            .watch("default", true, false, &recorder)
            .unwrap();

        let errors = recorder.errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].root_error.as_deref(), Some(ROOT_UNAVAILABLE_ERROR));
        let err = provider.validate_credentials().unwrap_err();
        assert_eq!(err.code(), StatusCode::InvalidArgument);
        assert!(err.to_string().contains("Cannot read"));
    }

    #[test]
    fn malformed_key_keeps_its_status_code() {
        // GIVEN: a valid chain next to a key file with no private key in it
        let dir = TempDir::new().unwrap();
        let (cert, _) = self_signed("server.test");
        fs::write(dir.path().join("server.key"), "not a key").unwrap();
        fs::write(dir.path().join("server.pem"), &cert).unwrap();

        // WHEN: the provider reads the files and credentials are validated
        let provider = FileWatcherCertificateProvider::new(FileWatcherOptions {
            identity_key_path: Some(dir.path().join("server.key")),
            identity_cert_path: Some(dir.path().join("server.pem")),
            ..FileWatcherOptions::default()
        })
        .unwrap();
        let err = provider.validate_credentials().unwrap_err();

        // THEN: the key error surfaces as NotFound, same as for static material
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(err.to_string(), KEY_PEM_ERROR);
    }

    #[test]
    fn identity_pair_is_loaded_together() {
        let dir = TempDir::new().unwrap();
        let (cert, key) = self_signed("server.test");
        fs::write(dir.path().join("server.key"), &key).unwrap();
        fs::write(dir.path().join("server.pem"), &cert).unwrap();
        let provider = FileWatcherCertificateProvider::new(FileWatcherOptions {
            identity_key_path: Some(dir.path().join("server.key")),
            identity_cert_path: Some(dir.path().join("server.pem")),
            ..FileWatcherOptions::default()
        })
        .unwrap();

        let recorder = Arc::new(Recorder::default());
        let _h = provider
            .distributor()
            .watch("default", false, true, &recorder)
            .unwrap();
        let materials = recorder.materials.lock();
        let pairs = materials[0].identity_pairs().unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].certificate_chain().as_ref(), cert.as_bytes());
    }

    #[test]
    fn unconfigured_facet_reports_error() {
        let dir = TempDir::new().unwrap();
        let (ca, _) = self_signed("ca.test");
        fs::write(dir.path().join("ca.pem"), &ca).unwrap();
        let provider = FileWatcherCertificateProvider::new(root_only(&dir)).unwrap();

        let recorder = Arc::new(Recorder::default());
        let _h = provider
            .distributor()
            .watch("default", false, true, &recorder)
            .unwrap();
        assert!(recorder.materials.lock().is_empty());
        assert!(recorder.errors.lock()[0].identity_error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn background_task_picks_up_changes() {
        let dir = TempDir::new().unwrap();
        let (ca1, _) = self_signed("one.test");
        let (ca2, _) = self_signed("two.test");
        fs::write(dir.path().join("ca.pem"), &ca1).unwrap();
        let mut options = root_only(&dir);
        options.refresh_interval = Duration::from_secs(5);
        let provider = FileWatcherCertificateProvider::start(options).unwrap();
        let recorder = Arc::new(Recorder::default());
        let _h = provider
            .distributor()
            .watch("default", true, false, &recorder)
            .unwrap();

        fs::write(dir.path().join("ca.pem"), &ca2).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        for _ in 0..100 {
            if recorder.materials.lock().len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let materials = recorder.materials.lock();
        assert_eq!(materials.len(), 2);
        assert_eq!(materials[1].root_certificate().unwrap().as_ref(), ca2.as_bytes());
    }
}
