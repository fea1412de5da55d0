//! End-to-end certificate distribution tests
//!
//! Tests the certificate pipeline including:
//! - Static and file-watching providers feeding a distributor
//! - Watch/unwatch lifecycle as seen by the provider
//! - Live rustls server config rebuilt on rotation

use std::fs;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use rcgen::{CertificateParams, KeyPair};
use rpc_guard::tls::{
    CertificateDistributor, CertificateError, CertificateMaterial, CertificateProvider,
    CertificateWatcher, FileWatcherCertificateProvider, FileWatcherOptions, PemKeyCertPair,
    RefreshOutcome, ServerTlsConfig, StaticCertificateProvider, WatchStatus,
};

struct Issued {
    cert_pem: String,
    key_pem: String,
}

fn issue(names: &[&str]) -> Issued {
    let key = KeyPair::generate().unwrap();
    let cert = CertificateParams::new(names.iter().map(ToString::to_string).collect::<Vec<_>>())
        .unwrap()
        .self_signed(&key)
        .unwrap();
    Issued {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    }
}

fn write_identity(dir: &Path, issued: &Issued) -> FileWatcherOptions {
    let root = dir.join("ca.pem");
    let key = dir.join("server.key");
    let cert = dir.join("server.pem");
    fs::write(&root, &issued.cert_pem).unwrap();
    fs::write(&key, &issued.key_pem).unwrap();
    fs::write(&cert, &issued.cert_pem).unwrap();
    FileWatcherOptions {
        root_cert_path: Some(root),
        identity_key_path: Some(key),
        identity_cert_path: Some(cert),
        ..FileWatcherOptions::default()
    }
}

// ── Providers → server config ──────────────────────────────────────────────

/// Static material yields a usable mTLS server config
#[test]
fn test_static_provider_builds_server_config() {
    let issued = issue(&["server.test"]);
    let provider = StaticCertificateProvider::new(
        Some(Bytes::from(issued.cert_pem.clone())),
        Some(vec![PemKeyCertPair::new(issued.key_pem.clone(), issued.cert_pem.clone())]),
    );
    provider.validate_credentials().unwrap();

    let tls = ServerTlsConfig::watch(provider.distributor(), "server", true).unwrap();

    let config = tls.current().expect("config built on watch");
    assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    assert!(tls.last_error().is_none());
}

/// Rotated files replace the live config; broken files keep the last good one
#[test]
fn test_file_rotation_rebuilds_config() {
    // GIVEN: files on disk and a live server config
    let dir = tempfile::tempdir().unwrap();
    let first = issue(&["v1.test"]);
    let options = write_identity(dir.path(), &first);
    let provider = FileWatcherCertificateProvider::new(options.clone()).unwrap();
    let tls = ServerTlsConfig::watch(provider.distributor(), "server", false).unwrap();
    let before = tls.current().unwrap();

    // WHEN: the identity is rotated
    let second = issue(&["v2.test"]);
    write_identity(dir.path(), &second);
    let report = provider.refresh();

    // THEN: both facets reload and a new config is in place
    assert_eq!(report.root, Some(RefreshOutcome::Reloaded));
    assert_eq!(report.identity, Some(RefreshOutcome::Reloaded));
    let after = tls.current().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));

    // WHEN: the certificate file is corrupted
    fs::write(options.identity_cert_path.as_ref().unwrap(), "garbage").unwrap();
    let report = provider.refresh();

    // THEN: identity fails, the last good config survives
    assert!(matches!(report.identity, Some(RefreshOutcome::Fail(_))));
    assert!(Arc::ptr_eq(&after, &tls.current().unwrap()));

    // AND: an unchanged pass reports nothing new for the root
    assert_eq!(provider.refresh().root, Some(RefreshOutcome::Unchanged));
}

/// Snapshot reflects what the files held
#[test]
fn test_snapshot_after_watch() {
    let dir = tempfile::tempdir().unwrap();
    let issued = issue(&["snap.test"]);
    let provider = FileWatcherCertificateProvider::new(write_identity(dir.path(), &issued)).unwrap();
    let distributor = provider.distributor();

    let _tls = ServerTlsConfig::watch(Arc::clone(&distributor), "server", false).unwrap();
    let snapshot: Arc<CertificateMaterial> = distributor.snapshot("server").unwrap();

    assert_eq!(
        snapshot.root_certificate().map(|b| b.to_vec()),
        Some(issued.cert_pem.into_bytes())
    );
    assert_eq!(snapshot.identity_pairs().map(<[_]>::len), Some(1));
}

// ── Watch lifecycle ─────────────────────────────────────────────────────────

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

/// Watching twice yields the same snapshot; re-watching replays the status sequence
#[test]
fn test_watch_is_idempotent() {
    // GIVEN: a distributor with a recording status callback and material
    let distributor = CertificateDistributor::new();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let statuses_in = Arc::clone(&statuses);
    distributor.set_watch_status_callback(Some(Arc::new(
        move |_: &CertificateDistributor, cert_name: &str, status: WatchStatus| {
            statuses_in.lock().push((cert_name.to_string(), status.root_being_watched));
        },
    )));
    let issued = issue(&["idem.test"]);
    distributor
        .set_key_materials("", Some(Bytes::from(issued.cert_pem)), None)
        .unwrap();

    // WHEN: two watchers subscribe with the same parameters
    let a = Arc::new(Recorder::default());
    let b = Arc::new(Recorder::default());
    let ha = distributor.watch("", true, false, &a).unwrap();
    let hb = distributor.watch("", true, false, &b).unwrap();

    // THEN: both see the same snapshot
    assert_eq!(
        a.materials.lock()[0].root_certificate(),
        b.materials.lock()[0].root_certificate()
    );
    assert!(a.materials.lock()[0].root_certificate().is_some());

    // WHEN: everyone leaves and one comes back
    distributor.unwatch(ha);
    distributor.unwatch(hb);
    let hc = distributor.watch("", true, false, &a).unwrap();

    // THEN: the provider saw true, false, true
    assert_eq!(
        *statuses.lock(),
        vec![
            (String::new(), true),
            (String::new(), false),
            (String::new(), true),
        ]
    );
    assert!(a.errors.lock().is_empty());
    distributor.unwatch(hc);
}

/// Invalid static material surfaces as an error, never as material
#[test]
fn test_static_invalid_root_reports_error() {
    let provider = StaticCertificateProvider::new(Some(Bytes::from_static(b"not pem")), None);
    assert!(provider.validate_credentials().unwrap_err().to_string().contains("PEM"));

    let watcher = Arc::new(Recorder::default());
    let _handle = provider.distributor().watch("root", true, false, &watcher).unwrap();

    assert!(watcher.materials.lock().is_empty());
    assert!(watcher.errors.lock()[0].root_error.is_some());
}
