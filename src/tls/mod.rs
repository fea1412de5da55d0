//! TLS key material distribution and peer verification.
//!
//! # Architecture
//!
//! ```text
//! StaticCertificateProvider ──┐
//!                             ├─► CertificateDistributor ──► CertificateWatcher
//! FileWatcherCertificateProvider┘      (per cert name)         (ServerTlsConfig, ...)
//!
//! TLS handshake ─► VerifierRequest ─► CertificateVerifier ─► VerifyOutcome
//!                                                      └─► PeerIdentity ─► authz
//! ```
//!
//! # Modules
//!
//! - [`material`]: `CertificateMaterial`, PEM parsing and validation
//! - [`distributor`]: watch/publish hub with lazy provider start
//! - [`provider`]: `CertificateProvider` trait and the static provider
//! - [`file_watcher`]: polling provider with content diffing
//! - [`identity`]: X.509 field extraction (`PeerIdentity`)
//! - [`verifier`]: sync, async and hostname verifiers
//! - [`server_config`]: live `rustls::ServerConfig`

pub mod distributor;
pub mod file_watcher;
pub mod identity;
pub mod material;
pub mod provider;
pub mod server_config;
pub mod verifier;

pub use distributor::{
    CertificateDistributor, CertificateError, CertificateWatcher, WatchHandle, WatchStatus,
    WatchStatusCallback,
};
pub use file_watcher::{
    FileWatcherCertificateProvider, FileWatcherOptions, RefreshOutcome, RefreshReport,
};
pub use identity::PeerIdentity;
pub use material::{CertificateMaterial, PemKeyCertPair, private_key_and_certificate_match};
pub use provider::{CertificateProvider, StaticCertificateProvider};
pub use server_config::{ServerTlsConfig, build_server_config};
pub use verifier::{
    AsyncCertificateVerifier, CertificateVerifier, HostnameVerifier, PendingVerification,
    SyncCertificateVerifier, Verification, VerifierRequest, VerifyCompleter, VerifyOutcome,
    verify_peer,
};
