//! Peer certificate verifiers run after the TLS handshake.
//!
//! Three flavours share the [`CertificateVerifier`] trait:
//!
//! - [`SyncCertificateVerifier`]: a closure that decides on the spot
//! - [`AsyncCertificateVerifier`]: a closure handed a [`VerifyCompleter`]
//!   that may finish later from any thread; cancellable
//! - [`HostnameVerifier`]: target name vs. peer CN / SAN DNS entries
//!
//! Every request yields exactly one [`VerifyOutcome`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::identity::PeerIdentity;
use crate::{Error, Result};

/// Rejection reason of the hostname verifier.
pub const HOSTNAME_MISMATCH_REASON: &str = "hostname verification check failed";
/// Rejection reason when a pending verification is cancelled.
pub const CANCELLED_REASON: &str = "verification cancelled";
/// Rejection reason when an async verifier drops its completer unused.
pub const ABANDONED_REASON: &str = "verifier finished without an outcome";

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

// ─────────────────────────────────────────────────────────────────────────────
// Request and outcome
// ─────────────────────────────────────────────────────────────────────────────

/// What the peer presented during one handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierRequest {
    id: u64,
    /// Name the client dialled (SNI / authority).
    pub target_name: String,
    /// Subject CN of the peer leaf certificate.
    pub peer_common_name: Option<String>,
    /// SAN DNS entries of the peer leaf certificate.
    pub peer_san_dns: Vec<String>,
    /// SAN URI entries of the peer leaf certificate.
    pub peer_san_uris: Vec<String>,
}

impl VerifierRequest {
    /// Build a request from an already extracted identity.
    pub fn new(target_name: impl Into<String>, identity: &PeerIdentity) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            target_name: target_name.into(),
            peer_common_name: identity.common_name.clone(),
            peer_san_dns: identity.san_dns_names.clone(),
            peer_san_uris: identity.san_uris.clone(),
        }
    }

    /// Build a request from the peer's DER leaf certificate.
    pub fn from_peer_certificate(target_name: impl Into<String>, der: &[u8]) -> Result<Self> {
        Ok(Self::new(target_name, &PeerIdentity::from_der(der)?))
    }

    /// Unique id; used to correlate [`CertificateVerifier::cancel`].
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Final verdict for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    /// Peer accepted.
    Authenticated,
    /// Peer rejected, with a reason suitable for the handshake error.
    Rejected(String),
}

impl VerifyOutcome {
    /// `Rejected` becomes `Error::Unauthenticated`.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Authenticated => Ok(()),
            Self::Rejected(reason) => Err(Error::Unauthenticated(reason)),
        }
    }
}

/// Either an immediate verdict or one still in flight.
#[derive(Debug)]
pub enum Verification {
    /// Decided synchronously.
    Ready(VerifyOutcome),
    /// Decided later; await [`PendingVerification::wait`].
    Pending(PendingVerification),
}

impl Verification {
    /// Resolve to the final outcome, waiting if necessary.
    pub async fn outcome(self) -> VerifyOutcome {
        match self {
            Self::Ready(outcome) => outcome,
            Self::Pending(pending) => pending.wait().await,
        }
    }
}

/// Handle on an asynchronous verification.
#[derive(Debug)]
pub struct PendingVerification {
    rx: oneshot::Receiver<VerifyOutcome>,
    cancelled: CancellationToken,
}

impl PendingVerification {
    /// Wait for the verifier's outcome or for cancellation, whichever is
    /// first.  A completion already delivered wins over a later cancel.
    pub async fn wait(self) -> VerifyOutcome {
        let Self { mut rx, cancelled } = self;
        tokio::select! {
            biased;
            result = &mut rx => result.unwrap_or_else(|_| {
                // A refused late completion drops the sender too.
                let reason = if cancelled.is_cancelled() {
                    CANCELLED_REASON
                } else {
                    ABANDONED_REASON
                };
                VerifyOutcome::Rejected(reason.to_string())
            }),
            () = cancelled.cancelled() => VerifyOutcome::Rejected(CANCELLED_REASON.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Verifier trait
// ─────────────────────────────────────────────────────────────────────────────

/// Pluggable post-handshake peer check.
pub trait CertificateVerifier: Send + Sync {
    /// Start verifying `request`.
    fn verify(&self, request: &VerifierRequest) -> Verification;

    /// Ask an in-flight verification to stop.
    ///
    /// Idempotent, and a no-op once the verification has finished.
    fn cancel(&self, _request: &VerifierRequest) {}
}

/// Run `verifier` against the peer's DER leaf certificate.
///
/// Returns the extracted identity on success.
///
/// # Errors
///
/// `Error::InvalidArgument` for an unparsable certificate,
/// `Error::Unauthenticated` when the verifier rejects the peer.
pub async fn verify_peer(
    verifier: &dyn CertificateVerifier,
    target_name: &str,
    der: &[u8],
) -> Result<PeerIdentity> {
    let identity = PeerIdentity::from_der(der)?;
    let request = VerifierRequest::new(target_name, &identity);
    verifier.verify(&request).outcome().await.into_result()?;
    Ok(identity)
}

// ─────────────────────────────────────────────────────────────────────────────
// Sync
// ─────────────────────────────────────────────────────────────────────────────

/// Verifier backed by a synchronous closure.
pub struct SyncCertificateVerifier<F> {
    check: F,
}

impl<F> SyncCertificateVerifier<F>
where
    F: Fn(&VerifierRequest) -> VerifyOutcome + Send + Sync,
{
    /// Wrap `check`.
    pub fn new(check: F) -> Self {
        Self { check }
    }
}

impl<F> CertificateVerifier for SyncCertificateVerifier<F>
where
    F: Fn(&VerifierRequest) -> VerifyOutcome + Send + Sync,
{
    fn verify(&self, request: &VerifierRequest) -> Verification {
        Verification::Ready((self.check)(request))
    }
}

impl<F> fmt::Debug for SyncCertificateVerifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCertificateVerifier").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Async
// ─────────────────────────────────────────────────────────────────────────────

type PendingTable = Arc<DashMap<u64, CancellationToken>>;

/// One-shot completion handle given to an async verifier closure.
///
/// Dropping it without calling [`complete`](Self::complete) rejects the
/// request.
pub struct VerifyCompleter {
    id: u64,
    tx: Option<oneshot::Sender<VerifyOutcome>>,
    cancelled: CancellationToken,
    pending: PendingTable,
}

impl VerifyCompleter {
    /// Deliver the outcome.  Returns `false` if the request was cancelled
    /// or its waiter has gone away.
    pub fn complete(mut self, outcome: VerifyOutcome) -> bool {
        self.pending.remove(&self.id);
        if self.cancelled.is_cancelled() {
            return false;
        }
        self.tx.take().is_some_and(|tx| tx.send(outcome).is_ok())
    }

    /// Whether the caller has cancelled this request.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// Resolves when the caller cancels this request.
    pub async fn cancelled(&self) {
        self.cancelled.cancelled().await;
    }
}

impl Drop for VerifyCompleter {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl fmt::Debug for VerifyCompleter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifyCompleter")
            .field("id", &self.id)
            .field("cancelled", &self.cancelled.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Verifier backed by a closure that completes out of band.
pub struct AsyncCertificateVerifier<F> {
    start: F,
    pending: PendingTable,
}

impl<F> AsyncCertificateVerifier<F>
where
    F: Fn(VerifierRequest, VerifyCompleter) + Send + Sync,
{
    /// Wrap `start`; it must eventually complete or drop the completer.
    pub fn new(start: F) -> Self {
        Self {
            start,
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Verifications started but not yet completed or cancelled.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

impl<F> CertificateVerifier for AsyncCertificateVerifier<F>
where
    F: Fn(VerifierRequest, VerifyCompleter) + Send + Sync,
{
    fn verify(&self, request: &VerifierRequest) -> Verification {
        let (tx, rx) = oneshot::channel();
        let cancelled = CancellationToken::new();
        self.pending.insert(request.id, cancelled.clone());

        let completer = VerifyCompleter {
            id: request.id,
            tx: Some(tx),
            cancelled: cancelled.clone(),
            pending: Arc::clone(&self.pending),
        };
        (self.start)(request.clone(), completer);

        Verification::Pending(PendingVerification { rx, cancelled })
    }

    fn cancel(&self, request: &VerifierRequest) {
        if let Some((_, token)) = self.pending.remove(&request.id) {
            debug!(request_id = request.id, "Cancelling pending verification");
            token.cancel();
        }
    }
}

impl<F> fmt::Debug for AsyncCertificateVerifier<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncCertificateVerifier")
            .field("in_flight", &self.pending.len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hostname
// ─────────────────────────────────────────────────────────────────────────────

/// Accepts the peer iff the target name matches its CN or a SAN DNS entry.
///
/// Matching is case-sensitive.  A pattern `*.example.com` matches exactly
/// one extra left-most label.  Trailing dots are ignored on both sides.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostnameVerifier;

impl CertificateVerifier for HostnameVerifier {
    fn verify(&self, request: &VerifierRequest) -> Verification {
        let target = request.target_name.as_str();
        let matched = request
            .peer_san_dns
            .iter()
            .map(String::as_str)
            .chain(request.peer_common_name.as_deref())
            .any(|pattern| hostname_matches(pattern, target));

        Verification::Ready(if matched {
            VerifyOutcome::Authenticated
        } else {
            VerifyOutcome::Rejected(HOSTNAME_MISMATCH_REASON.to_string())
        })
    }
}

/// Exact or single-label wildcard comparison.
fn hostname_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.strip_suffix('.').unwrap_or(pattern);
    let host = host.strip_suffix('.').unwrap_or(host);
    if pattern.is_empty() || host.is_empty() {
        return false;
    }

    let Some(suffix) = pattern.strip_prefix('*') else {
        return pattern == host;
    };
    // `*` alone or `*foo.com` are not wildcards.
    if !suffix.starts_with('.') || suffix.len() < 2 || suffix[1..].contains('*') {
        return false;
    }
    host.strip_suffix(suffix)
        .is_some_and(|label| !label.is_empty() && !label.contains('.'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
