//! Certificate distributor, the hub between providers and TLS consumers.
//!
//! Providers push [`CertificateMaterial`] facets (root bundle, identity
//! pairs) or errors in under a certificate name; consumers register
//! [`CertificateWatcher`]s for one or both facets of a name and are told
//! about every change.  The provider learns which names are in demand
//! through a single watch-status callback.
//!
//! ## Locking
//!
//! One mutex guards the whole table.  Every mutation computes the
//! notifications it owes while holding the lock, releases it, and only then
//! invokes watchers and the status callback.  Callbacks may therefore call
//! back into the distributor without deadlocking.
//!
//! Because delivery happens outside the lock, two updates can race to the
//! same watcher.  Every material change bumps a per-name generation and each
//! registration remembers the newest generation it was handed; anything
//! older is dropped at delivery time.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::material::{CertificateMaterial, PemKeyCertPair};
use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Watcher-facing types
// ─────────────────────────────────────────────────────────────────────────────

/// Per-facet error delivered to a watcher.
///
/// Only facets the watcher asked for are filled in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CertificateError {
    /// Why the root bundle is unavailable.
    pub root_error: Option<String>,
    /// Why the identity pairs are unavailable.
    pub identity_error: Option<String>,
}

impl CertificateError {
    fn is_empty(&self) -> bool {
        self.root_error.is_none() && self.identity_error.is_none()
    }
}

/// Which facets of a certificate name currently have at least one watcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStatus {
    /// Some watcher wants the root bundle.
    pub root_being_watched: bool,
    /// Some watcher wants the identity pairs.
    pub identity_being_watched: bool,
}

impl WatchStatus {
    /// `true` when neither facet is watched.
    #[must_use]
    pub fn is_idle(self) -> bool {
        !self.root_being_watched && !self.identity_being_watched
    }
}

/// Consumer of certificate updates.
///
/// The distributor holds watchers weakly: dropping the last `Arc` silences
/// the watcher even before [`CertificateDistributor::unwatch`] runs.
pub trait CertificateWatcher: Send + Sync {
    /// New material for the facets this watcher registered for.
    fn on_certificates_changed(&self, material: Arc<CertificateMaterial>);

    /// A watched facet has no usable material.
    fn on_error(&self, error: &CertificateError);
}

/// Called with `(distributor, cert_name, status)` whenever a facet of
/// `cert_name` gains its first watcher or loses its last one.
pub type WatchStatusCallback = Arc<dyn Fn(&CertificateDistributor, &str, WatchStatus) + Send + Sync>;

/// Registration returned by [`CertificateDistributor::watch`].
///
/// Hand it back to [`CertificateDistributor::unwatch`] to stop watching.
#[derive(Debug)]
#[must_use = "dropping the handle without unwatching leaks the registration"]
pub struct WatchHandle {
    id: u64,
    cert_name: String,
}

impl WatchHandle {
    /// Certificate name this handle watches.
    #[must_use]
    pub fn cert_name(&self) -> &str {
        &self.cert_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal state
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct CertificateSet {
    root: Option<Bytes>,
    identity: Option<Vec<PemKeyCertPair>>,
    root_error: Option<String>,
    identity_error: Option<String>,
    root_watchers: BTreeSet<u64>,
    identity_watchers: BTreeSet<u64>,
    generation: u64,
}

impl CertificateSet {
    fn status(&self) -> WatchStatus {
        WatchStatus {
            root_being_watched: !self.root_watchers.is_empty(),
            identity_being_watched: !self.identity_watchers.is_empty(),
        }
    }

    fn is_unused(&self) -> bool {
        self.root.is_none()
            && self.identity.is_none()
            && self.root_error.is_none()
            && self.identity_error.is_none()
            && self.root_watchers.is_empty()
            && self.identity_watchers.is_empty()
    }

    /// Material restricted to the requested facets, if any of them is present.
    fn snapshot(&self, wants_root: bool, wants_identity: bool) -> Option<Arc<CertificateMaterial>> {
        let root = if wants_root { self.root.clone() } else { None };
        let identity = if wants_identity {
            self.identity.clone()
        } else {
            None
        };
        if root.is_none() && identity.is_none() {
            return None;
        }
        CertificateMaterial::new(root, identity).ok().map(Arc::new)
    }

    fn error_for(&self, wants_root: bool, wants_identity: bool) -> CertificateError {
        CertificateError {
            root_error: if wants_root {
                self.root_error.clone()
            } else {
                None
            },
            identity_error: if wants_identity {
                self.identity_error.clone()
            } else {
                None
            },
        }
    }
}

struct Registration {
    cert_name: String,
    wants_root: bool,
    wants_identity: bool,
    watcher: Weak<dyn CertificateWatcher>,
    delivered: Arc<AtomicU64>,
}

impl Registration {
    fn target(&self) -> Target<'_> {
        Target {
            watcher: &self.watcher,
            delivered: &self.delivered,
        }
    }
}

/// Where a delivery goes and the generation high-water mark it must beat.
#[derive(Clone, Copy)]
struct Target<'a> {
    watcher: &'a Weak<dyn CertificateWatcher>,
    delivered: &'a Arc<AtomicU64>,
}

#[derive(Default)]
struct State {
    certs: HashMap<String, CertificateSet>,
    watchers: HashMap<u64, Registration>,
}

enum Delivery {
    Material(Arc<CertificateMaterial>),
    Error(CertificateError),
}

struct Pending {
    watcher: Arc<dyn CertificateWatcher>,
    delivered: Arc<AtomicU64>,
    generation: u64,
    delivery: Delivery,
}

/// Notifications collected under the lock, fired after it is released.
#[derive(Default)]
struct Outbox {
    deliveries: Vec<Pending>,
}

impl Outbox {
    fn push(&mut self, target: Target<'_>, generation: u64, delivery: Delivery) {
        if let Some(watcher) = target.watcher.upgrade() {
            self.deliveries.push(Pending {
                watcher,
                delivered: Arc::clone(target.delivered),
                generation,
                delivery,
            });
        }
    }

    /// Material older than what the watcher already holds is dropped, and so
    /// is an error raised before that material existed.
    fn flush(self) {
        for pending in self.deliveries {
            match pending.delivery {
                Delivery::Material(material) => {
                    let previous = pending.delivered.fetch_max(pending.generation, Ordering::AcqRel);
                    if previous >= pending.generation {
                        debug!(generation = pending.generation, previous, "Dropping stale certificate update");
                        continue;
                    }
                    pending.watcher.on_certificates_changed(material);
                }
                Delivery::Error(error) => {
                    if pending.delivered.load(Ordering::Acquire) > pending.generation {
                        continue;
                    }
                    pending.watcher.on_error(&error);
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Distributor
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe registry of certificate material keyed by certificate name.
pub struct CertificateDistributor {
    state: Mutex<State>,
    status_callback: Mutex<Option<WatchStatusCallback>>,
    next_watcher_id: AtomicU64,
}

impl Default for CertificateDistributor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CertificateDistributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CertificateDistributor")
            .field("cert_names", &state.certs.keys().collect::<Vec<_>>())
            .field("watchers", &state.watchers.len())
            .finish_non_exhaustive()
    }
}

impl CertificateDistributor {
    /// Create an empty distributor.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            status_callback: Mutex::new(None),
            next_watcher_id: AtomicU64::new(1),
        }
    }

    /// Install (or clear) the provider's watch-status callback.
    ///
    /// Only transitions that happen after installation are reported.
    pub fn set_watch_status_callback(&self, callback: Option<WatchStatusCallback>) {
        *self.status_callback.lock() = callback;
    }

    /// Register `watcher` for the chosen facets of `cert_name`.
    ///
    /// Whatever material or error is already stored for those facets is
    /// delivered before this returns.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` when neither facet is requested.
    pub fn watch<W>(
        &self,
        cert_name: &str,
        wants_root: bool,
        wants_identity: bool,
        watcher: &Arc<W>,
    ) -> Result<WatchHandle>
    where
        W: CertificateWatcher + 'static,
    {
        if !wants_root && !wants_identity {
            return Err(Error::InvalidArgument(
                "a watcher must request the root certificate, the identity certificate, or both"
                    .to_string(),
            ));
        }

        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<W> = Arc::downgrade(watcher);
        let weak: Weak<dyn CertificateWatcher> = weak;
        let delivered = Arc::new(AtomicU64::new(0));
        let target = Target {
            watcher: &weak,
            delivered: &delivered,
        };
        let mut outbox = Outbox::default();

        let status_change = {
            let mut state = self.state.lock();
            let set = state.certs.entry(cert_name.to_string()).or_default();

            let starts_root = wants_root && set.root_watchers.is_empty();
            let starts_identity = wants_identity && set.identity_watchers.is_empty();
            if wants_root {
                set.root_watchers.insert(id);
            }
            if wants_identity {
                set.identity_watchers.insert(id);
            }

            if let Some(material) = set.snapshot(wants_root, wants_identity) {
                outbox.push(target, set.generation, Delivery::Material(material));
            }
            let error = set.error_for(wants_root, wants_identity);
            if !error.is_empty() {
                outbox.push(target, set.generation, Delivery::Error(error));
            }

            let status = set.status();
            state.watchers.insert(
                id,
                Registration {
                    cert_name: cert_name.to_string(),
                    wants_root,
                    wants_identity,
                    watcher: Weak::clone(&weak),
                    delivered: Arc::clone(&delivered),
                },
            );
            (starts_root || starts_identity).then_some(status)
        };

        debug!(cert_name, watcher_id = id, wants_root, wants_identity, "Watcher registered");
        outbox.flush();
        if let Some(status) = status_change {
            self.notify_status(cert_name, status);
        }

        Ok(WatchHandle {
            id,
            cert_name: cert_name.to_string(),
        })
    }

    /// Remove a registration.
    ///
    /// When this was the last watcher of a facet, the status callback hears
    /// that the facet is no longer watched.
    pub fn unwatch(&self, handle: WatchHandle) {
        let status_change = {
            let mut state = self.state.lock();
            let Some(registration) = state.watchers.remove(&handle.id) else {
                return;
            };
            let Some(set) = state.certs.get_mut(&registration.cert_name) else {
                return;
            };

            let stops_root = set.root_watchers.remove(&handle.id) && set.root_watchers.is_empty();
            let stops_identity =
                set.identity_watchers.remove(&handle.id) && set.identity_watchers.is_empty();
            let status = set.status();
            if set.is_unused() {
                state.certs.remove(&registration.cert_name);
            }
            (stops_root || stops_identity).then_some(status)
        };

        debug!(cert_name = %handle.cert_name, watcher_id = handle.id, "Watcher removed");
        if let Some(status) = status_change {
            self.notify_status(&handle.cert_name, status);
        }
    }

    /// Publish new material for one or both facets of `cert_name`.
    ///
    /// Each supplied facet replaces the stored one and clears its error.
    /// Watchers of the updated facets receive a fresh snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` when `identity_pairs` is present but
    /// empty.
    pub fn set_key_materials(
        &self,
        cert_name: &str,
        root_certificate: Option<Bytes>,
        identity_pairs: Option<Vec<PemKeyCertPair>>,
    ) -> Result<()> {
        if identity_pairs.as_ref().is_some_and(Vec::is_empty) {
            return Err(Error::InvalidArgument(
                "identity update must carry at least one key/certificate pair".to_string(),
            ));
        }
        let updates_root = root_certificate.is_some();
        let updates_identity = identity_pairs.is_some();
        if !updates_root && !updates_identity {
            return Ok(());
        }

        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            let State { certs, watchers } = &mut *state;
            let set = certs.entry(cert_name.to_string()).or_default();

            if let Some(root) = root_certificate {
                set.root = Some(root);
                set.root_error = None;
            }
            if let Some(identity) = identity_pairs {
                set.identity = Some(identity);
                set.identity_error = None;
            }
            set.generation += 1;

            for id in affected_watchers(set, updates_root, updates_identity) {
                let Some(registration) = watchers.get(&id) else {
                    continue;
                };
                if let Some(material) =
                    set.snapshot(registration.wants_root, registration.wants_identity)
                {
                    outbox.push(registration.target(), set.generation, Delivery::Material(material));
                }
            }
        }

        debug!(cert_name, updates_root, updates_identity, "Key material updated");
        outbox.flush();
        Ok(())
    }

    /// Report that a facet of `cert_name` could not be produced.
    ///
    /// A facet that already has material keeps it: the error is logged and
    /// dropped, so consumers continue on stale but valid credentials.
    /// Repeating the stored error is a no-op.
    pub fn set_error_for_cert(
        &self,
        cert_name: &str,
        root_error: Option<String>,
        identity_error: Option<String>,
    ) {
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            let State { certs, watchers } = &mut *state;
            let set = certs.entry(cert_name.to_string()).or_default();

            let mut root_changed = false;
            if let Some(error) = root_error {
                if set.root.is_some() {
                    warn!(cert_name, error = %error, "Keeping existing root certificate after provider error");
                } else if set.root_error.as_deref() != Some(error.as_str()) {
                    set.root_error = Some(error);
                    root_changed = true;
                }
            }
            let mut identity_changed = false;
            if let Some(error) = identity_error {
                if set.identity.is_some() {
                    warn!(cert_name, error = %error, "Keeping existing identity certificate after provider error");
                } else if set.identity_error.as_deref() != Some(error.as_str()) {
                    set.identity_error = Some(error);
                    identity_changed = true;
                }
            }

            for id in affected_watchers(set, root_changed, identity_changed) {
                let Some(registration) = watchers.get(&id) else {
                    continue;
                };
                let error = CertificateError {
                    root_error: if registration.wants_root && root_changed {
                        set.root_error.clone()
                    } else {
                        None
                    },
                    identity_error: if registration.wants_identity && identity_changed {
                        set.identity_error.clone()
                    } else {
                        None
                    },
                };
                if !error.is_empty() {
                    outbox.push(registration.target(), set.generation, Delivery::Error(error));
                }
            }
        }
        outbox.flush();
    }

    /// Current material for `cert_name`, both facets, if any is stored.
    #[must_use]
    pub fn snapshot(&self, cert_name: &str) -> Option<Arc<CertificateMaterial>> {
        self.state
            .lock()
            .certs
            .get(cert_name)
            .and_then(|set| set.snapshot(true, true))
    }

    /// Which facets of `cert_name` currently have watchers.
    #[must_use]
    pub fn watch_status(&self, cert_name: &str) -> WatchStatus {
        self.state
            .lock()
            .certs
            .get(cert_name)
            .map(CertificateSet::status)
            .unwrap_or_default()
    }

    fn notify_status(&self, cert_name: &str, status: WatchStatus) {
        let callback = self.status_callback.lock().clone();
        if let Some(callback) = callback {
            callback(self, cert_name, status);
        }
    }
}

/// Ids of watchers subscribed to any of the flagged facets, each once.
fn affected_watchers(set: &CertificateSet, root: bool, identity: bool) -> BTreeSet<u64> {
    let mut ids = BTreeSet::new();
    if root {
        ids.extend(set.root_watchers.iter().copied());
    }
    if identity {
        ids.extend(set.identity_watchers.iter().copied());
    }
    ids
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

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

    fn pair(tag: &str) -> Vec<PemKeyCertPair> {
        vec![PemKeyCertPair::new(format!("key-{tag}"), format!("chain-{tag}"))]
    }

    #[test]
    fn watch_without_facets_is_rejected() {
        let distributor = CertificateDistributor::new();
        let recorder = Arc::new(Recorder::default());
        let result = distributor.watch("cert", false, false, &recorder);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn existing_material_is_delivered_on_watch() {
        // GIVEN: material published before anyone watches
        let distributor = CertificateDistributor::new();
        distributor
            .set_key_materials("cert", Some(Bytes::from_static(b"root")), Some(pair("a")))
            .unwrap();

        // WHEN: a root-only watcher registers
        let recorder = Arc::new(Recorder::default());
        let handle = distributor.watch("cert", true, false, &recorder).unwrap();

        // THEN: it gets the root facet and nothing else
        let materials = recorder.materials.lock();
        assert_eq!(materials.len(), 1);
        assert_eq!(materials[0].root_certificate().unwrap().as_ref(), b"root");
        assert!(materials[0].identity_pairs().is_none());
        drop(materials);
        distributor.unwatch(handle);
    }

    #[test]
    fn updates_reach_only_watchers_of_that_facet() {
        let distributor = CertificateDistributor::new();
        let root_watcher = Arc::new(Recorder::default());
        let identity_watcher = Arc::new(Recorder::default());
        let _r = distributor.watch("cert", true, false, &root_watcher).unwrap();
        let _i = distributor.watch("cert", false, true, &identity_watcher).unwrap();

        distributor.set_key_materials("cert", None, Some(pair("a"))).unwrap();

        assert!(root_watcher.materials.lock().is_empty());
        assert_eq!(identity_watcher.materials.lock().len(), 1);
    }

    #[test]
    fn status_callback_fires_on_first_and_last_watcher() {
        let distributor = CertificateDistributor::new();
        let seen: Arc<Mutex<Vec<(String, WatchStatus)>>> = Arc::default();
        let sink = Arc::clone(&seen);
        distributor.set_watch_status_callback(Some(Arc::new(
            move |_: &CertificateDistributor, name: &str, status: WatchStatus| {
                sink.lock().push((name.to_string(), status));
            },
        )));

        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        let ha = distributor.watch("cert", true, false, &a).unwrap();
        let hb = distributor.watch("cert", true, false, &b).unwrap();
        distributor.unwatch(ha);
        distributor.unwatch(hb);

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].1.root_being_watched);
        assert!(seen[1].1.is_idle());
    }

    #[test]
    fn callbacks_may_reenter_the_distributor() {
        // GIVEN: a provider-style callback that publishes from inside the notification
        let distributor = CertificateDistributor::new();
        distributor.set_watch_status_callback(Some(Arc::new(
            |dist: &CertificateDistributor, name: &str, status: WatchStatus| {
                if status.root_being_watched {
                    dist.set_key_materials(name, Some(Bytes::from_static(b"root")), None)
                        .unwrap();
                }
            },
        )));

        // WHEN: the first watcher arrives
        let recorder = Arc::new(Recorder::default());
        let _h = distributor.watch("cert", true, false, &recorder).unwrap();

        // THEN: the material published by the callback reaches it
        assert_eq!(recorder.materials.lock().len(), 1);
    }

    #[test]
    fn error_does_not_replace_existing_material() {
        let distributor = CertificateDistributor::new();
        distributor
            .set_key_materials("cert", Some(Bytes::from_static(b"root")), None)
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        let _h = distributor.watch("cert", true, false, &recorder).unwrap();

        distributor.set_error_for_cert("cert", Some("disk gone".to_string()), None);

        assert!(recorder.errors.lock().is_empty());
        assert!(distributor.snapshot("cert").is_some());
    }

    #[test]
    fn error_without_material_is_delivered_once() {
        let distributor = CertificateDistributor::new();
        let recorder = Arc::new(Recorder::default());
        let _h = distributor.watch("cert", false, true, &recorder).unwrap();

        distributor.set_error_for_cert("cert", None, Some("no key".to_string()));
        distributor.set_error_for_cert("cert", None, Some("no key".to_string()));

        let errors = recorder.errors.lock();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].identity_error.as_deref(), Some("no key"));
        assert!(errors[0].root_error.is_none());
    }

    #[test]
    fn dropped_watcher_is_skipped() {
        let distributor = CertificateDistributor::new();
        let recorder = Arc::new(Recorder::default());
        let handle = distributor.watch("cert", true, false, &recorder).unwrap();
        drop(recorder);

        distributor
            .set_key_materials("cert", Some(Bytes::from_static(b"root")), None)
            .unwrap();
        distributor.unwatch(handle);
    }

    /// Publishes `v3` the moment it sees `v2`.
    struct Republisher {
        distributor: Arc<CertificateDistributor>,
        seen: Mutex<Vec<Bytes>>,
    }

    impl CertificateWatcher for Republisher {
        fn on_certificates_changed(&self, material: Arc<CertificateMaterial>) {
            let root = material.root_certificate().cloned().unwrap_or_default();
            self.seen.lock().push(root.clone());
            if root.as_ref() == b"v2" {
                self.distributor
                    .set_key_materials("cert", Some(Bytes::from_static(b"v3")), None)
                    .unwrap();
            }
        }
        fn on_error(&self, _error: &CertificateError) {}
    }

    #[test]
    fn nested_publish_is_not_overtaken_by_the_older_update() {
        // GIVEN: watcher A republishes from inside its callback, B registered after A
        let distributor = Arc::new(CertificateDistributor::new());
        let first = Arc::new(Republisher {
            distributor: Arc::clone(&distributor),
            seen: Mutex::default(),
        });
        let second = Arc::new(Recorder::default());
        let _a = distributor.watch("cert", true, false, &first).unwrap();
        let _b = distributor.watch("cert", true, false, &second).unwrap();

        // WHEN: v2 is published and A answers with v3 before B has seen v2
        distributor
            .set_key_materials("cert", Some(Bytes::from_static(b"v2")), None)
            .unwrap();

        // THEN: B ends on the material the distributor holds, and never goes back to v2
        let stored = distributor.snapshot("cert").unwrap();
        assert_eq!(stored.root_certificate().unwrap().as_ref(), b"v3");
        let seen: Vec<Vec<u8>> = second
            .materials
            .lock()
            .iter()
            .map(|m| m.root_certificate().unwrap().to_vec())
            .collect();
        assert_eq!(seen, vec![b"v3".to_vec()]);
        assert_eq!(first.seen.lock().last().unwrap().as_ref(), b"v3");
    }

    #[test]
    fn error_raised_before_newer_material_is_dropped() {
        // GIVEN: an identity watcher holding a pending error delivery at generation 0
        let distributor = CertificateDistributor::new();
        let recorder = Arc::new(Recorder::default());
        let _h = distributor.watch("cert", false, true, &recorder).unwrap();
        let delivered = {
            let state = distributor.state.lock();
            let registration = state.watchers.values().next().unwrap();
            Arc::clone(&registration.delivered)
        };
        let weak: Weak<Recorder> = Arc::downgrade(&recorder);
        let weak: Weak<dyn CertificateWatcher> = weak;
        let mut outbox = Outbox::default();
        outbox.push(
            Target {
                watcher: &weak,
                delivered: &delivered,
            },
            0,
            Delivery::Error(CertificateError {
                root_error: None,
                identity_error: Some("no key".to_string()),
            }),
        );

        // WHEN: newer material lands before the outbox is flushed
        distributor.set_key_materials("cert", None, Some(pair("a"))).unwrap();
        outbox.flush();

        // THEN: the watcher keeps the material and never hears the stale error
        assert_eq!(recorder.materials.lock().len(), 1);
        assert!(recorder.errors.lock().is_empty());
    }

    #[test]
    fn empty_identity_update_is_rejected() {
        let distributor = CertificateDistributor::new();
        let result = distributor.set_key_materials("cert", None, Some(Vec::new()));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }
}
