//! Name → factory registry for audit loggers.
//!
//! A registry is an ordinary value that can be threaded through
//! initialization; [`AuditLoggerRegistry::global`] provides the
//! process-wide default.  Factories are registered once at startup and
//! never removed individually.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::debug;

use super::stdout::StdoutAuditLoggerFactory;
use super::{AuditLogger, AuditLoggerConfig, AuditLoggerFactory};
use crate::{Error, Result};

/// Registered audit logger factories.
pub struct AuditLoggerRegistry {
    factories: Mutex<HashMap<String, Arc<dyn AuditLoggerFactory>>>,
}

impl Default for AuditLoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AuditLoggerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.factories.lock().keys().cloned().collect();
        names.sort();
        f.debug_struct("AuditLoggerRegistry")
            .field("factories", &names)
            .finish()
    }
}

impl AuditLoggerRegistry {
    /// Registry holding the built-in factories.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register_factory(Arc::new(StdoutAuditLoggerFactory));
        registry
    }

    /// Registry with no factories at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            factories: Mutex::new(HashMap::new()),
        }
    }

    /// Process-wide registry, created with the built-ins on first use.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<AuditLoggerRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Add a factory.
    ///
    /// # Panics
    ///
    /// Panics if a factory with the same name is already registered.
    pub fn register_factory(&self, factory: Arc<dyn AuditLoggerFactory>) {
        let name = factory.name().to_string();
        let mut factories = self.factories.lock();
        assert!(
            !factories.contains_key(&name),
            "audit logger factory {name} already registered"
        );
        debug!(logger = %name, "Registered audit logger factory");
        factories.insert(name, factory);
    }

    /// Whether a factory named `name` is registered.
    #[must_use]
    pub fn factory_exists(&self, name: &str) -> bool {
        self.factories.lock().contains_key(name)
    }

    /// Validate `config` with the factory named `name`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` for an unknown factory; otherwise whatever the
    /// factory reports.
    pub fn parse_config(
        &self,
        name: &str,
        config: &serde_json::Value,
    ) -> Result<Box<dyn AuditLoggerConfig>> {
        let factory = self.factory(name).ok_or_else(|| {
            Error::NotFound(format!("audit logger factory for {name} does not exist"))
        })?;
        factory.parse_config(config)
    }

    /// Build a logger from a config obtained from [`parse_config`](Self::parse_config).
    ///
    /// # Panics
    ///
    /// Panics if the config's factory is not registered.
    pub fn create_audit_logger(&self, config: Box<dyn AuditLoggerConfig>) -> Arc<dyn AuditLogger> {
        let factory = self.factory(config.name()).unwrap_or_else(|| {
            panic!(
                "audit logger factory {} missing from registry",
                config.name()
            )
        });
        factory.create_audit_logger(config)
    }

    /// Drop every registration, built-ins included.  For test harnesses.
    pub fn test_only_reset_registry(&self) {
        self.factories.lock().clear();
    }

    fn factory(&self, name: &str) -> Option<Arc<dyn AuditLoggerFactory>> {
        self.factories.lock().get(name).cloned()
    }
}
