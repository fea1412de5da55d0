//! Configuration management
//!
//! ```yaml
//! logging:
//!   level: info
//!   format: json
//! certificates:
//!   - name: server
//!     provider:
//!       file_watcher:
//!         root_cert_path: /etc/guard/ca.pem
//!         identity_key_path: /etc/guard/server.key
//!         identity_cert_path: /etc/guard/server.pem
//!         refresh_interval_secs: 600
//! authz:
//!   policy_file: /etc/guard/authz.json
//! ```
//!
//! Every field can be overridden with `RPC_GUARD_`-prefixed environment
//! variables, `__` separating levels (`RPC_GUARD_LOGGING__LEVEL=debug`).

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audit::AuditLoggerRegistry;
use crate::authz::{AuthorizationEngine, translate_policy, translate_value};
use crate::tls::file_watcher::{
    DEFAULT_REFRESH_INTERVAL, FileWatcherCertificateProvider, FileWatcherOptions,
};
use crate::tls::{CertificateProvider, PemKeyCertPair, StaticCertificateProvider};
use crate::{Error, Result};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "RPC_GUARD_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Named certificate providers
    pub certificates: Vec<CertificateConfig>,
    /// Authorization policy
    pub authz: AuthzConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,
    /// `text` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// One certificate name and the provider serving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateConfig {
    /// Certificate name consumers watch
    #[serde(default)]
    pub name: String,
    /// Where the material comes from
    pub provider: ProviderConfig,
}

/// Certificate provider selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Inline PEM material
    Static {
        /// PEM root bundle
        #[serde(default)]
        root_cert: Option<String>,
        /// PEM identity private key
        #[serde(default)]
        identity_key: Option<String>,
        /// PEM identity certificate chain
        #[serde(default)]
        identity_cert: Option<String>,
    },
    /// PEM files polled on an interval
    FileWatcher {
        /// PEM root bundle path
        #[serde(default)]
        root_cert_path: Option<PathBuf>,
        /// PEM identity private key path
        #[serde(default)]
        identity_key_path: Option<PathBuf>,
        /// PEM identity certificate chain path
        #[serde(default)]
        identity_cert_path: Option<PathBuf>,
        /// Poll interval in seconds (minimum 1)
        #[serde(default = "default_refresh_interval_secs")]
        refresh_interval_secs: u64,
    },
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}

/// Authorization configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// SDK policy file; `.yaml`/`.yml` is read as YAML, anything else as JSON
    pub policy_file: Option<PathBuf>,
    /// Inline SDK policy document
    pub policy: Option<serde_json::Value>,
}

impl GuardConfig {
    /// Load configuration from an optional YAML file plus environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Extract and validate from a prepared figment.
    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for cert in &self.certificates {
            if !names.insert(cert.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate certificate name '{}'",
                    cert.name
                )));
            }
            cert.provider.validate(&cert.name)?;
        }
        if self.authz.policy_file.is_some() && self.authz.policy.is_some() {
            return Err(Error::Config(
                "authz.policy_file and authz.policy are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Start one provider per configured certificate name.
    ///
    /// File-watching providers spawn their refresh task, so this must run
    /// inside a tokio runtime when any are configured.
    pub fn build_providers(&self) -> Result<HashMap<String, Arc<dyn CertificateProvider>>> {
        self.certificates
            .iter()
            .map(|cert| Ok((cert.name.clone(), cert.provider.build()?)))
            .collect()
    }

    /// Build the authorization engine, if a policy is configured.
    pub fn build_authz_engine(
        &self,
        registry: &AuditLoggerRegistry,
    ) -> Result<Option<AuthorizationEngine>> {
        let chain = match (&self.authz.policy_file, &self.authz.policy) {
            (Some(path), _) => {
                let text = fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("Cannot read '{}': {e}", path.display()))
                })?;
                if is_yaml(path) {
                    let value: serde_json::Value = serde_yaml::from_str(&text).map_err(|e| {
                        Error::Config(format!("Invalid YAML in '{}': {e}", path.display()))
                    })?;
                    translate_value(&value, registry)?
                } else {
                    translate_policy(&text, registry)?
                }
            }
            (None, Some(inline)) => translate_value(inline, registry)?,
            (None, None) => return Ok(None),
        };
        Ok(Some(AuthorizationEngine::new(chain)))
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

impl ProviderConfig {
    fn validate(&self, name: &str) -> Result<()> {
        match self {
            Self::Static {
                identity_key,
                identity_cert,
                ..
            } => {
                if identity_key.is_some() != identity_cert.is_some() {
                    return Err(Error::Config(format!(
                        "certificate '{name}': identity_key and identity_cert must be set together"
                    )));
                }
            }
            Self::FileWatcher {
                root_cert_path,
                identity_key_path,
                identity_cert_path,
                ..
            } => {
                if identity_key_path.is_some() != identity_cert_path.is_some() {
                    return Err(Error::Config(format!(
                        "certificate '{name}': identity_key_path and identity_cert_path must be set together"
                    )));
                }
                if root_cert_path.is_none() && identity_key_path.is_none() {
                    return Err(Error::Config(format!(
                        "certificate '{name}': file_watcher needs at least one path"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Effective refresh interval; `None` for static providers.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self {
            Self::Static { .. } => None,
            Self::FileWatcher {
                refresh_interval_secs,
                ..
            } => {
                if *refresh_interval_secs < 1 {
                    warn!(
                        refresh_interval_secs,
                        "refresh_interval_secs below 1, using 1"
                    );
                }
                Some(Duration::from_secs((*refresh_interval_secs).max(1)))
            }
        }
    }

    fn build(&self) -> Result<Arc<dyn CertificateProvider>> {
        match self {
            Self::Static {
                root_cert,
                identity_key,
                identity_cert,
            } => {
                let root = root_cert.clone().map(Bytes::from);
                let identity = match (identity_key, identity_cert) {
                    (Some(key), Some(cert)) => {
                        Some(vec![PemKeyCertPair::new(key.clone(), cert.clone())])
                    }
                    _ => None,
                };
                Ok(Arc::new(StaticCertificateProvider::new(root, identity)))
            }
            Self::FileWatcher {
                root_cert_path,
                identity_key_path,
                identity_cert_path,
                ..
            } => {
                let options = FileWatcherOptions {
                    root_cert_path: root_cert_path.clone(),
                    identity_key_path: identity_key_path.clone(),
                    identity_cert_path: identity_cert_path.clone(),
                    refresh_interval: self.refresh_interval().unwrap_or(DEFAULT_REFRESH_INTERVAL),
                };
                Ok(Arc::new(FileWatcherCertificateProvider::start(options)?))
            }
        }
    }
}
