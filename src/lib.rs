//! RPC Guard Library
//!
//! Security-policy enforcement core for RPC servers.
//!
//! # Features
//!
//! - **Certificate distribution**: named root/identity material fanned out to
//!   watchers, with static and file-polling providers
//! - **Peer verification**: synchronous, asynchronous (cancellable) and
//!   hostname verifiers on top of the TLS handshake
//! - **RBAC**: ordered allow/deny/log policy chains over boolean match trees,
//!   translated from the SDK JSON policy format
//! - **Audit logging**: pluggable audit logger factories with a built-in
//!   JSON-lines stdout logger
//!
//! # Quick start
//!
//! ```no_run
//! use rpc_guard::audit::AuditLoggerRegistry;
//! use rpc_guard::authz::{AuthorizationEngine, CallContext};
//!
//! # fn main() -> rpc_guard::Result<()> {
//! let engine = AuthorizationEngine::from_sdk_policy(
//!     r#"{"name":"authz","allow_rules":[{"name":"echo","request":{"paths":["/svc/Echo"]}}]}"#,
//!     AuditLoggerRegistry::global(),
//! )?;
//! engine.authorize(&CallContext::new("/svc/Echo"))?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod authz;
pub mod config;
pub mod error;
pub mod tls;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. Fails if a global subscriber
/// is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
