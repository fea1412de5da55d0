//! Audit logging of authorization decisions.
//!
//! Loggers are created through named factories held in an
//! [`AuditLoggerRegistry`].  A policy keeps the loggers built from its
//! configuration and the authorization engine hands each of them one
//! [`AuditContext`] per audited decision.
//!
//! # Record
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `rpc_method` | full method path of the call |
//! | `principal` | first authenticated principal, empty when none |
//! | `policy_name` | policy being audited |
//! | `matched_rule` | rule of that policy that matched, empty when none |
//! | `authorized` | final verdict of the whole chain |

pub mod registry;
pub mod stdout;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::Result;

pub use registry::AuditLoggerRegistry;
pub use stdout::{STDOUT_LOGGER_NAME, StdoutAuditLogger, StdoutAuditLoggerFactory};

/// One audited authorization decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditContext {
    /// Full method path, e.g. `/package.Service/Method`.
    pub rpc_method: String,
    /// Authenticated principal of the caller.
    pub principal: String,
    /// Policy that produced this record.
    pub policy_name: String,
    /// Rule of that policy that matched.
    pub matched_rule: String,
    /// Final verdict for the call.
    pub authorized: bool,
}

/// Sink for audit records.
///
/// `log` runs on the call path and must return quickly.  Errors and panics
/// are contained by the caller and never fail the RPC.
pub trait AuditLogger: Send + Sync {
    /// Factory name this logger was built by.
    fn name(&self) -> &str;

    /// Record one decision.
    fn log(&self, context: &AuditContext) -> Result<()>;
}

/// Parsed, factory-specific logger configuration.
pub trait AuditLoggerConfig: fmt::Debug + Send + Sync {
    /// Name of the factory that produced this config.
    fn name(&self) -> &str;

    /// Downcast hook for the owning factory.
    fn as_any(&self) -> &dyn Any;
}

/// Builds loggers of one kind.
pub trait AuditLoggerFactory: Send + Sync {
    /// Name policies refer to this factory by.
    fn name(&self) -> &str;

    /// Validate raw JSON configuration.
    fn parse_config(&self, config: &serde_json::Value) -> Result<Box<dyn AuditLoggerConfig>>;

    /// Build a logger from a config returned by [`parse_config`](Self::parse_config).
    fn create_audit_logger(&self, config: Box<dyn AuditLoggerConfig>) -> Arc<dyn AuditLogger>;
}
