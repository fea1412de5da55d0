//! Built-in `stdout_logger`: one JSON line per audit record.
//!
//! ```text
//! {"grpc_audit_log":{"timestamp":"2026-10-19T12:00:00.123Z","rpc_method":"/pkg.Svc/Call",...}}
//! ```

use std::any::Any;
use std::io::{self, Write};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::json;

use super::{AuditContext, AuditLogger, AuditLoggerConfig, AuditLoggerFactory};
use crate::{Error, Result};

/// Registry name of the built-in stdout logger.
pub const STDOUT_LOGGER_NAME: &str = "stdout_logger";

#[derive(Debug)]
struct StdoutConfig;

impl AuditLoggerConfig for StdoutConfig {
    fn name(&self) -> &str {
        STDOUT_LOGGER_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory for [`StdoutAuditLogger`].  Accepts only an empty JSON object.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutAuditLoggerFactory;

impl AuditLoggerFactory for StdoutAuditLoggerFactory {
    fn name(&self) -> &str {
        STDOUT_LOGGER_NAME
    }

    fn parse_config(&self, config: &serde_json::Value) -> Result<Box<dyn AuditLoggerConfig>> {
        match config.as_object() {
            Some(object) if object.is_empty() => Ok(Box::new(StdoutConfig)),
            _ => Err(Error::InvalidArgument(
                "stdout_logger does not take any config".to_string(),
            )),
        }
    }

    fn create_audit_logger(&self, _config: Box<dyn AuditLoggerConfig>) -> Arc<dyn AuditLogger> {
        Arc::new(StdoutAuditLogger::new())
    }
}

/// Writes each record as a JSON line to stdout (or any writer).
pub struct StdoutAuditLogger {
    out: Mutex<Box<dyn Write + Send>>,
}

impl Default for StdoutAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutAuditLogger {
    /// Logger writing to the process's stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }

    /// Logger writing to `out`.
    pub fn with_writer(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }
}

impl AuditLogger for StdoutAuditLogger {
    fn name(&self) -> &str {
        STDOUT_LOGGER_NAME
    }

    fn log(&self, context: &AuditContext) -> Result<()> {
        let record = json!({
            "grpc_audit_log": {
                "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                "rpc_method": context.rpc_method,
                "principal": context.principal,
                "policy_name": context.policy_name,
                "matched_rule": context.matched_rule,
                "authorized": context.authorized,
            }
        });
        let line = serde_json::to_string(&record)?;

        let mut out = self.out.lock();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}
