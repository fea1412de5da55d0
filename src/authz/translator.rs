//! Translate an SDK authorization policy (JSON) into a policy chain.
//!
//! ```json
//! {
//!   "name": "authz",
//!   "deny_rules": [
//!     { "name": "no_admin", "request": { "paths": ["/admin.*"] } }
//!   ],
//!   "allow_rules": [
//!     {
//!       "name": "billing",
//!       "source": { "principals": ["spiffe://prod/billing"] },
//!       "request": {
//!         "paths": ["/billing.*"],
//!         "headers": [ { "key": "x-env", "values": ["prod", "canary*"] } ]
//!       }
//!     }
//!   ],
//!   "audit_logging_options": {
//!     "audit_condition": "ON_DENY",
//!     "audit_loggers": [ { "name": "stdout_logger", "config": {}, "is_optional": false } ]
//!   }
//! }
//! ```
//!
//! The result is `[deny policy (when deny_rules is present), allow policy]`.
//! Each rule is named `<policy name>_<rule name>`.
//!
//! # Patterns
//!
//! | Pattern | Matcher |
//! |---------|---------|
//! | `"*"` | prefix `""` (everything) |
//! | `"abc*"` | prefix `abc` |
//! | `"*abc"` | suffix `abc` |
//! | `"abc"` | exact |

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::matcher::{HeaderMatcher, StringMatcher};
use super::node::{MatchNode, Rule};
use super::policy::{Action, AuditCondition, AuthorizationEngine, Policy};
use crate::audit::{AuditLogger, AuditLoggerRegistry};
use crate::{Error, Result};

type Object = Map<String, Value>;

/// Parse `policy` and build the chain, resolving loggers in `registry`.
///
/// # Errors
///
/// Returns `Error::InvalidArgument` describing the first problem, prefixed
/// with its location (`allow_rules 0: "name" is not present`).
pub fn translate_policy(policy: &str, registry: &AuditLoggerRegistry) -> Result<Vec<Policy>> {
    let value: Value = serde_json::from_str(policy)
        .map_err(|e| Error::InvalidArgument(format!("Failed to parse authorization policy: {e}")))?;
    translate_value(&value, registry)
}

/// Same as [`translate_policy`] for an already parsed document.
pub fn translate_value(value: &Value, registry: &AuditLoggerRegistry) -> Result<Vec<Policy>> {
    let root = value
        .as_object()
        .ok_or_else(|| invalid("policy is not an object"))?;
    let name = required_str(root, "name")?;

    let (condition, loggers) = match root.get("audit_logging_options") {
        Some(options) => parse_audit_options(options, registry)
            .map_err(|e| nest("audit_logging_options", &e))?,
        None => (AuditCondition::None, Vec::new()),
    };

    let mut chain = Vec::with_capacity(2);
    if let Some(deny_rules) = root.get("deny_rules") {
        let rules = parse_rules(deny_rules, "deny_rules", name)?;
        let deny_condition = match condition {
            AuditCondition::OnDeny | AuditCondition::OnDenyAndAllow => AuditCondition::OnDeny,
            AuditCondition::None | AuditCondition::OnAllow => AuditCondition::None,
        };
        chain.push(build_policy(name, Action::Deny, rules, deny_condition, &loggers));
    }

    let allow_rules = root
        .get("allow_rules")
        .ok_or_else(|| invalid("\"allow_rules\" is not present"))?;
    let rules = parse_rules(allow_rules, "allow_rules", name)?;
    chain.push(build_policy(name, Action::Allow, rules, condition, &loggers));

    debug!(policy = name, policies = chain.len(), "Translated authorization policy");
    Ok(chain)
}

impl AuthorizationEngine {
    /// Engine for an SDK authorization policy document.
    pub fn from_sdk_policy(policy: &str, registry: &AuditLoggerRegistry) -> Result<Self> {
        translate_policy(policy, registry).map(Self::new)
    }
}

fn build_policy(
    name: &str,
    action: Action,
    rules: Vec<(String, Rule)>,
    condition: AuditCondition,
    loggers: &[Arc<dyn AuditLogger>],
) -> Policy {
    let mut policy = Policy::new(name, action).with_audit_condition(condition);
    for (rule_name, rule) in rules {
        policy = policy.with_rule(rule_name, rule);
    }
    for logger in loggers {
        policy = policy.with_logger(Arc::clone(logger));
    }
    policy
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules
// ─────────────────────────────────────────────────────────────────────────────

fn parse_rules(value: &Value, field: &str, policy_name: &str) -> Result<Vec<(String, Rule)>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(format!("\"{field}\" is not an array")))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            parse_rule(item, policy_name).map_err(|e| nest(&format!("{field} {i}"), &e))
        })
        .collect()
}

fn parse_rule(value: &Value, policy_name: &str) -> Result<(String, Rule)> {
    let rule = value.as_object().ok_or_else(|| invalid("is not an object"))?;
    let name = required_str(rule, "name")?;

    let principal = match rule.get("source") {
        Some(source) => parse_source(source).map_err(|e| nest("source", &e))?,
        None => MatchNode::Any,
    };
    let permission = match rule.get("request") {
        Some(request) => parse_request(request).map_err(|e| nest("request", &e))?,
        None => MatchNode::Any,
    };

    Ok((format!("{policy_name}_{name}"), Rule::new(permission, principal)))
}

fn parse_source(value: &Value) -> Result<MatchNode> {
    let source = value.as_object().ok_or_else(|| invalid("is not an object"))?;
    let Some(principals) = source.get("principals") else {
        return Ok(MatchNode::Any);
    };
    let patterns = string_array(principals, "principals")?;
    Ok(any_of(
        patterns
            .into_iter()
            .map(|p| MatchNode::AuthenticatedPrincipal(Some(pattern_matcher(p))))
            .collect(),
    ))
}

fn parse_request(value: &Value) -> Result<MatchNode> {
    let request = value.as_object().ok_or_else(|| invalid("is not an object"))?;
    let mut conditions = Vec::new();

    if let Some(paths) = request.get("paths") {
        let patterns = string_array(paths, "paths")?;
        if !patterns.is_empty() {
            conditions.push(MatchNode::Or(
                patterns
                    .into_iter()
                    .map(|p| MatchNode::UrlPath(pattern_matcher(p)))
                    .collect(),
            ));
        }
    }

    if let Some(headers) = request.get("headers") {
        let headers = headers
            .as_array()
            .ok_or_else(|| invalid("\"headers\" is not an array"))?;
        for (i, header) in headers.iter().enumerate() {
            conditions.push(parse_header(header).map_err(|e| nest(&format!("headers {i}"), &e))?);
        }
    }

    Ok(match conditions.len() {
        0 => MatchNode::Any,
        1 => conditions.remove(0),
        _ => MatchNode::And(conditions),
    })
}

fn parse_header(value: &Value) -> Result<MatchNode> {
    let header = value.as_object().ok_or_else(|| invalid("is not an object"))?;
    let key = required_str(header, "key")?.to_ascii_lowercase();
    if key.starts_with(':') || key.starts_with("grpc-") || key == "host" {
        return Err(invalid(format!("Unsupported \"key\" {key}")));
    }
    let values = header
        .get("values")
        .ok_or_else(|| invalid("\"values\" is not present"))?;
    let values = string_array(values, "values")?;
    if values.is_empty() {
        return Err(invalid("\"values\" list is empty"));
    }
    Ok(MatchNode::Or(
        values
            .into_iter()
            .map(|v| MatchNode::Header(HeaderMatcher::value(key.clone(), pattern_matcher(v))))
            .collect(),
    ))
}

/// `"*"` → prefix `""`, `"x*"` → prefix, `"*x"` → suffix, else exact.
fn pattern_matcher(pattern: &str) -> StringMatcher {
    if pattern == "*" {
        StringMatcher::prefix("")
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        StringMatcher::prefix(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        StringMatcher::suffix(suffix)
    } else {
        StringMatcher::exact(pattern)
    }
}

fn any_of(mut nodes: Vec<MatchNode>) -> MatchNode {
    match nodes.len() {
        0 => MatchNode::Any,
        1 => nodes.remove(0),
        _ => MatchNode::Or(nodes),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Audit options
// ─────────────────────────────────────────────────────────────────────────────

fn parse_audit_options(
    value: &Value,
    registry: &AuditLoggerRegistry,
) -> Result<(AuditCondition, Vec<Arc<dyn AuditLogger>>)> {
    let options = value.as_object().ok_or_else(|| invalid("is not an object"))?;

    let condition = match options.get("audit_condition") {
        None => AuditCondition::None,
        Some(Value::String(s)) => match s.as_str() {
            "NONE" => AuditCondition::None,
            "ON_DENY" => AuditCondition::OnDeny,
            "ON_ALLOW" => AuditCondition::OnAllow,
            "ON_DENY_AND_ALLOW" => AuditCondition::OnDenyAndAllow,
            other => return Err(invalid(format!("Unsupported \"audit_condition\" value {other}"))),
        },
        Some(_) => return Err(invalid("\"audit_condition\" is not a string")),
    };

    let mut loggers = Vec::new();
    if let Some(entries) = options.get("audit_loggers") {
        let entries = entries
            .as_array()
            .ok_or_else(|| invalid("\"audit_loggers\" is not an array"))?;
        for (i, entry) in entries.iter().enumerate() {
            if let Some(logger) =
                parse_logger(entry, registry).map_err(|e| nest(&format!("audit_loggers {i}"), &e))?
            {
                loggers.push(logger);
            }
        }
    }

    Ok((condition, loggers))
}

/// `Ok(None)` for an unknown logger marked optional.
fn parse_logger(value: &Value, registry: &AuditLoggerRegistry) -> Result<Option<Arc<dyn AuditLogger>>> {
    let entry = value.as_object().ok_or_else(|| invalid("is not an object"))?;
    let name = required_str(entry, "name")?;
    let is_optional = match entry.get("is_optional") {
        None => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(invalid("\"is_optional\" is not a boolean")),
    };

    if !registry.factory_exists(name) {
        if is_optional {
            warn!(logger = name, "Skipping unsupported optional audit logger");
            return Ok(None);
        }
        return Err(invalid(format!("\"audit_logger\" {name} is not supported")));
    }

    let empty = Value::Object(Map::new());
    let config = entry.get("config").unwrap_or(&empty);
    let parsed = registry.parse_config(name, config)?;
    Ok(Some(registry.create_audit_logger(parsed)))
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON helpers
// ─────────────────────────────────────────────────────────────────────────────

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidArgument(message.into())
}

/// Prefix an error message with its location.
fn nest(location: &str, error: &Error) -> Error {
    invalid(format!("{location}: {error}"))
}

fn required_str<'a>(object: &'a Object, field: &str) -> Result<&'a str> {
    match object.get(field) {
        None => Err(invalid(format!("\"{field}\" is not present"))),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(invalid(format!("\"{field}\" is not a string"))),
    }
}

fn string_array<'a>(value: &'a Value, field: &str) -> Result<Vec<&'a str>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(format!("\"{field}\" is not an array")))?;
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            item.as_str()
                .ok_or_else(|| invalid(format!("{field} {i}: is not a string")))
        })
        .collect()
}
