//! Policies, the policy chain and the authorization engine.
//!
//! # Evaluation order
//!
//! Policies are evaluated in chain order; inside a policy, rules are tried
//! in insertion order and the first match names the policy's rule.
//!
//! 1. A matching **Deny** policy ends the chain: the call is denied.
//! 2. A matching **Allow** policy records the first allowing rule and
//!    evaluation continues, so a later Deny still wins.
//! 3. **Log** policies never affect the verdict.
//! 4. Chain exhausted: allowed iff some Allow policy matched (fail-closed).
//!
//! Afterwards every evaluated policy whose audit condition accepts the final
//! verdict sends one [`AuditContext`] to each of its loggers.  Logger errors
//! and panics are contained.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::context::CallContext;
use super::node::Rule;
use crate::audit::{AuditContext, AuditLogger};
use crate::{Error, Result};

/// What a matching policy does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Grant the call.
    Allow,
    /// Reject the call.
    Deny,
    /// Observe only.
    Log,
}

/// Which final verdicts a policy audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditCondition {
    /// Never.
    #[default]
    None,
    /// Denied calls.
    OnDeny,
    /// Allowed calls.
    OnAllow,
    /// Every call.
    OnDenyAndAllow,
}

impl AuditCondition {
    /// Whether a call with this verdict is audited.
    #[must_use]
    pub fn should_audit(self, authorized: bool) -> bool {
        match self {
            Self::None => false,
            Self::OnDeny => !authorized,
            Self::OnAllow => authorized,
            Self::OnDenyAndAllow => true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Named set of rules sharing one action and audit configuration.
#[derive(Clone)]
pub struct Policy {
    name: String,
    action: Action,
    rules: Vec<(String, Rule)>,
    audit_condition: AuditCondition,
    loggers: Vec<Arc<dyn AuditLogger>>,
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("action", &self.action)
            .field("rules", &self.rules.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field("audit_condition", &self.audit_condition)
            .field("loggers", &self.loggers.iter().map(|l| l.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Policy {
    /// Empty policy; with no rules it never matches.
    pub fn new(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            rules: Vec::new(),
            audit_condition: AuditCondition::None,
            loggers: Vec::new(),
        }
    }

    /// Add a rule.  Reusing a name replaces that rule in place.
    #[must_use]
    pub fn with_rule(mut self, name: impl Into<String>, rule: Rule) -> Self {
        let name = name.into();
        match self.rules.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = rule,
            None => self.rules.push((name, rule)),
        }
        self
    }

    /// Set the audit condition.
    #[must_use]
    pub fn with_audit_condition(mut self, condition: AuditCondition) -> Self {
        self.audit_condition = condition;
        self
    }

    /// Append an audit logger.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn AuditLogger>) -> Self {
        self.loggers.push(logger);
        self
    }

    /// Policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Policy action.
    #[must_use]
    pub fn action(&self) -> Action {
        self.action
    }

    /// Rules in evaluation order.
    #[must_use]
    pub fn rules(&self) -> &[(String, Rule)] {
        &self.rules
    }

    /// Audit condition.
    #[must_use]
    pub fn audit_condition(&self) -> AuditCondition {
        self.audit_condition
    }

    /// Name of the first rule matching `ctx`.
    #[must_use]
    pub fn first_match(&self, ctx: &CallContext) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, rule)| rule.matches(ctx))
            .map(|(name, _)| name.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decision
// ─────────────────────────────────────────────────────────────────────────────

/// Verdict for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Granted by `matched_rule` of `policy_name`.
    Allowed {
        /// Allowing policy.
        policy_name: String,
        /// Allowing rule.
        matched_rule: String,
    },
    /// Rejected, by a Deny rule or because nothing allowed the call.
    Denied {
        /// Denying policy, `None` when the chain was exhausted.
        policy_name: Option<String>,
        /// Denying rule, `None` when the chain was exhausted.
        matched_rule: Option<String>,
    },
}

impl Decision {
    /// `true` for [`Decision::Allowed`].
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    /// Matched rule, if any policy decided the call.
    #[must_use]
    pub fn matched_rule(&self) -> Option<&str> {
        match self {
            Self::Allowed { matched_rule, .. } => Some(matched_rule),
            Self::Denied { matched_rule, .. } => matched_rule.as_deref(),
        }
    }

    /// `Denied` becomes the fixed permission-denied error.
    pub fn into_result(self) -> Result<Self> {
        if self.is_allowed() {
            Ok(self)
        } else {
            Err(Error::unauthorized_rpc())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered policy chain evaluated per call.
///
/// Immutable after construction; share it behind an `Arc` across calls.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationEngine {
    policies: Vec<Policy>,
}

impl AuthorizationEngine {
    /// Engine over `policies`, in chain order.
    #[must_use]
    pub fn new(policies: Vec<Policy>) -> Self {
        Self { policies }
    }

    /// Policies in chain order.
    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Decide `ctx` and emit audit records.
    pub fn evaluate(&self, ctx: &CallContext) -> Decision {
        let mut evaluated: Vec<(&Policy, Option<&str>)> = Vec::with_capacity(self.policies.len());
        let mut allowed: Option<(&str, &str)> = None;
        let mut denied: Option<(&str, &str)> = None;

        for policy in &self.policies {
            let matched = policy.first_match(ctx);
            evaluated.push((policy, matched));
            match (policy.action, matched) {
                (Action::Deny, Some(rule)) => {
                    denied = Some((policy.name(), rule));
                    break;
                }
                (Action::Allow, Some(rule)) if allowed.is_none() => {
                    allowed = Some((policy.name(), rule));
                }
                _ => {}
            }
        }

        let decision = match (denied, allowed) {
            (Some((policy, rule)), _) => Decision::Denied {
                policy_name: Some(policy.to_string()),
                matched_rule: Some(rule.to_string()),
            },
            (None, Some((policy, rule))) => Decision::Allowed {
                policy_name: policy.to_string(),
                matched_rule: rule.to_string(),
            },
            (None, None) => Decision::Denied {
                policy_name: None,
                matched_rule: None,
            },
        };

        debug!(
            path = %ctx.path(),
            allowed = decision.is_allowed(),
            rule = decision.matched_rule().unwrap_or(""),
            "Authorization decision"
        );

        let authorized = decision.is_allowed();
        for (policy, matched) in evaluated {
            if policy.loggers.is_empty() || !policy.audit_condition.should_audit(authorized) {
                continue;
            }
            let record = AuditContext {
                rpc_method: ctx.path().to_string(),
                principal: ctx.audit_principal().to_string(),
                policy_name: policy.name.clone(),
                matched_rule: matched.unwrap_or_default().to_string(),
                authorized,
            };
            for logger in &policy.loggers {
                emit(logger.as_ref(), &record);
            }
        }

        decision
    }

    /// Decide `ctx`; a denial becomes `Error::PermissionDenied`.
    pub fn authorize(&self, ctx: &CallContext) -> Result<Decision> {
        self.evaluate(ctx).into_result()
    }
}

/// Run one logger, containing errors and panics.
fn emit(logger: &dyn AuditLogger, record: &AuditContext) {
    match catch_unwind(AssertUnwindSafe(|| logger.log(record))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(logger = logger.name(), policy = %record.policy_name, error = %e, "Audit logger failed"),
        Err(_) => error!(logger = logger.name(), policy = %record.policy_name, "Audit logger panicked"),
    }
}
