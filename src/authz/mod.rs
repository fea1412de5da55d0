//! Per-call RBAC authorization.
//!
//! # Architecture
//!
//! ```text
//! CallContext ─► AuthorizationEngine ─► [Policy, Policy, ...]
//!                                          └─ Rule { permission: MatchNode, principal: MatchNode }
//!                     │
//!                     ├─► Decision (Allowed / Denied)
//!                     └─► AuditLogger::log(AuditContext)
//! ```
//!
//! # Modules
//!
//! - [`matcher`]: string, header and CIDR leaf matchers
//! - [`context`]: `CallContext`
//! - [`node`]: `MatchNode` trees and `Rule`
//! - [`policy`]: `Policy`, `Decision`, `AuthorizationEngine`
//! - [`translator`]: SDK JSON policy → policy chain

pub mod context;
pub mod matcher;
pub mod node;
pub mod policy;
pub mod translator;

pub use context::CallContext;
pub use matcher::{CidrRange, HeaderMatch, HeaderMatcher, StringMatcher, StringPattern};
pub use node::{MatchNode, Rule};
pub use policy::{Action, AuditCondition, AuthorizationEngine, Decision, Policy};
pub use translator::{translate_policy, translate_value};
