//! Boolean policy trees and rules.
//!
//! A [`MatchNode`] is a closed sum type evaluated recursively over a
//! [`CallContext`].  Trees own their children, so they are finite and
//! acyclic by construction.

use super::context::CallContext;
use super::matcher::{CidrRange, HeaderMatcher, StringMatcher};

/// One node of a permission or principal tree.
#[derive(Debug, Clone)]
pub enum MatchNode {
    /// Always true.
    Any,
    /// Negation.
    Not(Box<MatchNode>),
    /// All children true; an empty list is true.
    And(Vec<MatchNode>),
    /// Some child true; an empty list is false.
    Or(Vec<MatchNode>),
    /// Request header (including `:method` / `:path`).
    Header(HeaderMatcher),
    /// Request path.
    UrlPath(StringMatcher),
    /// Local address inside the block.
    DestinationIp(CidrRange),
    /// Local port equal.
    DestinationPort(u16),
    /// Caller address inside the block.
    SourceIp(CidrRange),
    /// Metadata selector.  Carries no selector, so it matches exactly
    /// when `invert` is set.
    Metadata {
        /// Negate the (always false) selector result.
        invert: bool,
    },
    /// Authenticated principal.  `None` matches any authenticated caller.
    AuthenticatedPrincipal(Option<StringMatcher>),
    /// Requested server name (SNI).
    RequestedServerName(StringMatcher),
}

impl MatchNode {
    /// `Not(node)`.
    #[must_use]
    pub fn not(node: MatchNode) -> Self {
        Self::Not(Box::new(node))
    }

    /// Evaluate against `ctx`.  Pure and short-circuiting.
    #[must_use]
    pub fn matches(&self, ctx: &CallContext) -> bool {
        match self {
            Self::Any => true,
            Self::Not(inner) => !inner.matches(ctx),
            Self::And(children) => children.iter().all(|child| child.matches(ctx)),
            Self::Or(children) => children.iter().any(|child| child.matches(ctx)),
            Self::Header(matcher) => matcher.matches(ctx.header(matcher.name()).as_deref()),
            Self::UrlPath(matcher) => matcher.matches(ctx.path()),
            Self::DestinationIp(range) => ctx.destination_ip().is_some_and(|ip| range.contains(ip)),
            Self::DestinationPort(port) => ctx.destination_port() == Some(*port),
            Self::SourceIp(range) => ctx.source_ip().is_some_and(|ip| range.contains(ip)),
            Self::Metadata { invert } => *invert,
            Self::AuthenticatedPrincipal(None) => !ctx.principals().is_empty(),
            Self::AuthenticatedPrincipal(Some(matcher)) => {
                ctx.principals().iter().any(|p| matcher.matches(p))
            }
            Self::RequestedServerName(matcher) => matcher.matches(ctx.requested_server_name()),
        }
    }
}

/// A permission tree and a principal tree; matches when both do.
#[derive(Debug, Clone)]
pub struct Rule {
    /// What is being accessed.
    pub permission: MatchNode,
    /// Who is accessing it.
    pub principal: MatchNode,
}

impl Rule {
    /// Pair a permission with a principal.
    #[must_use]
    pub fn new(permission: MatchNode, principal: MatchNode) -> Self {
        Self {
            permission,
            principal,
        }
    }

    /// `Rule{Any, Any}`.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::new(MatchNode::Any, MatchNode::Any)
    }

    /// Whether both trees match.
    #[must_use]
    pub fn matches(&self, ctx: &CallContext) -> bool {
        self.permission.matches(ctx) && self.principal.matches(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::matcher::HeaderMatch;

    fn post() -> CallContext {
        CallContext::new("/svc/Echo").with_method("POST")
    }

    fn method_is(m: &str) -> MatchNode {
        MatchNode::Header(HeaderMatcher::value(":method", StringMatcher::exact(m)))
    }

    #[test]
    fn combinators() {
        let ctx = post();
        let t = MatchNode::Any;
        let f = MatchNode::not(MatchNode::Any);

        assert!(!f.matches(&ctx));
        assert!(MatchNode::And(vec![t.clone(), t.clone()]).matches(&ctx));
        assert!(!MatchNode::And(vec![t.clone(), f.clone()]).matches(&ctx));
        assert!(MatchNode::Or(vec![f.clone(), t.clone()]).matches(&ctx));
        assert!(!MatchNode::Or(vec![f.clone(), f]).matches(&ctx));
        assert!(MatchNode::And(Vec::new()).matches(&ctx));
        assert!(!MatchNode::Or(Vec::new()).matches(&ctx));
    }

    #[test]
    fn header_and_path() {
        let ctx = post();
        assert!(method_is("POST").matches(&ctx));
        assert!(!method_is("PUT").matches(&ctx));
        assert!(MatchNode::UrlPath(StringMatcher::prefix("/svc/")).matches(&ctx));
        assert!(
            MatchNode::Header(HeaderMatcher::new("x-absent", HeaderMatch::Present(false)))
                .matches(&ctx)
        );
    }

    #[test]
    fn network_attributes() {
        let ctx = post()
            .with_destination("10.0.0.5:8443".parse().unwrap())
            .with_source("192.168.7.9".parse().unwrap());
        assert!(MatchNode::DestinationIp("10.0.0.0/24".parse().unwrap()).matches(&ctx));
        assert!(MatchNode::DestinationPort(8443).matches(&ctx));
        assert!(!MatchNode::DestinationPort(443).matches(&ctx));
        assert!(MatchNode::SourceIp("192.168.0.0/16".parse().unwrap()).matches(&ctx));
        assert!(!MatchNode::SourceIp("10.0.0.0/8".parse().unwrap()).matches(&ctx));
        // No source recorded at all.
        assert!(!MatchNode::SourceIp("0.0.0.0/0".parse().unwrap()).matches(&post()));
    }

    #[test]
    fn metadata_has_no_selector() {
        let ctx = post().with_header("x-anything", "1");
        assert!(!MatchNode::Metadata { invert: false }.matches(&ctx));
        assert!(MatchNode::Metadata { invert: true }.matches(&ctx));
    }

    #[test]
    fn principals_and_sni() {
        let anonymous = post();
        let authed = post()
            .with_principal("spiffe://prod/billing")
            .with_requested_server_name("api.test");

        assert!(!MatchNode::AuthenticatedPrincipal(None).matches(&anonymous));
        assert!(MatchNode::AuthenticatedPrincipal(None).matches(&authed));
        assert!(
            MatchNode::AuthenticatedPrincipal(Some(StringMatcher::suffix("/billing")))
                .matches(&authed)
        );
        assert!(MatchNode::RequestedServerName(StringMatcher::exact("api.test")).matches(&authed));
    }

    #[test]
    fn rule_needs_both_trees() {
        let ctx = post();
        assert!(Rule::allow_all().matches(&ctx));
        assert!(!Rule::new(method_is("POST"), MatchNode::AuthenticatedPrincipal(None)).matches(&ctx));
    }
}
