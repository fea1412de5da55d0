//! Per-call attributes the authorization engine evaluates.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};

use crate::tls::PeerIdentity;

/// Read-only snapshot of one call, built by the dispatch layer.
///
/// Header names are stored lower-cased.  Pseudo-headers `:method` and
/// `:path` are served from [`method`](Self::method) and
/// [`path`](Self::path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    method: String,
    path: String,
    destination_ip: Option<IpAddr>,
    destination_port: Option<u16>,
    source_ip: Option<IpAddr>,
    principals: Vec<String>,
    requested_server_name: String,
    metadata: BTreeMap<String, Vec<String>>,
}

impl CallContext {
    /// Context for a `POST` to `path`, with no peer information yet.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.into(),
            destination_ip: None,
            destination_port: None,
            source_ip: None,
            principals: Vec::new(),
            requested_server_name: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Override the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Local address the call arrived on.
    #[must_use]
    pub fn with_destination(mut self, addr: SocketAddr) -> Self {
        self.destination_ip = Some(addr.ip());
        self.destination_port = Some(addr.port());
        self
    }

    /// Remote address of the caller.
    #[must_use]
    pub fn with_source(mut self, ip: IpAddr) -> Self {
        self.source_ip = Some(ip);
        self
    }

    /// Add one authenticated principal.
    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principals.push(principal.into());
        self
    }

    /// Add the principals of a verified peer certificate.
    #[must_use]
    pub fn with_peer_identity(mut self, identity: &PeerIdentity) -> Self {
        self.principals.extend(identity.principals());
        self
    }

    /// SNI the client asked for.
    #[must_use]
    pub fn with_requested_server_name(mut self, name: impl Into<String>) -> Self {
        self.requested_server_name = name.into();
        self
    }

    /// Append a header value.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.metadata
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
        self
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Full method path, e.g. `/package.Service/Method`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Local IP, if known.
    #[must_use]
    pub fn destination_ip(&self) -> Option<IpAddr> {
        self.destination_ip
    }

    /// Local port, if known.
    #[must_use]
    pub fn destination_port(&self) -> Option<u16> {
        self.destination_port
    }

    /// Remote IP, if known.
    #[must_use]
    pub fn source_ip(&self) -> Option<IpAddr> {
        self.source_ip
    }

    /// Authenticated principals; empty for unauthenticated callers.
    #[must_use]
    pub fn principals(&self) -> &[String] {
        &self.principals
    }

    /// Principal recorded in audit entries: the first one, or `""`.
    #[must_use]
    pub fn audit_principal(&self) -> &str {
        self.principals.first().map_or("", String::as_str)
    }

    /// SNI, empty when none was sent.
    #[must_use]
    pub fn requested_server_name(&self) -> &str {
        &self.requested_server_name
    }

    /// Raw header map.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, Vec<String>> {
        &self.metadata
    }

    /// Header value as policies see it.
    ///
    /// Multiple values are joined with `,`.  Headers prefixed `grpc-` are
    /// reserved for the transport and always look absent.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<Cow<'_, str>> {
        match name {
            ":method" => return Some(Cow::Borrowed(&self.method)),
            ":path" => return Some(Cow::Borrowed(&self.path)),
            _ if name.starts_with("grpc-") => return None,
            _ => {}
        }
        match self.metadata.get(name)?.as_slice() {
            [] => None,
            [single] => Some(Cow::Borrowed(single)),
            values => Some(Cow::Owned(values.join(","))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_headers_come_from_call() {
        let ctx = CallContext::new("/svc/Echo").with_method("PUT");
        assert_eq!(ctx.header(":method").as_deref(), Some("PUT"));
        assert_eq!(ctx.header(":path").as_deref(), Some("/svc/Echo"));
    }

    #[test]
    fn repeated_headers_are_joined() {
        let ctx = CallContext::new("/x")
            .with_header("X-Role", "admin")
            .with_header("x-role", "dev");
        assert_eq!(ctx.header("x-role").as_deref(), Some("admin,dev"));
        assert_eq!(ctx.header("x-missing"), None);
    }

    #[test]
    fn grpc_prefixed_headers_are_hidden() {
        let ctx = CallContext::new("/x").with_header("grpc-timeout", "1S");
        assert_eq!(ctx.header("grpc-timeout"), None);
    }

    #[test]
    fn audit_principal_is_first_or_empty() {
        let anonymous = CallContext::new("/x");
        assert_eq!(anonymous.audit_principal(), "");

        let identity = PeerIdentity {
            common_name: Some("cn".to_string()),
            san_dns_names: Vec::new(),
            san_uris: vec!["spiffe://a".to_string(), "spiffe://b".to_string()],
        };
        let ctx = CallContext::new("/x").with_peer_identity(&identity);
        assert_eq!(ctx.audit_principal(), "spiffe://a");
        assert_eq!(ctx.principals().len(), 2);
    }

    #[test]
    fn destination_splits_ip_and_port() {
        let ctx = CallContext::new("/x").with_destination("10.0.0.1:443".parse().unwrap());
        assert_eq!(ctx.destination_port(), Some(443));
        assert_eq!(ctx.destination_ip(), Some("10.0.0.1".parse().unwrap()));
    }
}
