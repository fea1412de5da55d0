//! Peer identity extraction.
//!
//! Parses an X.509 certificate presented by a TLS peer and pulls out the
//! fields the verifiers and the authorization engine look at: Common Name,
//! SAN DNS names and SAN URIs.

use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::prelude::FromDer;

use super::material::parse_certificates;
use crate::{Error, Result};

/// Identity fields of a peer's leaf certificate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Subject Common Name (CN).
    pub common_name: Option<String>,

    /// Subject Alternative Name: DNS entries.
    pub san_dns_names: Vec<String>,

    /// Subject Alternative Name: URI entries (SPIFFE IDs and the like).
    pub san_uris: Vec<String>,
}

impl PeerIdentity {
    /// Parse a DER-encoded certificate.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the certificate cannot be parsed.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| Error::InvalidArgument(format!("Failed to parse peer certificate: {e}")))?;

        let (san_uris, san_dns_names) = extract_sans(&cert);
        Ok(Self {
            common_name: extract_cn(&cert),
            san_dns_names,
            san_uris,
        })
    }

    /// Parse the leaf (first) certificate of a PEM chain.
    pub fn from_pem(pem: &[u8]) -> Result<Self> {
        let certs = parse_certificates(pem)?;
        let leaf = certs
            .first()
            .ok_or_else(|| Error::InvalidArgument("no certificates found".to_string()))?;
        Self::from_der(leaf.as_ref())
    }

    /// Names the authorization engine treats as authenticated principals.
    ///
    /// URI SANs when present, otherwise DNS SANs, otherwise the CN.
    #[must_use]
    pub fn principals(&self) -> Vec<String> {
        if !self.san_uris.is_empty() {
            return self.san_uris.clone();
        }
        if !self.san_dns_names.is_empty() {
            return self.san_dns_names.clone();
        }
        self.common_name.iter().cloned().collect()
    }
}

fn extract_cn(cert: &X509Certificate<'_>) -> Option<String> {
    cert.subject()
        .iter_common_name()
        .next()
        .and_then(|attr| attr.as_str().ok())
        .map(str::to_owned)
}

/// SAN URI and SAN DNS entries, in certificate order.
fn extract_sans(cert: &X509Certificate<'_>) -> (Vec<String>, Vec<String>) {
    let mut uris = Vec::new();
    let mut dns_names = Vec::new();

    if let Ok(Some(san_ext)) = cert.subject_alternative_name() {
        for name in &san_ext.value.general_names {
            match name {
                GeneralName::URI(uri) => uris.push((*uri).to_owned()),
                GeneralName::DNSName(dns) => dns_names.push((*dns).to_owned()),
                _ => {}
            }
        }
    }

    (uris, dns_names)
}
