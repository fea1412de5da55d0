//! Leaf matchers used by policy trees: strings, headers and CIDR blocks.
//!
//! | Kind | Semantics |
//! |------|-----------|
//! | `Exact` | whole value equal |
//! | `Prefix` | value starts with pattern (`""` matches everything) |
//! | `Suffix` | value ends with pattern |
//! | `Contains` | pattern occurs anywhere |
//! | `Regex` | full-match, implicitly anchored |

use std::net::IpAddr;
use std::str::FromStr;

use regex::Regex;

use crate::{Error, Result};

// ─────────────────────────────────────────────────────────────────────────────
// String matcher
// ─────────────────────────────────────────────────────────────────────────────

/// Pattern part of a [`StringMatcher`].
#[derive(Debug, Clone)]
pub enum StringPattern {
    /// Byte-equal.
    Exact(String),
    /// Starts with.
    Prefix(String),
    /// Ends with.
    Suffix(String),
    /// Occurs anywhere.
    Contains(String),
    /// Anchored full match.
    Regex(Regex),
}

/// String predicate with optional ASCII case folding.
///
/// Case folding does not apply to regular expressions.
#[derive(Debug, Clone)]
pub struct StringMatcher {
    pattern: StringPattern,
    ignore_case: bool,
}

impl StringMatcher {
    /// Case-sensitive exact match.
    pub fn exact(value: impl Into<String>) -> Self {
        Self::plain(StringPattern::Exact(value.into()))
    }

    /// Case-sensitive prefix match.
    pub fn prefix(value: impl Into<String>) -> Self {
        Self::plain(StringPattern::Prefix(value.into()))
    }

    /// Case-sensitive suffix match.
    pub fn suffix(value: impl Into<String>) -> Self {
        Self::plain(StringPattern::Suffix(value.into()))
    }

    /// Case-sensitive substring match.
    pub fn contains(value: impl Into<String>) -> Self {
        Self::plain(StringPattern::Contains(value.into()))
    }

    /// Regular expression that must match the whole value.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` if the expression does not compile.
    pub fn regex(pattern: &str) -> Result<Self> {
        let compiled = Regex::new(&format!("^(?:{pattern})$"))
            .map_err(|e| Error::InvalidArgument(format!("Invalid regex '{pattern}': {e}")))?;
        Ok(Self::plain(StringPattern::Regex(compiled)))
    }

    /// Same pattern, compared ignoring ASCII case.
    #[must_use]
    pub fn ignore_case(mut self, ignore_case: bool) -> Self {
        self.ignore_case = ignore_case;
        self
    }

    fn plain(pattern: StringPattern) -> Self {
        Self {
            pattern,
            ignore_case: false,
        }
    }

    /// The pattern.
    #[must_use]
    pub fn pattern(&self) -> &StringPattern {
        &self.pattern
    }

    /// Test `value` against the pattern.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        if self.ignore_case {
            return self.matches_folded(value);
        }
        match &self.pattern {
            StringPattern::Exact(p) => value == p,
            StringPattern::Prefix(p) => value.starts_with(p.as_str()),
            StringPattern::Suffix(p) => value.ends_with(p.as_str()),
            StringPattern::Contains(p) => value.contains(p.as_str()),
            StringPattern::Regex(re) => re.is_match(value),
        }
    }

    fn matches_folded(&self, value: &str) -> bool {
        let value = value.as_bytes();
        match &self.pattern {
            StringPattern::Exact(p) => value.eq_ignore_ascii_case(p.as_bytes()),
            StringPattern::Prefix(p) => value
                .get(..p.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(p.as_bytes())),
            StringPattern::Suffix(p) => value
                .len()
                .checked_sub(p.len())
                .and_then(|start| value.get(start..))
                .is_some_and(|tail| tail.eq_ignore_ascii_case(p.as_bytes())),
            StringPattern::Contains(p) => {
                let needle = p.as_bytes();
                needle.is_empty()
                    || value
                        .windows(needle.len())
                        .any(|window| window.eq_ignore_ascii_case(needle))
            }
            StringPattern::Regex(re) => std::str::from_utf8(value).is_ok_and(|v| re.is_match(v)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Header matcher
// ─────────────────────────────────────────────────────────────────────────────

/// What a [`HeaderMatcher`] checks.
#[derive(Debug, Clone)]
pub enum HeaderMatch {
    /// Compare the value with a string matcher.
    Value(StringMatcher),
    /// Value parses as an integer in `[start, end)`.
    Range {
        /// Inclusive lower bound.
        start: i64,
        /// Exclusive upper bound.
        end: i64,
    },
    /// Header is present (`true`) or absent (`false`).
    Present(bool),
}

/// Predicate over one request header.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: String,
    kind: HeaderMatch,
    invert: bool,
}

impl HeaderMatcher {
    /// Match header `name` (case-insensitive name) with `kind`.
    pub fn new(name: impl Into<String>, kind: HeaderMatch) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            kind,
            invert: false,
        }
    }

    /// Shorthand for a string comparison.
    pub fn value(name: impl Into<String>, matcher: StringMatcher) -> Self {
        Self::new(name, HeaderMatch::Value(matcher))
    }

    /// Negate the result when the header is present.
    #[must_use]
    pub fn invert(mut self, invert: bool) -> Self {
        self.invert = invert;
        self
    }

    /// Lower-cased header name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Test a header value; `None` means the header is absent.
    ///
    /// Apart from `Present`, an absent header never matches, inverted or not.
    #[must_use]
    pub fn matches(&self, value: Option<&str>) -> bool {
        let matched = match (&self.kind, value) {
            (HeaderMatch::Present(expected), value) => value.is_some() == *expected,
            (_, None) => return false,
            (HeaderMatch::Value(matcher), Some(value)) => matcher.matches(value),
            (HeaderMatch::Range { start, end }, Some(value)) => value
                .trim()
                .parse::<i64>()
                .is_ok_and(|n| *start <= n && n < *end),
        };
        matched != self.invert
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CIDR
// ─────────────────────────────────────────────────────────────────────────────

/// An address block such as `10.0.0.0/8` or `2001:db8::/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrRange {
    address: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Block of `prefix_len` leading bits; longer prefixes are clamped to
    /// the family width.
    #[must_use]
    pub fn new(address: IpAddr, prefix_len: u8) -> Self {
        let width = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self {
            address,
            prefix_len: prefix_len.min(width),
        }
    }

    /// Whether `ip` lies inside the block.  Families never mix.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.address, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

impl FromStr for CidrRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("Invalid CIDR range '{s}'"));
        let (addr, len) = match s.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (s, None),
        };
        let address: IpAddr = addr.parse().map_err(|_| invalid())?;
        let width = if address.is_ipv4() { 32 } else { 128 };
        let prefix_len = match len {
            Some(len) => len.parse::<u8>().map_err(|_| invalid())?,
            None => width,
        };
        if prefix_len > width {
            return Err(invalid());
        }
        Ok(Self::new(address, prefix_len))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
