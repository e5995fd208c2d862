use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

/// Host shape accepted by [`resolve_domain`]: optional scheme, optional
/// userinfo, optional leading `www.`, then the host up to the first
/// `: / ?` or end of string.
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:[^@/\s]+@)?(?:www\.)?([^:/?\s]+)")
        .unwrap()
});

/// Extract the source domain from a URL.
///
/// Returns `None` when the string does not look like a URL at all; an
/// unresolvable domain is not an error anywhere downstream, the document
/// just never matches the blacklist.
pub fn resolve_domain(url: &str) -> Option<String> {
    DOMAIN_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|host| !host.is_empty())
}

/// Sticky per-session blacklist flags, keyed by domain.
///
/// Entries are only ever added: observing a new domain seeds it as
/// not-blacklisted, and a user decision overwrites the flag but never
/// removes the entry. Choices therefore survive re-running the domain
/// statistics with a different result set.
#[derive(Debug, Clone, Default)]
pub struct DomainFilterSet {
    flags: BTreeMap<String, bool>,
}

impl DomainFilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a newly seen domain as not-blacklisted. Existing flags are left
    /// untouched.
    pub fn observe(&mut self, domain: &str) {
        self.flags.entry(domain.to_string()).or_insert(false);
    }

    /// Record a user decision for a domain.
    pub fn set(&mut self, domain: &str, blacklisted: bool) {
        self.flags.insert(domain.to_string(), blacklisted);
    }

    pub fn is_blacklisted(&self, domain: &str) -> bool {
        self.flags.get(domain).copied().unwrap_or(false)
    }

    /// The multiplicative score factor for a resolved domain: 0 when
    /// blacklisted, 1 otherwise. Documents with no resolvable domain are
    /// never filtered.
    pub fn factor(&self, domain: Option<&str>) -> f32 {
        match domain {
            Some(d) if self.is_blacklisted(d) => 0.0,
            _ => 1.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.flags.iter().map(|(k, &v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.flags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }
}
