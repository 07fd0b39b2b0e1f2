//! IP whitelist policy.
//!
//! Built once at startup from configuration; immutable thereafter.

use crate::error::{LimitError, LimitResult};
use std::collections::HashSet;
use std::net::IpAddr;

/// Set of client IPs that bypass rate limiting entirely.
///
/// Addresses are parsed at construction (v4 and v6), so membership tests on
/// the hot path are a single hash lookup on the parsed form.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    whitelist: HashSet<IpAddr>,
}

impl Policy {
    /// Build a policy from configured IP literals.
    ///
    /// Entries are trimmed and empty entries dropped; the first entry that
    /// does not parse as an IP address fails construction.
    pub fn new<I, S>(whitelisted_ips: I) -> LimitResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut whitelist = HashSet::new();
        for entry in whitelisted_ips {
            let trimmed = entry.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            let addr: IpAddr = trimmed.parse().map_err(|_| {
                LimitError::InvalidConfig(format!("invalid whitelisted IP '{trimmed}'"))
            })?;
            whitelist.insert(addr);
        }
        Ok(Self { whitelist })
    }

    /// Whether requests from `ip` bypass rate limiting.
    ///
    /// An unparseable address is never whitelisted.
    #[must_use]
    pub fn should_bypass(&self, ip: &str) -> bool {
        ip.trim()
            .parse::<IpAddr>()
            .map(|addr| self.whitelist.contains(&addr))
            .unwrap_or(false)
    }

    /// Number of whitelisted addresses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.whitelist.len()
    }

    /// Whether the whitelist is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.whitelist.is_empty()
    }
}
