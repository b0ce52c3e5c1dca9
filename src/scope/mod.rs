//! Scope enforcement and target safety — the mission "kill switch".
//!
//! Every outbound tool invocation is vetted here before it can touch the
//! network. The enforcer prevents three failure classes:
//!
//! 1. Scanning targets outside the declared scope
//! 2. Accidental pivots to external domains discovered mid-mission
//! 3. Hitting protected infrastructure (government, healthcare, major
//!    platforms) regardless of what the scope says

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// Maximum number of audit entries retained in the ring.
const AUDIT_RING_CAPACITY: usize = 1_000;

/// Global blocklist applied regardless of the configured allow list.
///
/// These patterns cannot be disabled through configuration; a mission scope
/// that names one of them still gets a denial.
const DEFAULT_SENSITIVE_PATTERNS: &[&str] = &[
    // Government
    "*.gov",
    "*.gov.*",
    "*.mil",
    // Healthcare
    "*.nhs.uk",
    "*.va.gov",
    // Critical infrastructure
    "*.edu",
    "*.bank",
    "*.fin",
    // Major platforms (avoid accidents)
    "*.google.com",
    "*.googleapis.com",
    "*.microsoft.com",
    "*.azure.com",
    "*.amazon.com",
    "*.aws.amazon.com",
    "*.cloudflare.com",
    "*.github.com",
    "*.githubusercontent.com",
    // Social media
    "*.facebook.com",
    "*.twitter.com",
    "*.linkedin.com",
];

/// Argument keys that may carry a scan target.
const TARGET_KEYS: &[&str] = &[
    "target", "host", "domain", "url", "ip", "hosts", "domains", "urls",
];

// ---------------------------------------------------------------------------
// Decision and audit types
// ---------------------------------------------------------------------------

/// Outcome of a scope check for a single target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeDecision {
    /// Target is within the declared scope.
    Allowed,
    /// Target matched nothing in the allow list.
    DeniedOutOfScope,
    /// Target matched an explicit exclusion.
    DeniedExcluded,
    /// Target matched the global sensitive blocklist.
    DeniedSensitive,
    /// Target is a private or loopback address and those are not permitted.
    DeniedPrivateIp,
}

impl ScopeDecision {
    /// Returns `true` when the decision permits execution.
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

/// One audited scope decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeAuditEntry {
    /// The target string as submitted.
    pub target: String,
    /// The decision reached.
    pub decision: ScopeDecision,
    /// Human-readable reason.
    pub reason: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

/// Scope violation raised when a tool call names out-of-scope targets.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScopeViolation {
    /// The tool call carried no recognizable target argument.
    #[error("no target found in tool arguments for {tool}")]
    NoTarget {
        /// The tool whose arguments were inspected.
        tool: String,
    },

    /// One or more targets were denied.
    #[error("scope violation: {}", details.join("; "))]
    Denied {
        /// Per-target denial reasons.
        details: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Scope configuration for a mission.
///
/// Wildcard patterns use `*` for any run of characters. IP entries accept
/// CIDR notation (`192.168.1.0/24`) or bare addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Allowed domain patterns, e.g. `*.example.com`.
    pub allowed_domains: Vec<String>,
    /// Allowed IP networks in CIDR notation.
    pub allowed_ips: Vec<String>,
    /// Excluded domain patterns; exclusion beats allowance.
    pub excluded_domains: Vec<String>,
    /// Excluded IP networks.
    pub excluded_ips: Vec<String>,
    /// Permit RFC-1918 and similar private ranges.
    pub allow_private_ips: bool,
    /// Permit loopback addresses.
    pub allow_localhost: bool,
    /// Extra sensitive patterns on top of the built-in blocklist.
    ///
    /// The built-in list is always enforced; this only extends it.
    pub extra_sensitive_patterns: Vec<String>,
}

impl ScopeConfig {
    /// Build a config from mixed pattern lists, routing CIDR/IP entries to
    /// the IP sets and everything else to the domain sets.
    pub fn from_patterns(allowed: &[String], excluded: &[String]) -> Self {
        let split = |patterns: &[String]| -> (Vec<String>, Vec<String>) {
            let mut domains = Vec::new();
            let mut ips = Vec::new();
            for pattern in patterns {
                if CidrBlock::parse(pattern).is_some() {
                    ips.push(pattern.clone());
                } else {
                    domains.push(pattern.clone());
                }
            }
            (domains, ips)
        };

        let (allowed_domains, allowed_ips) = split(allowed);
        let (excluded_domains, excluded_ips) = split(excluded);

        Self {
            allowed_domains,
            allowed_ips,
            excluded_domains,
            excluded_ips,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// CIDR matching
// ---------------------------------------------------------------------------

/// A parsed CIDR block (or single address with a full prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CidrBlock {
    network: IpAddr,
    prefix: u8,
}

impl CidrBlock {
    /// Parse `addr/prefix` or a bare address.
    fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let (addr_part, prefix_part) = match spec.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (spec, None),
        };
        let network: IpAddr = addr_part.parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32u8,
            IpAddr::V6(_) => 128u8,
        };
        let prefix = match prefix_part {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };
        Some(Self { network, prefix })
    }

    /// Check whether `addr` falls inside this block.
    fn contains(&self, addr: &IpAddr) -> bool {
        match (self.network, addr) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let shift = 32u32.saturating_sub(u32::from(self.prefix));
                let mask = u32::MAX.checked_shl(shift).unwrap_or(0);
                (u32::from(net) & mask) == (u32::from(*ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let shift = 128u32.saturating_sub(u32::from(self.prefix));
                let mask = u128::MAX.checked_shl(shift).unwrap_or(0);
                (u128::from(net) & mask) == (u128::from(*ip) & mask)
            }
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Private / loopback ranges
// ---------------------------------------------------------------------------

/// Check whether an address is loopback (`127.0.0.0/8`, `::1`).
fn is_loopback(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback())
        }
    }
}

/// Check whether an address is in a private/reserved range.
fn is_private_ip(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            // fc00::/7 (unique local)
            (segments[0] & 0xFE00) == 0xFC00
            // fe80::/10 (link-local)
            || (segments[0] & 0xFFC0) == 0xFE80
            // IPv4-mapped addresses inherit the IPv4 classification
            || v6.to_ipv4_mapped().is_some_and(|v4| is_private_v4(&v4))
        }
    }
}

/// IPv4 private/reserved classification.
fn is_private_v4(v4: &Ipv4Addr) -> bool {
    let octets = v4.octets();
    // 127.0.0.0/8
    octets[0] == 127
    // 10.0.0.0/8
    || octets[0] == 10
    // 172.16.0.0/12
    || (octets[0] == 172 && (octets[1] & 0xF0) == 16)
    // 192.168.0.0/16
    || (octets[0] == 192 && octets[1] == 168)
    // 169.254.0.0/16 (link-local)
    || (octets[0] == 169 && octets[1] == 254)
    // 100.64.0.0/10 (CGN)
    || (octets[0] == 100 && (octets[1] & 0xC0) == 64)
    // 0.0.0.0
    || v4.is_unspecified()
}

// ---------------------------------------------------------------------------
// Target normalization
// ---------------------------------------------------------------------------

/// A target reduced to its checkable form.
#[derive(Debug, Clone, PartialEq, Eq)]
enum NormalizedTarget {
    /// A lowercased domain name.
    Domain(String),
    /// A parsed IP address.
    Ip(IpAddr),
}

/// RFC-1035-ish domain shape: alnum+hyphen labels, alpha TLD of 2+ chars.
static DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)*[a-zA-Z]{2,}$")
        .expect("domain regex is valid")
});

/// Normalize a raw target (domain, IP, URL, CIDR host, bracketed IPv6).
///
/// Returns `None` when the target cannot be reduced to a domain or address.
fn normalize_target(target: &str) -> Option<NormalizedTarget> {
    let mut target = target.trim().to_owned();

    // URLs: reduce to the host component.
    if target.contains("://") {
        let parsed = Url::parse(&target).ok()?;
        target = parsed.host_str()?.to_owned();
    }

    // Bracketed IPv6, possibly with a port: [::1]:80
    if let Some(rest) = target.strip_prefix('[') {
        let end = rest.find(']')?;
        target = rest.get(..end)?.to_owned();
    } else if let Some((host, _port)) = target.rsplit_once(':') {
        // Strip a trailing port, but only when the remainder is not itself
        // an un-bracketed IPv6 address (which contains further colons).
        if !host.contains(':') {
            target = host.to_owned();
        }
    }

    let target = target.trim_end_matches('/').to_owned();
    if target.is_empty() {
        return None;
    }

    if let Ok(ip) = target.parse::<IpAddr>() {
        return Some(NormalizedTarget::Ip(ip));
    }

    if target.len() <= 255 && DOMAIN_RE.is_match(&target) {
        return Some(NormalizedTarget::Domain(target.to_lowercase()));
    }

    None
}

/// Compile a wildcard pattern (`*` = any run of characters) to a regex.
fn wildcard_to_regex(pattern: &str) -> Option<Regex> {
    let escaped = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("(?i)^{escaped}$")).ok()
}

// ---------------------------------------------------------------------------
// Enforcer
// ---------------------------------------------------------------------------

/// Enforces target scope restrictions.
///
/// Must be consulted before any tool execution. Decision order, first match
/// wins: sensitive blocklist, explicit exclusion, private/loopback policy,
/// allow list, default deny. Every decision lands in a bounded audit ring.
#[derive(Debug)]
pub struct ScopeEnforcer {
    config: ScopeConfig,
    allowed_domain_patterns: Vec<Regex>,
    excluded_domain_patterns: Vec<Regex>,
    sensitive_patterns: Vec<Regex>,
    allowed_networks: Vec<CidrBlock>,
    excluded_networks: Vec<CidrBlock>,
    audit: Mutex<VecDeque<ScopeAuditEntry>>,
    allowed_count: AtomicU64,
    blocked_count: AtomicU64,
}

impl ScopeEnforcer {
    /// Build an enforcer from a mission scope configuration.
    ///
    /// Invalid wildcard patterns and CIDR specs are skipped with a warning
    /// rather than failing mission startup.
    pub fn new(config: ScopeConfig) -> Self {
        let compile = |patterns: &[String]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| {
                    let compiled = wildcard_to_regex(p);
                    if compiled.is_none() {
                        tracing::warn!(pattern = %p, "skipping invalid scope pattern");
                    }
                    compiled
                })
                .collect()
        };

        let parse_networks = |specs: &[String]| -> Vec<CidrBlock> {
            specs
                .iter()
                .filter_map(|s| {
                    let block = CidrBlock::parse(s);
                    if block.is_none() {
                        tracing::warn!(spec = %s, "skipping invalid CIDR spec");
                    }
                    block
                })
                .collect()
        };

        let mut sensitive: Vec<String> = DEFAULT_SENSITIVE_PATTERNS
            .iter()
            .map(|p| (*p).to_owned())
            .collect();
        sensitive.extend(config.extra_sensitive_patterns.iter().cloned());

        Self {
            allowed_domain_patterns: compile(&config.allowed_domains),
            excluded_domain_patterns: compile(&config.excluded_domains),
            sensitive_patterns: compile(&sensitive),
            allowed_networks: parse_networks(&config.allowed_ips),
            excluded_networks: parse_networks(&config.excluded_ips),
            audit: Mutex::new(VecDeque::with_capacity(AUDIT_RING_CAPACITY)),
            allowed_count: AtomicU64::new(0),
            blocked_count: AtomicU64::new(0),
            config,
        }
    }

    /// Check a single target (domain, IP, URL, or bracketed host).
    ///
    /// Never panics; unparseable targets are denied out of scope.
    pub fn check_target(&self, target: &str) -> (ScopeDecision, String) {
        let normalized = match normalize_target(target) {
            Some(n) => n,
            None => {
                return self.log_decision(
                    target,
                    ScopeDecision::DeniedOutOfScope,
                    "invalid target format",
                );
            }
        };

        match normalized {
            NormalizedTarget::Domain(domain) => self.check_domain(target, &domain),
            NormalizedTarget::Ip(ip) => self.check_ip(target, &ip),
        }
    }

    fn check_domain(&self, raw: &str, domain: &str) -> (ScopeDecision, String) {
        if self.sensitive_patterns.iter().any(|p| p.is_match(domain)) {
            return self.log_decision(
                raw,
                ScopeDecision::DeniedSensitive,
                "target matches sensitive pattern (protected infrastructure)",
            );
        }

        if self
            .excluded_domain_patterns
            .iter()
            .any(|p| p.is_match(domain))
        {
            return self.log_decision(
                raw,
                ScopeDecision::DeniedExcluded,
                "domain explicitly excluded from scope",
            );
        }

        if self
            .allowed_domain_patterns
            .iter()
            .any(|p| p.is_match(domain))
        {
            return self.log_decision(
                raw,
                ScopeDecision::Allowed,
                "target is within defined scope",
            );
        }

        self.log_decision(
            raw,
            ScopeDecision::DeniedOutOfScope,
            "target not in allowed scope",
        )
    }

    fn check_ip(&self, raw: &str, ip: &IpAddr) -> (ScopeDecision, String) {
        if self.excluded_networks.iter().any(|n| n.contains(ip)) {
            return self.log_decision(
                raw,
                ScopeDecision::DeniedExcluded,
                "IP explicitly excluded from scope",
            );
        }

        if is_loopback(ip) && !self.config.allow_localhost {
            return self.log_decision(
                raw,
                ScopeDecision::DeniedPrivateIp,
                "localhost addresses not allowed",
            );
        }

        if is_private_ip(ip) && !self.config.allow_private_ips {
            return self.log_decision(
                raw,
                ScopeDecision::DeniedPrivateIp,
                "private IP addresses not allowed",
            );
        }

        if self.allowed_networks.iter().any(|n| n.contains(ip)) {
            return self.log_decision(
                raw,
                ScopeDecision::Allowed,
                "target is within defined scope",
            );
        }

        self.log_decision(
            raw,
            ScopeDecision::DeniedOutOfScope,
            "target not in allowed scope",
        )
    }

    /// Validate a tool call by extracting and checking every target argument.
    ///
    /// Recognized keys: `target`, `host`, `domain`, `url`, `ip` and their
    /// plural array forms. All extracted targets must individually pass.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeViolation::NoTarget`] when no target argument is
    /// present, or [`ScopeViolation::Denied`] listing each denied target.
    pub fn validate_tool_call(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), ScopeViolation> {
        let mut targets: Vec<String> = Vec::new();

        if let Some(map) = arguments.as_object() {
            for key in TARGET_KEYS {
                match map.get(*key) {
                    Some(serde_json::Value::String(s)) => targets.push(s.clone()),
                    Some(serde_json::Value::Array(items)) => {
                        targets.extend(
                            items
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_owned)),
                        );
                    }
                    _ => {}
                }
            }
        }

        if targets.is_empty() {
            return Err(ScopeViolation::NoTarget {
                tool: tool_name.to_owned(),
            });
        }

        let mut denied: Vec<String> = Vec::new();
        for target in &targets {
            let (decision, reason) = self.check_target(target);
            if !decision.is_allowed() {
                denied.push(format!("{target}: {reason}"));
            }
        }

        if denied.is_empty() {
            Ok(())
        } else {
            Err(ScopeViolation::Denied { details: denied })
        }
    }

    /// Snapshot of the audit ring, oldest first.
    pub fn audit_log(&self) -> Vec<ScopeAuditEntry> {
        self.audit
            .lock()
            .map(|ring| ring.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Counters of allowed and blocked decisions since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.allowed_count.load(Ordering::Relaxed),
            self.blocked_count.load(Ordering::Relaxed),
        )
    }

    fn log_decision(
        &self,
        target: &str,
        decision: ScopeDecision,
        reason: &str,
    ) -> (ScopeDecision, String) {
        if decision.is_allowed() {
            self.allowed_count.fetch_add(1, Ordering::Relaxed);
        } else {
            self.blocked_count.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(target = %target, decision = ?decision, reason = %reason, "scope denial");
        }

        if let Ok(mut ring) = self.audit.lock() {
            if ring.len() >= AUDIT_RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(ScopeAuditEntry {
                target: target.to_owned(),
                decision,
                reason: reason.to_owned(),
                timestamp: Utc::now(),
            });
        }

        (decision, reason.to_owned())
    }
}
