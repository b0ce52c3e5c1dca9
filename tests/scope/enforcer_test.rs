//! Scope enforcement tests.

use sentryai::scope::{ScopeConfig, ScopeDecision, ScopeEnforcer, ScopeViolation};

fn enforcer(allowed: &[&str], excluded: &[&str]) -> ScopeEnforcer {
    ScopeEnforcer::new(ScopeConfig {
        allowed_domains: allowed.iter().map(|s| (*s).to_owned()).collect(),
        excluded_domains: excluded.iter().map(|s| (*s).to_owned()).collect(),
        ..ScopeConfig::default()
    })
}

#[test]
fn allowed_wildcard_matches_subdomain() {
    let scope = enforcer(&["*.example.com"], &[]);
    let (decision, _) = scope.check_target("www.example.com");
    assert_eq!(decision, ScopeDecision::Allowed);
}

#[test]
fn unlisted_target_is_out_of_scope() {
    let scope = enforcer(&["*.example.com"], &[]);
    let (decision, _) = scope.check_target("www.other.org");
    assert_eq!(decision, ScopeDecision::DeniedOutOfScope);
}

#[test]
fn exclusion_beats_allowance() {
    let scope = enforcer(&["*.example.com"], &["admin.example.com"]);
    let (decision, _) = scope.check_target("admin.example.com");
    assert_eq!(decision, ScopeDecision::DeniedExcluded);
}

#[test]
fn sensitive_list_beats_allowance() {
    let scope = enforcer(&["*.google.com"], &[]);
    let (decision, _) = scope.check_target("www.google.com");
    assert_eq!(decision, ScopeDecision::DeniedSensitive);
}

#[test]
fn sensitive_list_cannot_be_emptied() {
    // Even an empty config still blocks protected infrastructure.
    let scope = enforcer(&["*.gov"], &[]);
    let (decision, _) = scope.check_target("records.example.gov");
    assert_eq!(decision, ScopeDecision::DeniedSensitive);
}

#[test]
fn bracketed_ipv6_loopback_denied_by_default() {
    let scope = enforcer(&["*.example.com"], &[]);
    let (decision, _) = scope.check_target("[::1]:80");
    assert_eq!(decision, ScopeDecision::DeniedPrivateIp);
}

#[test]
fn loopback_allowed_when_configured() {
    let scope = ScopeEnforcer::new(ScopeConfig {
        allowed_ips: vec!["127.0.0.0/8".to_owned()],
        allow_localhost: true,
        allow_private_ips: true,
        ..ScopeConfig::default()
    });
    let (decision, _) = scope.check_target("127.0.0.1");
    assert_eq!(decision, ScopeDecision::Allowed);
}

#[test]
fn private_ip_denied_by_default() {
    let scope = ScopeEnforcer::new(ScopeConfig {
        allowed_ips: vec!["192.168.1.0/24".to_owned()],
        ..ScopeConfig::default()
    });
    let (decision, _) = scope.check_target("192.168.1.5");
    assert_eq!(decision, ScopeDecision::DeniedPrivateIp);
}

#[test]
fn cidr_allowance_with_private_policy() {
    let scope = ScopeEnforcer::new(ScopeConfig {
        allowed_ips: vec!["10.0.0.0/8".to_owned()],
        allow_private_ips: true,
        ..ScopeConfig::default()
    });
    let (decision, _) = scope.check_target("10.20.30.40");
    assert_eq!(decision, ScopeDecision::Allowed);

    let (decision, _) = scope.check_target("11.0.0.1");
    assert_eq!(decision, ScopeDecision::DeniedOutOfScope);
}

#[test]
fn public_ip_in_allowed_network() {
    let scope = ScopeEnforcer::new(ScopeConfig {
        allowed_ips: vec!["203.0.113.0/24".to_owned()],
        ..ScopeConfig::default()
    });
    let (decision, _) = scope.check_target("203.0.113.9");
    assert_eq!(decision, ScopeDecision::Allowed);
}

#[test]
fn urls_are_normalized_to_their_host() {
    let scope = enforcer(&["*.example.com"], &[]);
    let (decision, _) = scope.check_target("https://WWW.Example.com:8443/login/");
    assert_eq!(decision, ScopeDecision::Allowed);
}

#[test]
fn port_suffix_is_stripped() {
    let scope = enforcer(&["*.example.com"], &[]);
    let (decision, _) = scope.check_target("api.example.com:8080");
    assert_eq!(decision, ScopeDecision::Allowed);
}

#[test]
fn garbage_is_denied_as_invalid() {
    let scope = enforcer(&["*"], &[]);
    let (decision, reason) = scope.check_target("not a target!!");
    assert_eq!(decision, ScopeDecision::DeniedOutOfScope);
    assert_eq!(reason, "invalid target format");
}

#[test]
fn tool_call_with_all_targets_in_scope_passes() {
    let scope = enforcer(&["*.example.com"], &[]);
    let args = serde_json::json!({
        "domain": "www.example.com",
        "silent": true,
    });
    assert!(scope.validate_tool_call("subfinder", &args).is_ok());
}

#[test]
fn tool_call_fails_if_any_target_denied() {
    let scope = enforcer(&["*.example.com"], &["admin.example.com"]);
    let args = serde_json::json!({
        "hosts": ["www.example.com", "admin.example.com"],
    });
    let result = scope.validate_tool_call("naabu", &args);
    assert!(matches!(result, Err(ScopeViolation::Denied { .. })));
}

#[test]
fn tool_call_without_targets_is_rejected() {
    let scope = enforcer(&["*.example.com"], &[]);
    let args = serde_json::json!({ "silent": true });
    let result = scope.validate_tool_call("subfinder", &args);
    assert!(matches!(result, Err(ScopeViolation::NoTarget { .. })));
}

#[test]
fn plural_keys_are_extracted() {
    let scope = enforcer(&["*.example.com"], &[]);
    let args = serde_json::json!({
        "urls": ["https://a.example.com", "https://b.example.com"],
    });
    assert!(scope.validate_tool_call("httpx", &args).is_ok());
}

#[test]
fn audit_ring_is_bounded() {
    let scope = enforcer(&["*.example.com"], &[]);
    for i in 0..1_050 {
        let _ = scope.check_target(&format!("host{i}.example.com"));
    }
    assert_eq!(scope.audit_log().len(), 1_000);
}

#[test]
fn stats_count_allowed_and_blocked() {
    let scope = enforcer(&["*.example.com"], &[]);
    let _ = scope.check_target("www.example.com");
    let _ = scope.check_target("www.other.org");
    let (allowed, blocked) = scope.stats();
    assert_eq!(allowed, 1);
    assert_eq!(blocked, 1);
}

#[test]
fn config_from_patterns_splits_cidrs_from_domains() {
    let allowed = vec!["*.example.com".to_owned(), "203.0.113.0/24".to_owned()];
    let excluded = vec!["admin.example.com".to_owned()];
    let config = ScopeConfig::from_patterns(&allowed, &excluded);
    assert_eq!(config.allowed_domains, vec!["*.example.com".to_owned()]);
    assert_eq!(config.allowed_ips, vec!["203.0.113.0/24".to_owned()]);
    assert_eq!(config.excluded_domains, vec!["admin.example.com".to_owned()]);
}
