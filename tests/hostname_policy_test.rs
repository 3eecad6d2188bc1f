//! Property tests for the accepted-hostname policy.

use devstack::config::hostname::{is_accepted_host, FIXED_HOSTS, PRODUCT_FAMILIES};
use proptest::prelude::*;

/// A single DNS label: alphanumeric ends, hyphens only inside, no `--`.
fn valid_label() -> impl Strategy<Value = String> {
    "[a-z0-9]([a-z0-9-]{0,20}[a-z0-9])?".prop_filter("no doubled hyphen", |l| !l.contains("--"))
}

fn family() -> impl Strategy<Value = &'static str> {
    prop::sample::select(PRODUCT_FAMILIES.to_vec())
}

fn suffix() -> impl Strategy<Value = &'static str> {
    prop::sample::select(vec![".localhost", "-dev.localhost", "-dev.com", "-local.com"])
}

proptest! {
    #[test]
    fn accepts_family_hosts(label in valid_label(), family in family(), suffix in suffix()) {
        let host = format!("{}.{}{}", label, family, suffix);
        prop_assert!(is_accepted_host(&host), "{} should be accepted", host);
        prop_assert!(is_accepted_host(&host.to_uppercase()), "{} should be accepted", host);
    }

    #[test]
    fn rejects_nested_subdomains(
        outer in valid_label(),
        inner in valid_label(),
        family in family(),
        suffix in suffix(),
    ) {
        let host = format!("{}.{}.{}{}", outer, inner, family, suffix);
        prop_assert!(!is_accepted_host(&host), "{} should be rejected", host);
    }

    #[test]
    fn rejects_edge_hyphens(label in valid_label(), family in family(), suffix in suffix()) {
        let leading = format!("-{}.{}{}", label, family, suffix);
        let trailing = format!("{}-.{}{}", label, family, suffix);
        prop_assert!(!is_accepted_host(&leading));
        prop_assert!(!is_accepted_host(&trailing));
    }

    #[test]
    fn rejects_doubled_hyphens(
        left in "[a-z0-9]{1,8}",
        right in "[a-z0-9]{1,8}",
        family in family(),
        suffix in suffix(),
    ) {
        let host = format!("{}--{}.{}{}", left, right, family, suffix);
        prop_assert!(!is_accepted_host(&host), "{} should be rejected", host);
    }

    #[test]
    fn rejects_unknown_families(
        label in valid_label(),
        family in "[a-z]{3,12}",
        suffix in suffix(),
    ) {
        prop_assume!(!PRODUCT_FAMILIES.contains(&family.as_str()));
        let host = format!("{}.{}{}", label, family, suffix);
        prop_assert!(!is_accepted_host(&host), "{} should be rejected", host);
    }

    #[test]
    fn rejects_stray_trailing_suffix(
        label in valid_label(),
        family in family(),
        suffix in suffix(),
        extra in "\\.[a-z]{2,6}",
    ) {
        let host = format!("{}.{}{}{}", label, family, suffix, extra);
        prop_assert!(!is_accepted_host(&host), "{} should be rejected", host);
    }

    #[test]
    fn rejects_ip_literals(a in 0u8..=255, b in 0u8..=255, c in 0u8..=255, d in 0u8..=255) {
        let host = format!("{}.{}.{}.{}", a, b, c, d);
        prop_assert!(!is_accepted_host(&host));
    }
}

#[test]
fn fixed_names_and_obvious_rejections() {
    for host in FIXED_HOSTS {
        assert!(is_accepted_host(host), "{} should be accepted", host);
    }
    for host in ["", "localhost", "127.0.0.1", "::1", "workleap.localhost", ".workleap.localhost"] {
        assert!(!is_accepted_host(host), "{:?} should be rejected", host);
    }
}
