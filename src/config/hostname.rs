//! Accepted-hostname policy for ingress hosts.
//!
//! The shared proxy and the locally trusted certificate must agree on the
//! set of addressable names, so only these shapes are accepted:
//!
//! - a fixed set of container bridge names,
//! - `<label>.<family>.localhost` and `<label>.<family>-dev.localhost`,
//! - `<label>.<family>-dev.com` and `<label>.<family>-local.com`,
//!
//! where `<family>` is one of `officevibe`, `sharegate`, `workleap` and
//! `<label>` is a single alphanumeric/hyphen label that neither starts nor
//! ends with a hyphen and never contains `--`.

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Names that always resolve to the workstation from inside containers.
pub const FIXED_HOSTS: &[&str] = &[
    "host.docker.internal",
    "gateway.docker.internal",
    "host.containers.internal",
];

pub const PRODUCT_FAMILIES: &[&str] = &["officevibe", "sharegate", "workleap"];

static LOCAL_WILDCARD: OnceLock<Regex> = OnceLock::new();
static CLOUD_WILDCARD: OnceLock<Regex> = OnceLock::new();

fn local_wildcard() -> &'static Regex {
    LOCAL_WILDCARD.get_or_init(|| {
        Regex::new(
            r"^(?i)[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.(officevibe|sharegate|workleap)(-dev)?\.localhost$",
        )
        .expect("local wildcard pattern is valid")
    })
}

fn cloud_wildcard() -> &'static Regex {
    CLOUD_WILDCARD.get_or_init(|| {
        Regex::new(
            r"^(?i)[a-z0-9](?:[a-z0-9-]*[a-z0-9])?\.(officevibe|sharegate|workleap)-(dev|local)\.com$",
        )
        .expect("cloud wildcard pattern is valid")
    })
}

/// Returns true if `host` may be used as an ingress host.
pub fn is_accepted_host(host: &str) -> bool {
    if FIXED_HOSTS.iter().any(|fixed| fixed.eq_ignore_ascii_case(host)) {
        return true;
    }

    is_supported_wildcard_host(host)
}

/// Returns true if `host` matches one of the product-family wildcard domains.
pub fn is_supported_wildcard_host(host: &str) -> bool {
    let Some((label, _)) = host.split_once('.') else {
        return false;
    };
    if label.contains("--") {
        return false;
    }

    local_wildcard().is_match(host) || cloud_wildcard().is_match(host)
}

/// Checks an ingress host declared by `service`.
pub fn validate_ingress_host(service: &str, host: &str) -> Result<()> {
    if is_accepted_host(host) {
        return Ok(());
    }

    Err(Error::Config(format!(
        "Service '{}' declares ingress host '{}', which is not an accepted hostname. \
         Use '<name>.<{}>.localhost' (optionally with a '-dev' family suffix) or one of: {}",
        service,
        host,
        PRODUCT_FAMILIES.join("|"),
        FIXED_HOSTS.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_family_hosts() {
        for host in [
            "app.workleap.localhost",
            "app.workleap-dev.localhost",
            "my-app.officevibe.localhost",
            "a.sharegate-dev.localhost",
            "A1.Workleap.LOCALHOST",
            "api.workleap-dev.com",
            "api.sharegate-local.com",
        ] {
            assert!(is_accepted_host(host), "expected '{}' to be accepted", host);
        }
    }

    #[test]
    fn accepts_fixed_bridge_names() {
        assert!(is_accepted_host("host.docker.internal"));
        assert!(is_accepted_host("HOST.CONTAINERS.INTERNAL"));
    }

    #[test]
    fn rejects_malformed_hosts() {
        for host in [
            "",
            "localhost",
            "127.0.0.1",
            "::1",
            "workleap.localhost",
            "a.b.workleap.localhost",
            "-app.workleap.localhost",
            "app-.workleap.localhost",
            "my--app.workleap.localhost",
            "app.contoso.localhost",
            "app.workleap-prod.localhost",
            "app.workleap.localhost.com",
            "app.workleap.com",
            "app.workleap-dev-dev.localhost",
            "app_1.workleap.localhost",
        ] {
            assert!(!is_accepted_host(host), "expected '{}' to be rejected", host);
        }
    }

    #[test]
    fn validation_error_names_the_service() {
        let err = validate_ingress_host("api", "api.example.com").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'api'"));
        assert!(message.contains("api.example.com"));
    }
}
