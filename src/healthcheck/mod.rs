//! Readiness gate: concurrent HTTP polling with backoff and an overall
//! deadline.

mod checker;
mod gate;
mod http;

pub use checker::{poll_until_healthy, Backoff, HealthChecker};
pub use gate::{
    declared_checks, implicit_checks, HealthCheck, ReadinessGate, UnprobedServicePolicy,
    DEFAULT_READINESS_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use http::HttpChecker;
