//! Metrics collection.
//!
//! # Metrics
//! - `relay_permission_checks_total` (counter): admission decisions by listener, result
//! - `relay_auth_total` (counter): authentication attempts by result
//! - `relay_reconcile_total` (counter): reconciliation passes by outcome
//! - `relay_objects` (gauge): live runtime objects by kind
//! - `relay_connections` (gauge): live relay connections by listener
//! - `relay_dns_resolutions_total` (counter): background resolutions by result
//!
//! # Design Decisions
//! - Emitted through the `metrics` facade; installing an exporter is up to the embedder
//! - Label values are low-cardinality (object names, fixed result strings)

use metrics::{counter, gauge};

/// Record one admission decision.
pub fn record_permission_check(listener: &str, allowed: bool) {
    let result = if allowed { "allow" } else { "deny" };
    counter!(
        "relay_permission_checks_total",
        "listener" => listener.to_string(),
        "result" => result
    )
    .increment(1);
}

/// Record one authentication attempt.
pub fn record_auth(result: &'static str) {
    counter!("relay_auth_total", "result" => result).increment(1);
}

/// Record the outcome of a reconciliation pass.
pub fn record_reconcile(outcome: &'static str) {
    counter!("relay_reconcile_total", "outcome" => outcome).increment(1);
}

/// Record the number of live objects of one kind.
pub fn record_objects(kind: &'static str, count: usize) {
    gauge!("relay_objects", "kind" => kind).set(count as f64);
}

/// Record the number of live relay connections of a listener.
pub fn record_relay_connections(listener: &str, active: u64) {
    gauge!("relay_connections", "listener" => listener.to_string()).set(active as f64);
}

/// Record one background DNS resolution.
pub fn record_dns_resolution(success: bool) {
    let result = if success { "success" } else { "failure" };
    counter!("relay_dns_resolutions_total", "result" => result).increment(1);
}
