//! Lightweight metrics helpers for Waypoint.
//!
//! This module exposes a small set of convenience functions and RAII timers
//! wrapping the `metrics` crate macros. No exporter is embedded; the
//! application can install any compatible recorder, and without one every
//! call is a no-op.
//!
//! Provided metrics (labels vary by family):
//! * `waypoint_requests_total` (counter: frontend, method, status)
//! * `waypoint_request_duration_seconds` (histogram: frontend, method)
//! * `waypoint_backend_requests_total` (counter: backend, method, status)
//! * `waypoint_backend_request_duration_seconds` (histogram: backend, method)
//! * `waypoint_dns_refresh_total` (counter: target, outcome)
//! * `waypoint_config_reloads_total` (counter: outcome)
//! * `waypoint_active_listeners` (gauge)
use std::{collections::HashMap, sync::Mutex, time::Instant};

use metrics::{
    Unit, counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::Lazy;

pub const WAYPOINT_REQUESTS_TOTAL: &str = "waypoint_requests_total";
pub const WAYPOINT_REQUEST_DURATION_SECONDS: &str = "waypoint_request_duration_seconds";
pub const WAYPOINT_BACKEND_REQUESTS_TOTAL: &str = "waypoint_backend_requests_total";
pub const WAYPOINT_BACKEND_REQUEST_DURATION_SECONDS: &str =
    "waypoint_backend_request_duration_seconds";
pub const WAYPOINT_DNS_REFRESH_TOTAL: &str = "waypoint_dns_refresh_total";
pub const WAYPOINT_CONFIG_RELOADS_TOTAL: &str = "waypoint_config_reloads_total";
pub const WAYPOINT_ACTIVE_LISTENERS: &str = "waypoint_active_listeners";

/// Last value written to each unlabelled gauge, for ad-hoc inspection.
pub static GAUGE_VALUES: Lazy<Mutex<HashMap<&'static str, f64>>> = Lazy::new(|| {
    describe_counter!(
        WAYPOINT_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests dispatched by the gateway."
    );
    describe_histogram!(
        WAYPOINT_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time until response headers were produced for a dispatched request."
    );
    describe_counter!(
        WAYPOINT_BACKEND_REQUESTS_TOTAL,
        Unit::Count,
        "Total number of requests forwarded to backends."
    );
    describe_histogram!(
        WAYPOINT_BACKEND_REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Latency until response headers of requests forwarded to backends."
    );
    describe_counter!(
        WAYPOINT_DNS_REFRESH_TOTAL,
        Unit::Count,
        "DNS discovery refresh attempts by outcome."
    );
    describe_counter!(
        WAYPOINT_CONFIG_RELOADS_TOTAL,
        Unit::Count,
        "Configuration loads by outcome."
    );
    describe_gauge!(
        WAYPOINT_ACTIVE_LISTENERS,
        "Number of entry point listeners currently serving."
    );

    Mutex::new(HashMap::new())
});

/// Increment the total request counter for a dispatched request.
pub fn increment_request_total(frontend: &str, method: &str, status: u16) {
    counter!(
        WAYPOINT_REQUESTS_TOTAL,
        "frontend" => frontend.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a dispatched request's duration.
pub fn record_request_duration(frontend: &str, method: &str, duration: std::time::Duration) {
    histogram!(
        WAYPOINT_REQUEST_DURATION_SECONDS,
        "frontend" => frontend.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Increment total count of proxied backend requests.
pub fn increment_backend_request_total(backend: &str, method: &str, status: u16) {
    counter!(
        WAYPOINT_BACKEND_REQUESTS_TOTAL,
        "backend" => backend.to_string(),
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed backend request duration.
pub fn record_backend_request_duration(backend: &str, method: &str, duration: std::time::Duration) {
    histogram!(
        WAYPOINT_BACKEND_REQUEST_DURATION_SECONDS,
        "backend" => backend.to_string(),
        "method" => method.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Count one DNS refresh attempt.
pub fn increment_dns_refresh(target: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(
        WAYPOINT_DNS_REFRESH_TOTAL,
        "target" => target.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Count one configuration load.
pub fn increment_config_reload(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!(WAYPOINT_CONFIG_RELOADS_TOTAL, "outcome" => outcome).increment(1);
}

/// Set current number of serving listeners.
pub fn set_active_listeners(count: usize) {
    if let Ok(mut gauges) = GAUGE_VALUES.lock() {
        gauges.insert(WAYPOINT_ACTIVE_LISTENERS, count as f64);
    }
    gauge!(WAYPOINT_ACTIVE_LISTENERS).set(count as f64);
}

/// RAII helper measuring a dispatched request.
pub struct RequestTimer {
    start: Instant,
    frontend: String,
    method: String,
}

impl RequestTimer {
    pub fn new(frontend: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            frontend: frontend.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        record_request_duration(&self.frontend, &self.method, self.start.elapsed());
    }
}

/// RAII helper measuring backend request duration.
pub struct BackendRequestTimer {
    start: Instant,
    backend: String,
    method: String,
}

impl BackendRequestTimer {
    pub fn new(backend: &str, method: &str) -> Self {
        Self {
            start: Instant::now(),
            backend: backend.to_string(),
            method: method.to_string(),
        }
    }
}

impl Drop for BackendRequestTimer {
    fn drop(&mut self) {
        record_backend_request_duration(&self.backend, &self.method, self.start.elapsed());
    }
}

/// Initialize metric descriptions (idempotent).
pub fn init_metrics() {
    Lazy::force(&GAUGE_VALUES);
    tracing::debug!("Waypoint metric descriptions registered");
}

/// Collect a snapshot of gauge values used for ad-hoc exports.
pub fn get_current_metrics() -> HashMap<String, f64> {
    GAUGE_VALUES
        .lock()
        .map(|gauges| {
            gauges
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect()
        })
        .unwrap_or_default()
}
