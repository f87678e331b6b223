//! Metric names shared across services, registered once at startup.

pub const REQUEST_DURATION: &str = "request.duration";
pub const REQUESTS_TOTAL: &str = "requests.total";
pub const UPSTREAM_CALLS: &str = "upstream.calls";
pub const UPSTREAM_CALL_FAILURES: &str = "upstream.call_failures";

/// Registers descriptions for every metric this workspace emits. Safe to
/// call before or after a recorder is installed.
pub fn describe() {
    metrics::describe_histogram!(
        REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Inbound request duration in seconds."
    );
    metrics::describe_counter!(
        REQUESTS_TOTAL,
        "Inbound resource requests. Tagged with resource."
    );
    metrics::describe_counter!(UPSTREAM_CALLS, "Outbound upstream calls dispatched.");
    metrics::describe_counter!(
        UPSTREAM_CALL_FAILURES,
        "Outbound upstream calls that failed, timed out, or returned a bad payload."
    );
}
