//! Relay metrics.
//!
//! Recorded through the [`metrics`] facade; nothing is exported unless the
//! embedding process installs a recorder.

/// Metric names used throughout the relay.
pub mod names {
    /// Total worker registrations.
    pub const SESSIONS_REGISTERED_TOTAL: &str = "relay_sessions_registered_total";
    /// Total calls submitted by callers.
    pub const CALLS_TOTAL: &str = "relay_calls_total";
    /// Total calls whose caller gave up waiting.
    pub const CALL_TIMEOUTS_TOTAL: &str = "relay_call_timeouts_total";
    /// Total requests handed to workers.
    pub const DISPATCHED_TOTAL: &str = "relay_dispatched_total";
    /// Total responses matched to an in-flight request.
    pub const RESPONSES_TOTAL: &str = "relay_responses_total";
    /// Total responses with no matching in-flight request.
    pub const STALE_RESPONSES_TOTAL: &str = "relay_stale_responses_total";
    /// Total polls that ended without work.
    pub const POLLS_EMPTY_TOTAL: &str = "relay_polls_empty_total";
    /// Time from call submission to result, in seconds.
    pub const CALL_DURATION_SECONDS: &str = "relay_call_duration_seconds";
}

/// Convenience functions for recording metrics.
pub mod record {
    use core::time::Duration;

    use metrics::{counter, histogram};

    use super::names;

    /// Record a worker registering.
    pub fn session_registered() {
        counter!(names::SESSIONS_REGISTERED_TOTAL).increment(1);
    }

    /// Record a call being submitted.
    pub fn call_submitted() {
        counter!(names::CALLS_TOTAL).increment(1);
    }

    /// Record a caller's wait timing out.
    pub fn call_timed_out() {
        counter!(names::CALL_TIMEOUTS_TOTAL).increment(1);
    }

    /// Record a completed call.
    pub fn call_completed(elapsed: Duration) {
        histogram!(names::CALL_DURATION_SECONDS).record(elapsed.as_secs_f64());
    }

    /// Record a request being handed to a worker.
    pub fn dispatched() {
        counter!(names::DISPATCHED_TOTAL).increment(1);
    }

    /// Record a response, labeled by whether it matched an in-flight request.
    pub fn response(matched: bool) {
        if matched {
            counter!(names::RESPONSES_TOTAL).increment(1);
        } else {
            counter!(names::STALE_RESPONSES_TOTAL).increment(1);
        }
    }

    /// Record a poll that found no work.
    pub fn poll_empty() {
        counter!(names::POLLS_EMPTY_TOTAL).increment(1);
    }
}
