//! Client Metrics
//!
//! Counters recorded through the `metrics` facade. The library installs no
//! recorder; an application that wants these exported installs one and may
//! call [`describe_metrics`] to attach descriptions.
//!
//! # Metrics
//!
//! - **Frames**: outbound frames by action, inbound frames, malformed frames
//! - **Connection**: reconnect attempts scheduled
//! - **Requests**: requests and submissions that timed out

use metrics::{counter, describe_counter};

/// Outbound frames by action.
pub const FRAMES_SENT: &str = "c9t_client_frames_sent_total";

/// Inbound frames received.
pub const FRAMES_RECEIVED: &str = "c9t_client_frames_received_total";

/// Inbound frames dropped because they could not be decoded.
pub const MALFORMED_FRAMES: &str = "c9t_client_malformed_frames_total";

/// Reconnect attempts scheduled.
pub const RECONNECTS: &str = "c9t_client_reconnects_total";

/// Requests or submissions resolved by timeout.
pub const REQUEST_TIMEOUTS: &str = "c9t_client_request_timeouts_total";

// =============================================================================
// Metric Registration
// =============================================================================

/// Attach descriptions to every client metric.
pub fn describe_metrics() {
    describe_counter!(FRAMES_SENT, "Total frames sent to the socket by action");
    describe_counter!(FRAMES_RECEIVED, "Total frames received from the socket");
    describe_counter!(
        MALFORMED_FRAMES,
        "Total inbound frames dropped because they were not [event, ...args] arrays"
    );
    describe_counter!(RECONNECTS, "Total reconnect attempts scheduled");
    describe_counter!(
        REQUEST_TIMEOUTS,
        "Total requests and submissions that received no response in time"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record an outbound frame.
pub fn record_frame_sent(action: &'static str) {
    counter!(FRAMES_SENT, "action" => action).increment(1);
}

/// Record an inbound frame.
pub fn record_frame_received() {
    counter!(FRAMES_RECEIVED).increment(1);
}

/// Record an inbound frame that failed to decode.
pub fn record_malformed_frame() {
    counter!(MALFORMED_FRAMES).increment(1);
}

/// Record a scheduled reconnect.
pub fn record_reconnect() {
    counter!(RECONNECTS).increment(1);
}

/// Record a request timeout.
pub fn record_request_timeout() {
    counter!(REQUEST_TIMEOUTS).increment(1);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        describe_metrics();
        record_frame_sent("subscribe");
        record_frame_received();
        record_malformed_frame();
        record_reconnect();
        record_request_timeout();
    }

    #[test]
    fn metric_names_share_prefix() {
        for name in [
            FRAMES_SENT,
            FRAMES_RECEIVED,
            MALFORMED_FRAMES,
            RECONNECTS,
            REQUEST_TIMEOUTS,
        ] {
            assert!(name.starts_with("c9t_client_"));
            assert!(name.ends_with("_total"));
        }
    }
}
