//! Metrics collection using metrics-rs.

use metrics::{Unit, counter, gauge};
use std::sync::atomic::{AtomicBool, Ordering};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

const BUFFERS_PUSHED: &str = "padflow_buffers_pushed";
const BYTES_PUSHED: &str = "padflow_bytes_pushed";
const BUFFERS_DROPPED: &str = "padflow_buffers_dropped";
const BUS_MESSAGES: &str = "padflow_bus_messages";
const STATE_CHANGES: &str = "padflow_state_changes";
const QUEUE_LEVEL_BYTES: &str = "padflow_queue_level_bytes";

/// Describe all metrics.
///
/// Call once at application startup after installing a recorder. Subsequent
/// calls are no-ops.
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        BUFFERS_PUSHED,
        Unit::Count,
        "Buffers pushed from a src pad to its peer"
    );
    metrics::describe_counter!(
        BYTES_PUSHED,
        Unit::Bytes,
        "Payload bytes pushed from a src pad to its peer"
    );
    metrics::describe_counter!(
        BUFFERS_DROPPED,
        Unit::Count,
        "Buffers dropped by leaky queues and full app sinks"
    );
    metrics::describe_counter!(BUS_MESSAGES, Unit::Count, "Messages posted on a bus");
    metrics::describe_counter!(
        STATE_CHANGES,
        Unit::Count,
        "State transitions committed by elements"
    );
    metrics::describe_gauge!(
        QUEUE_LEVEL_BYTES,
        Unit::Bytes,
        "Bytes currently held by a queue element"
    );
}

/// Record a buffer pushed by `element`.
#[inline]
pub fn record_buffer_pushed(element: &str, bytes: usize) {
    counter!(BUFFERS_PUSHED, "element" => element.to_string()).increment(1);
    counter!(BYTES_PUSHED, "element" => element.to_string()).increment(bytes as u64);
}

/// Record a buffer dropped by `element`.
#[inline]
pub fn record_buffer_dropped(element: &str) {
    counter!(BUFFERS_DROPPED, "element" => element.to_string()).increment(1);
}

/// Record a message posted on a bus.
#[inline]
pub fn record_bus_message(message_type: &'static str) {
    counter!(BUS_MESSAGES, "type" => message_type).increment(1);
}

/// Record a committed state change.
#[inline]
pub fn record_state_change(element: &str, new_state: &'static str) {
    counter!(STATE_CHANGES, "element" => element.to_string(), "state" => new_state).increment(1);
}

/// Record the current byte level of a queue.
#[inline]
pub fn record_queue_level(element: &str, bytes: u64) {
    gauge!(QUEUE_LEVEL_BYTES, "element" => element.to_string()).set(bytes as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        init_metrics();
        init_metrics();
        record_buffer_pushed("src", 128);
        record_buffer_dropped("queue0");
        record_bus_message("eos");
        record_state_change("sink", "PLAYING");
        record_queue_level("queue0", 4096);
    }
}
