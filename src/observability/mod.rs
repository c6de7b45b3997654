//! Observability: metrics and tracing helpers.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `padflow_buffers_pushed` | Counter | Buffers pushed across a pad link |
//! | `padflow_bytes_pushed` | Counter | Payload bytes pushed across a pad link |
//! | `padflow_buffers_dropped` | Counter | Buffers dropped by leaky queues or full app sinks |
//! | `padflow_bus_messages` | Counter | Messages posted on a bus, by type |
//! | `padflow_state_changes` | Counter | Committed element state changes |
//! | `padflow_queue_level_bytes` | Gauge | Bytes currently held by a queue |
//!
//! Nothing is exported unless the application installs a `metrics` recorder.
//!
//! ## Tracing
//!
//! All engine logging goes through `tracing` with the element name as a
//! structured field. [`span_pipeline`] and [`span_element`] create spans for
//! applications that want to group their own events.

mod metrics;
mod tracing_support;

pub use metrics::{
    init_metrics, record_buffer_dropped, record_buffer_pushed, record_bus_message,
    record_queue_level, record_state_change,
};
pub use tracing_support::{span_element, span_pipeline};
