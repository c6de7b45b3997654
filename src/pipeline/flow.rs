//! Backpressure signalling between linked pads.
//!
//! Every sink pad owns a [`SharedFlowState`]. When a src pad links to it, the
//! src pad adopts the same handle, so the producer upstream of a queue can see
//! the queue's fill state without calling into it:
//!
//! ```text
//! Producer ──buffers──> Queue sink pad ──> worker thread ──> Consumer
//!     ^                      │
//!     └── FlowSignal::Busy ──┘   (set while the queue is full)
//! ```
//!
//! Queues flip the signal to `Busy` when any of their limits is reached and
//! back to `Ready` once a buffer has been taken out. Each `Ready` to `Busy`
//! transition counts as one backpressure event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Flow signal from downstream to upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FlowSignal {
    /// Downstream accepts data.
    #[default]
    Ready = 0,
    /// Downstream is full; the next push will block (or drop, if leaky).
    Busy = 1,
}

impl FlowSignal {
    /// Whether the signal indicates backpressure.
    #[inline]
    pub fn is_backpressure(&self) -> bool {
        matches!(self, FlowSignal::Busy)
    }
}

impl From<u8> for FlowSignal {
    fn from(value: u8) -> Self {
        match value {
            1 => FlowSignal::Busy,
            _ => FlowSignal::Ready,
        }
    }
}

/// Flow state shared between the two ends of a link.
#[derive(Debug, Default)]
pub struct SharedFlowState {
    signal: AtomicU8,
    buffers_dropped: AtomicU64,
    backpressure_events: AtomicU64,
}

impl SharedFlowState {
    /// Create a new flow state in the `Ready` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current signal.
    #[inline]
    pub fn signal(&self) -> FlowSignal {
        FlowSignal::from(self.signal.load(Ordering::Acquire))
    }

    /// Set the signal, counting `Ready` to `Busy` transitions.
    #[inline]
    pub fn set_signal(&self, signal: FlowSignal) {
        let old = self.signal.swap(signal as u8, Ordering::AcqRel);
        if signal == FlowSignal::Busy && FlowSignal::from(old) != FlowSignal::Busy {
            self.backpressure_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a buffer dropped by a leaky element.
    pub fn record_drop(&self) {
        self.buffers_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Buffers dropped so far.
    pub fn buffers_dropped(&self) -> u64 {
        self.buffers_dropped.load(Ordering::Relaxed)
    }

    /// Number of `Ready` to `Busy` transitions so far.
    pub fn backpressure_events(&self) -> u64 {
        self.backpressure_events.load(Ordering::Relaxed)
    }
}

/// Handle to shared flow state.
pub type FlowStateHandle = Arc<SharedFlowState>;

/// Create a new flow state handle.
pub fn new_flow_state() -> FlowStateHandle {
    Arc::new(SharedFlowState::new())
}
