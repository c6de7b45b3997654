//! In-band events.
//!
//! Events travel downstream through pads in order with buffers. `StreamStart`
//! and `Caps` are sticky: a src pad remembers the last one of each kind and
//! replays them to a new peer before the next buffer, so elements linked
//! after streaming started still learn the format.
//!
//! `FlushStart` is not serialized. It overtakes data so that a blocked
//! element (a full queue, a prerolled sink) can be released; `FlushStop` ends
//! the flush and is serialized again.
//!
//! ```rust
//! use padflow::caps::Caps;
//! use padflow::event::Event;
//!
//! let event = Event::Caps(Caps::new_empty_simple("audio/x-raw"));
//! assert!(event.is_sticky());
//! assert!(!Event::FlushStart.is_serialized());
//! ```

use crate::caps::Caps;

/// Events that flow through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// First event of a stream.
    StreamStart {
        /// Identifier of the stream.
        stream_id: String,
    },
    /// Format of the buffers that follow.
    Caps(Caps),
    /// No more data on this pad.
    Eos,
    /// Discard queued data and unblock waiting threads.
    FlushStart,
    /// Resume after a flush.
    FlushStop,
}

impl Event {
    /// Whether the event is kept on the src pad and replayed to new peers.
    pub fn is_sticky(&self) -> bool {
        matches!(self, Self::StreamStart { .. } | Self::Caps(_))
    }

    /// Whether the event keeps its order relative to buffers.
    pub fn is_serialized(&self) -> bool {
        !matches!(self, Self::FlushStart)
    }

    /// Whether two events are of the same kind (ignoring payloads).
    pub fn same_kind(&self, other: &Event) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    /// Short name used in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::StreamStart { .. } => "stream-start",
            Self::Caps(_) => "caps",
            Self::Eos => "eos",
            Self::FlushStart => "flush-start",
            Self::FlushStop => "flush-stop",
        }
    }
}
