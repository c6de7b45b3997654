//! Bus messages.

use crate::caps::Structure;
use crate::element::{Element, State};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SEQNUM: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Message types
// ============================================================================

/// Set of message types, used to filter bus pops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct MessageType(u32);

impl MessageType {
    /// No type.
    pub const NONE: Self = Self(0);
    /// Fatal error.
    pub const ERROR: Self = Self(1 << 0);
    /// Non-fatal problem.
    pub const WARNING: Self = Self(1 << 1);
    /// Informational.
    pub const INFO: Self = Self(1 << 2);
    /// End of stream reached by every sink.
    pub const EOS: Self = Self(1 << 3);
    /// An element committed a state change.
    pub const STATE_CHANGED: Self = Self(1 << 4);
    /// An async state change completed.
    pub const ASYNC_DONE: Self = Self(1 << 5);
    /// A stream started.
    pub const STREAM_START: Self = Self(1 << 6);
    /// Element-specific message.
    pub const ELEMENT: Self = Self(1 << 7);
    /// Posted by the application.
    pub const APPLICATION: Self = Self(1 << 8);
    /// The pipeline selected a clock.
    pub const NEW_CLOCK: Self = Self(1 << 9);
    /// Latency needs recalculating.
    pub const LATENCY: Self = Self(1 << 10);
    /// Every type.
    pub const ANY: Self = Self(u32::MAX);

    /// Whether all types in `other` are in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0 && other.0 != 0
    }

    /// Union of two sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Lower-case name of a single type.
    pub fn name(self) -> &'static str {
        match self {
            Self::ERROR => "error",
            Self::WARNING => "warning",
            Self::INFO => "info",
            Self::EOS => "eos",
            Self::STATE_CHANGED => "state-changed",
            Self::ASYNC_DONE => "async-done",
            Self::STREAM_START => "stream-start",
            Self::ELEMENT => "element",
            Self::APPLICATION => "application",
            Self::NEW_CLOCK => "new-clock",
            Self::LATENCY => "latency",
            _ => "unknown",
        }
    }
}

impl std::ops::BitOr for MessageType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

// ============================================================================
// Message
// ============================================================================

/// Payload of a message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageView {
    /// Fatal error. The pipeline should be stopped.
    Error {
        /// Human-readable error.
        error: String,
        /// Extra detail for developers.
        debug: Option<String>,
    },
    /// Non-fatal problem.
    Warning {
        /// Human-readable warning.
        warning: String,
        /// Extra detail for developers.
        debug: Option<String>,
    },
    /// Informational.
    Info {
        /// Human-readable text.
        info: String,
        /// Extra detail for developers.
        debug: Option<String>,
    },
    /// End of stream.
    Eos,
    /// A committed state change.
    StateChanged {
        /// State before.
        old: State,
        /// State now.
        current: State,
        /// Final target, when the element has further to go.
        pending: Option<State>,
    },
    /// An async state change completed.
    AsyncDone,
    /// A stream started.
    StreamStart,
    /// Element-specific payload.
    Element(Structure),
    /// Application payload.
    Application(Structure),
    /// The pipeline selected a clock.
    NewClock {
        /// Clock name.
        clock: String,
    },
    /// Latency needs recalculating.
    Latency,
}

/// An immutable message posted on a bus.
#[derive(Debug, Clone)]
pub struct Message {
    seqnum: u64,
    source: Option<Element>,
    view: MessageView,
}

impl Message {
    /// Create a message.
    pub fn new(view: MessageView, source: Option<&Element>) -> Self {
        Self {
            seqnum: NEXT_SEQNUM.fetch_add(1, Ordering::Relaxed),
            source: source.cloned(),
            view,
        }
    }

    /// Error message.
    pub fn error(source: &Element, error: impl Into<String>, debug: Option<String>) -> Self {
        Self::new(
            MessageView::Error {
                error: error.into(),
                debug,
            },
            Some(source),
        )
    }

    /// Warning message.
    pub fn warning(source: &Element, warning: impl Into<String>, debug: Option<String>) -> Self {
        Self::new(
            MessageView::Warning {
                warning: warning.into(),
                debug,
            },
            Some(source),
        )
    }

    /// End-of-stream message.
    pub fn eos(source: &Element) -> Self {
        Self::new(MessageView::Eos, Some(source))
    }

    /// State change message.
    pub fn state_changed(source: &Element, old: State, current: State, pending: Option<State>) -> Self {
        Self::new(
            MessageView::StateChanged {
                old,
                current,
                pending,
            },
            Some(source),
        )
    }

    /// Async-done message.
    pub fn async_done(source: &Element) -> Self {
        Self::new(MessageView::AsyncDone, Some(source))
    }

    /// Stream-start message.
    pub fn stream_start(source: &Element) -> Self {
        Self::new(MessageView::StreamStart, Some(source))
    }

    /// Element-specific message.
    pub fn element(source: &Element, structure: Structure) -> Self {
        Self::new(MessageView::Element(structure), Some(source))
    }

    /// Application message, usually posted from outside the pipeline.
    pub fn application(structure: Structure) -> Self {
        Self::new(MessageView::Application(structure), None)
    }

    /// Payload.
    pub fn view(&self) -> &MessageView {
        &self.view
    }

    /// Type of the payload.
    pub fn type_(&self) -> MessageType {
        match self.view {
            MessageView::Error { .. } => MessageType::ERROR,
            MessageView::Warning { .. } => MessageType::WARNING,
            MessageView::Info { .. } => MessageType::INFO,
            MessageView::Eos => MessageType::EOS,
            MessageView::StateChanged { .. } => MessageType::STATE_CHANGED,
            MessageView::AsyncDone => MessageType::ASYNC_DONE,
            MessageView::StreamStart => MessageType::STREAM_START,
            MessageView::Element(_) => MessageType::ELEMENT,
            MessageView::Application(_) => MessageType::APPLICATION,
            MessageView::NewClock { .. } => MessageType::NEW_CLOCK,
            MessageView::Latency => MessageType::LATENCY,
        }
    }

    /// Element that posted the message.
    pub fn source(&self) -> Option<&Element> {
        self.source.as_ref()
    }

    /// Name of the posting element.
    pub fn src_name(&self) -> Option<&str> {
        self.source.as_ref().map(Element::name)
    }

    /// Whether the message was posted by `element`.
    pub fn is_from(&self, element: &Element) -> bool {
        self.source.as_ref() == Some(element)
    }

    /// Posting order; increases across all buses.
    pub fn seqnum(&self) -> u64 {
        self.seqnum
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let src = self.src_name().unwrap_or("application");
        match &self.view {
            MessageView::Error { error, debug } => {
                write!(f, "Error received from element {src}: {error}")?;
                if let Some(debug) = debug {
                    write!(f, " ({debug})")?;
                }
                Ok(())
            }
            MessageView::Warning { warning, .. } => write!(f, "Warning from {src}: {warning}"),
            MessageView::Info { info, .. } => write!(f, "Info from {src}: {info}"),
            MessageView::StateChanged { old, current, .. } => {
                write!(f, "{src} state changed from {old} to {current}")
            }
            MessageView::Element(s) | MessageView::Application(s) => write!(f, "{src}: {s}"),
            MessageView::NewClock { clock } => write!(f, "{src} selected clock {clock}"),
            _ => write!(f, "{} from {src}", self.type_().name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_masks() {
        let mask = MessageType::ERROR | MessageType::EOS;
        assert!(mask.contains(MessageType::EOS));
        assert!(!mask.contains(MessageType::STATE_CHANGED));
        assert!(MessageType::ANY.contains(MessageType::LATENCY));
        assert!(!MessageType::ANY.contains(MessageType::NONE));
    }

    #[test]
    fn test_application_message() {
        let msg = Message::application(Structure::new("tick").field("n", 3));
        assert_eq!(msg.type_(), MessageType::APPLICATION);
        assert!(msg.source().is_none());
        assert_eq!(msg.to_string(), "application: tick, n=(int)3");
    }

    #[test]
    fn test_seqnums_increase() {
        let a = Message::application(Structure::new("a"));
        let b = Message::application(Structure::new("b"));
        assert!(b.seqnum() > a.seqnum());
    }
}
