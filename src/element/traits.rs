//! The trait implemented by element behaviour.

use super::{Element, Pad, PadDirection, PropertyValue, StateChange, StateChangeSuccess};
use crate::buffer::Buffer;
use crate::bus::Message;
use crate::caps::Caps;
use crate::error::{FlowError, FlowResult, PropertyError, StateChangeError};
use crate::event::Event;
use std::any::Any;
use tracing::error;

/// Upcast to [`Any`], implemented for every `'static` type.
pub trait AsAny: Any {
    /// `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Behaviour of an element.
///
/// The engine owns pads, state bookkeeping, signals and message routing in
/// [`Element`]; an implementation only reacts to the calls below. Methods
/// take `&self` because they are called from several threads at once (the
/// application thread changes state while a streaming thread calls
/// [`chain`](ElementImpl::chain)); keep mutable state behind locks.
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
///
/// /// Counts buffers and passes them on.
/// #[derive(Default)]
/// struct Counter {
///     seen: std::sync::atomic::AtomicU64,
/// }
///
/// impl ElementImpl for Counter {
///     fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
///         self.seen.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///         element.static_pad("src").ok_or(FlowError::NotLinked)?.push(buffer)
///     }
/// }
///
/// let element = Element::new(
///     "counter",
///     vec![
///         PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any()),
///         PadTemplate::new("src", PadDirection::Src, PadPresence::Always, Caps::new_any()),
///     ],
///     Counter::default(),
/// );
/// assert_eq!(element.pads().len(), 2);
/// ```
pub trait ElementImpl: AsAny + Send + Sync + 'static {
    /// Perform one state transition.
    ///
    /// Return `Async` when the transition completes later; the element must
    /// then call [`Element::continue_state`] once it has.
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
        let _ = (element, transition);
        Ok(StateChangeSuccess::Success)
    }

    /// Handle a buffer arriving on a sink pad.
    fn chain(&self, element: &Element, pad: &Pad, buffer: Buffer) -> FlowResult {
        let _ = buffer;
        error!(element = %element.name(), pad = %pad.name(), "element has no chain function");
        Err(FlowError::Error)
    }

    /// Handle an event arriving on a sink pad. Forwards to all src pads by
    /// default.
    fn sink_event(&self, element: &Element, pad: &Pad, event: Event) -> bool {
        let _ = pad;
        element.forward_event(event)
    }

    /// Answer a caps query on one of the element's pads.
    ///
    /// The default answers with the pad template caps; the engine applies
    /// the caller's filter afterwards.
    fn query_caps(&self, element: &Element, pad: &Pad, filter: Option<&Caps>) -> Caps {
        let _ = (element, filter);
        pad.template_caps()
    }

    /// Pick fixed caps from non-fixed `caps` negotiated on src `pad`.
    fn fixate_caps(&self, element: &Element, pad: &Pad, caps: Caps) -> Caps {
        let _ = (element, pad);
        caps.fixate()
    }

    /// Set a property.
    fn set_property(
        &self,
        element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        let _ = (element, value);
        Err(PropertyError::unknown(name))
    }

    /// Read a property.
    fn property(&self, element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        let _ = element;
        Err(PropertyError::unknown(name))
    }

    /// Names of the action signals the element emits (`"overrun"`, ...).
    fn signals(&self) -> &'static [&'static str] {
        &[]
    }

    /// Whether the element consumes data without producing any. Bins use
    /// this for EOS aggregation and state ordering.
    fn is_sink(&self, element: &Element) -> bool {
        let templates = element.pad_templates();
        templates.iter().any(|t| t.direction() == PadDirection::Sink)
            && !templates.iter().any(|t| t.direction() == PadDirection::Src)
    }

    /// Handle a message posted by a child. Only bins have children; the
    /// default forwards upward.
    fn handle_message(&self, element: &Element, message: Message) {
        element.post_message(message);
    }

    /// Join helper threads once the element reached NULL. Runs without any
    /// element lock held.
    fn join_threads(&self, element: &Element) {
        let _ = element;
    }
}
