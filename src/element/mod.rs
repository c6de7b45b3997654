//! Elements: the nodes of a pipeline graph.
//!
//! An [`Element`] is a shared handle to one node. It owns the node's pads,
//! its state, the handlers connected to its signals and its behaviour, an
//! [`ElementImpl`]. Handles are cheap to clone; two handles compare equal when
//! they refer to the same element.
//!
//! # Ownership
//!
//! A bin holds its children strongly and each child refers to its parent
//! weakly. Streaming threads hold strong handles to the element they run for
//! and are joined when the element reaches NULL, so dropping the last
//! application handle of a stopped pipeline frees the whole graph.
//!
//! # Signals
//!
//! `pad-added`, `pad-removed` and `no-more-pads` are typed
//! ([`Element::connect_pad_added`], ...). Elements declare further
//! notifications by name (`"overrun"` on a queue, `"need-data"` on an app
//! source); connect to those with [`Element::connect`]. Handlers run on the
//! thread that emits, with no engine lock held.

mod pad;
mod property;
mod signal;
mod state;
mod task;
mod traits;

pub use pad::{Pad, PadDirection, PadPresence, PadTemplate};
pub use property::PropertyValue;
pub use signal::SignalHandlerId;
pub use state::{State, StateChange, StateChangeResult, StateChangeSuccess};
pub use traits::{AsAny, ElementImpl};

pub(crate) use pad::PadInner;
pub(crate) use task::Task;

use crate::bus::{Bus, Message};
use crate::caps::Caps;
use crate::clock::{Clock, ClockTime};
use crate::error::{Error, LinkError, PropertyError, Result};
use crate::event::Event;
use crate::pipeline::factory::ElementFactory;
use signal::Signal;
use state::StateData;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, OnceLock, Weak};
use tracing::{debug, error, warn};

type PadHandler = dyn Fn(&Element, &Pad) + Send + Sync;
type ElementHandler = dyn Fn(&Element) + Send + Sync;

#[derive(Default)]
struct PadList {
    pads: Vec<Pad>,
    next_index: HashMap<String, u32>,
}

#[derive(Clone)]
pub(crate) struct ClockBinding {
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) base_time: ClockTime,
}

pub(crate) struct ElementInner {
    name: String,
    factory: OnceLock<&'static ElementFactory>,
    templates: Vec<PadTemplate>,
    pads: Mutex<PadList>,
    pub(crate) state: Mutex<StateData>,
    pub(crate) state_cond: Condvar,
    pub(crate) state_lock: Mutex<()>,
    parent: Mutex<Weak<ElementInner>>,
    bus: Option<Bus>,
    clock: Mutex<Option<ClockBinding>>,
    pad_added: Signal<PadHandler>,
    pad_removed: Signal<PadHandler>,
    no_more_pads: Signal<ElementHandler>,
    signals: Vec<(&'static str, Signal<ElementHandler>)>,
    imp: Box<dyn ElementImpl>,
}

/// Handle to an element.
#[derive(Clone)]
pub struct Element(pub(crate) Arc<ElementInner>);

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Element {}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("name", &self.0.name)
            .field("state", &self.current_state())
            .finish()
    }
}

impl Element {
    /// Create an element with the given pad templates and behaviour.
    ///
    /// One pad is created for each `Always` template.
    pub fn new(
        name: impl Into<String>,
        templates: Vec<PadTemplate>,
        imp: impl ElementImpl,
    ) -> Element {
        Self::build(name.into(), templates, Box::new(imp), None)
    }

    pub(crate) fn new_toplevel(
        name: impl Into<String>,
        imp: impl ElementImpl,
        bus: Bus,
    ) -> Element {
        Self::build(name.into(), Vec::new(), Box::new(imp), Some(bus))
    }

    fn build(
        name: String,
        templates: Vec<PadTemplate>,
        imp: Box<dyn ElementImpl>,
        bus: Option<Bus>,
    ) -> Element {
        let signals = imp
            .signals()
            .iter()
            .map(|name| (*name, Signal::new()))
            .collect();
        let element = Element(Arc::new(ElementInner {
            name,
            factory: OnceLock::new(),
            templates,
            pads: Mutex::new(PadList::default()),
            state: Mutex::new(StateData::default()),
            state_cond: Condvar::new(),
            state_lock: Mutex::new(()),
            parent: Mutex::new(Weak::new()),
            bus,
            clock: Mutex::new(None),
            pad_added: Signal::new(),
            pad_removed: Signal::new(),
            no_more_pads: Signal::new(),
            signals,
            imp,
        }));
        let always: Vec<Pad> = element
            .0
            .templates
            .iter()
            .filter(|t| t.presence() == PadPresence::Always)
            .map(|t| Pad::from_template(t, t.name_template()))
            .collect();
        {
            let mut list = element.0.pads.lock().unwrap();
            for pad in always {
                pad.set_parent(&element);
                list.pads.push(pad);
            }
        }
        element
    }

    /// Element name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Factory that created the element.
    pub fn factory(&self) -> Option<&'static ElementFactory> {
        self.0.factory.get().copied()
    }

    pub(crate) fn set_factory(&self, factory: &'static ElementFactory) {
        let _ = self.0.factory.set(factory);
    }

    /// Behaviour of the element, if it is a `T`.
    pub fn imp<T: ElementImpl>(&self) -> Option<&T> {
        self.0.imp.as_ref().as_any().downcast_ref::<T>()
    }

    pub(crate) fn imp_dyn(&self) -> &dyn ElementImpl {
        self.0.imp.as_ref()
    }

    /// Bin containing the element.
    pub fn parent(&self) -> Option<Element> {
        self.0.parent.lock().unwrap().upgrade().map(Element)
    }

    pub(crate) fn set_parent(&self, parent: Option<&Element>) -> Result<()> {
        let mut slot = self.0.parent.lock().unwrap();
        match parent {
            Some(parent) => {
                if slot.upgrade().is_some() {
                    return Err(Error::Element(format!(
                        "'{}' already has a parent",
                        self.name()
                    )));
                }
                *slot = Arc::downgrade(&parent.0);
            }
            None => *slot = Weak::new(),
        }
        Ok(())
    }

    /// Bus of the top-level pipeline above this element.
    pub fn bus(&self) -> Option<Bus> {
        match &self.0.bus {
            Some(bus) => Some(bus.clone()),
            None => self.parent()?.bus(),
        }
    }

    // -- pads --

    /// Pad templates.
    pub fn pad_templates(&self) -> &[PadTemplate] {
        &self.0.templates
    }

    /// Template named `name`.
    pub fn pad_template(&self, name: &str) -> Option<&PadTemplate> {
        self.0.templates.iter().find(|t| t.name_template() == name)
    }

    /// All pads, in creation order.
    pub fn pads(&self) -> Vec<Pad> {
        self.0.pads.lock().unwrap().pads.clone()
    }

    /// Src pads.
    pub fn src_pads(&self) -> Vec<Pad> {
        self.pads_with(PadDirection::Src)
    }

    /// Sink pads.
    pub fn sink_pads(&self) -> Vec<Pad> {
        self.pads_with(PadDirection::Sink)
    }

    fn pads_with(&self, direction: PadDirection) -> Vec<Pad> {
        self.0
            .pads
            .lock()
            .unwrap()
            .pads
            .iter()
            .filter(|p| p.direction() == direction)
            .cloned()
            .collect()
    }

    /// Pad named `name`.
    pub fn static_pad(&self, name: &str) -> Option<Pad> {
        self.0
            .pads
            .lock()
            .unwrap()
            .pads
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Add a pad and emit `pad-added`.
    ///
    /// The pad is activated when the element is already running.
    pub fn add_pad(&self, pad: &Pad) -> Result<()> {
        {
            let mut list = self.0.pads.lock().unwrap();
            if list.pads.iter().any(|p| p.name() == pad.name()) {
                return Err(Error::Element(format!(
                    "'{}' already has a pad named '{}'",
                    self.name(),
                    pad.name()
                )));
            }
            pad.set_parent(self);
            list.pads.push(pad.clone());
        }
        self.activate_if_running(pad);
        debug!(element = %self.name(), pad = %pad.name(), "pad added");
        for handler in self.0.pad_added.handlers() {
            handler(self, pad);
        }
        Ok(())
    }

    /// Remove a pad, unlinking it first, and emit `pad-removed`.
    pub fn remove_pad(&self, pad: &Pad) -> Result<()> {
        {
            let mut list = self.0.pads.lock().unwrap();
            let Some(index) = list.pads.iter().position(|p| p == pad) else {
                return Err(Error::PadNotFound {
                    element: self.name().to_string(),
                    pad: pad.name().to_string(),
                });
            };
            list.pads.remove(index);
        }
        pad.set_active(false);
        pad.unlink_peer();
        pad.clear_parent();
        debug!(element = %self.name(), pad = %pad.name(), "pad removed");
        for handler in self.0.pad_removed.handlers() {
            handler(self, pad);
        }
        Ok(())
    }

    /// Announce that no further sometimes pads will appear.
    pub fn no_more_pads(&self) {
        for handler in self.0.no_more_pads.handlers() {
            handler(self);
        }
    }

    /// Create a pad from the request template `template_name`.
    ///
    /// Names come from a per-template counter that only grows, so released
    /// names are never reused.
    pub fn request_pad(&self, template_name: &str) -> Result<Pad> {
        let template = self
            .pad_template(template_name)
            .filter(|t| t.presence() == PadPresence::Request)
            .ok_or_else(|| Error::PadNotFound {
                element: self.name().to_string(),
                pad: template_name.to_string(),
            })?;
        let pad = {
            let mut list = self.0.pads.lock().unwrap();
            let counter = list
                .next_index
                .entry(template_name.to_string())
                .or_insert(0);
            let pad = Pad::from_template(template, template.instance_name(*counter));
            *counter += 1;
            pad.set_parent(self);
            list.pads.push(pad.clone());
            pad
        };
        self.activate_if_running(&pad);
        debug!(element = %self.name(), pad = %pad.name(), "request pad created");
        for handler in self.0.pad_added.handlers() {
            handler(self, &pad);
        }
        Ok(pad)
    }

    /// Release a pad obtained from [`request_pad`](Self::request_pad).
    ///
    /// Waits for a buffer currently passing the pad, then deactivates,
    /// unlinks and removes it.
    pub fn release_request_pad(&self, pad: &Pad) -> Result<()> {
        if pad.presence() != PadPresence::Request || pad.parent_element().as_ref() != Some(self) {
            return Err(Error::Element(format!(
                "'{}' is not a request pad of '{}'",
                pad.name(),
                self.name()
            )));
        }
        {
            let _drain = pad.stream_lock();
            pad.set_active(false);
        }
        self.remove_pad(pad)
    }

    fn activate_if_running(&self, pad: &Pad) {
        let st = self.0.state.lock().unwrap();
        let running = st.current >= State::Paused || st.next >= Some(State::Paused);
        drop(st);
        if running {
            pad.set_active(true);
        }
    }

    /// Push `event` on every src pad; true if any peer accepted it.
    pub fn forward_event(&self, event: Event) -> bool {
        let pads = self.src_pads();
        if pads.is_empty() {
            return true;
        }
        pads.into_iter()
            .map(|pad| pad.push_event(event.clone()))
            .fold(false, |any, ok| any || ok)
    }

    // -- linking --

    /// Link this element to `dest`.
    ///
    /// Tries each unlinked src pad against each unlinked sink pad of `dest`
    /// (requesting pads from request templates when needed) and keeps the
    /// first pair that negotiates.
    pub fn link(&self, dest: &Element) -> Result<()> {
        let mut last_error = LinkError::NoPads;
        let mut sources: Vec<(Pad, bool)> = self
            .src_pads()
            .into_iter()
            .filter(|p| !p.is_linked() && p.presence() != PadPresence::Request)
            .map(|p| (p, false))
            .collect();
        if sources.is_empty() {
            if let Some(template) = self
                .pad_templates()
                .iter()
                .find(|t| t.direction() == PadDirection::Src && t.presence() == PadPresence::Request)
            {
                let pad = self.request_pad(template.name_template())?;
                sources.push((pad, true));
            }
        }

        for (src, requested) in sources {
            match self.link_pad_to(&src, dest) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    last_error = err;
                    if requested {
                        let _ = self.release_request_pad(&src);
                    }
                }
            }
        }
        debug!(src = %self.name(), dest = %dest.name(), error = %last_error, "element link failed");
        Err(Error::Link(last_error))
    }

    fn link_pad_to(&self, src: &Pad, dest: &Element) -> std::result::Result<(), LinkError> {
        let mut last_error = LinkError::NoPads;
        for sink in dest.sink_pads().into_iter().filter(|p| !p.is_linked()) {
            match src.link(&sink) {
                Ok(()) => return Ok(()),
                Err(err) => last_error = err,
            }
        }
        let request = dest
            .pad_templates()
            .iter()
            .find(|t| t.direction() == PadDirection::Sink && t.presence() == PadPresence::Request)
            .map(|t| t.name_template().to_string());
        if let Some(template) = request {
            let sink = dest.request_pad(&template).map_err(|_| LinkError::NoPads)?;
            match src.link(&sink) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    let _ = dest.release_request_pad(&sink);
                    last_error = err;
                }
            }
        }
        Err(last_error)
    }

    /// Link the named pads of this element and `dest`.
    pub fn link_pads(&self, src_pad: &str, dest: &Element, sink_pad: &str) -> Result<()> {
        let src = self.static_pad(src_pad).ok_or_else(|| Error::PadNotFound {
            element: self.name().to_string(),
            pad: src_pad.to_string(),
        })?;
        let sink = dest.static_pad(sink_pad).ok_or_else(|| Error::PadNotFound {
            element: dest.name().to_string(),
            pad: sink_pad.to_string(),
        })?;
        src.link(&sink)?;
        Ok(())
    }

    /// Link each element to the next.
    pub fn link_many(elements: &[&Element]) -> Result<()> {
        for pair in elements.windows(2) {
            pair[0].link(pair[1])?;
        }
        Ok(())
    }

    /// Remove every link from this element's src pads to `dest`.
    pub fn unlink(&self, dest: &Element) {
        for pad in self.src_pads() {
            if let Some(peer) = pad.peer() {
                let peer_element = peer.parent_element();
                if peer_element.as_ref() == Some(dest) || dest.owns_ghost_for(&peer) {
                    pad.unlink(&peer);
                }
            }
        }
    }

    fn owns_ghost_for(&self, target: &Pad) -> bool {
        self.sink_pads()
            .iter()
            .any(|p| p.ghost_target().as_ref() == Some(target))
    }

    // -- properties --

    /// Set a property.
    pub fn set_property(
        &self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> std::result::Result<(), PropertyError> {
        let value = value.into();
        if name == "name" {
            return Err(PropertyError::invalid(name, "read-only"));
        }
        debug!(element = %self.name(), property = name, value = %value, "set property");
        self.imp_dyn().set_property(self, name, &value)
    }

    /// Read a property.
    pub fn property(&self, name: &str) -> std::result::Result<PropertyValue, PropertyError> {
        if name == "name" {
            return Ok(PropertyValue::Str(self.name().to_string()));
        }
        self.imp_dyn().property(self, name)
    }

    // -- signals --

    /// Call `f` whenever a pad is added.
    pub fn connect_pad_added<F>(&self, f: F) -> SignalHandlerId
    where
        F: Fn(&Element, &Pad) + Send + Sync + 'static,
    {
        self.0.pad_added.connect(Arc::new(f))
    }

    /// Call `f` whenever a pad is removed.
    pub fn connect_pad_removed<F>(&self, f: F) -> SignalHandlerId
    where
        F: Fn(&Element, &Pad) + Send + Sync + 'static,
    {
        self.0.pad_removed.connect(Arc::new(f))
    }

    /// Call `f` when the element announces it has created all its pads.
    pub fn connect_no_more_pads<F>(&self, f: F) -> SignalHandlerId
    where
        F: Fn(&Element) + Send + Sync + 'static,
    {
        self.0.no_more_pads.connect(Arc::new(f))
    }

    /// Connect to a signal declared by the element.
    pub fn connect<F>(&self, signal: &str, f: F) -> Result<SignalHandlerId>
    where
        F: Fn(&Element) + Send + Sync + 'static,
    {
        let slot = self.signal(signal)?;
        Ok(slot.connect(Arc::new(f)))
    }

    /// Disconnect a handler from whichever signal it is connected to.
    pub fn disconnect(&self, id: SignalHandlerId) -> bool {
        self.0.pad_added.disconnect(id)
            || self.0.pad_removed.disconnect(id)
            || self.0.no_more_pads.disconnect(id)
            || self.0.signals.iter().any(|(_, s)| s.disconnect(id))
    }

    /// Emit a declared signal.
    pub fn emit_by_name(&self, signal: &str) -> Result<()> {
        let slot = self.signal(signal)?;
        for handler in slot.handlers() {
            handler(self);
        }
        Ok(())
    }

    fn signal(&self, name: &str) -> Result<&Signal<ElementHandler>> {
        self.0
            .signals
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, s)| s)
            .ok_or_else(|| {
                Error::Element(format!("'{}' has no signal named '{name}'", self.name()))
            })
    }

    // -- messages --

    /// Post a message toward the bus: to the parent bin, or to the element's
    /// own bus at the top level. Returns false when nobody takes it.
    pub fn post_message(&self, message: Message) -> bool {
        if let Some(parent) = self.parent() {
            parent.imp_dyn().handle_message(&parent, message);
            return true;
        }
        match &self.0.bus {
            Some(bus) => bus.post(message),
            None => false,
        }
    }

    /// Log and post an error message.
    pub fn post_error(&self, text: &str, debug: Option<String>) {
        let debug_info = &debug;
        error!(element = %self.name(), error = text, debug = ?debug_info, "posting error");
        self.post_message(Message::error(self, text, debug));
    }

    /// Log and post a warning message.
    pub fn post_warning(&self, text: &str, debug: Option<String>) {
        let debug_info = &debug;
        warn!(element = %self.name(), warning = text, debug = ?debug_info, "posting warning");
        self.post_message(Message::warning(self, text, debug));
    }

    /// Whether the element is a sink.
    pub fn is_sink(&self) -> bool {
        self.imp_dyn().is_sink(self)
    }

    // -- clock --

    /// Clock the element synchronizes against.
    pub fn clock(&self) -> Option<Arc<dyn Clock>> {
        self.0.clock.lock().unwrap().as_ref().map(|b| Arc::clone(&b.clock))
    }

    /// Clock time corresponding to running time zero.
    pub fn base_time(&self) -> Option<ClockTime> {
        self.0.clock.lock().unwrap().as_ref().map(|b| b.base_time)
    }

    /// Time spent in PLAYING, according to the element's clock.
    pub fn running_time(&self) -> Option<ClockTime> {
        let binding = self.0.clock.lock().unwrap().clone()?;
        Some(binding.clock.time().saturating_sub(binding.base_time))
    }

    pub(crate) fn clock_binding(&self) -> Option<ClockBinding> {
        self.0.clock.lock().unwrap().clone()
    }

    pub(crate) fn set_clock_binding(&self, binding: Option<ClockBinding>) {
        *self.0.clock.lock().unwrap() = binding;
    }

    /// Caps currently negotiated on the pad named `pad`.
    pub fn pad_caps(&self, pad: &str) -> Option<Caps> {
        self.static_pad(pad)?.current_caps()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::Buffer;
    use crate::error::{FlowError, FlowResult, FlowSuccess};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Passthrough;

    impl ElementImpl for Passthrough {
        fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
            element
                .static_pad("src")
                .ok_or(FlowError::NotLinked)?
                .push(buffer)
        }
    }

    #[derive(Default)]
    struct Collect {
        count: AtomicUsize,
    }

    impl ElementImpl for Collect {
        fn chain(&self, _element: &Element, _pad: &Pad, _buffer: Buffer) -> FlowResult {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(FlowSuccess::Ok)
        }
    }

    fn any(name: &str, direction: PadDirection, presence: PadPresence) -> PadTemplate {
        PadTemplate::new(name, direction, presence, Caps::new_any())
    }

    fn filter(name: &str) -> Element {
        Element::new(
            name,
            vec![
                any("sink", PadDirection::Sink, PadPresence::Always),
                any("src", PadDirection::Src, PadPresence::Always),
            ],
            Passthrough,
        )
    }

    fn sink(name: &str) -> Element {
        Element::new(
            name,
            vec![any("sink", PadDirection::Sink, PadPresence::Always)],
            Collect::default(),
        )
    }

    #[test]
    fn test_always_pads_created() {
        let e = filter("f");
        assert_eq!(e.pads().len(), 2);
        assert_eq!(e.static_pad("src").unwrap().parent_element(), Some(e.clone()));
        assert!(!e.is_sink());
        assert!(sink("s").is_sink());
    }

    #[test]
    fn test_link_and_push_through() {
        let a = filter("a");
        let b = sink("b");
        a.link(&b).unwrap();
        a.set_state(State::Paused).unwrap();
        b.set_state(State::Paused).unwrap();

        let input = a.static_pad("sink").unwrap();
        assert_eq!(input.chain(Buffer::with_size(4)), Ok(FlowSuccess::Ok));
        assert_eq!(b.imp::<Collect>().unwrap().count.load(Ordering::SeqCst), 1);
        assert!(b.imp::<Passthrough>().is_none());
    }

    #[test]
    fn test_request_pads_are_monotonic() {
        let e = Element::new(
            "t",
            vec![any("src_%u", PadDirection::Src, PadPresence::Request)],
            Passthrough,
        );
        let added = Arc::new(AtomicUsize::new(0));
        let added2 = added.clone();
        e.connect_pad_added(move |_, _| {
            added2.fetch_add(1, Ordering::SeqCst);
        });

        let p0 = e.request_pad("src_%u").unwrap();
        let p1 = e.request_pad("src_%u").unwrap();
        assert_eq!((p0.name(), p1.name()), ("src_0", "src_1"));
        e.release_request_pad(&p0).unwrap();
        let p2 = e.request_pad("src_%u").unwrap();
        assert_eq!(p2.name(), "src_2");
        assert_eq!(added.load(Ordering::SeqCst), 3);
        assert!(e.request_pad("sink_%u").is_err());
    }

    #[test]
    fn test_release_unlinks_peer() {
        let e = Element::new(
            "t",
            vec![any("src_%u", PadDirection::Src, PadPresence::Request)],
            Passthrough,
        );
        let s = sink("s");
        e.link(&s).unwrap();
        let pad = e.static_pad("src_0").unwrap();
        let peer = s.static_pad("sink").unwrap();
        assert_eq!(pad.peer(), Some(peer.clone()));

        e.release_request_pad(&pad).unwrap();
        assert!(!peer.is_linked());
        assert!(e.static_pad("src_0").is_none());
        assert!(e.release_request_pad(&pad).is_err());
    }

    #[test]
    fn test_unknown_signal_and_property() {
        let e = filter("f");
        assert!(e.connect("overrun", |_| {}).is_err());
        assert!(matches!(
            e.set_property("bogus", 1),
            Err(PropertyError::Unknown { .. })
        ));
        assert_eq!(e.property("name"), Ok(PropertyValue::from("f")));
    }

    #[test]
    fn test_state_walk_without_parent() {
        let e = filter("f");
        assert_eq!(e.set_state(State::Playing), Ok(StateChangeSuccess::Success));
        assert_eq!(e.current_state(), State::Playing);
        assert!(!e.static_pad("src").unwrap().is_flushing());
        e.set_state(State::Null).unwrap();
        assert!(e.static_pad("src").unwrap().is_flushing());
        let (result, current, pending) = e.state(Some(std::time::Duration::ZERO));
        assert_eq!((result, current, pending), (Ok(StateChangeSuccess::Success), State::Null, None));
    }

    #[test]
    fn test_link_pads_by_name() {
        let a = filter("a");
        let b = sink("b");
        assert!(matches!(
            a.link_pads("out", &b, "sink"),
            Err(Error::PadNotFound { ref pad, .. }) if pad == "out"
        ));
        a.link_pads("src", &b, "sink").unwrap();
        assert!(b.static_pad("sink").unwrap().is_linked());
        assert!(a.link_pads("src", &b, "sink").is_err());
    }

    #[test]
    fn test_warning_reaches_parent_bus() {
        let pipeline = crate::pipeline::Pipeline::new();
        let e = filter("noisy");
        pipeline.add(&e).unwrap();
        e.post_warning("late buffer", Some("dropped".into()));
        let msg = pipeline
            .bus()
            .pop_filtered(crate::bus::MessageType::WARNING)
            .unwrap();
        assert!(msg.is_from(&e));
    }
}
