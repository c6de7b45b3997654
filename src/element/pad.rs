//! Pads: the connection points of elements.
//!
//! A src pad pushes buffers and events into the sink pad it is linked to.
//! Linking negotiates caps: both sides are queried, the results intersected,
//! and the intersection fixated by the upstream element.
//!
//! The link state of a pad is a tagged variant:
//!
//! ```text
//! Unlinked ──reserve──> Negotiating ──commit──> Linked(peer)
//!     ^                     │
//!     └─────rollback────────┘
//! ```
//!
//! Reservation and commit take the link locks of both pads in address order.
//! Caps queries run between the two critical sections with no pad lock held,
//! because they call into element code that may look at other pads.

use super::{Element, ElementInner};
use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::error::{FlowError, FlowResult, LinkError};
use crate::event::Event;
use crate::observability::record_buffer_pushed;
use crate::pipeline::flow::{FlowStateHandle, new_flow_state};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, trace};

/// Direction of a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Output pad: pushes data downstream.
    Src,
    /// Input pad: receives data from upstream.
    Sink,
}

impl fmt::Display for PadDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Src => "SRC",
            Self::Sink => "SINK",
        })
    }
}

/// When pads created from a template exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadPresence {
    /// Created with the element.
    Always,
    /// Created by the element while running (demuxers).
    Sometimes,
    /// Created when the application asks (tee src pads).
    Request,
}

impl fmt::Display for PadPresence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Always => "Always",
            Self::Sometimes => "Sometimes",
            Self::Request => "On request",
        })
    }
}

/// Describes the pads an element can have.
#[derive(Debug, Clone, PartialEq)]
pub struct PadTemplate {
    name_template: String,
    direction: PadDirection,
    presence: PadPresence,
    caps: Caps,
}

impl PadTemplate {
    /// Create a template. `name_template` may contain `%u` for request and
    /// sometimes pads.
    pub fn new(
        name_template: impl Into<String>,
        direction: PadDirection,
        presence: PadPresence,
        caps: Caps,
    ) -> Self {
        Self {
            name_template: name_template.into(),
            direction,
            presence,
            caps,
        }
    }

    /// Name pattern, e.g. `"src"` or `"src_%u"`.
    pub fn name_template(&self) -> &str {
        &self.name_template
    }

    /// Direction.
    pub fn direction(&self) -> PadDirection {
        self.direction
    }

    /// Presence.
    pub fn presence(&self) -> PadPresence {
        self.presence
    }

    /// Caps accepted or produced by pads of this template.
    pub fn caps(&self) -> &Caps {
        &self.caps
    }

    /// Pad name for the `index`-th instance of this template.
    pub(crate) fn instance_name(&self, index: u32) -> String {
        if self.name_template.contains("%u") {
            self.name_template.replacen("%u", &index.to_string(), 1)
        } else if self.name_template.contains("%d") {
            self.name_template.replacen("%d", &index.to_string(), 1)
        } else {
            self.name_template.clone()
        }
    }
}

enum PadLinkState {
    Unlinked,
    Negotiating,
    Linked(Weak<PadInner>),
}

impl PadLinkState {
    fn is_linked_to(&self, pad: &Arc<PadInner>) -> bool {
        matches!(self, Self::Linked(peer) if Weak::as_ptr(peer) == Arc::as_ptr(pad))
    }
}

pub(crate) struct PadInner {
    name: String,
    direction: PadDirection,
    template: Option<PadTemplate>,
    parent: Mutex<Weak<ElementInner>>,
    link: Mutex<PadLinkState>,
    caps: Mutex<Option<Caps>>,
    sticky: Mutex<Vec<Event>>,
    resend_sticky: AtomicBool,
    stream_lock: Mutex<()>,
    flushing: AtomicBool,
    eos: AtomicBool,
    flow: Mutex<FlowStateHandle>,
    ghost_target: Option<Weak<PadInner>>,
}

/// A pad instance. Cloning gives another handle to the same pad.
#[derive(Clone)]
pub struct Pad(pub(crate) Arc<PadInner>);

impl PartialEq for Pad {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Pad {}

impl fmt::Debug for Pad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pad")
            .field("name", &self.0.name)
            .field("direction", &self.0.direction)
            .field("linked", &self.is_linked())
            .finish()
    }
}

impl Pad {
    fn build(
        name: String,
        direction: PadDirection,
        template: Option<PadTemplate>,
        ghost_target: Option<Weak<PadInner>>,
    ) -> Self {
        Self(Arc::new(PadInner {
            name,
            direction,
            template,
            parent: Mutex::new(Weak::new()),
            link: Mutex::new(PadLinkState::Unlinked),
            caps: Mutex::new(None),
            sticky: Mutex::new(Vec::new()),
            resend_sticky: AtomicBool::new(false),
            stream_lock: Mutex::new(()),
            flushing: AtomicBool::new(true),
            eos: AtomicBool::new(false),
            flow: Mutex::new(new_flow_state()),
            ghost_target,
        }))
    }

    /// Create a pad without a template; its caps query answers ANY.
    pub fn new(name: impl Into<String>, direction: PadDirection) -> Self {
        Self::build(name.into(), direction, None, None)
    }

    /// Create a pad from a template.
    pub fn from_template(template: &PadTemplate, name: impl Into<String>) -> Self {
        Self::build(name.into(), template.direction, Some(template.clone()), None)
    }

    /// Create a ghost pad proxying `target`.
    pub(crate) fn new_ghost(name: impl Into<String>, target: &Pad) -> Self {
        Self::build(
            name.into(),
            target.direction(),
            None,
            Some(Arc::downgrade(&target.0)),
        )
    }

    /// Pad name, unique within its element.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Direction.
    pub fn direction(&self) -> PadDirection {
        self.0.direction
    }

    /// Template the pad was created from.
    pub fn template(&self) -> Option<&PadTemplate> {
        self.0.template.as_ref()
    }

    /// Presence of the pad's template; pads without one count as `Always`.
    pub fn presence(&self) -> PadPresence {
        self.template().map_or(PadPresence::Always, PadTemplate::presence)
    }

    /// Caps of the pad's template, or ANY.
    pub fn template_caps(&self) -> Caps {
        self.template()
            .map_or_else(Caps::new_any, |t| t.caps().clone())
    }

    /// Element the pad belongs to.
    pub fn parent_element(&self) -> Option<Element> {
        self.0.parent.lock().unwrap().upgrade().map(Element)
    }

    pub(crate) fn set_parent(&self, element: &Element) {
        *self.0.parent.lock().unwrap() = Arc::downgrade(&element.0);
    }

    pub(crate) fn clear_parent(&self) {
        *self.0.parent.lock().unwrap() = Weak::new();
    }

    /// Whether this is a ghost pad.
    pub fn is_ghost(&self) -> bool {
        self.0.ghost_target.is_some()
    }

    /// Target of a ghost pad.
    pub fn ghost_target(&self) -> Option<Pad> {
        self.0.ghost_target.as_ref()?.upgrade().map(Pad)
    }

    /// Follow ghost targets down to a real pad.
    fn resolve(&self) -> Option<Pad> {
        let mut pad = self.clone();
        while pad.is_ghost() {
            pad = pad.ghost_target()?;
        }
        Some(pad)
    }

    /// The linked peer pad.
    pub fn peer(&self) -> Option<Pad> {
        let pad = self.resolve()?;
        let link = pad.0.link.lock().unwrap();
        match &*link {
            PadLinkState::Linked(peer) => peer.upgrade().map(Pad),
            _ => None,
        }
    }

    /// Whether the pad has a peer.
    pub fn is_linked(&self) -> bool {
        self.peer().is_some()
    }

    /// Caps negotiated on this pad, if any.
    pub fn current_caps(&self) -> Option<Caps> {
        let pad = self.resolve()?;
        pad.0.caps.lock().unwrap().clone()
    }

    pub(crate) fn set_current_caps(&self, caps: Caps) {
        *self.0.caps.lock().unwrap() = Some(caps);
    }

    /// Caps this pad could handle, narrowed by `filter`.
    ///
    /// Asks the owning element, which by default answers with the template
    /// caps; pass-through elements answer with what their other side accepts.
    pub fn query_caps(&self, filter: Option<&Caps>) -> Caps {
        if let Some(target) = self.ghost_target() {
            return target.query_caps(filter);
        }
        let caps = match self.parent_element() {
            Some(element) => element.imp_dyn().query_caps(&element, self, filter),
            None => self.template_caps(),
        };
        match filter {
            Some(filter) => caps.intersect(filter),
            None => caps,
        }
    }

    /// Caps the peer could handle, or ANY when unlinked.
    pub fn peer_query_caps(&self, filter: Option<&Caps>) -> Caps {
        match self.peer() {
            Some(peer) => peer.query_caps(filter),
            None => filter.cloned().unwrap_or_else(Caps::new_any),
        }
    }

    /// Shared flow state of this link.
    ///
    /// Sink pads own one; a src pad adopts its peer's when linked, so both
    /// ends observe the same backpressure signal.
    pub fn flow_state(&self) -> FlowStateHandle {
        match self.resolve() {
            Some(pad) => Arc::clone(&pad.0.flow.lock().unwrap()),
            None => Arc::clone(&self.0.flow.lock().unwrap()),
        }
    }

    /// Link this src pad to `sink`.
    ///
    /// Neither pad is modified when the link fails.
    pub fn link(&self, sink: &Pad) -> Result<(), LinkError> {
        if self.direction() != PadDirection::Src || sink.direction() != PadDirection::Sink {
            return Err(LinkError::WrongDirection);
        }
        check_hierarchy(self, sink)?;

        let (Some(src), Some(sink_real)) = (self.resolve(), sink.resolve()) else {
            return Err(LinkError::Refused);
        };

        reserve(&src, &sink_real)?;
        let negotiated = negotiate(&src, &sink_real);

        let (first, second) = ordered(&src, &sink_real);
        let mut a = first.0.link.lock().unwrap();
        let mut b = second.0.link.lock().unwrap();
        let caps = match negotiated {
            Ok(caps) => caps,
            Err(err) => {
                *a = PadLinkState::Unlinked;
                *b = PadLinkState::Unlinked;
                debug!(src = %src.name(), sink = %sink_real.name(), error = %err, "link rolled back");
                return Err(err);
            }
        };
        *a = PadLinkState::Linked(Arc::downgrade(&second.0));
        *b = PadLinkState::Linked(Arc::downgrade(&first.0));
        drop((a, b));

        match caps {
            Some(caps) => {
                src.set_current_caps(caps.clone());
                sink_real.set_current_caps(caps);
            }
            None => *src.0.caps.lock().unwrap() = src.sticky_caps(),
        }
        let flow = Arc::clone(&sink_real.0.flow.lock().unwrap());
        *src.0.flow.lock().unwrap() = flow;
        src.0.resend_sticky.store(true, Ordering::Release);

        debug!(
            src = %src.debug_name(),
            sink = %sink_real.debug_name(),
            caps = ?src.current_caps().map(|c| c.to_string()),
            "linked"
        );
        Ok(())
    }

    /// Remove the link between this src pad and `sink`.
    ///
    /// Negotiated caps are cleared on both pads; a src pad falls back to the
    /// caps of its last sticky caps event, if any.
    pub fn unlink(&self, sink: &Pad) -> bool {
        let (Some(src), Some(sink)) = (self.resolve(), sink.resolve()) else {
            return false;
        };
        let (first, second) = ordered(&src, &sink);
        let mut a = first.0.link.lock().unwrap();
        let mut b = second.0.link.lock().unwrap();
        // The pairing may have changed since the caller looked it up.
        if !a.is_linked_to(&second.0) || !b.is_linked_to(&first.0) {
            return false;
        }
        *a = PadLinkState::Unlinked;
        *b = PadLinkState::Unlinked;
        *src.0.flow.lock().unwrap() = new_flow_state();
        *src.0.caps.lock().unwrap() = src.sticky_caps();
        *sink.0.caps.lock().unwrap() = None;
        drop((a, b));
        debug!(src = %src.debug_name(), sink = %sink.debug_name(), "unlinked");
        true
    }

    /// Unlink from whatever peer this pad has.
    pub(crate) fn unlink_peer(&self) -> bool {
        match (self.peer(), self.direction()) {
            (Some(peer), PadDirection::Src) => self.unlink(&peer),
            (Some(peer), PadDirection::Sink) => peer.unlink(self),
            (None, _) => false,
        }
    }

    /// Whether the pad is flushing (inactive).
    pub fn is_flushing(&self) -> bool {
        self.0.flushing.load(Ordering::Acquire)
    }

    /// Whether the pad received end-of-stream.
    pub fn is_eos(&self) -> bool {
        self.0.eos.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.0.flushing.store(!active, Ordering::Release);
        if active {
            self.0.eos.store(false, Ordering::Release);
        }
    }

    /// Hold the streaming lock; no buffer passes this pad while it is held.
    pub(crate) fn stream_lock(&self) -> MutexGuard<'_, ()> {
        self.0.stream_lock.lock().unwrap()
    }

    /// Push a buffer to the peer (src pads).
    pub fn push(&self, buffer: Buffer) -> FlowResult {
        if let Some(target) = self.ghost_target() {
            return target.push(buffer);
        }
        let _stream = self.stream_lock();
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }
        let Some(peer) = self.peer() else {
            return Err(FlowError::NotLinked);
        };
        if self.0.resend_sticky.swap(false, Ordering::AcqRel) {
            let sticky = self.0.sticky.lock().unwrap().clone();
            for event in sticky {
                peer.send_event(event);
            }
        }
        trace!(pad = %self.debug_name(), pts = ?buffer.pts(), size = buffer.len(), "push");
        if let Some(element) = self.parent_element() {
            record_buffer_pushed(element.name(), buffer.len());
        }
        peer.chain(buffer)
    }

    /// Deliver a buffer to this sink pad's element.
    pub fn chain(&self, buffer: Buffer) -> FlowResult {
        if let Some(target) = self.ghost_target() {
            return target.chain(buffer);
        }
        let _stream = self.stream_lock();
        if self.is_flushing() {
            return Err(FlowError::Flushing);
        }
        if self.is_eos() {
            return Err(FlowError::Eos);
        }
        let Some(element) = self.parent_element() else {
            return Err(FlowError::Flushing);
        };
        element.imp_dyn().chain(&element, self, buffer)
    }

    /// Push an event to the peer (src pads).
    ///
    /// Sticky events are stored even when they cannot be delivered yet.
    pub fn push_event(&self, event: Event) -> bool {
        if let Some(target) = self.ghost_target() {
            return target.push_event(event);
        }
        if !event.is_serialized() {
            return self.peer().is_some_and(|peer| peer.send_event(event));
        }
        let _stream = self.stream_lock();
        if event.is_sticky() {
            self.store_sticky(&event);
            if let Event::Caps(caps) = &event {
                self.set_current_caps(caps.clone());
            }
        }
        if self.is_flushing() && event != Event::FlushStop {
            return false;
        }
        let Some(peer) = self.peer() else {
            return false;
        };
        if self.0.resend_sticky.swap(false, Ordering::AcqRel) {
            let sticky = self.0.sticky.lock().unwrap().clone();
            for ev in sticky.into_iter().filter(|ev| !ev.same_kind(&event)) {
                peer.send_event(ev);
            }
        }
        trace!(pad = %self.debug_name(), event = event.type_name(), "push event");
        peer.send_event(event)
    }

    /// Deliver an event to this sink pad's element.
    pub fn send_event(&self, event: Event) -> bool {
        if let Some(target) = self.ghost_target() {
            return target.send_event(event);
        }
        let Some(element) = self.parent_element() else {
            return false;
        };
        match &event {
            Event::FlushStart => {
                self.0.flushing.store(true, Ordering::Release);
                return element.imp_dyn().sink_event(&element, self, event);
            }
            Event::FlushStop => {
                let _stream = self.stream_lock();
                self.0.flushing.store(false, Ordering::Release);
                self.0.eos.store(false, Ordering::Release);
                return element.imp_dyn().sink_event(&element, self, event);
            }
            _ => {}
        }
        let _stream = self.stream_lock();
        if self.is_flushing() {
            return false;
        }
        match &event {
            Event::Caps(caps) => self.set_current_caps(caps.clone()),
            Event::Eos => self.0.eos.store(true, Ordering::Release),
            Event::StreamStart { .. } => self.0.eos.store(false, Ordering::Release),
            _ => {}
        }
        if event.is_sticky() {
            self.store_sticky(&event);
        }
        element.imp_dyn().sink_event(&element, self, event)
    }

    /// Sticky events seen on this pad.
    pub fn sticky_events(&self) -> Vec<Event> {
        self.0.sticky.lock().unwrap().clone()
    }

    fn sticky_caps(&self) -> Option<Caps> {
        self.0.sticky.lock().unwrap().iter().find_map(|event| match event {
            Event::Caps(caps) => Some(caps.clone()),
            _ => None,
        })
    }

    fn store_sticky(&self, event: &Event) {
        let mut sticky = self.0.sticky.lock().unwrap();
        match sticky.iter_mut().find(|e| e.same_kind(event)) {
            Some(slot) => *slot = event.clone(),
            None => sticky.push(event.clone()),
        }
    }

    pub(crate) fn clear_sticky(&self) {
        self.0.sticky.lock().unwrap().clear();
    }

    /// `element:pad` for logs.
    pub fn debug_name(&self) -> String {
        match self.parent_element() {
            Some(element) => format!("{}:{}", element.name(), self.name()),
            None => self.name().to_string(),
        }
    }
}

fn same_parent(a: Option<Element>, b: Option<Element>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    }
}

fn check_hierarchy(src: &Pad, sink: &Pad) -> Result<(), LinkError> {
    match (src.parent_element(), sink.parent_element()) {
        (Some(a), Some(b)) if !same_parent(a.parent(), b.parent()) => {
            Err(LinkError::WrongHierarchy)
        }
        _ => Ok(()),
    }
}

fn ordered<'a>(a: &'a Pad, b: &'a Pad) -> (&'a Pad, &'a Pad) {
    if Arc::as_ptr(&a.0) <= Arc::as_ptr(&b.0) {
        (a, b)
    } else {
        (b, a)
    }
}

/// Move both pads from `Unlinked` to `Negotiating`.
fn reserve(src: &Pad, sink: &Pad) -> Result<(), LinkError> {
    let (first, second) = ordered(src, sink);
    let mut a = first.0.link.lock().unwrap();
    let mut b = second.0.link.lock().unwrap();
    if !matches!(*a, PadLinkState::Unlinked) || !matches!(*b, PadLinkState::Unlinked) {
        return Err(LinkError::WasLinked);
    }
    *a = PadLinkState::Negotiating;
    *b = PadLinkState::Negotiating;
    Ok(())
}

/// Intersect both sides and fixate. `Ok(None)` means ANY: caps stay unset
/// until a caps event arrives.
fn negotiate(src: &Pad, sink: &Pad) -> Result<Option<Caps>, LinkError> {
    let src_caps = src.query_caps(None);
    let sink_caps = sink.query_caps(None);
    let common = src_caps.intersect(&sink_caps);
    trace!(src = %src_caps, sink = %sink_caps, common = %common, "negotiate");
    if common.is_empty() {
        return Err(LinkError::NoFormat);
    }
    if common.is_any() {
        return Ok(None);
    }
    let fixed = match src.parent_element() {
        Some(element) => element.imp_dyn().fixate_caps(&element, src, common),
        None => common.fixate(),
    };
    let fixed = if fixed.is_fixed() { fixed } else { fixed.fixate() };
    if fixed.is_empty() {
        return Err(LinkError::NoFormat);
    }
    Ok(Some(fixed))
}
