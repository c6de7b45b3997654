//! Bins: elements that contain other elements.
//!
//! A bin forwards every state change to its children, sinks first and
//! sources last, so that downstream elements are ready before data arrives.
//! The order comes from a topological sort of the children along their pad
//! links (a `daggy` graph with edges pointing upstream).
//!
//! Children's messages travel up through the bin. Two kinds are aggregated
//! instead of forwarded:
//!
//! - `Eos` is posted once, when every sink child has reached end of stream.
//! - `AsyncDone` completes the bin's own async state change once the last
//!   async child finished; the bin then continues toward its target state on
//!   a continuation thread, joined when the bin reaches NULL.

use crate::bus::{Message, MessageView};
use crate::clock::PipelineClock;
use crate::element::{
    ClockBinding, Element, ElementImpl, Pad, State, StateChange, StateChangeSuccess,
};
use crate::error::{Error, Result, StateChangeError};
use crate::pipeline::factory::auto_name;
use daggy::petgraph::algo::toposort;
use daggy::{Dag, NodeIndex};
use std::collections::HashSet;
use std::ops::Deref;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

#[derive(Default)]
struct EosTracking {
    from: HashSet<String>,
    posted: bool,
}

/// Behaviour of a bin. Use through [`Bin`].
#[derive(Default)]
pub struct BinImpl {
    children: Mutex<Vec<Element>>,
    waiting_async: Mutex<bool>,
    eos: Mutex<EosTracking>,
    continuations: Mutex<Vec<JoinHandle<()>>>,
    pub(crate) clock: Option<PipelineClock>,
}

impl BinImpl {
    pub(crate) fn toplevel(clock: PipelineClock) -> Self {
        Self {
            clock: Some(clock),
            ..Self::default()
        }
    }

    fn children(&self) -> Vec<Element> {
        self.children.lock().unwrap().clone()
    }

    /// Children ordered sinks first.
    fn sorted_children(&self, bin: &Element) -> Vec<Element> {
        let children = self.children();
        let mut dag: Dag<usize, ()> = Dag::new();
        let nodes: Vec<NodeIndex> = (0..children.len()).map(|i| dag.add_node(i)).collect();

        for (i, child) in children.iter().enumerate() {
            for pad in child.src_pads() {
                let Some(peer) = pad.peer().and_then(|p| p.parent_element()) else {
                    continue;
                };
                let Some(downstream) = child_containing(bin, &peer) else {
                    continue;
                };
                if let Some(j) = children.iter().position(|c| *c == downstream) {
                    if i != j {
                        // Cycles are left out of the ordering.
                        let _ = dag.add_edge(nodes[j], nodes[i], ());
                    }
                }
            }
        }

        match toposort(dag.graph(), None) {
            Ok(order) => order.into_iter().map(|n| children[dag[n]].clone()).collect(),
            Err(_) => children,
        }
    }

    fn reset_eos(&self) {
        *self.eos.lock().unwrap() = EosTracking::default();
    }

    fn handle_eos(&self, bin: &Element, message: &Message) {
        let sinks: Vec<String> = self
            .children()
            .into_iter()
            .filter(Element::is_sink)
            .map(|c| c.name().to_string())
            .collect();
        let post = {
            let mut eos = self.eos.lock().unwrap();
            if let Some(name) = message.src_name() {
                if sinks.iter().any(|s| s == name) {
                    eos.from.insert(name.to_string());
                }
            }
            let all = !sinks.is_empty() && sinks.iter().all(|s| eos.from.contains(s));
            let post = all && !eos.posted;
            if post {
                eos.posted = true;
            }
            post
        };
        if post {
            debug!(bin = %bin.name(), "all sinks reached EOS");
            bin.post_message(Message::eos(bin));
        }
    }

    fn handle_async_done(&self, bin: &Element) {
        let mut waiting = self.waiting_async.lock().unwrap();
        if !*waiting || self.children().iter().any(Element::is_async_pending) {
            return;
        }
        *waiting = false;
        drop(waiting);

        let element = bin.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-continue", bin.name()))
            .spawn(move || element.continue_state());
        match spawned {
            Ok(handle) => {
                let mut handles = self.continuations.lock().unwrap();
                handles.retain(|h| !h.is_finished());
                handles.push(handle);
            }
            Err(err) => error!(bin = %bin.name(), error = %err, "failed to spawn continuation"),
        }
    }

    fn toplevel_change(&self, bin: &Element, transition: StateChange) {
        let Some(clock) = &self.clock else {
            return;
        };
        match transition {
            StateChange::NullToReady => {
                if let Some(bus) = bin.bus() {
                    bus.set_flushing(false);
                }
            }
            StateChange::PausedToPlaying => {
                let base_time = clock.start();
                let binding = ClockBinding {
                    clock: clock.clock(),
                    base_time,
                };
                debug!(pipeline = %bin.name(), %base_time, "distributing clock");
                distribute_clock(bin, Some(binding));
                bin.post_message(Message::new(
                    MessageView::NewClock {
                        clock: clock.clock().name().to_string(),
                    },
                    Some(bin),
                ));
            }
            StateChange::PlayingToPaused => clock.pause(),
            StateChange::PausedToReady => clock.reset(),
            _ => {}
        }
    }
}

/// The direct child of `bin` that is, or contains, `element`.
fn child_containing(bin: &Element, element: &Element) -> Option<Element> {
    let mut current = element.clone();
    loop {
        let parent = current.parent()?;
        if parent == *bin {
            return Some(current);
        }
        current = parent;
    }
}

fn distribute_clock(element: &Element, binding: Option<ClockBinding>) {
    element.set_clock_binding(binding.clone());
    if let Some(bin) = element.imp::<BinImpl>() {
        for child in bin.children() {
            distribute_clock(&child, binding.clone());
        }
    }
}

impl ElementImpl for BinImpl {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> std::result::Result<StateChangeSuccess, StateChangeError> {
        self.toplevel_change(element, transition);
        if matches!(
            transition,
            StateChange::ReadyToPaused | StateChange::PausedToReady
        ) {
            self.reset_eos();
        }

        let children = self.sorted_children(element);
        let mut is_async = false;
        let mut no_preroll = false;
        for (index, child) in children.iter().enumerate() {
            match child.set_state(transition.next()) {
                Ok(StateChangeSuccess::Success) => {}
                Ok(StateChangeSuccess::Async) => is_async = true,
                Ok(StateChangeSuccess::NoPreroll) => no_preroll = true,
                Err(err) => {
                    warn!(bin = %element.name(), child = %child.name(), %transition, "child failed to change state");
                    if transition == StateChange::PausedToPlaying {
                        for done in &children[..index] {
                            let _ = done.set_state(State::Paused);
                        }
                    }
                    return Err(err);
                }
            }
        }

        if transition == StateChange::ReadyToNull && self.clock.is_some() {
            if let Some(bus) = element.bus() {
                bus.set_flushing(true);
            }
        }

        if no_preroll {
            return Ok(StateChangeSuccess::NoPreroll);
        }
        if is_async {
            let mut waiting = self.waiting_async.lock().unwrap();
            if children.iter().any(Element::is_async_pending) {
                *waiting = true;
                return Ok(StateChangeSuccess::Async);
            }
        }
        Ok(StateChangeSuccess::Success)
    }

    fn handle_message(&self, element: &Element, message: Message) {
        match message.view() {
            MessageView::Eos => self.handle_eos(element, &message),
            MessageView::AsyncDone => self.handle_async_done(element),
            _ => {
                element.post_message(message);
            }
        }
    }

    fn is_sink(&self, _element: &Element) -> bool {
        self.children().iter().any(Element::is_sink)
    }

    fn join_threads(&self, element: &Element) {
        *self.waiting_async.lock().unwrap() = false;
        let handles = std::mem::take(&mut *self.continuations.lock().unwrap());
        for handle in handles {
            if handle.thread().id() == thread::current().id() {
                continue;
            }
            if handle.join().is_err() {
                warn!(bin = %element.name(), "continuation thread panicked");
            }
        }
    }
}

/// A container element.
///
/// ```rust
/// use padflow::prelude::*;
///
/// let bin = Bin::with_name("sink-bin");
/// let sink = ElementFactory::make("fakesink").build().unwrap();
/// bin.add(&sink).unwrap();
/// bin.add_ghost_pad("sink", &sink.static_pad("sink").unwrap()).unwrap();
/// assert!(bin.is_sink());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bin(pub(crate) Element);

impl Default for Bin {
    fn default() -> Self {
        Self::new()
    }
}

impl Bin {
    /// Create a bin with a generated name.
    pub fn new() -> Self {
        Self::with_name(&auto_name("bin"))
    }

    /// Create a bin named `name`.
    pub fn with_name(name: &str) -> Self {
        Self(Element::new(name, Vec::new(), BinImpl::default()))
    }

    /// View an element as a bin, if it is one.
    pub fn from_element(element: &Element) -> Option<Bin> {
        element.imp::<BinImpl>().map(|_| Bin(element.clone()))
    }

    /// The bin as a plain element.
    pub fn element(&self) -> &Element {
        &self.0
    }

    fn imp_bin(&self) -> &BinImpl {
        match self.0.imp::<BinImpl>() {
            Some(imp) => imp,
            None => unreachable!("Bin always wraps a BinImpl"),
        }
    }

    /// Add `child`. Names must be unique within the bin and an element can
    /// only be in one bin.
    pub fn add(&self, child: &Element) -> Result<()> {
        if *child == self.0 {
            return Err(Error::Element("cannot add a bin to itself".into()));
        }
        {
            let mut children = self.imp_bin().children.lock().unwrap();
            if children.iter().any(|c| c.name() == child.name()) {
                return Err(Error::Element(format!(
                    "name '{}' is already used in bin '{}'",
                    child.name(),
                    self.name()
                )));
            }
            child.set_parent(Some(&self.0))?;
            children.push(child.clone());
        }
        if let Some(binding) = self.0.clock_binding() {
            distribute_clock(child, Some(binding));
        }
        debug!(bin = %self.name(), child = %child.name(), "added child");
        Ok(())
    }

    /// Add several children, stopping at the first failure.
    pub fn add_many(&self, children: &[&Element]) -> Result<()> {
        for child in children {
            self.add(child)?;
        }
        Ok(())
    }

    /// Remove `child`, unlinking all its pads. Set it to NULL first.
    pub fn remove(&self, child: &Element) -> Result<()> {
        {
            let mut children = self.imp_bin().children.lock().unwrap();
            let Some(index) = children.iter().position(|c| c == child) else {
                return Err(Error::ElementNotFound(child.name().to_string()));
            };
            children.remove(index);
        }
        for pad in child.pads() {
            pad.unlink_peer();
        }
        child.set_parent(None)?;
        child.set_clock_binding(None);
        self.imp_bin().eos.lock().unwrap().from.remove(child.name());
        debug!(bin = %self.name(), child = %child.name(), "removed child");
        Ok(())
    }

    /// Direct children, in insertion order.
    pub fn children(&self) -> Vec<Element> {
        self.imp_bin().children()
    }

    /// Find a descendant by name.
    pub fn by_name(&self, name: &str) -> Option<Element> {
        for child in self.children() {
            if child.name() == name {
                return Some(child);
            }
            if let Some(found) = Bin::from_element(&child).and_then(|b| b.by_name(name)) {
                return Some(found);
            }
        }
        None
    }

    /// Expose `target`, a pad of a descendant, as a pad of the bin.
    pub fn add_ghost_pad(&self, name: &str, target: &Pad) -> Result<Pad> {
        let owner = target
            .parent_element()
            .ok_or_else(|| Error::Element(format!("ghost target '{}' has no element", target.name())))?;
        if child_containing(&self.0, &owner).is_none() {
            return Err(Error::Element(format!(
                "'{}' is not inside bin '{}'",
                target.debug_name(),
                self.name()
            )));
        }
        let ghost = Pad::new_ghost(name, target);
        self.0.add_pad(&ghost)?;
        Ok(ghost)
    }
}

impl Deref for Bin {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.0
    }
}

impl AsRef<Element> for Bin {
    fn as_ref(&self) -> &Element {
        &self.0
    }
}
