//! Queue element for asynchronous buffering.
//!
//! Provides a buffer queue between pipeline elements, enabling:
//! - Decoupling of producer and consumer rates
//! - Backpressure handling
//! - Thread boundary crossing
//!
//! Everything arriving on the sink pad (buffers and serialized events) is
//! appended to a bounded FIFO on the upstream thread. A worker thread owned
//! by the queue takes items out in order and pushes them on the src pad, so
//! everything downstream of a queue runs on the queue's thread.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::clock::ClockTime;
use crate::element::{
    Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue,
    StateChange, StateChangeSuccess, Task,
};
use crate::elements::base::proxy_query_caps;
use crate::error::{FlowError, FlowResult, FlowSuccess, PropertyError, StateChangeError};
use crate::event::Event;
use crate::observability::{record_buffer_dropped, record_queue_level, span_element};
use crate::pipeline::FlowSignal;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::{debug, error, trace, warn};

/// Leaky mode determines what happens when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeakyMode {
    /// Block until space is available (default).
    #[default]
    None,
    /// Drop new buffers when full (upstream leaky).
    Upstream,
    /// Drop old buffers when full (downstream leaky).
    Downstream,
}

impl LeakyMode {
    /// Name used by the `leaky` property.
    pub fn nick(self) -> &'static str {
        match self {
            Self::None => "no",
            Self::Upstream => "upstream",
            Self::Downstream => "downstream",
        }
    }

    fn from_value(name: &str, value: &PropertyValue) -> Result<Self, PropertyError> {
        let mode = match value {
            PropertyValue::Str(nick) => match nick.as_str() {
                "no" | "none" => Some(Self::None),
                "upstream" => Some(Self::Upstream),
                "downstream" => Some(Self::Downstream),
                _ => None,
            },
            _ => match value.get_i64(name)? {
                0 => Some(Self::None),
                1 => Some(Self::Upstream),
                2 => Some(Self::Downstream),
                _ => None,
            },
        };
        mode.ok_or_else(|| PropertyError::invalid(name, format!("unknown leaky mode '{value}'")))
    }
}

/// Limits and leak policy of a [`Queue`]. A limit of 0 disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    /// Maximum number of buffers.
    pub max_size_buffers: u32,
    /// Maximum number of bytes.
    pub max_size_bytes: u64,
    /// Maximum span of timestamps held.
    pub max_size_time: ClockTime,
    /// What to do when a limit is reached.
    pub leaky: LeakyMode,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_size_buffers: 200,
            max_size_bytes: 10 * 1024 * 1024,
            max_size_time: ClockTime::SECOND,
            leaky: LeakyMode::None,
        }
    }
}

impl QueueSettings {
    /// Set the buffer limit.
    pub fn max_size_buffers(mut self, buffers: u32) -> Self {
        self.max_size_buffers = buffers;
        self
    }

    /// Set the byte limit.
    pub fn max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    /// Set the time limit.
    pub fn max_size_time(mut self, time: ClockTime) -> Self {
        self.max_size_time = time;
        self
    }

    /// Set the leaky mode.
    pub fn leaky(mut self, mode: LeakyMode) -> Self {
        self.leaky = mode;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), PropertyError> {
        let unbounded = self.max_size_buffers == 0
            && self.max_size_bytes == 0
            && self.max_size_time == ClockTime::ZERO;
        if unbounded && self.leaky != LeakyMode::None {
            return Err(PropertyError::invalid("leaky", "an unbounded queue cannot leak"));
        }
        Ok(())
    }
}

enum Item {
    Buffer(Buffer),
    Event(Event),
}

struct QueueState {
    items: VecDeque<Item>,
    buffers: u32,
    bytes: u64,
    /// Error returned to upstream: the last downstream flow error, or
    /// `Flushing` while stopped.
    srcresult: Result<(), FlowError>,
    stopping: bool,
    underrun: bool,
    total_pushed: u64,
    total_popped: u64,
    total_dropped: u64,
    overruns: u64,
}

impl Default for QueueState {
    fn default() -> Self {
        Self {
            items: VecDeque::new(),
            buffers: 0,
            bytes: 0,
            srcresult: Err(FlowError::Flushing),
            stopping: false,
            underrun: false,
            total_pushed: 0,
            total_popped: 0,
            total_dropped: 0,
            overruns: 0,
        }
    }
}

impl QueueState {
    /// Span between the oldest and the newest timestamp held.
    fn time_level(&self) -> ClockTime {
        let mut buffers = self.items.iter().filter_map(|item| match item {
            Item::Buffer(b) => Some(b),
            Item::Event(_) => None,
        });
        let first = buffers.clone().find_map(Buffer::pts);
        let last = buffers
            .rev()
            .find_map(|b| b.metadata().end_time().or_else(|| b.pts()));
        match (first, last) {
            (Some(first), Some(last)) => last.saturating_sub(first),
            _ => ClockTime::ZERO,
        }
    }

    fn is_full(&self, settings: &QueueSettings) -> bool {
        (settings.max_size_buffers > 0 && self.buffers >= settings.max_size_buffers)
            || (settings.max_size_bytes > 0 && self.bytes >= settings.max_size_bytes)
            || (settings.max_size_time > ClockTime::ZERO
                && self.time_level() >= settings.max_size_time)
    }

    fn push(&mut self, item: Item) {
        if let Item::Buffer(b) = &item {
            self.buffers += 1;
            self.bytes += b.len() as u64;
            self.total_pushed += 1;
        }
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<Item> {
        let item = self.items.pop_front()?;
        if let Item::Buffer(b) = &item {
            self.buffers -= 1;
            self.bytes -= b.len() as u64;
            self.total_popped += 1;
        }
        Some(item)
    }

    /// Remove the oldest buffer, keeping events in place.
    fn drop_oldest_buffer(&mut self) -> Option<Buffer> {
        let index = self
            .items
            .iter()
            .position(|item| matches!(item, Item::Buffer(_)))?;
        let Some(Item::Buffer(buffer)) = self.items.remove(index) else {
            return None;
        };
        self.buffers -= 1;
        self.bytes -= buffer.len() as u64;
        self.total_dropped += 1;
        Some(buffer)
    }

    fn clear(&mut self) {
        self.items.clear();
        self.buffers = 0;
        self.bytes = 0;
    }
}

/// A queue element that buffers data between pipeline stages.
///
/// The queue provides asynchronous decoupling between upstream and downstream
/// elements, allowing them to operate at different rates while handling
/// backpressure.
///
/// When a limit is reached the queue emits `overrun`, flips the link's
/// [`FlowSignal`] to `Busy` and blocks the upstream thread (or drops data,
/// when leaky). The worker emits `underrun` when it runs dry and `running`
/// once data arrives again. A flow error from downstream is handed back to
/// upstream on its next push.
///
/// # Properties
///
/// | Name | Type | Default |
/// |------|------|---------|
/// | `max-size-buffers` | uint | 200 |
/// | `max-size-bytes` | uint | 10485760 |
/// | `max-size-time` | uint (ns) | 1000000000 |
/// | `leaky` | `no`, `upstream`, `downstream` | `no` |
/// | `current-level-buffers` | uint, read-only | |
/// | `current-level-bytes` | uint, read-only | |
/// | `current-level-time` | uint (ns), read-only | |
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
/// use padflow::elements::{LeakyMode, Queue, QueueSettings};
///
/// let queue = Element::new(
///     "queue",
///     Queue::templates(),
///     Queue::with_settings(
///         QueueSettings::default()
///             .max_size_buffers(100)
///             .max_size_bytes(1024 * 1024)
///             .leaky(LeakyMode::Downstream),
///     )
///     .unwrap(),
/// );
/// assert_eq!(queue.property("leaky").unwrap().to_string(), "downstream");
/// ```
pub struct Queue {
    settings: Mutex<QueueSettings>,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
    task: Task,
}

impl Default for Queue {
    fn default() -> Self {
        Self {
            settings: Mutex::new(QueueSettings::default()),
            state: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            task: Task::default(),
        }
    }
}

impl Queue {
    /// Create a queue with the given limits.
    pub fn with_settings(settings: QueueSettings) -> Result<Self, PropertyError> {
        settings.validate()?;
        Ok(Self {
            settings: Mutex::new(settings),
            ..Self::default()
        })
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        vec![
            PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any()),
            PadTemplate::new("src", PadDirection::Src, PadPresence::Always, Caps::new_any()),
        ]
    }

    /// Current limits.
    pub fn settings(&self) -> QueueSettings {
        *self.settings.lock().unwrap()
    }

    /// Get the current number of buffers in the queue.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().buffers as usize
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get statistics about the queue.
    pub fn stats(&self) -> QueueStats {
        let st = self.state.lock().unwrap();
        QueueStats {
            current_buffers: st.buffers,
            current_bytes: st.bytes,
            current_time: st.time_level(),
            total_pushed: st.total_pushed,
            total_popped: st.total_popped,
            total_dropped: st.total_dropped,
            overruns: st.overruns,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap()
    }

    fn flow_signal(element: &Element, signal: FlowSignal) {
        if let Some(pad) = element.static_pad("sink") {
            let flow = pad.flow_state();
            if flow.signal() != signal {
                flow.set_signal(signal);
            }
        }
    }

    fn enqueue(&self, element: &Element, buffer: Buffer) -> FlowResult {
        let settings = self.settings();
        let mut st = self.lock_state();
        st.srcresult?;
        let mut overrun = false;
        while st.is_full(&settings) {
            match settings.leaky {
                LeakyMode::Upstream => {
                    st.total_dropped += 1;
                    drop(st);
                    warn!(element = %element.name(), sequence = buffer.metadata().sequence, "queue full, dropping new buffer");
                    record_buffer_dropped(element.name());
                    if let Some(pad) = element.static_pad("sink") {
                        pad.flow_state().record_drop();
                    }
                    return Ok(FlowSuccess::Ok);
                }
                LeakyMode::Downstream => {
                    let Some(old) = st.drop_oldest_buffer() else {
                        break;
                    };
                    warn!(element = %element.name(), sequence = old.metadata().sequence, "queue full, dropping old buffer");
                    record_buffer_dropped(element.name());
                    if let Some(pad) = element.static_pad("sink") {
                        pad.flow_state().record_drop();
                    }
                }
                LeakyMode::None if !overrun => {
                    overrun = true;
                    st.overruns += 1;
                    drop(st);
                    debug!(element = %element.name(), "queue is full");
                    Self::flow_signal(element, FlowSignal::Busy);
                    let _ = element.emit_by_name("overrun");
                    st = self.lock_state();
                    st.srcresult?;
                }
                LeakyMode::None => {
                    st = self.not_full.wait(st).unwrap();
                    st.srcresult?;
                }
            }
        }
        trace!(element = %element.name(), sequence = buffer.metadata().sequence, level = st.buffers + 1, "enqueue");
        st.push(Item::Buffer(buffer));
        self.wake_worker(element, st);
        Ok(FlowSuccess::Ok)
    }

    /// Signal the worker, emitting `running` if it had run dry.
    fn wake_worker(&self, element: &Element, mut st: MutexGuard<'_, QueueState>) {
        let running = std::mem::take(&mut st.underrun);
        let bytes = st.bytes;
        self.not_empty.notify_one();
        drop(st);
        record_queue_level(element.name(), bytes);
        if running {
            let _ = element.emit_by_name("running");
        }
    }

    fn start(&self, element: &Element) -> Result<(), StateChangeError> {
        {
            let mut st = self.lock_state();
            *st = QueueState::default();
            st.srcresult = Ok(());
        }
        let streaming = element.clone();
        let span = span_element(element.name(), "queue");
        self.task
            .start(&format!("{}:src", element.name()), move || {
                let _guard = span.enter();
                queue_loop(&streaming)
            })
            .map_err(|err| {
                error!(element = %element.name(), error = %err, "failed to start queue task");
                StateChangeError
            })
    }

    fn stop(&self, element: &Element) {
        {
            let mut st = self.lock_state();
            st.stopping = true;
            st.srcresult = Err(FlowError::Flushing);
            st.clear();
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
        self.task.join();
        Self::flow_signal(element, FlowSignal::Ready);
        record_queue_level(element.name(), 0);
    }
}

fn queue_loop(element: &Element) {
    let (Some(imp), Some(src)) = (element.imp::<Queue>(), element.static_pad("src")) else {
        return;
    };
    loop {
        let mut st = imp.lock_state();
        let item = loop {
            if st.stopping {
                return;
            }
            if st.srcresult.is_ok() {
                if let Some(item) = st.pop() {
                    break item;
                }
                if !st.underrun {
                    st.underrun = true;
                    drop(st);
                    debug!(element = %element.name(), "queue is empty");
                    let _ = element.emit_by_name("underrun");
                    st = imp.lock_state();
                    continue;
                }
            }
            st = imp.not_empty.wait(st).unwrap();
        };
        let has_room = !st.is_full(&imp.settings());
        let bytes = st.bytes;
        imp.not_full.notify_one();
        drop(st);
        record_queue_level(element.name(), bytes);
        if has_room {
            Queue::flow_signal(element, FlowSignal::Ready);
        }

        let result = match item {
            Item::Buffer(buffer) => src.push(buffer).map(|_| ()),
            Item::Event(event) => {
                trace!(element = %element.name(), event = event.type_name(), "dequeued event");
                src.push_event(event);
                Ok(())
            }
        };
        if let Err(err) = result {
            pause(imp, element, &src, err);
        }
    }
}

/// Stop pushing after a downstream error and report it upstream.
fn pause(imp: &Queue, element: &Element, src: &Pad, err: FlowError) {
    {
        let mut st = imp.lock_state();
        if st.srcresult.is_ok() {
            st.srcresult = Err(err);
        }
        st.clear();
    }
    imp.not_full.notify_all();
    match err {
        FlowError::Flushing | FlowError::Eos => {
            debug!(element = %element.name(), reason = %err, "pausing task");
        }
        _ => {
            element.post_error(
                "Internal data stream error.",
                Some(format!("streaming stopped, reason {err}")),
            );
            src.push_event(Event::Eos);
        }
    }
}

impl ElementImpl for Queue {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
        match transition {
            StateChange::ReadyToPaused => self.start(element)?,
            StateChange::PausedToReady => self.stop(element),
            _ => {}
        }
        Ok(StateChangeSuccess::Success)
    }

    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        self.enqueue(element, buffer)
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: Event) -> bool {
        match event {
            Event::FlushStart => {
                {
                    let mut st = self.lock_state();
                    st.srcresult = Err(FlowError::Flushing);
                    st.clear();
                }
                self.not_full.notify_all();
                self.not_empty.notify_all();
                debug!(element = %element.name(), "flushing");
                element.forward_event(Event::FlushStart)
            }
            Event::FlushStop => {
                let forwarded = element.forward_event(Event::FlushStop);
                let mut st = self.lock_state();
                if !st.stopping {
                    st.srcresult = Ok(());
                    st.underrun = false;
                }
                drop(st);
                self.not_empty.notify_all();
                forwarded
            }
            event => {
                let mut st = self.lock_state();
                if st.srcresult.is_err() {
                    debug!(element = %element.name(), event = event.type_name(), "refusing event, not running");
                    return false;
                }
                st.push(Item::Event(event));
                self.wake_worker(element, st);
                true
            }
        }
    }

    fn query_caps(&self, element: &Element, pad: &Pad, filter: Option<&Caps>) -> Caps {
        proxy_query_caps(element, pad, filter)
    }

    fn set_property(
        &self,
        _element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        let mut settings = self.settings();
        match name {
            "max-size-buffers" => settings.max_size_buffers = value.get_u32(name)?,
            "max-size-bytes" => settings.max_size_bytes = value.get_u64(name)?,
            "max-size-time" => {
                settings.max_size_time = ClockTime::from_nseconds(value.get_u64(name)?)
            }
            "leaky" => settings.leaky = LeakyMode::from_value(name, value)?,
            "current-level-buffers" | "current-level-bytes" | "current-level-time" => {
                return Err(PropertyError::invalid(name, "read-only"));
            }
            _ => return Err(PropertyError::unknown(name)),
        }
        settings.validate()?;
        *self.settings.lock().unwrap() = settings;
        // A raised limit may unblock the producer.
        self.not_full.notify_all();
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        let settings = self.settings();
        Ok(match name {
            "max-size-buffers" => PropertyValue::UInt(u64::from(settings.max_size_buffers)),
            "max-size-bytes" => PropertyValue::UInt(settings.max_size_bytes),
            "max-size-time" => PropertyValue::UInt(settings.max_size_time.nseconds()),
            "leaky" => PropertyValue::Str(settings.leaky.nick().to_string()),
            "current-level-buffers" => PropertyValue::UInt(u64::from(self.stats().current_buffers)),
            "current-level-bytes" => PropertyValue::UInt(self.stats().current_bytes),
            "current-level-time" => PropertyValue::UInt(self.stats().current_time.nseconds()),
            _ => return Err(PropertyError::unknown(name)),
        })
    }

    fn signals(&self) -> &'static [&'static str] {
        &["overrun", "underrun", "running"]
    }
}

/// Statistics for a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Buffers currently queued.
    pub current_buffers: u32,
    /// Bytes currently queued.
    pub current_bytes: u64,
    /// Timestamp span currently queued.
    pub current_time: ClockTime,
    /// Buffers accepted since start.
    pub total_pushed: u64,
    /// Buffers handed downstream since start.
    pub total_popped: u64,
    /// Buffers dropped by a leaky queue.
    pub total_dropped: u64,
    /// Times the queue became full.
    pub overruns: u64,
}
