//! AppSink element for extracting data to application code.
//!
//! Allows applications to pull buffers out of a pipeline programmatically.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::clock::ClockTime;
use crate::element::{
    Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue,
    SignalHandlerId, StateChange, StateChangeSuccess,
};
use crate::elements::base::{BaseSink, RenderSink};
use crate::error::{FlowError, FlowResult, FlowSuccess, PropertyError, Result, StateChangeError};
use crate::event::Event;
use crate::observability::record_buffer_dropped;
use crate::pipeline::ElementFactory;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{trace, warn};

/// A buffer together with the caps it was produced under.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    buffer: Buffer,
    caps: Option<Caps>,
}

impl Sample {
    /// Create a sample.
    pub fn new(buffer: Buffer, caps: Option<Caps>) -> Self {
        Self { buffer, caps }
    }

    /// The buffer.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Caps negotiated when the buffer arrived, `None` if nothing was
    /// negotiated.
    pub fn caps(&self) -> Option<&Caps> {
        self.caps.as_ref()
    }

    /// Take the buffer out.
    pub fn into_buffer(self) -> Buffer {
        self.buffer
    }
}

/// Settings of an app sink.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSinkSettings {
    /// Accepted caps.
    pub caps: Caps,
    /// Emit `new-sample` for every buffer.
    pub emit_signals: bool,
    /// Samples held before rendering blocks (or drops), 0 for unlimited.
    pub max_buffers: u32,
    /// Drop the oldest sample instead of blocking when full.
    pub drop: bool,
    /// Synchronise on the clock before queueing a sample.
    pub sync: bool,
}

impl Default for AppSinkSettings {
    fn default() -> Self {
        Self {
            caps: Caps::new_any(),
            emit_signals: false,
            max_buffers: 0,
            drop: false,
            sync: true,
        }
    }
}

impl AppSinkSettings {
    /// Set the accepted caps.
    pub fn caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    /// Enable `new-sample`.
    pub fn emit_signals(mut self, emit: bool) -> Self {
        self.emit_signals = emit;
        self
    }

    /// Set the sample limit.
    pub fn max_buffers(mut self, max_buffers: u32) -> Self {
        self.max_buffers = max_buffers;
        self
    }

    /// Drop old samples when full.
    pub fn drop(mut self, drop: bool) -> Self {
        self.drop = drop;
        self
    }

    /// Enable clock synchronisation.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }
}

struct AppSinkState {
    queue: VecDeque<Sample>,
    eos: bool,
    flushing: bool,
    total_received: u64,
    total_dropped: u64,
}

impl Default for AppSinkState {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            eos: false,
            flushing: true,
            total_received: 0,
            total_dropped: 0,
        }
    }
}

/// Behaviour of the `appsink` element.
///
/// Rendered buffers are queued as [`Sample`]s for [`AppSink::pull_sample`].
/// With `emit-signals`, `new-sample` is emitted on the streaming thread after
/// each one is queued.
#[derive(Default)]
pub struct AppSinkImpl {
    base: BaseSink,
    settings: Mutex<AppSinkSettings>,
    state: Mutex<AppSinkState>,
    cond: Condvar,
}

impl AppSinkImpl {
    /// Create with the given settings.
    pub fn with_settings(settings: AppSinkSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            ..Self::default()
        }
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        vec![PadTemplate::new(
            "sink",
            PadDirection::Sink,
            PadPresence::Always,
            Caps::new_any(),
        )]
    }

    fn lock_state(&self) -> MutexGuard<'_, AppSinkState> {
        self.state.lock().unwrap()
    }

    fn reset(&self, flushing: bool) {
        let mut st = self.lock_state();
        st.queue.clear();
        st.eos = false;
        st.flushing = flushing;
        self.cond.notify_all();
    }

    fn pull(&self, timeout: Option<Duration>) -> Option<Sample> {
        let st = self.lock_state();
        let blocked = |st: &mut AppSinkState| st.queue.is_empty() && !st.eos && !st.flushing;
        let mut st = match timeout {
            Some(timeout) => self.cond.wait_timeout_while(st, timeout, blocked).unwrap().0,
            None => self.cond.wait_while(st, blocked).unwrap(),
        };
        let sample = st.queue.pop_front();
        if sample.is_some() {
            self.cond.notify_all();
        }
        sample
    }

    /// Statistics.
    pub fn stats(&self) -> AppSinkStats {
        let st = self.lock_state();
        AppSinkStats {
            queued: st.queue.len(),
            total_received: st.total_received,
            total_dropped: st.total_dropped,
        }
    }
}

impl RenderSink for AppSinkImpl {
    fn base_sink(&self) -> &BaseSink {
        &self.base
    }

    fn render(&self, element: &Element, buffer: Buffer) -> FlowResult {
        let settings = self.settings.lock().unwrap().clone();
        let sample = Sample::new(buffer, element.pad_caps("sink"));
        let mut st = self.lock_state();
        while settings.max_buffers > 0 && st.queue.len() >= settings.max_buffers as usize {
            if st.flushing {
                return Err(FlowError::Flushing);
            }
            if settings.drop {
                st.queue.pop_front();
                st.total_dropped += 1;
                warn!(element = %element.name(), "queue full, dropping old sample");
                record_buffer_dropped(element.name());
                continue;
            }
            st = self.cond.wait(st).unwrap();
        }
        if st.flushing {
            return Err(FlowError::Flushing);
        }
        trace!(element = %element.name(), pts = ?sample.buffer().pts(), "queued sample");
        st.queue.push_back(sample);
        st.total_received += 1;
        self.cond.notify_all();
        drop(st);
        if settings.emit_signals {
            let _ = element.emit_by_name("new-sample");
        }
        Ok(FlowSuccess::Ok)
    }

    fn sync(&self) -> bool {
        self.settings.lock().unwrap().sync
    }

    fn eos(&self, _element: &Element) {
        self.lock_state().eos = true;
        self.cond.notify_all();
    }

    fn flush(&self, _element: &Element) {
        self.reset(true);
    }
}

impl ElementImpl for AppSinkImpl {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> std::result::Result<StateChangeSuccess, StateChangeError> {
        if transition == StateChange::ReadyToPaused {
            self.reset(false);
        }
        BaseSink::change_state(self, element, transition)
    }

    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        BaseSink::chain(self, element, buffer)
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: Event) -> bool {
        if event == Event::FlushStop {
            self.reset(false);
        }
        BaseSink::event(self, element, event)
    }

    fn query_caps(&self, _element: &Element, pad: &Pad, _filter: Option<&Caps>) -> Caps {
        let caps = self.settings.lock().unwrap().caps.clone();
        pad.template_caps().intersect(&caps)
    }

    fn set_property(
        &self,
        _element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> std::result::Result<(), PropertyError> {
        let mut settings = self.settings.lock().unwrap();
        match name {
            "caps" => settings.caps = value.get_caps(name)?,
            "emit-signals" => settings.emit_signals = value.get_bool(name)?,
            "max-buffers" => settings.max_buffers = value.get_u32(name)?,
            "drop" => settings.drop = value.get_bool(name)?,
            "sync" => settings.sync = value.get_bool(name)?,
            "eos" => return Err(PropertyError::invalid(name, "read-only")),
            _ => return Err(PropertyError::unknown(name)),
        }
        drop(settings);
        self.cond.notify_all();
        Ok(())
    }

    fn property(
        &self,
        _element: &Element,
        name: &str,
    ) -> std::result::Result<PropertyValue, PropertyError> {
        let settings = self.settings.lock().unwrap();
        Ok(match name {
            "caps" => PropertyValue::Caps(settings.caps.clone()),
            "emit-signals" => PropertyValue::Bool(settings.emit_signals),
            "max-buffers" => PropertyValue::UInt(u64::from(settings.max_buffers)),
            "drop" => PropertyValue::Bool(settings.drop),
            "sync" => PropertyValue::Bool(settings.sync),
            "eos" => PropertyValue::Bool(self.lock_state().eos),
            _ => return Err(PropertyError::unknown(name)),
        })
    }

    fn signals(&self) -> &'static [&'static str] {
        &["new-sample"]
    }
}

/// A sink element that hands buffers to application code.
///
/// A typed handle to an `appsink` element; it dereferences to [`Element`].
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
/// use padflow::elements::AppSink;
///
/// let pipeline = Pipeline::new();
/// let src = ElementFactory::make("fakesrc").property("num-buffers", 3).build().unwrap();
/// let appsink = AppSink::new("sink");
/// pipeline.add_many(&[&src, appsink.element()]).unwrap();
/// src.link(&appsink).unwrap();
///
/// pipeline.set_state(State::Playing).unwrap();
/// let mut count = 0;
/// while let Some(sample) = appsink.pull_sample() {
///     assert_eq!(sample.buffer().metadata().sequence, count);
///     count += 1;
/// }
/// assert_eq!(count, 3);
/// assert!(appsink.is_eos());
/// pipeline.set_state(State::Null).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct AppSink {
    element: Element,
}

impl AppSink {
    /// Create an `appsink` element named `name`.
    pub fn new(name: &str) -> Self {
        let element = match ElementFactory::find("appsink") {
            Some(factory) => factory.create(Some(name)),
            None => Element::new(name, AppSinkImpl::templates(), AppSinkImpl::default()),
        };
        Self { element }
    }

    /// Wrap an existing `appsink` element.
    pub fn from_element(element: &Element) -> Option<Self> {
        element.imp::<AppSinkImpl>()?;
        Some(Self {
            element: element.clone(),
        })
    }

    /// The underlying element.
    pub fn element(&self) -> &Element {
        &self.element
    }

    fn imp(&self) -> &AppSinkImpl {
        let Some(imp) = self.element.imp::<AppSinkImpl>() else {
            unreachable!("AppSink always wraps an appsink element");
        };
        imp
    }

    /// Wait for the next sample. `None` at end of stream or when the sink
    /// is stopped or flushing.
    pub fn pull_sample(&self) -> Option<Sample> {
        self.imp().pull(None)
    }

    /// Like [`pull_sample`](Self::pull_sample), giving up after `timeout`.
    pub fn try_pull_sample(&self, timeout: ClockTime) -> Option<Sample> {
        self.imp().pull(Some(timeout.into()))
    }

    /// Whether EOS was received and every sample has been pulled.
    pub fn is_eos(&self) -> bool {
        let st = self.imp().lock_state();
        st.eos && st.queue.is_empty()
    }

    /// Get the number of queued samples.
    pub fn queue_len(&self) -> usize {
        self.imp().lock_state().queue.len()
    }

    /// Accept only `caps`.
    pub fn set_caps(&self, caps: &Caps) {
        self.imp().settings.lock().unwrap().caps = caps.clone();
    }

    /// Get statistics.
    pub fn stats(&self) -> AppSinkStats {
        self.imp().stats()
    }

    /// Call `f` for every new sample, on the streaming thread. Turns on
    /// `emit-signals`.
    pub fn connect_new_sample<F>(&self, f: F) -> Result<SignalHandlerId>
    where
        F: Fn(&AppSink) + Send + Sync + 'static,
    {
        self.imp().settings.lock().unwrap().emit_signals = true;
        self.element.connect("new-sample", move |element| {
            if let Some(appsink) = AppSink::from_element(element) {
                f(&appsink);
            }
        })
    }
}

impl Deref for AppSink {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.element
    }
}

impl AsRef<Element> for AppSink {
    fn as_ref(&self) -> &Element {
        &self.element
    }
}

/// Statistics for AppSink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppSinkStats {
    /// Samples waiting to be pulled.
    pub queued: usize,
    /// Samples queued since creation.
    pub total_received: u64,
    /// Samples dropped because the queue was full.
    pub total_dropped: u64,
}
