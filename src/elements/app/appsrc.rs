//! AppSrc element for injecting data from application code.
//!
//! Allows applications to push buffers into a pipeline programmatically.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue,
    SignalHandlerId, StateChange, StateChangeSuccess,
};
use crate::elements::base::{BaseSrc, PushSrc};
use crate::error::{FlowError, FlowResult, FlowSuccess, PropertyError, Result, StateChangeError};
use crate::pipeline::ElementFactory;
use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

/// Settings of an app source.
#[derive(Debug, Clone, PartialEq)]
pub struct AppSrcSettings {
    /// Caps announced downstream, ANY to leave them to negotiation.
    pub caps: Caps,
    /// Queued bytes at which `enough-data` is emitted.
    pub max_bytes: u64,
    /// Block `push_buffer` while the queue is over `max_bytes`.
    pub block: bool,
    /// Produce only in PLAYING and skip preroll.
    pub is_live: bool,
}

impl Default for AppSrcSettings {
    fn default() -> Self {
        Self {
            caps: Caps::new_any(),
            max_bytes: 200_000,
            block: false,
            is_live: false,
        }
    }
}

impl AppSrcSettings {
    /// Set the caps.
    pub fn caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    /// Set the queue threshold.
    pub fn max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Enable blocking pushes.
    pub fn block(mut self, block: bool) -> Self {
        self.block = block;
        self
    }

    /// Make the source live.
    pub fn is_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }
}

#[derive(Default)]
struct AppSrcState {
    queue: VecDeque<Buffer>,
    bytes: u64,
    eos: bool,
    flushing: bool,
    /// `enough-data` was emitted and the level has not dropped since.
    enough: bool,
    total_pushed: u64,
    total_produced: u64,
}

/// Behaviour of the `appsrc` element.
///
/// The streaming thread takes buffers from an internal queue fed by
/// [`AppSrc::push_buffer`]. It emits `need-data` whenever it finds the queue
/// empty, and `push_buffer` emits `enough-data` once `max-bytes` are queued.
/// Both signals run on whichever thread triggered them.
#[derive(Default)]
pub struct AppSrcImpl {
    base: BaseSrc,
    settings: Mutex<AppSrcSettings>,
    state: Mutex<AppSrcState>,
    cond: Condvar,
}

impl AppSrcImpl {
    /// Create with the given settings.
    pub fn with_settings(settings: AppSrcSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            ..Self::default()
        }
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        vec![PadTemplate::new(
            "src",
            PadDirection::Src,
            PadPresence::Always,
            Caps::new_any(),
        )]
    }

    fn lock_state(&self) -> MutexGuard<'_, AppSrcState> {
        self.state.lock().unwrap()
    }

    fn push_buffer(&self, element: &Element, buffer: Buffer) -> FlowResult {
        let settings = self.settings.lock().unwrap().clone();
        let mut st = self.lock_state();
        if settings.block {
            st = self
                .cond
                .wait_while(st, |st| {
                    !st.flushing && !st.eos && st.bytes >= settings.max_bytes
                })
                .unwrap();
        }
        if st.flushing {
            return Err(FlowError::Flushing);
        }
        if st.eos {
            return Err(FlowError::Eos);
        }
        st.bytes += buffer.len() as u64;
        st.total_pushed += 1;
        st.queue.push_back(buffer);
        let enough = st.bytes >= settings.max_bytes && !std::mem::replace(&mut st.enough, true);
        trace!(element = %element.name(), level = st.bytes, "queued buffer");
        self.cond.notify_all();
        drop(st);
        if enough {
            debug!(element = %element.name(), "queue full, enough data");
            let _ = element.emit_by_name("enough-data");
        }
        Ok(FlowSuccess::Ok)
    }

    fn end_of_stream(&self, element: &Element) -> FlowResult {
        let mut st = self.lock_state();
        if st.flushing {
            return Err(FlowError::Flushing);
        }
        st.eos = true;
        self.cond.notify_all();
        debug!(element = %element.name(), "end of stream requested");
        Ok(FlowSuccess::Ok)
    }

    /// Statistics.
    pub fn stats(&self) -> AppSrcStats {
        let st = self.lock_state();
        AppSrcStats {
            queued_buffers: st.queue.len(),
            queued_bytes: st.bytes,
            total_pushed: st.total_pushed,
            total_produced: st.total_produced,
        }
    }
}

impl PushSrc for AppSrcImpl {
    fn base_src(&self) -> &BaseSrc {
        &self.base
    }

    fn create(&self, element: &Element) -> std::result::Result<Option<Buffer>, FlowError> {
        let max_bytes = self.settings.lock().unwrap().max_bytes;
        let mut asked = false;
        let mut st = self.lock_state();
        loop {
            if st.flushing {
                return Err(FlowError::Flushing);
            }
            if let Some(buffer) = st.queue.pop_front() {
                st.bytes -= buffer.len() as u64;
                st.total_produced += 1;
                if st.bytes < max_bytes {
                    st.enough = false;
                }
                self.cond.notify_all();
                return Ok(Some(buffer));
            }
            if st.eos {
                return Ok(None);
            }
            if !asked {
                asked = true;
                drop(st);
                trace!(element = %element.name(), "queue empty, need data");
                let _ = element.emit_by_name("need-data");
                st = self.lock_state();
                continue;
            }
            st = self.cond.wait(st).unwrap();
        }
    }

    fn is_live(&self) -> bool {
        self.settings.lock().unwrap().is_live
    }

    fn stream_caps(&self, element: &Element) -> Option<Caps> {
        let caps = self.settings.lock().unwrap().caps.clone();
        if caps.is_fixed() {
            Some(caps)
        } else {
            element.pad_caps("src")
        }
    }

    fn unlock(&self) {
        let mut st = self.lock_state();
        st.flushing = true;
        st.eos = false;
        st.queue.clear();
        st.bytes = 0;
        self.cond.notify_all();
    }

    fn start(&self, _element: &Element) {
        self.lock_state().flushing = false;
    }
}

impl ElementImpl for AppSrcImpl {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> std::result::Result<StateChangeSuccess, StateChangeError> {
        BaseSrc::change_state(self, element, transition)
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
            "max-bytes" => settings.max_bytes = value.get_u64(name)?,
            "block" => settings.block = value.get_bool(name)?,
            "is-live" => settings.is_live = value.get_bool(name)?,
            "current-level-bytes" => return Err(PropertyError::invalid(name, "read-only")),
            _ => return Err(PropertyError::unknown(name)),
        }
        drop(settings);
        // A new threshold may unblock a pusher.
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
            "max-bytes" => PropertyValue::UInt(settings.max_bytes),
            "block" => PropertyValue::Bool(settings.block),
            "is-live" => PropertyValue::Bool(settings.is_live),
            "current-level-bytes" => PropertyValue::UInt(self.lock_state().bytes),
            _ => return Err(PropertyError::unknown(name)),
        })
    }

    fn signals(&self) -> &'static [&'static str] {
        &["need-data", "enough-data"]
    }
}

/// A source element that allows applications to inject buffers into a
/// pipeline.
///
/// A typed handle to an `appsrc` element; it dereferences to [`Element`] so
/// it can be added to bins and linked like any other element.
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
/// use padflow::elements::AppSrc;
///
/// let appsrc = AppSrc::new("feeder");
/// appsrc.set_caps(&"audio/x-raw, rate=8000".parse().unwrap());
/// appsrc.push_buffer(Buffer::from_slice(&[0; 16])).unwrap();
/// appsrc.end_of_stream().unwrap();
/// assert_eq!(appsrc.queue_len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct AppSrc {
    element: Element,
}

impl AppSrc {
    /// Create an `appsrc` element named `name`.
    pub fn new(name: &str) -> Self {
        let element = match ElementFactory::find("appsrc") {
            Some(factory) => factory.create(Some(name)),
            None => Element::new(name, AppSrcImpl::templates(), AppSrcImpl::default()),
        };
        Self { element }
    }

    /// Wrap an existing `appsrc` element.
    pub fn from_element(element: &Element) -> Option<Self> {
        element.imp::<AppSrcImpl>()?;
        Some(Self {
            element: element.clone(),
        })
    }

    /// The underlying element.
    pub fn element(&self) -> &Element {
        &self.element
    }

    fn imp(&self) -> &AppSrcImpl {
        let Some(imp) = self.element.imp::<AppSrcImpl>() else {
            unreachable!("AppSrc always wraps an appsrc element");
        };
        imp
    }

    /// Queue a buffer for the streaming thread.
    ///
    /// Fails with `Flushing` once the element has stopped and with `Eos`
    /// after [`end_of_stream`](Self::end_of_stream).
    pub fn push_buffer(&self, buffer: Buffer) -> FlowResult {
        self.imp().push_buffer(&self.element, buffer)
    }

    /// Send EOS after the queued buffers.
    pub fn end_of_stream(&self) -> FlowResult {
        self.imp().end_of_stream(&self.element)
    }

    /// Caps to announce downstream.
    pub fn set_caps(&self, caps: &Caps) {
        self.imp().settings.lock().unwrap().caps = caps.clone();
    }

    /// Threshold for `enough-data`.
    pub fn set_max_bytes(&self, max_bytes: u64) {
        self.imp().settings.lock().unwrap().max_bytes = max_bytes;
    }

    /// Bytes waiting to be pushed.
    pub fn current_level_bytes(&self) -> u64 {
        self.imp().lock_state().bytes
    }

    /// Get the number of queued buffers.
    pub fn queue_len(&self) -> usize {
        self.imp().lock_state().queue.len()
    }

    /// Check if end of stream was requested.
    pub fn is_eos(&self) -> bool {
        self.imp().lock_state().eos
    }

    /// Get statistics.
    pub fn stats(&self) -> AppSrcStats {
        self.imp().stats()
    }

    /// Call `f` when the source runs out of data.
    pub fn connect_need_data<F>(&self, f: F) -> Result<SignalHandlerId>
    where
        F: Fn(&AppSrc) + Send + Sync + 'static,
    {
        self.element.connect("need-data", move |element| {
            if let Some(appsrc) = AppSrc::from_element(element) {
                f(&appsrc);
            }
        })
    }

    /// Call `f` when `max-bytes` are queued.
    pub fn connect_enough_data<F>(&self, f: F) -> Result<SignalHandlerId>
    where
        F: Fn(&AppSrc) + Send + Sync + 'static,
    {
        self.element.connect("enough-data", move |element| {
            if let Some(appsrc) = AppSrc::from_element(element) {
                f(&appsrc);
            }
        })
    }
}

impl Deref for AppSrc {
    type Target = Element;

    fn deref(&self) -> &Element {
        &self.element
    }
}

impl AsRef<Element> for AppSrc {
    fn as_ref(&self) -> &Element {
        &self.element
    }
}

/// Statistics for AppSrc.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppSrcStats {
    /// Buffers waiting in the queue.
    pub queued_buffers: usize,
    /// Bytes waiting in the queue.
    pub queued_bytes: u64,
    /// Buffers accepted by `push_buffer`.
    pub total_pushed: u64,
    /// Buffers handed to the streaming thread.
    pub total_produced: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageType;
    use crate::clock::ClockTime;
    use crate::element::State;
    use crate::elements::FakeSink;
    use crate::pipeline::Pipeline;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_enough_data_at_threshold() {
        let appsrc = AppSrc::new("src");
        appsrc.set_max_bytes(10);
        let enough = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&enough);
        appsrc
            .connect_enough_data(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        for _ in 0..4 {
            appsrc.push_buffer(Buffer::from_slice(&[0; 4])).unwrap();
        }
        // Emitted once when crossing the threshold, not for every push.
        assert_eq!(enough.load(Ordering::SeqCst), 1);
        assert_eq!(appsrc.current_level_bytes(), 16);
        assert_eq!(appsrc.property("current-level-bytes"), Ok(PropertyValue::UInt(16)));
    }

    #[test]
    fn test_need_data_feeds_pipeline() {
        let pipeline = Pipeline::new();
        let appsrc = AppSrc::new("src");
        let sink = Element::new("sink", FakeSink::templates(), FakeSink::default());
        pipeline.add_many(&[appsrc.element(), &sink]).unwrap();
        appsrc.link(&sink).unwrap();

        let fed = Arc::new(AtomicUsize::new(0));
        let count = Arc::clone(&fed);
        appsrc
            .connect_need_data(move |src| {
                if count.fetch_add(1, Ordering::SeqCst) < 5 {
                    src.push_buffer(Buffer::from_slice(&[1, 2])).unwrap();
                } else {
                    src.end_of_stream().unwrap();
                }
            })
            .unwrap();

        pipeline.set_state(State::Playing).unwrap();
        let msg = pipeline
            .bus()
            .timed_pop_filtered(Some(ClockTime::from_secs(5)), MessageType::EOS | MessageType::ERROR)
            .unwrap();
        assert_eq!(msg.type_(), MessageType::EOS);
        assert_eq!(sink.imp::<FakeSink>().unwrap().rendered(), 5);
        assert_eq!(appsrc.stats().total_produced, 5);
        pipeline.set_state(State::Null).unwrap();

        assert_eq!(appsrc.push_buffer(Buffer::from_slice(&[0])), Err(FlowError::Flushing));
    }

    #[test]
    fn test_push_after_eos() {
        let appsrc = AppSrc::new("src");
        appsrc.end_of_stream().unwrap();
        assert!(appsrc.is_eos());
        assert_eq!(appsrc.push_buffer(Buffer::from_slice(&[0])), Err(FlowError::Eos));
        assert!(AppSrc::from_element(&Element::new("x", Vec::new(), FakeSink::default())).is_none());
    }
}
