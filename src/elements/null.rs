//! Fake elements - FakeSrc and FakeSink.
//!
//! These produce and consume buffers without looking at their contents.
//! They are the usual ends of a test pipeline:
//! - Benchmarking pipeline throughput
//! - Testing filters in between
//! - Draining a pipeline without side effects

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue,
    StateChange, StateChangeSuccess,
};
use crate::elements::base::{BaseSink, BaseSrc, PushSrc, RenderSink};
use crate::error::{FlowError, FlowResult, FlowSuccess, PropertyError, StateChangeError};
use crate::event::Event;
use crate::metadata::Metadata;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

// ============================================================================
// FakeSrc
// ============================================================================

/// Settings of a [`FakeSrc`].
#[derive(Debug, Clone, PartialEq)]
pub struct FakeSrcSettings {
    /// Buffers to produce before EOS, -1 for unlimited.
    pub num_buffers: i64,
    /// Size of each buffer in bytes.
    pub sizemax: usize,
    /// Produce only in PLAYING and skip preroll.
    pub is_live: bool,
    /// Buffers are tagged with stream ids `0..num_streams` in turn.
    pub num_streams: u32,
    /// Caps announced on the src pad, ANY to leave them to negotiation.
    pub caps: Caps,
}

impl Default for FakeSrcSettings {
    fn default() -> Self {
        Self {
            num_buffers: -1,
            sizemax: 4096,
            is_live: false,
            num_streams: 1,
            caps: Caps::new_any(),
        }
    }
}

impl FakeSrcSettings {
    /// Set the number of buffers.
    pub fn num_buffers(mut self, num_buffers: i64) -> Self {
        self.num_buffers = num_buffers;
        self
    }

    /// Set the buffer size.
    pub fn sizemax(mut self, sizemax: usize) -> Self {
        self.sizemax = sizemax;
        self
    }

    /// Make the source live.
    pub fn is_live(mut self, is_live: bool) -> Self {
        self.is_live = is_live;
        self
    }

    /// Set the number of interleaved streams.
    pub fn num_streams(mut self, num_streams: u32) -> Self {
        self.num_streams = num_streams;
        self
    }

    /// Set the output caps.
    pub fn caps(mut self, caps: Caps) -> Self {
        self.caps = caps;
        self
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<(), PropertyError> {
        if self.num_buffers < -1 {
            return Err(PropertyError::invalid("num-buffers", "must be -1 or more"));
        }
        if self.num_streams == 0 {
            return Err(PropertyError::invalid("num-streams", "must be at least 1"));
        }
        Ok(())
    }
}

/// A source that pushes zero-filled buffers.
///
/// Each buffer carries a sequence number and, when `num-streams` is more
/// than one, a stream id cycling through the streams.
///
/// # Properties
///
/// | Name | Type | Default |
/// |------|------|---------|
/// | `num-buffers` | int | -1 |
/// | `sizemax` | int | 4096 |
/// | `is-live` | bool | false |
/// | `num-streams` | uint | 1 |
/// | `caps` | caps | ANY |
#[derive(Default)]
pub struct FakeSrc {
    base: BaseSrc,
    settings: Mutex<FakeSrcSettings>,
    produced: AtomicU64,
}

impl FakeSrc {
    /// Create with the given settings.
    pub fn with_settings(settings: FakeSrcSettings) -> Result<Self, PropertyError> {
        settings.validate()?;
        Ok(Self {
            settings: Mutex::new(settings),
            ..Self::default()
        })
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

    /// Buffers produced since the last start.
    pub fn produced(&self) -> u64 {
        self.produced.load(Ordering::Relaxed)
    }
}

impl PushSrc for FakeSrc {
    fn base_src(&self) -> &BaseSrc {
        &self.base
    }

    fn create(&self, _element: &Element) -> Result<Option<Buffer>, FlowError> {
        let settings = self.settings.lock().unwrap().clone();
        let sequence = self.produced.load(Ordering::Relaxed);
        if settings.num_buffers >= 0 && sequence >= settings.num_buffers as u64 {
            return Ok(None);
        }
        self.produced.fetch_add(1, Ordering::Relaxed);
        let metadata = Metadata::with_sequence(sequence)
            .with_stream_id(sequence % u64::from(settings.num_streams));
        Ok(Some(Buffer::new(vec![0u8; settings.sizemax], metadata)))
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

    fn start(&self, _element: &Element) {
        self.produced.store(0, Ordering::Relaxed);
    }
}

impl ElementImpl for FakeSrc {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
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
    ) -> Result<(), PropertyError> {
        let mut settings = self.settings.lock().unwrap().clone();
        match name {
            "num-buffers" => settings.num_buffers = value.get_i64(name)?,
            "sizemax" => settings.sizemax = value.get_u32(name)? as usize,
            "is-live" => settings.is_live = value.get_bool(name)?,
            "num-streams" => settings.num_streams = value.get_u32(name)?,
            "caps" => settings.caps = value.get_caps(name)?,
            _ => return Err(PropertyError::unknown(name)),
        }
        settings.validate()?;
        *self.settings.lock().unwrap() = settings;
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        let settings = self.settings.lock().unwrap();
        Ok(match name {
            "num-buffers" => PropertyValue::Int(settings.num_buffers),
            "sizemax" => PropertyValue::Int(settings.sizemax as i64),
            "is-live" => PropertyValue::Bool(settings.is_live),
            "num-streams" => PropertyValue::UInt(u64::from(settings.num_streams)),
            "caps" => PropertyValue::Caps(settings.caps.clone()),
            _ => return Err(PropertyError::unknown(name)),
        })
    }
}

// ============================================================================
// FakeSink
// ============================================================================

/// Settings of a [`FakeSink`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeSinkSettings {
    /// Wait for each buffer's running time before rendering it.
    pub sync: bool,
    /// Emit `handoff` for every rendered buffer.
    pub signal_handoffs: bool,
}

impl FakeSinkSettings {
    /// Enable clock synchronisation.
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Enable the `handoff` signal.
    pub fn signal_handoffs(mut self, signal_handoffs: bool) -> Self {
        self.signal_handoffs = signal_handoffs;
        self
    }
}

/// A sink that discards every buffer.
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
/// use padflow::elements::FakeSink;
///
/// let pipeline = Pipeline::new();
/// let src = ElementFactory::make("fakesrc").property("num-buffers", 4).build().unwrap();
/// let sink = ElementFactory::make("fakesink").name("sink").build().unwrap();
/// pipeline.add_many(&[&src, &sink]).unwrap();
/// src.link(&sink).unwrap();
///
/// pipeline.set_state(State::Playing).unwrap();
/// pipeline.bus().timed_pop_filtered(None, MessageType::EOS).unwrap();
/// assert_eq!(sink.imp::<FakeSink>().unwrap().rendered(), 4);
/// pipeline.set_state(State::Null).unwrap();
/// ```
#[derive(Default)]
pub struct FakeSink {
    base: BaseSink,
    settings: Mutex<FakeSinkSettings>,
    rendered: AtomicU64,
}

impl FakeSink {
    /// Create with the given settings.
    pub fn with_settings(settings: FakeSinkSettings) -> Self {
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

    /// Buffers rendered since the element was created.
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }
}

impl RenderSink for FakeSink {
    fn base_sink(&self) -> &BaseSink {
        &self.base
    }

    fn render(&self, element: &Element, buffer: Buffer) -> FlowResult {
        let count = self.rendered.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(
            element = %element.name(),
            sequence = buffer.metadata().sequence,
            size = buffer.len(),
            count,
            "discarding buffer"
        );
        if self.settings.lock().unwrap().signal_handoffs {
            let _ = element.emit_by_name("handoff");
        }
        Ok(FlowSuccess::Ok)
    }

    fn sync(&self) -> bool {
        self.settings.lock().unwrap().sync
    }
}

impl ElementImpl for FakeSink {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
        BaseSink::change_state(self, element, transition)
    }

    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        BaseSink::chain(self, element, buffer)
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: Event) -> bool {
        BaseSink::event(self, element, event)
    }

    fn set_property(
        &self,
        _element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        let mut settings = self.settings.lock().unwrap();
        match name {
            "sync" => settings.sync = value.get_bool(name)?,
            "signal-handoffs" => settings.signal_handoffs = value.get_bool(name)?,
            "rendered" => return Err(PropertyError::invalid(name, "read-only")),
            _ => return Err(PropertyError::unknown(name)),
        }
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        let settings = self.settings.lock().unwrap();
        Ok(match name {
            "sync" => PropertyValue::Bool(settings.sync),
            "signal-handoffs" => PropertyValue::Bool(settings.signal_handoffs),
            "rendered" => PropertyValue::UInt(self.rendered()),
            _ => return Err(PropertyError::unknown(name)),
        })
    }

    fn signals(&self) -> &'static [&'static str] {
        &["handoff"]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageType;
    use crate::clock::ClockTime;
    use crate::element::State;
    use crate::pipeline::Pipeline;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn run_to_eos(pipeline: &Pipeline) {
        pipeline.set_state(State::Playing).unwrap();
        let msg = pipeline
            .bus()
            .timed_pop_filtered(
                Some(ClockTime::from_secs(5)),
                MessageType::EOS | MessageType::ERROR,
            )
            .unwrap();
        assert_eq!(msg.type_(), MessageType::EOS, "{msg}");
    }

    #[test]
    fn test_fakesrc_to_fakesink() {
        let pipeline = Pipeline::new();
        let src = Element::new(
            "src",
            FakeSrc::templates(),
            FakeSrc::with_settings(FakeSrcSettings::default().num_buffers(10).sizemax(16)).unwrap(),
        );
        let sink = Element::new("sink", FakeSink::templates(), FakeSink::default());
        pipeline.add_many(&[&src, &sink]).unwrap();
        src.link(&sink).unwrap();

        let handoffs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&handoffs);
        sink.connect("handoff", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        sink.set_property("signal-handoffs", true).unwrap();

        run_to_eos(&pipeline);
        assert_eq!(src.imp::<FakeSrc>().unwrap().produced(), 10);
        assert_eq!(sink.property("rendered"), Ok(PropertyValue::UInt(10)));
        assert_eq!(handoffs.load(Ordering::SeqCst), 10);
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn test_fakesrc_restarts_count() {
        let pipeline = Pipeline::new();
        let src = Element::new("src", FakeSrc::templates(), FakeSrc::default());
        let sink = Element::new("sink", FakeSink::templates(), FakeSink::default());
        src.set_property("num-buffers", 3).unwrap();
        pipeline.add_many(&[&src, &sink]).unwrap();
        src.link(&sink).unwrap();

        run_to_eos(&pipeline);
        pipeline.set_state(State::Ready).unwrap();
        run_to_eos(&pipeline);
        assert_eq!(sink.imp::<FakeSink>().unwrap().rendered(), 6);
        pipeline.set_state(State::Null).unwrap();
    }

    #[test]
    fn test_fakesrc_properties() {
        let src = Element::new("src", FakeSrc::templates(), FakeSrc::default());
        assert_eq!(src.property("num-buffers"), Ok(PropertyValue::Int(-1)));
        assert!(matches!(
            src.set_property("num-streams", 0u32),
            Err(PropertyError::Invalid { .. })
        ));
        assert!(matches!(
            src.set_property("is-live", 3.5),
            Err(PropertyError::TypeMismatch { .. })
        ));
        src.set_property("caps", "audio/x-raw, rate=8000").unwrap();
        let caps = src.static_pad("src").unwrap().query_caps(None);
        assert_eq!(caps.structure(0).unwrap().get_int("rate"), Some(8000));
        assert!(FakeSrc::with_settings(FakeSrcSettings::default().num_buffers(-2)).is_err());
    }

    #[test]
    fn test_fakesink_is_sink() {
        let sink = Element::new("sink", FakeSink::templates(), FakeSink::default());
        assert!(sink.is_sink());
        assert!(matches!(
            sink.set_property("rendered", 1u64),
            Err(PropertyError::Invalid { .. })
        ));
    }
}
