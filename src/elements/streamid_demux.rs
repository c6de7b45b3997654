//! StreamIdDemux element for demultiplexing by stream ID.
//!
//! Routes buffers to different outputs based on a stream identifier.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{
    Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue,
    StateChange, StateChangeSuccess,
};
use crate::error::{FlowError, FlowResult, FlowSuccess, PropertyError, StateChangeError};
use crate::event::Event;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Function type for extracting stream ID from a buffer.
pub type StreamIdExtractor = Box<dyn Fn(&Buffer) -> u64 + Send + Sync>;

#[derive(Default)]
struct StreamIdDemuxState {
    outputs: BTreeMap<u64, Output>,
    no_more_pads: bool,
    total_received: u64,
    total_routed: u64,
}

struct Output {
    pad: Pad,
    last_flow: FlowResult,
}

/// A demuxer that routes buffers to outputs based on stream ID.
///
/// Each unique stream ID gets its own `src_<id>` sometimes pad, created and
/// announced with `pad-added` when the first buffer of the stream arrives.
/// By default the id is [`Metadata::stream_id`](crate::metadata::Metadata),
/// with untagged buffers going to stream 0.
///
/// # Properties
///
/// | Name | Type | Default |
/// |------|------|---------|
/// | `stream-caps` | caps | ANY |
/// | `num-streams` | uint | 0 (unknown) |
///
/// With `stream-caps` holding several structures, stream `n` is announced
/// with structure `n % len` as its caps, which is enough to exercise
/// media-type routing of dynamic pads. Once `num-streams` pads exist (or
/// at EOS) the demuxer emits `no-more-pads`.
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
/// use padflow::elements::StreamIdDemux;
///
/// // Demux by buffer sequence number modulo 2 (even/odd)
/// let demux = Element::new(
///     "demux",
///     StreamIdDemux::templates(),
///     StreamIdDemux::new(|buf| buf.metadata().sequence % 2),
/// );
/// demux.connect_pad_added(|_, pad| println!("new stream on {}", pad.name()));
/// assert!(demux.src_pads().is_empty());
/// ```
pub struct StreamIdDemux {
    extractor: StreamIdExtractor,
    stream_caps: Mutex<Caps>,
    num_streams: Mutex<u32>,
    state: Mutex<StreamIdDemuxState>,
}

impl Default for StreamIdDemux {
    fn default() -> Self {
        Self::new(|buf| buf.metadata().stream_id.unwrap_or(0))
    }
}

impl StreamIdDemux {
    /// Create a new stream ID demuxer with an extractor function.
    pub fn new<F>(extractor: F) -> Self
    where
        F: Fn(&Buffer) -> u64 + Send + Sync + 'static,
    {
        Self {
            extractor: Box::new(extractor),
            stream_caps: Mutex::new(Caps::new_any()),
            num_streams: Mutex::new(0),
            state: Mutex::new(StreamIdDemuxState::default()),
        }
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        vec![
            PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any()),
            PadTemplate::new("src_%u", PadDirection::Src, PadPresence::Sometimes, Caps::new_any()),
        ]
    }

    /// Caps announced for stream `id`, if any.
    fn caps_for(&self, id: u64) -> Option<Caps> {
        let caps = self.stream_caps.lock().unwrap();
        if caps.is_any() || caps.is_empty() {
            return None;
        }
        let index = (id % caps.size() as u64) as usize;
        caps.structure(index).cloned().map(Caps::from_structure)
    }

    fn stream_of(&self, pad: &Pad) -> Option<u64> {
        pad.name().strip_prefix("src_")?.parse().ok()
    }

    /// Pad for stream `id`, created and announced on first use.
    fn output(&self, element: &Element, id: u64) -> Result<Pad, FlowError> {
        if let Some(output) = self.state.lock().unwrap().outputs.get(&id) {
            return Ok(output.pad.clone());
        }
        let template = element
            .pad_template("src_%u")
            .ok_or(FlowError::Error)?;
        let pad = Pad::from_template(template, format!("src_{id}"));
        self.state.lock().unwrap().outputs.insert(
            id,
            Output {
                pad: pad.clone(),
                last_flow: Ok(FlowSuccess::Ok),
            },
        );
        debug!(element = %element.name(), stream = id, "new stream");
        element.add_pad(&pad).map_err(|err| {
            element.post_error("Failed to add stream pad.", Some(err.to_string()));
            FlowError::Error
        })?;
        pad.push_event(Event::StreamStart {
            stream_id: format!("{}/{id}", element.name()),
        });
        if let Some(caps) = self.caps_for(id) {
            pad.push_event(Event::Caps(caps));
        }

        let expected = *self.num_streams.lock().unwrap();
        let announce = {
            let mut st = self.state.lock().unwrap();
            let done = expected > 0 && st.outputs.len() as u64 >= u64::from(expected);
            done && !std::mem::replace(&mut st.no_more_pads, true)
        };
        if announce {
            element.no_more_pads();
        }
        Ok(pad)
    }

    /// Combine per-stream results: only fail with `NotLinked` when no stream
    /// is linked.
    fn combine(&self, id: u64, result: FlowResult) -> FlowResult {
        let mut st = self.state.lock().unwrap();
        if let Some(output) = st.outputs.get_mut(&id) {
            output.last_flow = result;
        }
        match result {
            Err(FlowError::NotLinked) => {
                if st
                    .outputs
                    .values()
                    .all(|o| o.last_flow == Err(FlowError::NotLinked))
                {
                    Err(FlowError::NotLinked)
                } else {
                    Ok(FlowSuccess::Ok)
                }
            }
            other => other,
        }
    }

    fn remove_outputs(&self, element: &Element) {
        let outputs = std::mem::take(&mut *self.state.lock().unwrap());
        for (_, output) in outputs.outputs {
            if let Err(err) = element.remove_pad(&output.pad) {
                warn!(element = %element.name(), error = %err, "failed to remove stream pad");
            }
        }
    }

    /// Get statistics.
    pub fn stats(&self) -> StreamIdDemuxStats {
        let st = self.state.lock().unwrap();
        StreamIdDemuxStats {
            num_outputs: st.outputs.len(),
            total_received: st.total_received,
            total_routed: st.total_routed,
        }
    }
}

impl ElementImpl for StreamIdDemux {
    fn change_state(
        &self,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
        if transition == StateChange::PausedToReady {
            self.remove_outputs(element);
        }
        Ok(StateChangeSuccess::Success)
    }

    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        let id = (self.extractor)(&buffer);
        self.state.lock().unwrap().total_received += 1;
        let pad = self.output(element, id)?;
        let result = pad.push(buffer);
        if result.is_ok() {
            self.state.lock().unwrap().total_routed += 1;
        }
        self.combine(id, result)
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: Event) -> bool {
        match event {
            // Every output announces its own stream.
            Event::StreamStart { .. } | Event::Caps(_) => true,
            Event::Eos => {
                let announce = !std::mem::replace(&mut self.state.lock().unwrap().no_more_pads, true);
                if announce {
                    element.no_more_pads();
                }
                element.forward_event(Event::Eos)
            }
            event => element.forward_event(event),
        }
    }

    fn query_caps(&self, _element: &Element, pad: &Pad, _filter: Option<&Caps>) -> Caps {
        match self.stream_of(pad).and_then(|id| self.caps_for(id)) {
            Some(caps) => caps,
            None => pad.template_caps(),
        }
    }

    fn set_property(
        &self,
        _element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        match name {
            "stream-caps" => *self.stream_caps.lock().unwrap() = value.get_caps(name)?,
            "num-streams" => *self.num_streams.lock().unwrap() = value.get_u32(name)?,
            _ => return Err(PropertyError::unknown(name)),
        }
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        Ok(match name {
            "stream-caps" => PropertyValue::Caps(self.stream_caps.lock().unwrap().clone()),
            "num-streams" => PropertyValue::UInt(u64::from(*self.num_streams.lock().unwrap())),
            _ => return Err(PropertyError::unknown(name)),
        })
    }
}

/// Statistics for StreamIdDemux.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamIdDemuxStats {
    /// Number of stream pads.
    pub num_outputs: usize,
    /// Buffers received.
    pub total_received: u64,
    /// Buffers pushed to a linked stream.
    pub total_routed: u64,
}
