//! The top-level pipeline: a bin with a bus and a clock.

use crate::bus::Bus;
use crate::clock::{ClockTime, PipelineClock};
use crate::element::{Element, State};
use crate::pipeline::bin::{Bin, BinImpl};
use crate::pipeline::factory::auto_name;
use std::ops::Deref;
use tracing::{debug, warn};

/// A bin that owns a [`Bus`] and a clock.
///
/// Children's messages end up on the pipeline's bus. On PAUSED to PLAYING
/// the pipeline picks a base time and hands the clock to every element so
/// sinks can synchronise on running time.
///
/// Dropping the pipeline sets it to NULL, joining every streaming thread.
///
/// ```rust
/// use padflow::prelude::*;
///
/// let pipeline = Pipeline::with_name("p");
/// let src = ElementFactory::make("fakesrc").property("num-buffers", 3).build().unwrap();
/// let sink = ElementFactory::make("fakesink").build().unwrap();
/// pipeline.add_many(&[&src, &sink]).unwrap();
/// src.link(&sink).unwrap();
///
/// pipeline.set_state(State::Playing).unwrap();
/// let msg = pipeline
///     .bus()
///     .timed_pop_filtered(None, MessageType::EOS | MessageType::ERROR)
///     .unwrap();
/// assert_eq!(msg.type_(), MessageType::EOS);
/// pipeline.set_state(State::Null).unwrap();
/// ```
#[derive(Debug)]
pub struct Pipeline {
    bin: Bin,
    bus: Bus,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a pipeline with a generated name.
    pub fn new() -> Self {
        Self::with_name(&auto_name("pipeline"))
    }

    /// Create a pipeline named `name`.
    pub fn with_name(name: &str) -> Self {
        let bus = Bus::new();
        let element = Element::new_toplevel(
            name,
            BinImpl::toplevel(PipelineClock::system()),
            bus.clone(),
        );
        debug!(pipeline = %name, "created pipeline");
        Self {
            bin: Bin(element),
            bus,
        }
    }

    /// The pipeline's bus.
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// The pipeline as a bin.
    pub fn bin(&self) -> &Bin {
        &self.bin
    }

    /// Running time since the pipeline last started playing, frozen while
    /// paused.
    pub fn clock_running_time(&self) -> ClockTime {
        self.imp_clock()
            .map_or(ClockTime::ZERO, PipelineClock::running_time)
    }

    fn imp_clock(&self) -> Option<&PipelineClock> {
        self.bin.element().imp::<BinImpl>()?.clock.as_ref()
    }
}

impl Deref for Pipeline {
    type Target = Bin;

    fn deref(&self) -> &Bin {
        &self.bin
    }
}

impl AsRef<Element> for Pipeline {
    fn as_ref(&self) -> &Element {
        self.bin.element()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if self.current_state() == State::Null && self.pending_state().is_none() {
            return;
        }
        debug!(pipeline = %self.name(), "dropped while running, shutting down");
        if self.set_state(State::Null).is_err() {
            warn!(pipeline = %self.name(), "failed to reach NULL on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{MessageType, MessageView};
    use crate::element::StateChangeSuccess;

    #[test]
    fn test_empty_pipeline_state_messages() {
        let pipeline = Pipeline::with_name("empty");
        assert_eq!(
            pipeline.set_state(State::Paused),
            Ok(StateChangeSuccess::Success)
        );
        let bus = pipeline.bus();
        let mut seen = Vec::new();
        while let Some(msg) = bus.pop_filtered(MessageType::STATE_CHANGED) {
            if let MessageView::StateChanged { old, current, .. } = msg.view() {
                assert!(msg.is_from(pipeline.element()));
                seen.push((*old, *current));
            }
        }
        assert_eq!(
            seen,
            [(State::Null, State::Ready), (State::Ready, State::Paused)]
        );
    }

    #[test]
    fn test_playing_distributes_clock() {
        let pipeline = Pipeline::with_name("clocked");
        let bin = Bin::with_name("inner");
        pipeline.add(bin.element()).unwrap();
        pipeline.set_state(State::Playing).unwrap();
        assert!(bin.clock().is_some());
        assert!(bin.base_time().is_some());
        let first = pipeline.clock_running_time();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(pipeline.clock_running_time() > first);
        assert!(
            pipeline
                .bus()
                .pop_filtered(MessageType::NEW_CLOCK)
                .is_some()
        );
        pipeline.set_state(State::Null).unwrap();
        assert!(!pipeline.bus().post(crate::bus::Message::application(
            crate::caps::Structure::new("late")
        )));
    }

    #[test]
    fn test_drop_while_playing() {
        let pipeline = Pipeline::new();
        let inner = Bin::new();
        pipeline.add(inner.element()).unwrap();
        pipeline.set_state(State::Playing).unwrap();
        drop(pipeline);
        assert_eq!(inner.current_state(), State::Null);
    }
}
