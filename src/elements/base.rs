//! Machinery shared by sources, sinks and pass-through elements.
//!
//! - [`PushSrc`] + [`BaseSrc`]: a streaming task that calls
//!   [`PushSrc::create`] and pushes the result out of the `src` pad, from
//!   READY to PAUSED until PAUSED to READY.
//! - [`RenderSink`] + [`BaseSink`]: preroll (the first buffer completes the
//!   asynchronous READY to PAUSED), waiting for PLAYING, clock
//!   synchronisation and EOS reporting.
//! - [`proxy_query_caps`]: caps queries for elements that do not change the
//!   format.

use crate::buffer::Buffer;
use crate::bus::Message;
use crate::caps::Caps;
use crate::clock::ClockTime;
use crate::element::{
    Element, ElementImpl, Pad, PadDirection, StateChange, StateChangeSuccess, Task,
};
use crate::error::{FlowError, FlowResult, StateChangeError};
use crate::event::Event;
use crate::observability::span_element;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, error, trace};

static NEXT_STREAM: AtomicU64 = AtomicU64::new(0);

// ============================================================================
// Sources
// ============================================================================

/// A source producing buffers on its own streaming thread.
pub(crate) trait PushSrc: ElementImpl {
    fn base_src(&self) -> &BaseSrc;

    /// Next buffer; `Ok(None)` ends the stream.
    fn create(&self, element: &Element) -> Result<Option<Buffer>, FlowError>;

    /// Live sources only produce in PLAYING and do not preroll.
    fn is_live(&self) -> bool {
        false
    }

    /// Caps announced before the first buffer.
    fn stream_caps(&self, element: &Element) -> Option<Caps> {
        element.pad_caps("src")
    }

    /// Wake a `create` blocked on something other than the element state.
    fn unlock(&self) {}

    /// Reset per-run counters before the task starts.
    fn start(&self, element: &Element) {
        let _ = element;
    }
}

#[derive(Default)]
struct SrcState {
    playing: bool,
    flushing: bool,
}

/// Streaming task state of a [`PushSrc`].
#[derive(Default)]
pub(crate) struct BaseSrc {
    task: Task,
    state: Mutex<SrcState>,
    cond: Condvar,
}

impl BaseSrc {
    pub(crate) fn change_state<S: PushSrc>(
        imp: &S,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
        let base = imp.base_src();
        match transition {
            StateChange::ReadyToPaused => {
                *base.state.lock().unwrap() = SrcState::default();
                imp.start(element);
                let streaming = element.clone();
                let factory = element.factory().map_or("source", |f| f.name());
                let span = span_element(element.name(), factory);
                base.task
                    .start(&format!("{}:src", element.name()), move || {
                        let _guard = span.enter();
                        source_loop::<S>(&streaming)
                    })
                    .map_err(|err| {
                        error!(element = %element.name(), error = %err, "failed to start streaming task");
                        StateChangeError
                    })?;
                if imp.is_live() {
                    return Ok(StateChangeSuccess::NoPreroll);
                }
            }
            StateChange::PausedToPlaying => {
                base.state.lock().unwrap().playing = true;
                base.cond.notify_all();
            }
            StateChange::PlayingToPaused => {
                base.state.lock().unwrap().playing = false;
                if imp.is_live() {
                    return Ok(StateChangeSuccess::NoPreroll);
                }
            }
            StateChange::PausedToReady => {
                base.state.lock().unwrap().flushing = true;
                base.cond.notify_all();
                imp.unlock();
                base.task.join();
            }
            _ => {}
        }
        Ok(StateChangeSuccess::Success)
    }

    /// Whether the task is being stopped.
    pub(crate) fn is_flushing(&self) -> bool {
        self.state.lock().unwrap().flushing
    }

    /// Block until PLAYING. False when stopping.
    fn wait_playing(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        while !st.playing && !st.flushing {
            st = self.cond.wait(st).unwrap();
        }
        !st.flushing
    }

    /// Sleep up to `duration`, waking early when stopping. False when
    /// stopping.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let st = self.state.lock().unwrap();
        let (st, _) = self
            .cond
            .wait_timeout_while(st, duration, |st| !st.flushing)
            .unwrap();
        !st.flushing
    }
}

fn source_loop<S: PushSrc>(element: &Element) {
    let (Some(imp), Some(pad)) = (element.imp::<S>(), element.static_pad("src")) else {
        return;
    };
    let base = imp.base_src();
    let stream_id = format!(
        "{}/{:04}",
        element.name(),
        NEXT_STREAM.fetch_add(1, Ordering::Relaxed)
    );
    pad.push_event(Event::StreamStart { stream_id });
    if let Some(caps) = imp.stream_caps(element) {
        pad.push_event(Event::Caps(caps));
    }

    loop {
        if imp.is_live() && !base.wait_playing() {
            break;
        }
        let result = match imp.create(element) {
            Ok(Some(buffer)) => pad.push(buffer),
            Ok(None) => {
                debug!(element = %element.name(), "end of stream");
                pad.push_event(Event::Eos);
                break;
            }
            Err(err) => Err(err),
        };
        match result {
            Ok(_) => {}
            Err(FlowError::Flushing) => {
                debug!(element = %element.name(), "pausing task, flushing");
                break;
            }
            Err(FlowError::Eos) => {
                debug!(element = %element.name(), "pausing task, downstream is EOS");
                break;
            }
            Err(err) => {
                element.post_error(
                    "Internal data stream error.",
                    Some(format!("streaming stopped, reason {err}")),
                );
                pad.push_event(Event::Eos);
                break;
            }
        }
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// A sink consuming buffers on the upstream streaming thread.
pub(crate) trait RenderSink: ElementImpl {
    fn base_sink(&self) -> &BaseSink;

    /// Consume a buffer in PLAYING, after clock synchronisation.
    fn render(&self, element: &Element, buffer: Buffer) -> FlowResult;

    /// Whether to wait for each buffer's running time on the clock.
    fn sync(&self) -> bool;

    /// End of stream reached, before the EOS message is posted.
    fn eos(&self, element: &Element) {
        let _ = element;
    }

    /// Data is being discarded (flush or PAUSED to READY).
    fn flush(&self, element: &Element) {
        let _ = element;
    }
}

#[derive(Default)]
struct SinkState {
    prerolled: bool,
    playing: bool,
    flushing: bool,
}

/// Preroll and synchronisation state of a [`RenderSink`].
#[derive(Default)]
pub(crate) struct BaseSink {
    state: Mutex<SinkState>,
    cond: Condvar,
}

impl BaseSink {
    pub(crate) fn change_state<S: RenderSink>(
        imp: &S,
        element: &Element,
        transition: StateChange,
    ) -> Result<StateChangeSuccess, StateChangeError> {
        let base = imp.base_sink();
        match transition {
            StateChange::ReadyToPaused => {
                *base.state.lock().unwrap() = SinkState::default();
                debug!(element = %element.name(), "waiting for preroll");
                return Ok(StateChangeSuccess::Async);
            }
            StateChange::PausedToPlaying => {
                base.state.lock().unwrap().playing = true;
                base.cond.notify_all();
            }
            StateChange::PlayingToPaused => {
                base.state.lock().unwrap().playing = false;
                base.cond.notify_all();
            }
            StateChange::PausedToReady => {
                {
                    let mut st = base.state.lock().unwrap();
                    st.flushing = true;
                    st.prerolled = false;
                }
                base.cond.notify_all();
                imp.flush(element);
            }
            _ => {}
        }
        Ok(StateChangeSuccess::Success)
    }

    pub(crate) fn chain<S: RenderSink>(imp: &S, element: &Element, buffer: Buffer) -> FlowResult {
        let base = imp.base_sink();
        base.preroll(element)?;
        if imp.sync() {
            base.wait_clock(element, buffer.pts())?;
        }
        trace!(element = %element.name(), pts = ?buffer.pts(), "render");
        imp.render(element, buffer)
    }

    pub(crate) fn event<S: RenderSink>(imp: &S, element: &Element, event: Event) -> bool {
        let base = imp.base_sink();
        match event {
            Event::Eos => {
                // EOS before any buffer still completes preroll.
                if base.preroll(element).is_err() {
                    return false;
                }
                debug!(element = %element.name(), "received EOS");
                imp.eos(element);
                element.post_message(Message::eos(element));
                true
            }
            Event::StreamStart { .. } => {
                element.post_message(Message::stream_start(element));
                true
            }
            Event::FlushStart => {
                base.state.lock().unwrap().flushing = true;
                base.cond.notify_all();
                imp.flush(element);
                true
            }
            Event::FlushStop => {
                base.state.lock().unwrap().flushing = false;
                true
            }
            Event::Caps(_) => true,
        }
    }

    /// Whether the sink has received its first buffer (or EOS) since READY.
    pub(crate) fn is_prerolled(&self) -> bool {
        self.state.lock().unwrap().prerolled
    }

    /// Complete the async state change on the first call, then hold the
    /// streaming thread until PLAYING.
    fn preroll(&self, element: &Element) -> Result<(), FlowError> {
        let first = {
            let mut st = self.state.lock().unwrap();
            if st.flushing {
                return Err(FlowError::Flushing);
            }
            !std::mem::replace(&mut st.prerolled, true)
        };
        if first {
            debug!(element = %element.name(), "prerolled");
            element.continue_state();
        }
        let st = self.wait_while(self.state.lock().unwrap(), |st| !st.playing)?;
        drop(st);
        Ok(())
    }

    fn wait_while<'a>(
        &self,
        st: MutexGuard<'a, SinkState>,
        mut blocked: impl FnMut(&SinkState) -> bool,
    ) -> Result<MutexGuard<'a, SinkState>, FlowError> {
        let st = self
            .cond
            .wait_while(st, |st| !st.flushing && blocked(st))
            .unwrap();
        if st.flushing {
            return Err(FlowError::Flushing);
        }
        Ok(st)
    }

    /// Wait until the clock reaches the buffer's running time.
    fn wait_clock(&self, element: &Element, pts: Option<ClockTime>) -> Result<(), FlowError> {
        let Some(pts) = pts else {
            return Ok(());
        };
        let mut st = self.state.lock().unwrap();
        loop {
            st = self.wait_while(st, |st| !st.playing)?;
            // Re-read each round: resuming from PAUSED picks a new base time.
            let Some(binding) = element.clock_binding() else {
                return Ok(());
            };
            let target = binding.base_time + pts;
            let now = binding.clock.time();
            if now >= target {
                return Ok(());
            }
            trace!(element = %element.name(), wait = %(target - now), "waiting for clock");
            st = self.cond.wait_timeout(st, (target - now).into()).unwrap().0;
            if st.flushing {
                return Err(FlowError::Flushing);
            }
        }
    }
}

// ============================================================================
// Pass-through caps
// ============================================================================

/// Answer a caps query on `pad` with what the peers on the other side
/// accept, narrowed to `pad`'s template.
pub(crate) fn proxy_query_caps(element: &Element, pad: &Pad, filter: Option<&Caps>) -> Caps {
    let others = match pad.direction() {
        PadDirection::Sink => element.src_pads(),
        PadDirection::Src => element.sink_pads(),
    };
    let mut caps = pad.template_caps();
    for other in others {
        caps = caps.intersect(&other.peer_query_caps(filter));
    }
    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{PadPresence, PadTemplate, State};
    use crate::pipeline::Bin;
    use std::sync::atomic::AtomicU32;

    #[derive(Default)]
    struct CountSrc {
        base: BaseSrc,
        left: AtomicU32,
    }

    impl PushSrc for CountSrc {
        fn base_src(&self) -> &BaseSrc {
            &self.base
        }

        fn create(&self, _element: &Element) -> Result<Option<Buffer>, FlowError> {
            let left = self.left.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(None);
            }
            self.left.store(left - 1, Ordering::SeqCst);
            Ok(Some(Buffer::from_slice(&[left as u8])))
        }

        fn start(&self, _element: &Element) {
            self.left.store(3, Ordering::SeqCst);
        }
    }

    impl ElementImpl for CountSrc {
        fn change_state(
            &self,
            element: &Element,
            transition: StateChange,
        ) -> Result<StateChangeSuccess, StateChangeError> {
            BaseSrc::change_state(self, element, transition)
        }
    }

    #[derive(Default)]
    struct Recorder {
        base: BaseSink,
        seen: Mutex<Vec<u8>>,
    }

    impl RenderSink for Recorder {
        fn base_sink(&self) -> &BaseSink {
            &self.base
        }

        fn render(&self, _element: &Element, buffer: Buffer) -> FlowResult {
            self.seen.lock().unwrap().push(buffer.as_bytes()[0]);
            Ok(crate::error::FlowSuccess::Ok)
        }

        fn sync(&self) -> bool {
            false
        }
    }

    impl ElementImpl for Recorder {
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
    }

    fn any(name: &str, direction: PadDirection) -> PadTemplate {
        PadTemplate::new(name, direction, PadPresence::Always, Caps::new_any())
    }

    #[test]
    fn test_sink_prerolls_then_renders_in_playing() {
        let bin = Bin::with_name("b");
        let src = Element::new("src", vec![any("src", PadDirection::Src)], CountSrc::default());
        let sink = Element::new("sink", vec![any("sink", PadDirection::Sink)], Recorder::default());
        bin.add_many(&[&src, &sink]).unwrap();
        src.link(&sink).unwrap();

        assert_eq!(bin.set_state(State::Paused), Ok(StateChangeSuccess::Async));
        let (result, current, _) = bin.state(Some(Duration::from_secs(5)));
        assert_eq!((result, current), (Ok(StateChangeSuccess::Success), State::Paused));
        assert!(sink.imp::<Recorder>().unwrap().base.is_prerolled());
        // Held at preroll: nothing rendered yet.
        assert!(sink.imp::<Recorder>().unwrap().seen.lock().unwrap().is_empty());

        bin.set_state(State::Playing).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while sink.imp::<Recorder>().unwrap().seen.lock().unwrap().len() < 3 {
            assert!(std::time::Instant::now() < deadline, "buffers never rendered");
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*sink.imp::<Recorder>().unwrap().seen.lock().unwrap(), [3, 2, 1]);
        bin.set_state(State::Null).unwrap();
    }

    #[test]
    fn test_unlinked_source_posts_error() {
        let pipeline = crate::pipeline::Pipeline::with_name("p");
        let src = Element::new("src", vec![any("src", PadDirection::Src)], CountSrc::default());
        pipeline.add(&src).unwrap();
        pipeline.set_state(State::Playing).unwrap();
        let msg = pipeline
            .bus()
            .timed_pop_filtered(
                Some(ClockTime::from_secs(5)),
                crate::bus::MessageType::ERROR,
            )
            .unwrap();
        assert!(msg.is_from(&src));
        assert_eq!(
            msg.to_string(),
            "Error received from element src: Internal data stream error. \
             (streaming stopped, reason not linked)"
        );
        pipeline.set_state(State::Null).unwrap();
    }
}
