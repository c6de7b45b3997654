//! Integration tests for whole pipelines: construction, state changes,
//! streaming and teardown.

use padflow::element::StateChange;
use padflow::elements::{AppSink, FakeSink};
use padflow::error::StateChangeError;
use padflow::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

const TIMEOUT: ClockTime = ClockTime::from_secs(10);

fn wait_eos(pipeline: &Pipeline) -> Message {
    let msg = pipeline
        .bus()
        .timed_pop_filtered(Some(TIMEOUT), MessageType::EOS | MessageType::ERROR)
        .expect("pipeline did not finish in time");
    assert_eq!(msg.type_(), MessageType::EOS, "unexpected message: {msg}");
    msg
}

/// A source pushing small buffers into a tiny queue in front of a slow
/// element: every buffer arrives in order and the producer was held back.
#[test]
fn test_backpressure_through_queue() {
    let pipeline = Pipeline::with_name("backpressure");
    let src = ElementFactory::make("fakesrc")
        .property("num-buffers", 10)
        .property("sizemax", 2)
        .build()
        .unwrap();
    let queue = ElementFactory::make("queue")
        .property("max-size-buffers", 0u32)
        .property("max-size-bytes", 5u64)
        .property("max-size-time", 0u64)
        .build()
        .unwrap();
    let identity = ElementFactory::make("identity")
        .property("sleep-time", 2000u32)
        .build()
        .unwrap();
    let appsink = AppSink::new("sink");
    appsink.set_property("sync", false).unwrap();

    pipeline
        .add_many(&[&src, &queue, &identity, appsink.element()])
        .unwrap();
    Element::link_many(&[&src, &queue, &identity, appsink.element()]).unwrap();

    let overruns = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&overruns);
    queue
        .connect("overrun", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    pipeline.set_state(State::Playing).unwrap();
    let mut sequences = Vec::new();
    while let Some(sample) = appsink.try_pull_sample(TIMEOUT) {
        assert_eq!(sample.buffer().len(), 2);
        sequences.push(sample.buffer().metadata().sequence);
    }
    assert_eq!(sequences, (0..10).collect::<Vec<_>>());
    assert!(appsink.is_eos());

    let flow = queue.static_pad("sink").unwrap().flow_state();
    assert!(flow.backpressure_events() >= 1);
    assert!(overruns.load(Ordering::SeqCst) >= 1);
    wait_eos(&pipeline);
    pipeline.set_state(State::Null).unwrap();
}

#[test]
fn test_launch_line_runs_to_eos() {
    let pipeline = padflow::parse::launch(
        "audiotestsrc num-buffers=5 samples-per-buffer=441 ! audio/x-raw,rate=8000 ! fakesink name=sink sync=false",
    )
    .unwrap();
    pipeline.set_state(State::Playing).unwrap();
    let eos = wait_eos(&pipeline);
    assert!(eos.is_from(pipeline.element()));

    let sink = pipeline.by_name("sink").unwrap();
    assert_eq!(sink.property("rendered"), Ok(padflow::element::PropertyValue::UInt(5)));
    let caps = sink.static_pad("sink").unwrap().current_caps().unwrap();
    let s = caps.structure(0).unwrap();
    assert_eq!((s.get_int("rate"), s.get_int("channels")), (Some(8000), Some(1)));
    pipeline.set_state(State::Null).unwrap();
}

#[test]
fn test_state_messages_and_async_done() {
    let pipeline = Pipeline::with_name("states");
    let src = ElementFactory::make("fakesrc").property("num-buffers", 1).build().unwrap();
    let sink = ElementFactory::make("fakesink").build().unwrap();
    pipeline.add_many(&[&src, &sink]).unwrap();
    src.link(&sink).unwrap();

    assert_eq!(pipeline.set_state(State::Paused), Ok(StateChangeSuccess::Async));
    let (result, current, pending) = pipeline.state(Some(TIMEOUT.into()));
    assert_eq!(result, Ok(StateChangeSuccess::Success));
    assert_eq!((current, pending), (State::Paused, None));

    let bus = pipeline.bus();
    let mut transitions = Vec::new();
    let mut async_done = false;
    while let Some(msg) = bus.pop_filtered(MessageType::STATE_CHANGED | MessageType::ASYNC_DONE) {
        if !msg.is_from(pipeline.element()) {
            continue;
        }
        match msg.view() {
            MessageView::StateChanged { old, current, .. } => transitions.push((*old, *current)),
            MessageView::AsyncDone => async_done = true,
            _ => {}
        }
    }
    assert_eq!(
        transitions,
        [(State::Null, State::Ready), (State::Ready, State::Paused)]
    );
    assert!(async_done);
    pipeline.set_state(State::Null).unwrap();
}

#[test]
fn test_streaming_error_is_posted() {
    let pipeline = padflow::parse::launch(
        "fakesrc num-buffers=100 ! identity name=broken error-after=3 ! fakesink",
    )
    .unwrap();
    pipeline.set_state(State::Playing).unwrap();
    let msg = pipeline
        .bus()
        .timed_pop_filtered(Some(TIMEOUT), MessageType::ERROR | MessageType::EOS)
        .unwrap();
    assert_eq!(msg.src_name(), Some("broken"));
    assert_eq!(
        msg.to_string(),
        "Error received from element broken: Failed to process buffer. (error-after 3)"
    );
    pipeline.set_state(State::Null).unwrap();
}

#[test]
fn test_tee_branches_on_own_threads() {
    let pipeline = Pipeline::with_name("tee");
    let src = ElementFactory::make("audiotestsrc").property("num-buffers", 20).build().unwrap();
    let tee = ElementFactory::make("tee").build().unwrap();
    let q1 = ElementFactory::make("queue").build().unwrap();
    let q2 = ElementFactory::make("queue").build().unwrap();
    let fake = ElementFactory::make("fakesink").property("sync", false).build().unwrap();
    let appsink = AppSink::new("app");
    appsink.set_property("sync", false).unwrap();

    pipeline
        .add_many(&[&src, &tee, &q1, &q2, &fake, appsink.element()])
        .unwrap();
    Element::link_many(&[&src, &tee]).unwrap();
    Element::link_many(&[&q1, &fake]).unwrap();
    Element::link_many(&[&q2, appsink.element()]).unwrap();

    let t1 = tee.request_pad("src_%u").unwrap();
    let t2 = tee.request_pad("src_%u").unwrap();
    t1.link(&q1.static_pad("sink").unwrap()).unwrap();
    t2.link(&q2.static_pad("sink").unwrap()).unwrap();

    pipeline.set_state(State::Playing).unwrap();
    let mut received = 0;
    while appsink.try_pull_sample(TIMEOUT).is_some() {
        received += 1;
    }
    assert_eq!(received, 20);
    wait_eos(&pipeline);
    assert_eq!(fake.imp::<FakeSink>().unwrap().rendered(), 20);

    pipeline.set_state(State::Null).unwrap();
    tee.release_request_pad(&t1).unwrap();
    tee.release_request_pad(&t2).unwrap();
    assert!(tee.src_pads().is_empty());
}

#[test]
fn test_teardown_is_repeatable() {
    let pipeline = padflow::parse::launch("audiotestsrc is-live=true ! queue ! fakesink").unwrap();
    assert!(pipeline.set_state(State::Playing).is_ok());
    std::thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(pipeline.set_state(State::Null), Ok(StateChangeSuccess::Success));
    assert_eq!(pipeline.set_state(State::Null), Ok(StateChangeSuccess::Success));
    assert_eq!(pipeline.current_state(), State::Null);
    for child in pipeline.children() {
        assert_eq!(child.current_state(), State::Null);
    }
}

#[test]
fn test_dropping_running_pipeline_stops_threads() {
    let pipeline = padflow::parse::launch("audiotestsrc ! queue name=q ! fakesink sync=true").unwrap();
    pipeline.set_state(State::Playing).unwrap();
    let queue = pipeline.by_name("q").unwrap();
    drop(pipeline);
    assert_eq!(queue.current_state(), State::Null);
}

/// Passes buffers on but refuses to start playing.
#[derive(Default)]
struct RefusePlaying;

impl ElementImpl for RefusePlaying {
    fn change_state(
        &self,
        _element: &Element,
        transition: StateChange,
    ) -> std::result::Result<StateChangeSuccess, StateChangeError> {
        if transition == StateChange::PausedToPlaying {
            return Err(StateChangeError);
        }
        Ok(StateChangeSuccess::Success)
    }

    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        element.static_pad("src").ok_or(FlowError::NotLinked)?.push(buffer)
    }
}

#[test]
fn test_failed_play_rolls_back_to_paused() {
    let pipeline = Pipeline::with_name("rollback");
    let src = ElementFactory::make("fakesrc").build().unwrap();
    let refuse = Element::new(
        "refuse",
        vec![
            PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any()),
            PadTemplate::new("src", PadDirection::Src, PadPresence::Always, Caps::new_any()),
        ],
        RefusePlaying,
    );
    let sink = ElementFactory::make("fakesink").build().unwrap();
    pipeline.add_many(&[&src, &refuse, &sink]).unwrap();
    Element::link_many(&[&src, &refuse, &sink]).unwrap();

    pipeline.set_state(State::Paused).unwrap();
    let (result, current, _) = pipeline.state(Some(Duration::from(TIMEOUT)));
    assert_eq!((result, current), (Ok(StateChangeSuccess::Success), State::Paused));

    assert!(pipeline.set_state(State::Playing).is_err());
    // The sink went first and was brought back.
    assert_eq!(sink.current_state(), State::Paused);
    assert_eq!(refuse.current_state(), State::Paused);
    assert_eq!(pipeline.current_state(), State::Paused);

    assert_eq!(pipeline.set_state(State::Null), Ok(StateChangeSuccess::Success));
    assert_eq!(sink.current_state(), State::Null);
}

/// Threads of this process whose name starts with `prefix`.
#[cfg(target_os = "linux")]
fn threads_named(prefix: &str) -> usize {
    std::fs::read_dir("/proc/self/task")
        .unwrap()
        .filter_map(|entry| std::fs::read_to_string(entry.ok()?.path().join("comm")).ok())
        .filter(|name| name.starts_with(prefix))
        .count()
}

#[cfg(target_os = "linux")]
#[test]
fn test_null_joins_every_streaming_thread() {
    let pipeline = padflow::parse::launch(
        "audiotestsrc name=zjsrc is-live=true ! tee name=zjtee \
         zjtee. ! queue name=zjq0 ! fakesink \
         zjtee. ! queue name=zjq1 ! fakesink",
    )
    .unwrap();
    pipeline.set_state(State::Playing).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    // One for the source, one per queue.
    assert_eq!(threads_named("zj"), 3);

    assert_eq!(pipeline.set_state(State::Null), Ok(StateChangeSuccess::Success));
    // Joined threads may linger in /proc for a moment after exiting.
    let deadline = Instant::now() + Duration::from_secs(2);
    while threads_named("zj") > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(threads_named("zj"), 0);

    // A second cycle starts and joins them again.
    pipeline.set_state(State::Playing).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(threads_named("zj"), 3);
    pipeline.set_state(State::Null).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while threads_named("zj") > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(threads_named("zj"), 0);
}
