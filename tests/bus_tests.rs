//! Integration tests for the message bus: polling, main-loop watches and
//! the async stream.

use futures::StreamExt;
use padflow::mainloop::{MainContext, MainLoop};
use padflow::prelude::*;
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const TIMEOUT: ClockTime = ClockTime::from_secs(10);

fn app(name: &str) -> Message {
    Message::application(Structure::new(name))
}

fn app_name(msg: &Message) -> Option<&str> {
    match msg.view() {
        MessageView::Application(s) => Some(s.name()),
        _ => None,
    }
}

#[test]
fn test_pipeline_messages_arrive_in_post_order() {
    let pipeline = padflow::parse::launch("fakesrc num-buffers=3 ! fakesink").unwrap();
    let bus = pipeline.bus();
    pipeline.set_state(State::Playing).unwrap();
    let eos = bus
        .timed_pop_filtered(Some(TIMEOUT), MessageType::EOS | MessageType::ERROR)
        .unwrap();
    assert_eq!(eos.type_(), MessageType::EOS);

    bus.post(app("after-eos"));
    bus.post(app("last"));
    let a = bus.pop_filtered(MessageType::APPLICATION).unwrap();
    let b = bus.pop_filtered(MessageType::APPLICATION).unwrap();
    assert_eq!((app_name(&a), app_name(&b)), (Some("after-eos"), Some("last")));
    assert!(eos.seqnum() < a.seqnum() && a.seqnum() < b.seqnum());
    pipeline.set_state(State::Null).unwrap();
}

#[test]
fn test_filtered_pop_discards_other_types() {
    let bus = Bus::new();
    bus.post(app("skipped"));
    bus.post(app("also-skipped"));
    let pipeline = Pipeline::new();
    bus.post(Message::eos(pipeline.element()));
    bus.post(app("kept"));

    let msg = bus.pop_filtered(MessageType::EOS).unwrap();
    assert!(msg.is_from(pipeline.element()));
    assert_eq!(bus.pending(), 1);
    assert_eq!(app_name(&bus.pop().unwrap()), Some("kept"));
}

#[test]
fn test_timed_pop_times_out() {
    let bus = Bus::new();
    let start = Instant::now();
    assert!(bus.timed_pop(Some(ClockTime::from_mseconds(30))).is_none());
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert!(bus.pop_filtered(MessageType::ANY).is_none());
}

#[test]
fn test_timed_pop_wakes_on_post() {
    let bus = Bus::new();
    let poster = bus.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        poster.post(app("late"));
    });
    let msg = bus.timed_pop(Some(TIMEOUT)).unwrap();
    assert_eq!(app_name(&msg), Some("late"));
    handle.join().unwrap();
}

#[test]
fn test_flushing_releases_waiters_and_drops_posts() {
    let bus = Bus::new();
    bus.post(app("pending"));
    bus.set_flushing(true);
    assert!(!bus.have_pending());
    assert!(!bus.post(app("rejected")));

    let waiter = bus.clone();
    let handle = std::thread::spawn(move || waiter.timed_pop(None));
    assert!(handle.join().unwrap().is_none());

    bus.set_flushing(false);
    assert!(bus.post(app("accepted")));
    assert_eq!(app_name(&bus.pop().unwrap()), Some("accepted"));
}

#[test]
fn test_watch_runs_pipeline_to_eos() {
    let pipeline = padflow::parse::launch("audiotestsrc num-buffers=5 ! queue ! fakesink").unwrap();
    let context = MainContext::new();
    let main_loop = MainLoop::new(&context);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let loop_ = main_loop.clone();
    let record = Arc::clone(&seen);
    let _guard = pipeline
        .bus()
        .add_watch(&context, move |_, msg| {
            record.lock().unwrap().push(msg.type_());
            match msg.view() {
                MessageView::Eos | MessageView::Error { .. } => {
                    loop_.quit();
                    ControlFlow::Break(())
                }
                _ => ControlFlow::Continue(()),
            }
        })
        .unwrap();

    // A safety net so a hung pipeline fails instead of blocking forever.
    let loop_ = main_loop.clone();
    context.timeout_add(Duration::from(TIMEOUT), move || {
        loop_.quit();
        ControlFlow::Break(())
    });

    pipeline.set_state(State::Playing).unwrap();
    main_loop.run();
    pipeline.set_state(State::Null).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.last(), Some(&MessageType::EOS));
    assert!(seen.contains(&MessageType::STATE_CHANGED));
    assert!(seen.contains(&MessageType::NEW_CLOCK));
}

#[test]
fn test_one_watch_per_bus() {
    let bus = Bus::new();
    let context = MainContext::new();
    let guard = bus.add_watch(&context, |_, _| ControlFlow::Continue(())).unwrap();
    assert!(bus.add_watch(&context, |_, _| ControlFlow::Continue(())).is_err());

    // Dropping the guard frees the slot and leaves messages on the bus.
    drop(guard);
    bus.post(app("undelivered"));
    context.iteration(false);
    assert_eq!(bus.pending(), 1);
    let _again = bus.add_watch(&context, |_, _| ControlFlow::Continue(())).unwrap();
}

#[test]
fn test_break_removes_watch() {
    let bus = Bus::new();
    let context = MainContext::new();
    let calls = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&calls);
    let _guard = bus
        .add_watch(&context, move |_, _| {
            *counter.lock().unwrap() += 1;
            ControlFlow::Break(())
        })
        .unwrap();

    bus.post(app("first"));
    bus.post(app("second"));
    assert!(context.iteration(false));
    assert_eq!(*calls.lock().unwrap(), 1);
    assert_eq!(bus.pending(), 1);

    context.iteration(false);
    assert_eq!(*calls.lock().unwrap(), 1);
    // The slot is free again.
    let _next = bus.add_watch(&context, |_, _| ControlFlow::Continue(())).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stream_yields_until_eos() {
    let pipeline = padflow::parse::launch("fakesrc num-buffers=4 ! fakesink").unwrap();
    let mut messages = pipeline.bus().stream();
    pipeline.set_state(State::Playing).unwrap();

    let mut types = Vec::new();
    let result = tokio::time::timeout(Duration::from(TIMEOUT), async {
        while let Some(msg) = messages.next().await {
            types.push(msg.type_());
            match msg.view() {
                MessageView::Eos => return Ok(()),
                MessageView::Error { error, .. } => return Err(error.clone()),
                _ => {}
            }
        }
        Err("stream ended".to_string())
    })
    .await
    .expect("no EOS before the timeout");
    assert_eq!(result, Ok(()));
    assert!(types.contains(&MessageType::STATE_CHANGED));
    pipeline.set_state(State::Null).unwrap();
}

#[tokio::test]
async fn test_stream_wakes_on_post_from_thread() {
    let bus = Bus::new();
    let poster = bus.clone();
    std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        poster.post(app("from-thread"));
    });
    let msg = tokio::time::timeout(Duration::from(TIMEOUT), bus.stream().next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(app_name(&msg), Some("from-thread"));
}
