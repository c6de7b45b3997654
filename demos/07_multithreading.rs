//! # Multithreading
//!
//! A tee splits one stream into two branches. Each branch starts with a
//! queue, so each runs on its own streaming thread and a slow branch does
//! not stall the other.
//!
//! ```text
//!                          ┌→ [queue] → [fakesink audio]
//! [audiotestsrc] → [tee] ──┤
//!                          └→ [queue] → [identity] → [fakesink visual]
//! ```
//!
//! Run: `cargo run --example 07_multithreading`

use padflow::observability::{init_metrics, span_pipeline};
use padflow::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("padflow=info".parse().unwrap()))
        .with_thread_names(true)
        .init();
    init_metrics();
    let _span = span_pipeline("test-pipeline").entered();

    let source = ElementFactory::make("audiotestsrc")
        .name("audio_source")
        .property("freq", 215.0)
        .property("num-buffers", 200)
        .build()?;
    let tee = ElementFactory::make("tee").name("tee").build()?;
    let audio_queue = ElementFactory::make("queue").name("audio_queue").build()?;
    let audio_sink = ElementFactory::make("fakesink")
        .name("audio_sink")
        .property("signal-handoffs", true)
        .build()?;
    let video_queue = ElementFactory::make("queue").name("video_queue").build()?;
    let visual = ElementFactory::make("identity")
        .name("visual")
        .property("sleep-time", 500u32)
        .build()?;
    let video_sink = ElementFactory::make("fakesink")
        .name("video_sink")
        .property("signal-handoffs", true)
        .build()?;

    let pipeline = Pipeline::with_name("test-pipeline");
    pipeline.add_many(&[
        &source,
        &tee,
        &audio_queue,
        &audio_sink,
        &video_queue,
        &visual,
        &video_sink,
    ])?;
    Element::link_many(&[&source, &tee])?;
    Element::link_many(&[&audio_queue, &audio_sink])?;
    Element::link_many(&[&video_queue, &visual, &video_sink])?;

    // Tee src pads are request pads; ask for one per branch.
    let tee_audio_pad = tee.request_pad("src_%u")?;
    println!("Obtained request pad {} for audio branch.", tee_audio_pad.name());
    let tee_video_pad = tee.request_pad("src_%u")?;
    println!("Obtained request pad {} for video branch.", tee_video_pad.name());
    tee.link_pads(tee_audio_pad.name(), &audio_queue, "sink")?;
    tee.link_pads(tee_video_pad.name(), &video_queue, "sink")?;

    // Record which threads render each branch.
    let threads: Arc<Mutex<BTreeSet<(String, String)>>> = Arc::default();
    for sink in [&audio_sink, &video_sink] {
        let threads = Arc::clone(&threads);
        sink.connect("handoff", move |element| {
            let thread = std::thread::current();
            let thread = thread.name().unwrap_or("unnamed").to_string();
            threads.lock().unwrap().insert((element.name().to_string(), thread));
        })?;
    }

    pipeline.set_state(State::Playing)?;

    let bus = pipeline.bus();
    if let Some(msg) = bus.timed_pop_filtered(None, MessageType::ERROR | MessageType::EOS) {
        match msg.view() {
            MessageView::Error { .. } => eprintln!("{msg}"),
            _ => println!("End-Of-Stream reached."),
        }
    }

    for (sink, thread) in threads.lock().unwrap().iter() {
        println!("{sink} rendered on thread '{thread}'");
    }

    pipeline.set_state(State::Null)?;
    tee.release_request_pad(&tee_audio_pad)?;
    tee.release_request_pad(&tee_video_pad)?;
    Ok(())
}
