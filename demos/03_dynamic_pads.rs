//! # Dynamic Pads
//!
//! A demuxer creates one src pad per stream once data flows. A pad-added
//! handler links each new pad to the branch for its media type.
//!
//! ```text
//!                 ┌→ src_0 (audio/x-raw) → [queue] → [fakesink audio]
//! [fakesrc] → [streamiddemux]
//!                 └→ src_1 (video/x-raw) → [fakesink video]
//! ```
//!
//! Run: `cargo run --example 03_dynamic_pads`

use padflow::element::PropertyValue;
use padflow::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("padflow=info".parse().unwrap()))
        .init();

    let source = ElementFactory::make("fakesrc")
        .name("source")
        .property("num-buffers", 40)
        .property("num-streams", 2u32)
        .build()?;
    let demux = ElementFactory::make("streamiddemux")
        .name("demux")
        .property("stream-caps", "audio/x-raw, rate=44100; video/x-raw, width=320, height=240")
        .property("num-streams", 2u32)
        .build()?;
    let queue = ElementFactory::make("queue").name("audio-queue").build()?;
    let audio_sink = ElementFactory::make("fakesink").name("audio-sink").build()?;
    let video_sink = ElementFactory::make("fakesink").name("video-sink").build()?;

    let pipeline = Pipeline::with_name("test-pipeline");
    pipeline.add_many(&[&source, &demux, &queue, &audio_sink, &video_sink])?;
    // The demuxer's src pads do not exist yet; only the fixed parts link now.
    source.link(&demux)?;
    queue.link(&audio_sink)?;

    let sink_pad = |element: &Element| {
        element.static_pad("sink").ok_or_else(|| Error::PadNotFound {
            element: element.name().to_string(),
            pad: "sink".into(),
        })
    };
    let audio_pad = sink_pad(&queue)?;
    let video_pad = sink_pad(&video_sink)?;
    demux.connect_pad_added(move |element, pad| {
        println!("Received new pad '{}' from '{}':", pad.name(), element.name());
        let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
        let Some(media_type) = caps.structure(0).map(|s| s.name().to_string()) else {
            println!("  Pad has no caps. Ignoring.");
            return;
        };
        let target = if media_type.starts_with("audio/") {
            &audio_pad
        } else if media_type.starts_with("video/") {
            &video_pad
        } else {
            println!("  It has type '{media_type}' which is not handled. Ignoring.");
            return;
        };
        if target.is_linked() {
            println!("  We are already linked. Ignoring.");
            return;
        }
        match pad.link(target) {
            Ok(()) => println!("  Link succeeded (type '{media_type}')."),
            Err(err) => println!("  Type is '{media_type}' but link failed: {err}"),
        }
    });
    demux.connect_no_more_pads(|element| println!("'{}' has no more pads", element.name()));

    pipeline.set_state(State::Playing)?;

    let bus = pipeline.bus();
    let types = MessageType::STATE_CHANGED | MessageType::ERROR | MessageType::EOS;
    while let Some(msg) = bus.timed_pop_filtered(None, types) {
        match msg.view() {
            MessageView::Error { .. } => {
                eprintln!("{msg}");
                break;
            }
            MessageView::Eos => {
                println!("End-Of-Stream reached.");
                break;
            }
            MessageView::StateChanged { old, current, .. } if msg.is_from(pipeline.element()) => {
                println!("Pipeline state changed from {old} to {current}");
            }
            _ => {}
        }
    }

    for sink in [&audio_sink, &video_sink] {
        if let Ok(PropertyValue::UInt(rendered)) = sink.property("rendered") {
            println!("{} rendered {rendered} buffers", sink.name());
        }
    }
    pipeline.set_state(State::Null)?;
    Ok(())
}
