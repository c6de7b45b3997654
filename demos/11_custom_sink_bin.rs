//! # Custom Sink Bin
//!
//! Wrap a filter and a sink in a bin and expose the filter's sink pad
//! through a ghost pad. The rest of the pipeline links to the bin as if it
//! were a single sink element.
//!
//! ```text
//!                     ┌──────────── bin ────────────┐
//! [audiotestsrc] → [ghost sink] → [capsfilter] → [fakesink]
//!                     └─────────────────────────────┘
//! ```
//!
//! Run: `cargo run --example 11_custom_sink_bin`

use padflow::inspect;
use padflow::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("padflow=info".parse().unwrap()))
        .init();

    let source = ElementFactory::make("audiotestsrc")
        .name("source")
        .property("num-buffers", 100)
        .build()?;

    // The "equalizer" stage: force a lower rate and stereo.
    let equalizer = ElementFactory::make("capsfilter")
        .name("equalizer")
        .property("caps", "audio/x-raw, rate=22050, channels=2")
        .build()?;
    let convert = ElementFactory::make("identity").name("convert").build()?;
    let sink = ElementFactory::make("fakesink").name("audio_sink").build()?;

    let bin = Bin::with_name("audio_sink_bin");
    bin.add_many(&[&equalizer, &convert, &sink])?;
    Element::link_many(&[&equalizer, &convert, &sink])?;
    let target = equalizer.static_pad("sink").ok_or_else(|| Error::PadNotFound {
        element: equalizer.name().to_string(),
        pad: "sink".into(),
    })?;
    let ghost = bin.add_ghost_pad("sink", &target)?;
    println!("Bin exposes ghost pad '{}'", ghost.name());

    let pipeline = Pipeline::with_name("test-pipeline");
    pipeline.add_many(&[&source, bin.element()])?;
    source.link(&bin)?;

    if let Some(text) = inspect::pad_caps_to_string(&source, "src") {
        print!("{text}");
    }

    pipeline.set_state(State::Playing)?;

    let bus = pipeline.bus();
    if let Some(msg) = bus.timed_pop_filtered(None, MessageType::ERROR | MessageType::EOS) {
        match msg.view() {
            MessageView::Error { .. } => eprintln!("{msg}"),
            _ => println!("End-Of-Stream reached."),
        }
    }
    println!("Sink rendered {} buffers", sink.property("rendered")?);

    pipeline.set_state(State::Null)?;
    Ok(())
}
