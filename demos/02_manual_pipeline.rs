//! # Manual Pipeline
//!
//! Create elements by factory name, set properties, add them to a pipeline
//! and link them by hand.
//!
//! ```text
//! [audiotestsrc] → [capsfilter] → [fakesink]
//! ```
//!
//! Run: `cargo run --example 02_manual_pipeline`

use padflow::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("padflow=info".parse().unwrap()))
        .init();

    let source = ElementFactory::make("audiotestsrc")
        .name("source")
        .property("wave", "square")
        .property("num-buffers", 50)
        .build()?;
    let filter = ElementFactory::make("capsfilter")
        .name("filter")
        .property("caps", "audio/x-raw, rate=22050")
        .build()?;
    let sink = ElementFactory::make("fakesink").name("sink").build()?;

    let pipeline = Pipeline::with_name("test-pipeline");
    pipeline.add_many(&[&source, &filter, &sink])?;
    if let Err(err) = Element::link_many(&[&source, &filter, &sink]) {
        eprintln!("Elements could not be linked: {err}");
        return Err(err);
    }

    pipeline.set_state(State::Playing)?;

    let bus = pipeline.bus();
    loop {
        let Some(msg) = bus.timed_pop_filtered(None, MessageType::ERROR | MessageType::EOS) else {
            break;
        };
        match msg.view() {
            MessageView::Error { .. } => {
                eprintln!("{msg}");
                break;
            }
            MessageView::Eos => {
                println!("End-Of-Stream reached.");
                break;
            }
            _ => unreachable!("filtered out"),
        }
    }

    let rendered = sink.property("rendered")?;
    println!("Sink rendered {rendered} buffers");
    pipeline.set_state(State::Null)?;
    Ok(())
}
