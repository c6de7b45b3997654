//! # Pad Capabilities
//!
//! Print the pad templates of two factories, then watch the caps on the
//! sink pad go from "everything the template allows" to the negotiated
//! format as the pipeline starts.
//!
//! Run: `cargo run --example 06_pad_capabilities`

use padflow::inspect;
use padflow::prelude::*;
use tracing_subscriber::EnvFilter;

fn print_pad_capabilities(element: &Element, pad_name: &str) {
    match inspect::pad_caps_to_string(element, pad_name) {
        Some(text) => print!("{text}"),
        None => eprintln!("Could not retrieve pad '{pad_name}'"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("padflow=warn".parse().unwrap()))
        .init();

    let source_factory = ElementFactory::find("audiotestsrc")
        .ok_or_else(|| Error::ElementNotFound("audiotestsrc".into()))?;
    let sink_factory =
        ElementFactory::find("fakesink").ok_or_else(|| Error::ElementNotFound("fakesink".into()))?;

    print!("{}", inspect::pad_templates_to_string(source_factory));
    print!("{}", inspect::pad_templates_to_string(sink_factory));

    let source = source_factory.create(Some("source"));
    source.set_property("num-buffers", 20)?;
    let sink = sink_factory.create(Some("sink"));

    let pipeline = Pipeline::with_name("test-pipeline");
    pipeline.add_many(&[&source, &sink])?;
    source.link(&sink)?;

    println!("In NULL state:");
    print_pad_capabilities(&source, "src");

    pipeline.set_state(State::Playing)?;

    let bus = pipeline.bus();
    let types = MessageType::ERROR | MessageType::EOS | MessageType::STATE_CHANGED;
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
                println!("\nPipeline state changed from {old} to {current}:");
                print_pad_capabilities(&sink, "sink");
            }
            _ => {}
        }
    }

    pipeline.set_state(State::Null)?;
    Ok(())
}
