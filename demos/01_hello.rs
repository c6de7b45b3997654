//! # Hello Pipeline
//!
//! Build a pipeline from a launch line, play it and wait for the end.
//!
//! ```text
//! [audiotestsrc] → [fakesink]
//! ```
//!
//! Run: `cargo run --example 01_hello`

use padflow::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("padflow=info".parse().unwrap()))
        .init();

    let pipeline = padflow::parse::launch("audiotestsrc num-buffers=100 ! fakesink")?;
    pipeline.set_state(State::Playing)?;

    let bus = pipeline.bus();
    if let Some(msg) = bus.timed_pop_filtered(None, MessageType::ERROR | MessageType::EOS) {
        match msg.view() {
            MessageView::Error { .. } => eprintln!("{msg}"),
            _ => println!("End-Of-Stream reached."),
        }
    }

    pipeline.set_state(State::Null)?;
    Ok(())
}
