//! # AppSrc and AppSink
//!
//! The application generates a waveform and feeds it into the pipeline
//! through appsrc when asked for data. A tee sends it both to a fakesink
//! and back to the application through appsink.
//!
//! ```text
//!                                 ┌→ [queue] → [fakesink]
//! (app) → [appsrc] → [tee] ───────┤
//!                                 └→ [queue] → [appsink] → (app)
//! ```
//!
//! Run: `cargo run --example 08_appsrc_appsink`

use padflow::buffer::Buffer;
use padflow::elements::{AppSink, AppSrc};
use padflow::metadata::Metadata;
use padflow::prelude::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

const CHUNK_SIZE: usize = 1024;
const SAMPLE_RATE: u64 = 44_100;
const TOTAL_CHUNKS: u64 = 100;

/// Generator state shared with the need-data handler.
#[derive(Default)]
struct Waveform {
    num_samples: u64,
    a: f32,
    b: f32,
    c: f32,
    d: f32,
}

impl Waveform {
    fn next_chunk(&mut self) -> Buffer {
        self.c += self.d;
        self.d -= self.c / 1000.0;
        let freq = 1100.0 + 1000.0 * self.d;

        let mut data = Vec::with_capacity(CHUNK_SIZE * 2);
        for _ in 0..CHUNK_SIZE {
            self.a += self.b;
            self.b -= self.a / freq;
            let sample = (500.0 * self.a) as i16;
            data.extend_from_slice(&sample.to_le_bytes());
        }

        let offset = self.num_samples;
        self.num_samples += CHUNK_SIZE as u64;
        let metadata = Metadata::with_sequence(offset / CHUNK_SIZE as u64)
            .with_offsets(offset, self.num_samples);
        let mut buffer = Buffer::new(data, metadata);
        let metadata = buffer.metadata_mut();
        metadata.pts = ClockTime::from_samples(offset, SAMPLE_RATE);
        metadata.duration = ClockTime::from_samples(CHUNK_SIZE as u64, SAMPLE_RATE);
        buffer
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("padflow=info".parse().unwrap()))
        .init();

    let app_source = AppSrc::new("audio_source");
    app_source.set_caps(&format!("audio/x-raw, format=S16LE, channels=1, rate={SAMPLE_RATE}").parse()?);
    let tee = ElementFactory::make("tee").name("tee").build()?;
    let audio_queue = ElementFactory::make("queue").name("audio_queue").build()?;
    let audio_sink = ElementFactory::make("fakesink")
        .name("audio_sink")
        .property("sync", false)
        .build()?;
    let app_queue = ElementFactory::make("queue").name("app_queue").build()?;
    let app_sink = AppSink::new("app_sink");
    app_sink.set_property("sync", false)?;

    let pipeline = Pipeline::with_name("test-pipeline");
    pipeline.add_many(&[
        app_source.element(),
        &tee,
        &audio_queue,
        &audio_sink,
        &app_queue,
        app_sink.element(),
    ])?;
    Element::link_many(&[app_source.element(), &tee])?;
    Element::link_many(&[&audio_queue, &audio_sink])?;
    Element::link_many(&[&app_queue, app_sink.element()])?;
    tee.link(&audio_queue)?;
    tee.link(&app_queue)?;

    let waveform = Arc::new(Mutex::new(Waveform {
        b: 1.0,
        d: 1.0,
        ..Default::default()
    }));
    let generator = Arc::clone(&waveform);
    app_source.connect_need_data(move |src| {
        let mut waveform = generator.lock().unwrap();
        if waveform.num_samples >= TOTAL_CHUNKS * CHUNK_SIZE as u64 {
            let _ = src.end_of_stream();
            return;
        }
        let buffer = waveform.next_chunk();
        if let Err(err) = src.push_buffer(buffer) {
            eprintln!("push failed: {err}");
        }
    })?;
    app_source.connect_enough_data(|_| println!("Stop feeding"))?;

    let samples = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&samples);
    app_sink.connect_new_sample(move |sink| {
        if let Some(sample) = sink.pull_sample() {
            let buffer = sample.into_buffer();
            if buffer.metadata().offset == Some(0) {
                println!("First chunk: {} bytes", buffer.len());
            }
            counter.fetch_add(1, Ordering::Relaxed);
            print!("*");
        }
    })?;

    pipeline.set_state(State::Playing)?;

    let bus = pipeline.bus();
    if let Some(msg) = bus.timed_pop_filtered(None, MessageType::ERROR | MessageType::EOS) {
        match msg.view() {
            MessageView::Error { .. } => eprintln!("\n{msg}"),
            _ => println!("\nEnd-Of-Stream reached."),
        }
    }
    println!(
        "Application received {} samples; fed {} buffers",
        samples.load(Ordering::Relaxed),
        app_source.stats().total_pushed
    );

    pipeline.set_state(State::Null)?;
    Ok(())
}
