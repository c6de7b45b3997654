//! Built-in pipeline elements.
//!
//! These exist to exercise the engine: they produce, pass on and consume
//! buffers without touching real media devices or container formats.
//!
//! ## Sources
//! - [`FakeSrc`]: Produces zero-filled buffers
//! - [`AudioTestSrc`]: Generates S16LE test tones
//! - [`AppSrc`]: Injects buffers from application code
//!
//! ## Sinks
//! - [`FakeSink`]: Discards all buffers
//! - [`AppSink`]: Extracts buffers to application code
//!
//! ## Filters
//! - [`Identity`]: Passes buffers unchanged, optionally slowly
//! - [`CapsFilter`]: Restricts the formats negotiated across it
//! - [`Queue`]: Bounded FIFO with its own streaming thread and backpressure
//!
//! ## Routing
//! - [`Tee`]: Duplicates buffers to multiple outputs (1-to-N fanout)
//! - [`StreamIdDemux`]: Demultiplexes by stream ID onto sometimes pads

pub(crate) mod base;

mod app;
mod capsfilter;
mod flow;
mod identity;
mod null;
mod streamid_demux;
mod testsrc;

// Sources
pub use app::{AppSrc, AppSrcImpl, AppSrcSettings, AppSrcStats};
pub use null::{FakeSrc, FakeSrcSettings};
pub use testsrc::{AudioTestSrc, AudioTestSrcSettings, Wave};

// Sinks
pub use app::{AppSink, AppSinkImpl, AppSinkSettings, AppSinkStats, Sample};
pub use null::{FakeSink, FakeSinkSettings};

// Filters
pub use capsfilter::CapsFilter;
pub use flow::{LeakyMode, Queue, QueueSettings, QueueStats};
pub use identity::{Identity, IdentitySettings, IdentityStats};

// Routing
pub use flow::Tee;
pub use streamid_demux::{StreamIdDemux, StreamIdDemuxStats, StreamIdExtractor};
