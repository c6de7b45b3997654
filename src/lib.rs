//! # padflow
//!
//! A media pipeline engine: elements connected through typed pads, caps
//! negotiated at link time, bins with ghost pads, queues that decouple
//! streaming threads, and a pipeline that owns a clock and a message bus.
//!
//! ## Features
//!
//! - **Caps negotiation**: pads only link when their formats intersect
//! - **State machine**: NULL → READY → PAUSED → PLAYING with async preroll
//! - **Threads**: one streaming thread per source and per queue
//! - **Backpressure**: bounded queues block, leak or signal their producer
//! - **Bus**: filtered pops, main-loop watches and an async stream
//!
//! ## Quick Start
//!
//! ```rust
//! use padflow::prelude::*;
//!
//! let pipeline = padflow::parse::launch(
//!     "audiotestsrc num-buffers=10 ! audio/x-raw,rate=8000 ! queue ! fakesink",
//! )
//! .unwrap();
//! pipeline.set_state(State::Playing).unwrap();
//!
//! let msg = pipeline
//!     .bus()
//!     .timed_pop_filtered(None, MessageType::ERROR | MessageType::EOS)
//!     .unwrap();
//! assert!(matches!(msg.view(), MessageView::Eos));
//! pipeline.set_state(State::Null).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod bus;
pub mod caps;
pub mod clock;
pub mod element;
pub mod elements;
pub mod error;
pub mod event;
pub mod inspect;
pub mod mainloop;
pub mod metadata;
pub mod observability;
pub mod pipeline;

pub use pipeline::parse;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::buffer::Buffer;
    pub use crate::bus::{Bus, Message, MessageType, MessageView};
    pub use crate::caps::{Caps, Structure};
    pub use crate::clock::ClockTime;
    pub use crate::element::{
        Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, State,
        StateChangeSuccess,
    };
    pub use crate::error::{Error, FlowError, FlowResult, FlowSuccess, Result};
    pub use crate::pipeline::{Bin, ElementFactory, Pipeline};
}

pub use error::{Error, Result};
