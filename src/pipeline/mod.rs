//! Containers, construction and flow control.
//!
//! - [`Bin`]: an element that contains other elements and exposes ghost pads
//! - [`Pipeline`]: the top-level bin with a bus and a clock
//! - [`ElementFactory`]: create elements by type name
//! - [`parse::launch`]: build a pipeline from a textual description
//! - [`PadRouter`]: link dynamic pads by media type
//! - [`flow`]: backpressure state shared across a link
//!
//! # Example
//!
//! ```rust
//! use padflow::prelude::*;
//!
//! let pipeline = Pipeline::with_name("test-pipeline");
//! let source = ElementFactory::make("audiotestsrc")
//!     .name("source")
//!     .property("num-buffers", 5)
//!     .build()
//!     .unwrap();
//! let sink = ElementFactory::make("fakesink").name("sink").build().unwrap();
//!
//! pipeline.add_many(&[&source, &sink]).unwrap();
//! Element::link_many(&[&source, &sink]).unwrap();
//!
//! pipeline.set_state(State::Playing).unwrap();
//! let msg = pipeline
//!     .bus()
//!     .timed_pop_filtered(None, MessageType::ERROR | MessageType::EOS)
//!     .unwrap();
//! assert_eq!(msg.type_(), MessageType::EOS);
//! pipeline.set_state(State::Null).unwrap();
//! ```

pub mod bin;
pub mod factory;
pub mod flow;
pub mod parse;
mod router;
mod toplevel;

pub use bin::{Bin, BinImpl};
pub use factory::{ElementBuilder, ElementFactory};
pub use flow::{FlowSignal, FlowStateHandle, SharedFlowState};
pub use router::{PadRouter, RouteOutcome};
pub use toplevel::Pipeline;
