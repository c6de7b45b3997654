//! Flow control and routing elements.
//!
//! ## Buffering
//! - [`Queue`]: bounded FIFO with its own streaming thread and backpressure
//!
//! ## Routing
//! - [`Tee`]: 1-to-N fanout (shares buffers)

mod queue;
mod tee;

pub use queue::{LeakyMode, Queue, QueueSettings, QueueStats};
pub use tee::Tee;
