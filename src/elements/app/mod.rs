//! Application integration elements.
//!
//! - [`AppSrc`]: Inject buffers from application code
//! - [`AppSink`]: Extract buffers to application code

mod appsink;
mod appsrc;

pub use appsink::{AppSink, AppSinkImpl, AppSinkSettings, AppSinkStats, Sample};
pub use appsrc::{AppSrc, AppSrcImpl, AppSrcSettings, AppSrcStats};
