//! Tee element - duplicates buffers to multiple outputs.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue};
use crate::elements::base::proxy_query_caps;
use crate::error::{FlowError, FlowResult, FlowSuccess, PropertyError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::trace;

/// An element that pushes every input buffer out of each of its src pads.
///
/// Src pads are requested from the `src_%u` template, one per branch.
/// Buffers are shared, not copied. Each branch normally starts with a
/// queue so that one slow branch does not stall the others.
///
/// A branch that is not linked is skipped. When no branch is linked the
/// push fails with `NotLinked`, unless `allow-not-linked` is set.
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
///
/// let tee = ElementFactory::make("tee").build().unwrap();
/// let a = tee.request_pad("src_%u").unwrap();
/// let b = tee.request_pad("src_%u").unwrap();
/// assert_eq!((a.name(), b.name()), ("src_0", "src_1"));
/// tee.release_request_pad(&a).unwrap();
/// assert_eq!(tee.request_pad("src_%u").unwrap().name(), "src_2");
/// ```
#[derive(Default)]
pub struct Tee {
    allow_not_linked: AtomicBool,
    /// Number of buffers that have passed through.
    count: AtomicU64,
    /// Total bytes that have passed through.
    bytes: AtomicU64,
}

impl Tee {
    /// Create a new Tee element.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        vec![
            PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any()),
            PadTemplate::new("src_%u", PadDirection::Src, PadPresence::Request, Caps::new_any()),
        ]
    }

    /// Get the number of buffers that have passed through.
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the total bytes that have passed through.
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl ElementImpl for Tee {
    fn chain(&self, element: &Element, sinkpad: &Pad, buffer: Buffer) -> FlowResult {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(buffer.len() as u64, Ordering::Relaxed);

        let pads = element.src_pads();
        let mut pushed = 0usize;
        let mut eos = 0usize;
        for pad in &pads {
            match pad.push(buffer.clone()) {
                Ok(_) => pushed += 1,
                Err(FlowError::NotLinked) => {
                    trace!(element = %element.name(), pad = %pad.name(), "branch not linked");
                }
                Err(FlowError::Eos) => eos += 1,
                // A pad being released flushes before the tee does.
                Err(FlowError::Flushing) if !sinkpad.is_flushing() => {
                    trace!(element = %element.name(), pad = %pad.name(), "branch released");
                }
                Err(err) => return Err(err),
            }
        }
        if pushed > 0 {
            return Ok(FlowSuccess::Ok);
        }
        if eos > 0 && eos + pushed == pads.len() {
            return Err(FlowError::Eos);
        }
        if eos > 0 || self.allow_not_linked.load(Ordering::Relaxed) {
            Ok(FlowSuccess::Ok)
        } else {
            Err(FlowError::NotLinked)
        }
    }

    fn query_caps(&self, element: &Element, pad: &Pad, filter: Option<&Caps>) -> Caps {
        proxy_query_caps(element, pad, filter)
    }

    fn set_property(
        &self,
        _element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        match name {
            "allow-not-linked" => {
                self.allow_not_linked
                    .store(value.get_bool(name)?, Ordering::Relaxed);
                Ok(())
            }
            "num-src-pads" => Err(PropertyError::invalid(name, "read-only")),
            _ => Err(PropertyError::unknown(name)),
        }
    }

    fn property(&self, element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        match name {
            "allow-not-linked" => Ok(PropertyValue::Bool(
                self.allow_not_linked.load(Ordering::Relaxed),
            )),
            "num-src-pads" => Ok(PropertyValue::UInt(element.src_pads().len() as u64)),
            _ => Err(PropertyError::unknown(name)),
        }
    }
}
