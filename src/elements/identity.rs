//! Identity element with callbacks for debugging.
//!
//! A pass-through element that allows inspection of buffers via callbacks.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue};
use crate::elements::base::proxy_query_caps;
use crate::error::{FlowError, FlowResult, PropertyError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::trace;

/// Callback type for buffer inspection.
pub type BufferCallback = Box<dyn Fn(&Buffer) + Send + Sync>;

/// Settings of an [`Identity`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentitySettings {
    /// Delay applied to every buffer, in microseconds.
    pub sleep_time: u64,
    /// Fail with a flow error after this many buffers, -1 to never fail.
    pub error_after: Option<u64>,
}

impl IdentitySettings {
    /// Set the per-buffer delay in microseconds.
    pub fn sleep_time(mut self, sleep_time: u64) -> Self {
        self.sleep_time = sleep_time;
        self
    }

    /// Fail after `count` buffers.
    pub fn error_after(mut self, count: u64) -> Self {
        self.error_after = Some(count);
        self
    }
}

/// An identity element that passes buffers through unchanged while
/// optionally calling callbacks for inspection.
///
/// This is useful for debugging, logging, or metrics collection
/// without modifying the data flow. `sleep-time` turns it into a slow
/// consumer, which is handy when exercising queue backpressure.
///
/// # Example
///
/// ```rust
/// use padflow::prelude::*;
/// use padflow::elements::Identity;
///
/// let identity = Element::new(
///     "debug-point",
///     Identity::templates(),
///     Identity::new().on_buffer(|buf| {
///         println!("Buffer: seq={}, len={}", buf.metadata().sequence, buf.len());
///     }),
/// );
/// assert_eq!(identity.imp::<Identity>().unwrap().buffer_count(), 0);
/// ```
#[derive(Default)]
pub struct Identity {
    settings: Mutex<IdentitySettings>,
    callback: Option<Arc<BufferCallback>>,
    count: AtomicU64,
    bytes: AtomicU64,
}

impl Identity {
    /// Create a new identity element.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with the given settings.
    pub fn with_settings(settings: IdentitySettings) -> Self {
        Self {
            settings: Mutex::new(settings),
            ..Self::default()
        }
    }

    /// Set a callback to be called for each buffer.
    pub fn on_buffer<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Buffer) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(Box::new(callback)));
        self
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        vec![
            PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any()),
            PadTemplate::new("src", PadDirection::Src, PadPresence::Always, Caps::new_any()),
        ]
    }

    /// Get the number of buffers processed.
    pub fn buffer_count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Get the total bytes processed.
    pub fn byte_count(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Get statistics.
    pub fn stats(&self) -> IdentityStats {
        IdentityStats {
            buffer_count: self.count.load(Ordering::Relaxed),
            byte_count: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Reset statistics.
    pub fn reset_stats(&self) {
        self.count.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}

impl ElementImpl for Identity {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        let settings = self.settings.lock().unwrap().clone();
        let count = self.count.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(buffer.len() as u64, Ordering::Relaxed);

        if settings.error_after.is_some_and(|limit| count >= limit) {
            element.post_error("Failed to process buffer.", Some(format!("error-after {count}")));
            return Err(FlowError::Error);
        }
        if settings.sleep_time > 0 {
            std::thread::sleep(Duration::from_micros(settings.sleep_time));
        }
        if let Some(ref cb) = self.callback {
            cb(&buffer);
        }
        trace!(element = %element.name(), sequence = buffer.metadata().sequence, "pass");

        element
            .static_pad("src")
            .ok_or(FlowError::NotLinked)?
            .push(buffer)
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
        let mut settings = self.settings.lock().unwrap();
        match name {
            "sleep-time" => settings.sleep_time = value.get_u64(name)?,
            "error-after" => {
                let after = value.get_i64(name)?;
                settings.error_after = u64::try_from(after).ok();
            }
            _ => return Err(PropertyError::unknown(name)),
        }
        Ok(())
    }

    fn property(&self, _element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        let settings = self.settings.lock().unwrap();
        Ok(match name {
            "sleep-time" => PropertyValue::UInt(settings.sleep_time),
            "error-after" => PropertyValue::Int(settings.error_after.map_or(-1, |n| n as i64)),
            _ => return Err(PropertyError::unknown(name)),
        })
    }
}

/// Statistics for Identity element.
#[derive(Debug, Clone, Copy)]
pub struct IdentityStats {
    /// Number of buffers processed.
    pub buffer_count: u64,
    /// Total bytes processed.
    pub byte_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::State;

    struct Sink(Mutex<Vec<u64>>);

    impl ElementImpl for Sink {
        fn chain(&self, _element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
            self.0.lock().unwrap().push(buffer.metadata().sequence);
            Ok(crate::error::FlowSuccess::Ok)
        }
    }

    fn harness(identity: Identity) -> (Element, Pad, Element) {
        let element = Element::new("identity", Identity::templates(), identity);
        let sink = Element::new(
            "sink",
            vec![PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any())],
            Sink(Mutex::new(Vec::new())),
        );
        element.link(&sink).unwrap();
        let feed = Pad::new("feed", PadDirection::Src);
        feed.link(&element.static_pad("sink").unwrap()).unwrap();
        for e in [&element, &sink] {
            e.set_state(State::Paused).unwrap();
        }
        (element, feed, sink)
    }

    fn buffer(seq: u64) -> Buffer {
        Buffer::new(
            vec![0u8; 4],
            crate::metadata::Metadata::with_sequence(seq),
        )
    }

    #[test]
    fn test_passes_buffers_and_counts() {
        let seen = Arc::new(AtomicU64::new(0));
        let cb_seen = Arc::clone(&seen);
        let (element, feed, sink) = harness(Identity::new().on_buffer(move |_| {
            cb_seen.fetch_add(1, Ordering::SeqCst);
        }));
        // A bare pad has no parent element to activate it.
        feed.set_active(true);
        for seq in 0..3 {
            feed.push(buffer(seq)).unwrap();
        }
        let stats = element.imp::<Identity>().unwrap().stats();
        assert_eq!((stats.buffer_count, stats.byte_count), (3, 12));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(*sink.imp::<Sink>().unwrap().0.lock().unwrap(), [0, 1, 2]);

        element.imp::<Identity>().unwrap().reset_stats();
        assert_eq!(element.imp::<Identity>().unwrap().buffer_count(), 0);
    }

    #[test]
    fn test_error_after() {
        let (element, feed, _sink) = harness(Identity::with_settings(
            IdentitySettings::default().error_after(1),
        ));
        feed.set_active(true);
        assert!(feed.push(buffer(0)).is_ok());
        assert_eq!(feed.push(buffer(1)), Err(FlowError::Error));
        assert_eq!(element.property("error-after"), Ok(PropertyValue::Int(1)));
        element.set_property("error-after", -1).unwrap();
        assert_eq!(element.property("error-after"), Ok(PropertyValue::Int(-1)));
    }

    #[test]
    fn test_caps_are_proxied() {
        let element = Element::new("identity", Identity::templates(), Identity::new());
        let sink = Pad::from_template(
            &PadTemplate::new(
                "sink",
                PadDirection::Sink,
                PadPresence::Always,
                "audio/x-raw".parse().unwrap(),
            ),
            "sink",
        );
        element.static_pad("src").unwrap().link(&sink).unwrap();
        let caps = element.static_pad("sink").unwrap().query_caps(None);
        assert_eq!(caps.to_string(), "audio/x-raw");
    }
}
