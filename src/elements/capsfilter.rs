//! CapsFilter: restrict the formats allowed across a link.

use crate::buffer::Buffer;
use crate::caps::Caps;
use crate::element::{Element, ElementImpl, Pad, PadDirection, PadPresence, PadTemplate, PropertyValue};
use crate::elements::base::proxy_query_caps;
use crate::error::{FlowError, FlowResult, PropertyError};
use crate::event::Event;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Passes buffers through unchanged but only negotiates formats allowed by
/// its `caps` property.
///
/// `audiotestsrc ! audio/x-raw, rate=8000 ! fakesink` in a launch line
/// creates one of these between the two elements.
///
/// ```rust
/// use padflow::prelude::*;
///
/// let filter = ElementFactory::make("capsfilter")
///     .property("caps", "audio/x-raw, rate=8000")
///     .build()
///     .unwrap();
/// let caps = filter.static_pad("src").unwrap().query_caps(None);
/// assert_eq!(caps.structure(0).unwrap().get_int("rate"), Some(8000));
/// ```
#[derive(Default)]
pub struct CapsFilter {
    caps: Mutex<Caps>,
}

impl CapsFilter {
    /// Create a filter allowing `caps`.
    pub fn new(caps: Caps) -> Self {
        Self {
            caps: Mutex::new(caps),
        }
    }

    /// Pad templates.
    pub fn templates() -> Vec<PadTemplate> {
        vec![
            PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, Caps::new_any()),
            PadTemplate::new("src", PadDirection::Src, PadPresence::Always, Caps::new_any()),
        ]
    }

    /// Allowed caps.
    pub fn filter_caps(&self) -> Caps {
        self.caps.lock().unwrap().clone()
    }
}

impl ElementImpl for CapsFilter {
    fn chain(&self, element: &Element, _pad: &Pad, buffer: Buffer) -> FlowResult {
        element
            .static_pad("src")
            .ok_or(FlowError::NotLinked)?
            .push(buffer)
    }

    fn sink_event(&self, element: &Element, _pad: &Pad, event: Event) -> bool {
        if let Event::Caps(caps) = &event {
            if !caps.can_intersect(&self.filter_caps()) {
                warn!(element = %element.name(), caps = %caps, "refusing caps");
                return false;
            }
        }
        element.forward_event(event)
    }

    fn query_caps(&self, element: &Element, pad: &Pad, filter: Option<&Caps>) -> Caps {
        proxy_query_caps(element, pad, filter).intersect(&self.filter_caps())
    }

    fn set_property(
        &self,
        element: &Element,
        name: &str,
        value: &PropertyValue,
    ) -> Result<(), PropertyError> {
        match name {
            "caps" => {
                let caps = value.get_caps(name)?;
                debug!(element = %element.name(), caps = %caps, "filter caps");
                *self.caps.lock().unwrap() = caps;
                Ok(())
            }
            _ => Err(PropertyError::unknown(name)),
        }
    }

    fn property(&self, _element: &Element, name: &str) -> Result<PropertyValue, PropertyError> {
        match name {
            "caps" => Ok(PropertyValue::Caps(self.filter_caps())),
            _ => Err(PropertyError::unknown(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::AudioTestSrc;
    use crate::error::LinkError;

    fn sink_pad(caps: &str) -> Pad {
        Pad::from_template(
            &PadTemplate::new("sink", PadDirection::Sink, PadPresence::Always, caps.parse().unwrap()),
            "sink",
        )
    }

    #[test]
    fn test_filter_drives_negotiation() {
        let src = Element::new("src", AudioTestSrc::templates(), AudioTestSrc::default());
        let filter = Element::new(
            "filter",
            CapsFilter::templates(),
            CapsFilter::new("audio/x-raw, rate=8000, channels=2".parse().unwrap()),
        );
        filter.static_pad("src").unwrap().link(&sink_pad("audio/x-raw")).unwrap();
        src.link(&filter).unwrap();

        let caps = src.pad_caps("src").unwrap();
        let s = caps.structure(0).unwrap();
        assert_eq!(s.get_int("rate"), Some(8000));
        assert_eq!(s.get_int("channels"), Some(2));
        assert_eq!(s.get_str("format"), Some("S16LE"));
    }

    #[test]
    fn test_incompatible_filter_refuses_link() {
        let src = Element::new("src", AudioTestSrc::templates(), AudioTestSrc::default());
        let filter = Element::new(
            "filter",
            CapsFilter::templates(),
            CapsFilter::new("video/x-raw".parse().unwrap()),
        );
        assert_eq!(
            src.static_pad("src").unwrap().link(&filter.static_pad("sink").unwrap()),
            Err(LinkError::NoFormat)
        );
    }

    #[test]
    fn test_caps_property() {
        let filter = Element::new("filter", CapsFilter::templates(), CapsFilter::default());
        assert_eq!(filter.property("caps"), Ok(PropertyValue::Caps(Caps::new_any())));
        assert!(filter.set_property("caps", "audio/x-raw, rate=[").is_err());
        filter.set_property("caps", Caps::new_empty_simple("audio/x-raw")).unwrap();
        assert_eq!(filter.property("caps").unwrap().to_string(), "audio/x-raw");
    }
}
