//! Element factories: create elements by type name.
//!
//! The registry is built once, on first use, and lists every built-in
//! element with its descriptive metadata and pad templates.
//!
//! ```rust
//! use padflow::pipeline::ElementFactory;
//!
//! let queue = ElementFactory::make("queue")
//!     .name("buffer")
//!     .property("max-size-buffers", 10u32)
//!     .build()
//!     .unwrap();
//! assert_eq!(queue.name(), "buffer");
//! assert!(ElementFactory::make("nosuchelement").build().is_err());
//! ```

use crate::element::{Element, PadTemplate, PropertyValue};
use crate::elements::{
    AppSinkImpl, AppSrcImpl, AudioTestSrc, CapsFilter, FakeSink, FakeSrc, Identity, Queue,
    StreamIdDemux, Tee,
};
use crate::error::{Error, Result};
use crate::pipeline::bin::BinImpl;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

type Constructor = fn(&str) -> Element;

/// Metadata and constructor for one element type.
pub struct ElementFactory {
    name: &'static str,
    long_name: &'static str,
    klass: &'static str,
    description: &'static str,
    templates: fn() -> Vec<PadTemplate>,
    constructor: Constructor,
}

impl fmt::Debug for ElementFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElementFactory")
            .field("name", &self.name)
            .field("long_name", &self.long_name)
            .finish()
    }
}

fn registry() -> &'static [ElementFactory] {
    static REGISTRY: OnceLock<Vec<ElementFactory>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        vec![
            ElementFactory {
                name: "fakesrc",
                long_name: "Fake Source",
                klass: "Source",
                description: "Push empty (no data) buffers around",
                templates: FakeSrc::templates,
                constructor: |name| Element::new(name, FakeSrc::templates(), FakeSrc::default()),
            },
            ElementFactory {
                name: "fakesink",
                long_name: "Fake Sink",
                klass: "Sink",
                description: "Black hole for data",
                templates: FakeSink::templates,
                constructor: |name| Element::new(name, FakeSink::templates(), FakeSink::default()),
            },
            ElementFactory {
                name: "audiotestsrc",
                long_name: "Audio test source",
                klass: "Source/Audio",
                description: "Creates audio test signals of given frequency and volume",
                templates: AudioTestSrc::templates,
                constructor: |name| {
                    Element::new(name, AudioTestSrc::templates(), AudioTestSrc::default())
                },
            },
            ElementFactory {
                name: "identity",
                long_name: "Identity",
                klass: "Generic",
                description: "Pass data without modification",
                templates: Identity::templates,
                constructor: |name| Element::new(name, Identity::templates(), Identity::default()),
            },
            ElementFactory {
                name: "capsfilter",
                long_name: "CapsFilter",
                klass: "Generic",
                description: "Pass data without modification, limiting formats",
                templates: CapsFilter::templates,
                constructor: |name| {
                    Element::new(name, CapsFilter::templates(), CapsFilter::default())
                },
            },
            ElementFactory {
                name: "queue",
                long_name: "Queue",
                klass: "Generic",
                description: "Simple data queue",
                templates: Queue::templates,
                constructor: |name| Element::new(name, Queue::templates(), Queue::default()),
            },
            ElementFactory {
                name: "tee",
                long_name: "Tee pipe fitting",
                klass: "Generic",
                description: "1-to-N pipe fitting",
                templates: Tee::templates,
                constructor: |name| Element::new(name, Tee::templates(), Tee::default()),
            },
            ElementFactory {
                name: "appsrc",
                long_name: "AppSrc",
                klass: "Generic/Source",
                description: "Allow the application to feed buffers to a pipeline",
                templates: AppSrcImpl::templates,
                constructor: |name| {
                    Element::new(name, AppSrcImpl::templates(), AppSrcImpl::default())
                },
            },
            ElementFactory {
                name: "appsink",
                long_name: "AppSink",
                klass: "Generic/Sink",
                description: "Allow the application to get access to raw buffers",
                templates: AppSinkImpl::templates,
                constructor: |name| {
                    Element::new(name, AppSinkImpl::templates(), AppSinkImpl::default())
                },
            },
            ElementFactory {
                name: "streamiddemux",
                long_name: "Stream ID Demux",
                klass: "Generic",
                description: "1-to-N output stream by stream-id",
                templates: StreamIdDemux::templates,
                constructor: |name| {
                    Element::new(name, StreamIdDemux::templates(), StreamIdDemux::default())
                },
            },
            ElementFactory {
                name: "bin",
                long_name: "Generic bin",
                klass: "Generic/Bin",
                description: "Simple container object",
                templates: Vec::new,
                constructor: |name| Element::new(name, Vec::new(), BinImpl::default()),
            },
        ]
    })
}

/// Next free `{prefix}{n}` name.
pub(crate) fn auto_name(prefix: &str) -> String {
    static COUNTERS: OnceLock<Mutex<HashMap<String, u32>>> = OnceLock::new();
    let mut counters = COUNTERS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap();
    let counter = counters.entry(prefix.to_string()).or_insert(0);
    let name = format!("{prefix}{counter}");
    *counter += 1;
    name
}

impl ElementFactory {
    /// Look up a factory by type name.
    pub fn find(name: &str) -> Option<&'static ElementFactory> {
        registry().iter().find(|f| f.name == name)
    }

    /// All registered factories.
    pub fn list() -> &'static [ElementFactory] {
        registry()
    }

    /// Start building an element of type `factory_name`.
    pub fn make(factory_name: &str) -> ElementBuilder {
        ElementBuilder {
            factory_name: factory_name.to_string(),
            name: None,
            properties: Vec::new(),
        }
    }

    /// Create an element and apply `properties` in order.
    pub fn make_with_properties(
        factory_name: &str,
        name: Option<&str>,
        properties: &[(&str, PropertyValue)],
    ) -> Result<Element> {
        let mut builder = Self::make(factory_name);
        if let Some(name) = name {
            builder = builder.name(name);
        }
        for (key, value) in properties {
            builder = builder.property(key, value.clone());
        }
        builder.build()
    }

    /// Create an element from this factory.
    pub fn create(&'static self, name: Option<&str>) -> Element {
        let name = name.map_or_else(|| auto_name(self.name), str::to_string);
        let element = (self.constructor)(&name);
        element.set_factory(self);
        debug!(factory = self.name, element = %name, "created element");
        element
    }

    /// Type name (`"queue"`).
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Human-readable name (`"Queue"`).
    pub fn long_name(&self) -> &'static str {
        self.long_name
    }

    /// Classification (`"Source/Audio"`).
    pub fn klass(&self) -> &'static str {
        self.klass
    }

    /// One-line description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Pad templates of elements made by this factory.
    pub fn pad_templates(&self) -> Vec<PadTemplate> {
        (self.templates)()
    }
}

/// Builder returned by [`ElementFactory::make`].
#[derive(Debug)]
#[must_use = "call build() to create the element"]
pub struct ElementBuilder {
    factory_name: String,
    name: Option<String>,
    properties: Vec<(String, PropertyValue)>,
}

impl ElementBuilder {
    /// Element name; generated from the type name when unset.
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Property applied after construction.
    pub fn property(mut self, name: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.push((name.to_string(), value.into()));
        self
    }

    /// Create the element.
    pub fn build(self) -> Result<Element> {
        let factory = ElementFactory::find(&self.factory_name)
            .ok_or_else(|| Error::ElementNotFound(self.factory_name.clone()))?;
        let element = factory.create(self.name.as_deref());
        for (key, value) in self.properties {
            element.set_property(&key, value)?;
        }
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PropertyError;

    #[test]
    fn test_unknown_factory() {
        let err = ElementFactory::make("nosuch").build().unwrap_err();
        assert!(matches!(err, Error::ElementNotFound(ref n) if n == "nosuch"));
    }

    #[test]
    fn test_auto_names_count_per_type() {
        let a = auto_name("unit-test-type");
        let b = auto_name("unit-test-type");
        assert_eq!(a, "unit-test-type0");
        assert_eq!(b, "unit-test-type1");
    }

    #[test]
    fn test_factory_recorded_on_element() {
        let e = ElementFactory::make("identity").name("id").build().unwrap();
        assert_eq!(e.factory().map(ElementFactory::name), Some("identity"));
        assert_eq!(e.factory().unwrap().long_name(), "Identity");
    }

    #[test]
    fn test_bad_property_fails_build() {
        let err = ElementFactory::make("queue")
            .property("max-size-buffers", "lots")
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Property(PropertyError::TypeMismatch { .. })
        ));
        let err = ElementFactory::make("queue")
            .property("no-such-property", 1)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Property(PropertyError::Unknown { .. })));
    }

    #[test]
    fn test_make_with_properties() {
        let e = ElementFactory::make_with_properties(
            "queue",
            Some("q"),
            &[("max-size-buffers", PropertyValue::from(3u32))],
        )
        .unwrap();
        assert_eq!(e.name(), "q");
        assert_eq!(e.property("max-size-buffers"), Ok(PropertyValue::from(3u32)));
        assert!(ElementFactory::make_with_properties("nosuch", None, &[]).is_err());
    }

    #[test]
    fn test_every_factory_builds() {
        for factory in ElementFactory::list() {
            let element = factory.create(None);
            assert!(element.name().starts_with(factory.name()));
            assert_eq!(element.pad_templates(), factory.pad_templates().as_slice());
        }
    }
}
