//! Launch descriptions: build a pipeline from text.
//!
//! ```text
//! audiotestsrc num-buffers=10 ! audio/x-raw,rate=8000 ! queue ! fakesink
//! fakesrc ! tee name=t  t. ! queue ! fakesink  t. ! queue ! fakesink
//! ```
//!
//! # Syntax
//!
//! - Elements in a chain are linked with `!`.
//! - `key=value` after an element sets a property; `name=` names the element.
//!   Values are quoted strings, booleans, numbers or bare words.
//! - A token containing `/` is a caps filter and becomes a `capsfilter`.
//! - `name.` refers to an element named elsewhere and starts or ends a new
//!   chain; `name.pad` picks a pad.
//! - Chains are separated by whitespace.
//!
//! Links from elements that only get their src pads while running (sometimes
//! pads) are made when the pad appears.

use crate::caps::Caps;
use crate::element::{Element, Pad, PadDirection, PadPresence, PropertyValue};
use crate::error::{Error, Result};
use crate::pipeline::factory::ElementFactory;
use crate::pipeline::toplevel::Pipeline;
use tracing::debug;
use winnow::Parser;
use winnow::ascii::{alpha1, digit1, multispace0, multispace1};
use winnow::combinator::{alt, delimited, opt, preceded, repeat, separated};
use winnow::error::ContextError;
use winnow::token::{take_till, take_while};

type WResult<T> = std::result::Result<T, ContextError>;

/// One item of a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// An element to create.
    Element {
        /// Factory name.
        factory: String,
        /// Properties in order, including `name`.
        properties: Vec<(String, PropertyValue)>,
    },
    /// Caps filter text.
    Caps(String),
    /// Reference to a named element, optionally to one of its pads.
    Reference {
        /// Element name.
        element: String,
        /// Pad name.
        pad: Option<String>,
    },
}

/// A parsed description: chains of items linked in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Description {
    /// Chains in the order written.
    pub chains: Vec<Vec<Item>>,
}

/// Parse a description without building anything.
///
/// ```rust
/// use padflow::pipeline::parse::{Item, parse};
///
/// let d = parse("fakesrc num-buffers=3 ! fakesink").unwrap();
/// assert_eq!(d.chains.len(), 1);
/// assert!(matches!(&d.chains[0][0], Item::Element { factory, .. } if factory == "fakesrc"));
/// ```
pub fn parse(input: &str) -> Result<Description> {
    description
        .parse(input.trim())
        .map_err(|e| Error::Parse(format!("invalid description '{input}': {e}")))
}

/// Build a pipeline from a description.
///
/// ```rust
/// use padflow::pipeline::parse;
///
/// let pipeline = parse::launch("fakesrc num-buffers=3 ! queue ! fakesink").unwrap();
/// assert_eq!(pipeline.children().len(), 3);
/// ```
pub fn launch(input: &str) -> Result<Pipeline> {
    let description = parse(input)?;
    let pipeline = Pipeline::new();

    // Create everything first so references may point forward.
    let mut chains: Vec<Vec<(Element, Option<String>)>> = Vec::new();
    for chain in &description.chains {
        let mut endpoints = Vec::new();
        for item in chain {
            if let Some(element) = create(item)? {
                pipeline.add(&element)?;
                endpoints.push((element, None));
            } else {
                endpoints.push((Element::clone(pipeline.element()), None));
            }
        }
        chains.push(endpoints);
    }

    for (chain, endpoints) in description.chains.iter().zip(chains.iter_mut()) {
        for (item, endpoint) in chain.iter().zip(endpoints.iter_mut()) {
            if let Item::Reference { element, pad } = item {
                let found = pipeline
                    .by_name(element)
                    .ok_or_else(|| Error::Parse(format!("no element named '{element}'")))?;
                *endpoint = (found, pad.clone());
            }
        }
        for pair in endpoints.windows(2) {
            let (src, src_pad) = &pair[0];
            let (sink, sink_pad) = &pair[1];
            link(src, src_pad.as_deref(), sink, sink_pad.as_deref())?;
        }
    }

    debug!(pipeline = %pipeline.name(), description = input, "launched");
    Ok(pipeline)
}

fn create(item: &Item) -> Result<Option<Element>> {
    match item {
        Item::Element {
            factory,
            properties,
        } => {
            let mut builder = ElementFactory::make(factory);
            for (key, value) in properties {
                if key == "name" {
                    builder = builder.name(&value.to_string());
                } else {
                    builder = builder.property(key, value.clone());
                }
            }
            builder.build().map(Some)
        }
        Item::Caps(text) => {
            let caps: Caps = text.parse()?;
            ElementFactory::make("capsfilter")
                .property("caps", caps)
                .build()
                .map(Some)
        }
        Item::Reference { .. } => Ok(None),
    }
}

fn link(src: &Element, src_pad: Option<&str>, sink: &Element, sink_pad: Option<&str>) -> Result<()> {
    let result = match (src_pad, sink_pad) {
        (None, None) => {
            if has_sometimes_src(src) && src.src_pads().is_empty() {
                link_later(src, sink);
                return Ok(());
            }
            src.link(sink)
        }
        (src_name, sink_name) => {
            let src_pad = match src_name {
                Some(name) => pad_or_request(src, name)?,
                None => src
                    .src_pads()
                    .into_iter()
                    .find(|p| !p.is_linked())
                    .ok_or_else(|| Error::PadNotFound {
                        element: src.name().to_string(),
                        pad: "src".into(),
                    })?,
            };
            let sink_pad = match sink_name {
                Some(name) => pad_or_request(sink, name)?,
                None => sink
                    .sink_pads()
                    .into_iter()
                    .find(|p| !p.is_linked())
                    .ok_or_else(|| Error::PadNotFound {
                        element: sink.name().to_string(),
                        pad: "sink".into(),
                    })?,
            };
            src_pad.link(&sink_pad).map_err(Error::from)
        }
    };
    result.map_err(|e| {
        Error::Parse(format!(
            "could not link {} to {}: {e}",
            src.name(),
            sink.name()
        ))
    })
}

fn pad_or_request(element: &Element, name: &str) -> Result<Pad> {
    if let Some(pad) = element.static_pad(name) {
        return Ok(pad);
    }
    element.request_pad(name)
}

fn has_sometimes_src(element: &Element) -> bool {
    element
        .pad_templates()
        .iter()
        .any(|t| t.direction() == PadDirection::Src && t.presence() == PadPresence::Sometimes)
}

/// Link the first compatible sometimes pad `src` creates to `sink`.
fn link_later(src: &Element, sink: &Element) {
    debug!(src = %src.name(), sink = %sink.name(), "delaying link until a pad appears");
    let sink = sink.clone();
    src.connect_pad_added(move |element, pad| {
        if pad.direction() != PadDirection::Src || pad.is_linked() {
            return;
        }
        let Some(sink_pad) = sink.sink_pads().into_iter().find(|p| !p.is_linked()) else {
            return;
        };
        match pad.link(&sink_pad) {
            Ok(()) => {
                debug!(pad = %pad.debug_name(), sink = %sink.name(), "delayed link made");
                let _ = sink.sync_state_with_parent();
            }
            Err(err) => debug!(src = %element.name(), pad = %pad.name(), error = %err, "delayed link refused"),
        }
    });
}

// ============================================================================
// Grammar
// ============================================================================

fn description(input: &mut &str) -> WResult<Description> {
    let chains: Vec<Vec<Item>> = separated(1.., chain, multispace1).parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    if !input.is_empty() {
        return Err(ContextError::new());
    }
    Ok(Description { chains })
}

fn chain(input: &mut &str) -> WResult<Vec<Item>> {
    separated(1.., item, link_separator).parse_next(input)
}

fn item(input: &mut &str) -> WResult<Item> {
    alt((reference, caps_item, element)).parse_next(input)
}

fn link_separator(input: &mut &str) -> WResult<()> {
    let _ = multispace0.parse_next(input)?;
    let _ = '!'.parse_next(input)?;
    let _ = multispace0.parse_next(input)?;
    Ok(())
}

fn identifier<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (
        alt((alpha1::<_, ContextError>, "_")),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_' || c == '-'),
    )
        .take()
        .parse_next(input)
}

fn reference(input: &mut &str) -> WResult<Item> {
    let element = identifier.parse_next(input)?;
    let _ = '.'.parse_next(input)?;
    let pad: Option<&str> = opt(take_while(1.., |c: char| {
        c.is_alphanumeric() || c == '_' || c == '%'
    }))
    .parse_next(input)?;
    Ok(Item::Reference {
        element: element.to_string(),
        pad: pad.map(str::to_string),
    })
}

fn caps_item(input: &mut &str) -> WResult<Item> {
    let text = alt((quoted_string, bare_token.map(str::to_string))).parse_next(input)?;
    if !text.contains('/') {
        return Err(ContextError::new());
    }
    Ok(Item::Caps(text))
}

fn element(input: &mut &str) -> WResult<Item> {
    let factory = identifier.parse_next(input)?;
    let properties: Vec<(String, PropertyValue)> =
        repeat(0.., preceded(multispace1, property)).parse_next(input)?;
    Ok(Item::Element {
        factory: factory.to_string(),
        properties,
    })
}

fn property(input: &mut &str) -> WResult<(String, PropertyValue)> {
    let key = identifier.parse_next(input)?;
    let _ = delimited(multispace0, '=', multispace0).parse_next(input)?;
    let value = property_value.parse_next(input)?;
    Ok((key.to_string(), value))
}

fn property_value(input: &mut &str) -> WResult<PropertyValue> {
    alt((
        quoted_string.map(PropertyValue::Str),
        bare_token.map(classify),
    ))
    .parse_next(input)
}

fn quoted_string(input: &mut &str) -> WResult<String> {
    alt((
        delimited('"', take_till(0.., '"'), '"'),
        delimited('\'', take_till(0.., '\''), '\''),
    ))
    .map(|s: &str| s.to_string())
    .parse_next(input)
}

/// Everything up to whitespace or `!`.
fn bare_token<'a>(input: &mut &'a str) -> WResult<&'a str> {
    take_while(1.., |c: char| !c.is_whitespace() && c != '!').parse_next(input)
}

/// Type a bare word: boolean, integer, float, else string.
fn classify(token: &str) -> PropertyValue {
    match token {
        "true" => return PropertyValue::Bool(true),
        "false" => return PropertyValue::Bool(false),
        _ => {}
    }
    if integer.parse(token).is_ok() {
        if let Ok(v) = token.parse() {
            return PropertyValue::Int(v);
        }
    }
    if float.parse(token).is_ok() {
        if let Ok(v) = token.parse() {
            return PropertyValue::Double(v);
        }
    }
    PropertyValue::Str(token.to_string())
}

fn integer<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (opt('-'), digit1).take().parse_next(input)
}

fn float<'a>(input: &mut &'a str) -> WResult<&'a str> {
    (opt('-'), digit1, '.', digit1).take().parse_next(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element_item(item: &Item) -> (&str, &[(String, PropertyValue)]) {
        match item {
            Item::Element {
                factory,
                properties,
            } => (factory, properties),
            other => panic!("expected element, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_chain() {
        let d = parse("fakesrc ! identity ! fakesink").unwrap();
        assert_eq!(d.chains.len(), 1);
        let names: Vec<&str> = d.chains[0].iter().map(|i| element_item(i).0).collect();
        assert_eq!(names, ["fakesrc", "identity", "fakesink"]);
    }

    #[test]
    fn test_parse_property_types() {
        let d = parse(r#"x a=5 b=-2 c=1.5 d=true e=downstream f="two words" g='q'"#).unwrap();
        let (_, props) = element_item(&d.chains[0][0]);
        let values: Vec<&PropertyValue> = props.iter().map(|(_, v)| v).collect();
        assert_eq!(
            values,
            [
                &PropertyValue::Int(5),
                &PropertyValue::Int(-2),
                &PropertyValue::Double(1.5),
                &PropertyValue::Bool(true),
                &PropertyValue::from("downstream"),
                &PropertyValue::from("two words"),
                &PropertyValue::from("q"),
            ]
        );
    }

    #[test]
    fn test_parse_no_spaces_around_links() {
        let d = parse("a!b!c").unwrap();
        assert_eq!(d.chains[0].len(), 3);
    }

    #[test]
    fn test_parse_caps_and_references() {
        let d = parse("src ! audio/x-raw,rate=8000 ! tee name=t  t. ! sink  t.src_%u ! other").unwrap();
        assert_eq!(d.chains.len(), 3);
        assert_eq!(d.chains[0][1], Item::Caps("audio/x-raw,rate=8000".into()));
        assert_eq!(
            d.chains[1][0],
            Item::Reference {
                element: "t".into(),
                pad: None
            }
        );
        assert_eq!(
            d.chains[2][0],
            Item::Reference {
                element: "t".into(),
                pad: Some("src_%u".into())
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("").is_err());
        assert!(parse("!").is_err());
        assert!(parse("a ! ! b").is_err());
    }

    #[test]
    fn test_launch_builds_and_links() {
        let pipeline = launch("fakesrc name=s num-buffers=2 ! audio/x-raw ! fakesink name=k").unwrap();
        let src = pipeline.by_name("s").unwrap();
        let sink = pipeline.by_name("k").unwrap();
        assert_eq!(src.property("num-buffers"), Ok(PropertyValue::Int(2)));
        let filter = src.static_pad("src").unwrap().peer().unwrap().parent_element().unwrap();
        assert_eq!(filter.factory().unwrap().name(), "capsfilter");
        assert!(sink.static_pad("sink").unwrap().is_linked());
    }

    #[test]
    fn test_launch_tee_branches() {
        let pipeline = launch("fakesrc ! tee name=t  t. ! fakesink  t. ! fakesink").unwrap();
        let tee = pipeline.by_name("t").unwrap();
        assert_eq!(tee.src_pads().len(), 2);
        assert!(tee.src_pads().iter().all(|p| p.is_linked()));
    }

    #[test]
    fn test_launch_errors() {
        assert!(matches!(
            launch("nosuchthing ! fakesink"),
            Err(Error::ElementNotFound(_))
        ));
        assert!(matches!(launch("fakesink ! fakesrc"), Err(Error::Parse(_))));
        assert!(matches!(launch("fakesrc ! missing."), Err(Error::Parse(_))));
        assert!(launch("fakesrc bogus=1").is_err());
    }
}
