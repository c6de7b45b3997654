//! Integration tests for caps negotiation at link time.

use padflow::caps::Caps;
use padflow::elements::CapsFilter;
use padflow::error::LinkError;
use padflow::inspect;
use padflow::prelude::*;

fn rate_and_channels(caps: &Caps) -> (Option<i64>, Option<i64>) {
    let s = caps.structure(0).unwrap();
    (s.get_int("rate"), s.get_int("channels"))
}

#[test]
fn test_source_fixates_its_preferred_format() {
    let pipeline = Pipeline::new();
    let src = ElementFactory::make("audiotestsrc").build().unwrap();
    let sink = ElementFactory::make("fakesink").build().unwrap();
    pipeline.add_many(&[&src, &sink]).unwrap();

    // Before linking the pad offers its whole template.
    let before = inspect::pad_caps_to_string(&src, "src").unwrap();
    assert!(before.contains("rate: [ 1, 2147483647 ]"));

    src.link(&sink).unwrap();
    let caps = src.static_pad("src").unwrap().current_caps().unwrap();
    assert!(caps.is_fixed());
    assert_eq!(rate_and_channels(&caps), (Some(44_100), Some(1)));
    assert_eq!(sink.static_pad("sink").unwrap().current_caps(), Some(caps));

    let after = inspect::pad_caps_to_string(&sink, "sink").unwrap();
    assert_eq!(
        after,
        "Caps for the sink pad:\n      audio/x-raw\n                format: S16LE\n                layout: interleaved\n                  rate: 44100\n              channels: 1\n"
    );
}

#[test]
fn test_capsfilter_restricts_negotiation() {
    let pipeline =
        padflow::parse::launch("audiotestsrc name=src ! audio/x-raw,rate=8000,channels=2 ! fakesink name=sink")
            .unwrap();
    let src = pipeline.by_name("src").unwrap();
    let caps = src.static_pad("src").unwrap().current_caps().unwrap();
    assert_eq!(rate_and_channels(&caps), (Some(8000), Some(2)));

    // The filter is an ordinary capsfilter element inside the pipeline.
    let filter = pipeline
        .children()
        .into_iter()
        .find(|e| e.imp::<CapsFilter>().is_some())
        .unwrap();
    assert_eq!(
        filter.property("caps").unwrap().to_string(),
        "audio/x-raw, rate=(int)8000, channels=(int)2"
    );
}

#[test]
fn test_incompatible_filter_refuses_link() {
    let err = padflow::parse::launch("audiotestsrc ! video/x-raw ! fakesink").unwrap_err();
    assert!(err.to_string().contains("pads do not have common format"), "{err}");

    let src = ElementFactory::make("audiotestsrc").build().unwrap();
    let filter = ElementFactory::make("capsfilter")
        .property("caps", "audio/x-raw, rate=[ 1, 10 ], channels=3")
        .build()
        .unwrap();
    let pipeline = Pipeline::new();
    pipeline.add_many(&[&src, &filter]).unwrap();
    let pad = src.static_pad("src").unwrap();
    let sink = filter.static_pad("sink").unwrap();
    assert_eq!(pad.link(&sink), Err(LinkError::NoFormat));
    assert!(!pad.is_linked() && !sink.is_linked());
    assert!(pad.current_caps().is_none());
}

#[test]
fn test_link_errors() {
    let pipeline = Pipeline::new();
    let src = ElementFactory::make("fakesrc").build().unwrap();
    let sink = ElementFactory::make("fakesink").build().unwrap();
    let other = ElementFactory::make("fakesink").build().unwrap();
    pipeline.add_many(&[&src, &sink]).unwrap();

    let src_pad = src.static_pad("src").unwrap();
    let sink_pad = sink.static_pad("sink").unwrap();
    assert_eq!(sink_pad.link(&src_pad), Err(LinkError::WrongDirection));

    // `other` lives outside the pipeline.
    assert_eq!(
        src_pad.link(&other.static_pad("sink").unwrap()),
        Err(LinkError::WrongHierarchy)
    );

    src_pad.link(&sink_pad).unwrap();
    pipeline.add(&other).unwrap();
    assert_eq!(
        src_pad.link(&other.static_pad("sink").unwrap()),
        Err(LinkError::WasLinked)
    );

    // A sink has nothing to link from.
    let err = sink.link(&other).unwrap_err();
    assert!(matches!(err, Error::Link(LinkError::NoPads)));
}

#[test]
fn test_any_leaves_caps_unset() {
    let pipeline = Pipeline::new();
    let src = ElementFactory::make("fakesrc").build().unwrap();
    let identity = ElementFactory::make("identity").build().unwrap();
    let sink = ElementFactory::make("fakesink").build().unwrap();
    pipeline.add_many(&[&src, &identity, &sink]).unwrap();
    Element::link_many(&[&src, &identity, &sink]).unwrap();
    for element in [&src, &identity] {
        assert!(element.static_pad("src").unwrap().is_linked());
        assert!(element.static_pad("src").unwrap().current_caps().is_none());
    }
}

#[test]
fn test_negotiation_through_ghost_pad() {
    let pipeline = Pipeline::new();
    let src = ElementFactory::make("audiotestsrc").build().unwrap();
    let bin = Bin::with_name("filtered-sink");
    let filter = ElementFactory::make("capsfilter")
        .property("caps", "audio/x-raw, channels=2")
        .build()
        .unwrap();
    let sink = ElementFactory::make("fakesink").build().unwrap();
    bin.add_many(&[&filter, &sink]).unwrap();
    filter.link(&sink).unwrap();
    let ghost = bin
        .add_ghost_pad("sink", &filter.static_pad("sink").unwrap())
        .unwrap();
    pipeline.add_many(&[&src, bin.element()]).unwrap();

    assert_eq!(
        ghost.query_caps(None).structure(0).unwrap().get_int("channels"),
        Some(2)
    );
    src.link(&bin).unwrap();
    let caps = src.static_pad("src").unwrap().current_caps().unwrap();
    assert_eq!(rate_and_channels(&caps), (Some(44_100), Some(2)));
    assert!(ghost.is_linked());
}
