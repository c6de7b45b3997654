//! Human-readable dumps of caps and pad templates.
//!
//! Every function returns the text instead of printing it, one line per
//! entry with a trailing newline.
//!
//! ```rust
//! use padflow::caps::Caps;
//! use padflow::inspect::caps_to_string;
//!
//! let caps: Caps = "audio/x-raw, rate=(int)44100".parse().unwrap();
//! assert_eq!(
//!     caps_to_string(&caps, "  "),
//!     "  audio/x-raw\n              rate: 44100\n"
//! );
//! ```

use crate::caps::Caps;
use crate::element::Element;
use crate::pipeline::ElementFactory;
use std::fmt::Write;

/// Render `caps`, each line starting with `pfx`.
///
/// Structure names go on their own line, followed by one
/// `"{pfx} {field:>15}: {value}"` line per field.
pub fn caps_to_string(caps: &Caps, pfx: &str) -> String {
    if caps.is_any() {
        return format!("{pfx}ANY\n");
    }
    if caps.is_empty() {
        return format!("{pfx}EMPTY\n");
    }
    let mut out = String::new();
    for structure in caps.iter() {
        let _ = writeln!(out, "{pfx}{}", structure.name());
        for (name, value) in structure.fields() {
            let _ = writeln!(out, "{pfx} {name:>15}: {value}");
        }
    }
    out
}

/// Describe the pad templates of elements made by `factory`.
pub fn pad_templates_to_string(factory: &ElementFactory) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pad Templates for {}:", factory.long_name());
    let templates = factory.pad_templates();
    if templates.is_empty() {
        out.push_str("  none\n");
        return out;
    }
    for template in &templates {
        let _ = writeln!(out, "  {} template: '{}'", template.direction(), template.name_template());
        let _ = writeln!(out, "    Availability: {}", template.presence());
        out.push_str("    Capabilities:\n");
        out.push_str(&caps_to_string(template.caps(), "      "));
        out.push('\n');
    }
    out
}

/// Describe the caps of `element`'s pad `pad_name`: the negotiated caps, or
/// the acceptable ones while negotiation has not happened yet.
///
/// Returns `None` when the element has no such pad.
pub fn pad_caps_to_string(element: &Element, pad_name: &str) -> Option<String> {
    let pad = element.static_pad(pad_name)?;
    let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
    Some(format!(
        "Caps for the {pad_name} pad:\n{}",
        caps_to_string(&caps, "      ")
    ))
}
