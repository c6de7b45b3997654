//! Capabilities: the media formats a pad can produce or accept.
//!
//! [`Caps`] is either `ANY` or an ordered list of [`Structure`]s. Each
//! structure has a media-type name (`audio/x-raw`) and ordered fields whose
//! values can be scalars, lists or integer ranges. Links are only allowed when
//! the caps of both pads intersect, and the agreed format is the fixated
//! intersection.
//!
//! ```rust
//! use padflow::caps::Caps;
//!
//! let src: Caps = "audio/x-raw, format=S16LE, rate=[ 1, 100 ]".parse().unwrap();
//! let sink: Caps = "audio/x-raw, rate=[ 50, 200 ]".parse().unwrap();
//! let common = src.intersect(&sink);
//! let fixed = common.fixate();
//! assert!(fixed.is_fixed());
//! assert_eq!(fixed.structure(0).unwrap().get_int("rate"), Some(50));
//! ```

mod parse;
mod value;

pub use value::{Fraction, Value};

use crate::error::{Error, Result};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Structure
// ============================================================================

/// A media-type name plus ordered fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Structure {
    name: String,
    fields: Vec<(String, Value)>,
}

impl Structure {
    /// Create an empty structure.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Builder-style field setter.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Media-type name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the name starts with `prefix` (e.g. `"audio/"`).
    pub fn has_name_prefix(&self, prefix: &str) -> bool {
        self.name.starts_with(prefix)
    }

    /// Set or replace a field, keeping its position if it already exists.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => *v = value,
            None => self.fields.push((name.to_string(), value)),
        }
    }

    /// Field value by name.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Integer field by name.
    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.value(name).and_then(Value::as_int)
    }

    /// String field by name.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    /// Whether a field exists.
    pub fn has_field(&self, name: &str) -> bool {
        self.value(name).is_some()
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Whether every field holds a scalar.
    pub fn is_fixed(&self) -> bool {
        self.fields.iter().all(|(_, v)| v.is_fixed())
    }

    /// Intersect with another structure.
    ///
    /// Names must match; fields present on both sides must intersect; fields
    /// present on only one side are carried over unchanged.
    pub fn intersect(&self, other: &Structure) -> Option<Structure> {
        if self.name != other.name {
            return None;
        }
        let mut out = Structure::new(self.name.clone());
        for (name, value) in &self.fields {
            let merged = match other.value(name) {
                Some(theirs) => value.intersect(theirs)?,
                None => value.clone(),
            };
            out.fields.push((name.clone(), merged));
        }
        for (name, value) in &other.fields {
            if !self.has_field(name) {
                out.fields.push((name.clone(), value.clone()));
            }
        }
        Some(out)
    }

    /// Reduce every field to a scalar.
    pub fn fixate(&self) -> Structure {
        Structure {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|(n, v)| (n.clone(), v.fixate()))
                .collect(),
        }
    }
}

/// Serialized form: `name, field=(type)value, ...`.
impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for (name, value) in &self.fields {
            match value {
                Value::List(_) | Value::IntRange { .. } => write!(f, ", {name}={value}")?,
                _ => write!(f, ", {name}=({}){value}", value.type_name())?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Caps
// ============================================================================

#[derive(Clone, Debug, PartialEq)]
enum CapsInner {
    Any,
    Structures(SmallVec<[Structure; 2]>),
}

/// Capabilities of a pad: `ANY` or an ordered list of structures.
///
/// An empty list is `EMPTY` and intersects with nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct Caps(CapsInner);

impl Caps {
    /// Caps accepting anything.
    pub fn new_any() -> Self {
        Self(CapsInner::Any)
    }

    /// Caps accepting nothing.
    pub fn new_empty() -> Self {
        Self(CapsInner::Structures(SmallVec::new()))
    }

    /// Caps with a single structure with no fields.
    pub fn new_empty_simple(name: &str) -> Self {
        Self::from_structure(Structure::new(name))
    }

    /// Caps holding one structure.
    pub fn from_structure(structure: Structure) -> Self {
        let mut list = SmallVec::new();
        list.push(structure);
        Self(CapsInner::Structures(list))
    }

    /// Start building single-structure caps.
    pub fn builder(name: &str) -> CapsBuilder {
        CapsBuilder {
            structure: Structure::new(name),
        }
    }

    /// Whether these caps are `ANY`.
    pub fn is_any(&self) -> bool {
        matches!(self.0, CapsInner::Any)
    }

    /// Whether these caps are `EMPTY`.
    pub fn is_empty(&self) -> bool {
        matches!(&self.0, CapsInner::Structures(list) if list.is_empty())
    }

    /// Exactly one structure whose fields are all scalars.
    pub fn is_fixed(&self) -> bool {
        matches!(&self.0, CapsInner::Structures(list) if list.len() == 1 && list[0].is_fixed())
    }

    /// Number of structures (0 for `ANY`).
    pub fn size(&self) -> usize {
        match &self.0 {
            CapsInner::Any => 0,
            CapsInner::Structures(list) => list.len(),
        }
    }

    /// Structure at `index`.
    pub fn structure(&self, index: usize) -> Option<&Structure> {
        match &self.0 {
            CapsInner::Any => None,
            CapsInner::Structures(list) => list.get(index),
        }
    }

    /// Iterate over structures (none for `ANY`).
    pub fn iter(&self) -> std::slice::Iter<'_, Structure> {
        match &self.0 {
            CapsInner::Any => <&[Structure]>::default().iter(),
            CapsInner::Structures(list) => list.iter(),
        }
    }

    /// Append a structure. No-op on `ANY`.
    pub fn append_structure(&mut self, structure: Structure) {
        if let CapsInner::Structures(list) = &mut self.0 {
            list.push(structure);
        }
    }

    /// Intersect two caps.
    ///
    /// `ANY` is the identity. Otherwise every pair of structures is
    /// intersected in order and the non-empty results are kept.
    pub fn intersect(&self, other: &Caps) -> Caps {
        match (&self.0, &other.0) {
            (CapsInner::Any, _) => other.clone(),
            (_, CapsInner::Any) => self.clone(),
            (CapsInner::Structures(ours), CapsInner::Structures(theirs)) => {
                let mut out = Caps::new_empty();
                for a in ours {
                    for b in theirs {
                        if let Some(s) = a.intersect(b) {
                            if !out.iter().any(|existing| *existing == s) {
                                out.append_structure(s);
                            }
                        }
                    }
                }
                out
            }
        }
    }

    /// Whether the intersection is non-empty.
    pub fn can_intersect(&self, other: &Caps) -> bool {
        !self.intersect(other).is_empty()
    }

    /// Reduce to fixed caps: first structure, every field fixated.
    ///
    /// `ANY` and `EMPTY` are returned unchanged.
    pub fn fixate(&self) -> Caps {
        match self.structure(0) {
            Some(first) => Caps::from_structure(first.fixate()),
            None => self.clone(),
        }
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::new_any()
    }
}

impl From<Structure> for Caps {
    fn from(structure: Structure) -> Self {
        Self::from_structure(structure)
    }
}

impl FromIterator<Structure> for Caps {
    fn from_iter<I: IntoIterator<Item = Structure>>(iter: I) -> Self {
        Self(CapsInner::Structures(iter.into_iter().collect()))
    }
}

impl FromStr for Caps {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse::parse_caps(s)
    }
}

/// Serialized form: `ANY`, `EMPTY`, or structures separated by `; `.
impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            CapsInner::Any => f.write_str("ANY"),
            CapsInner::Structures(list) if list.is_empty() => f.write_str("EMPTY"),
            CapsInner::Structures(list) => {
                for (i, s) in list.iter().enumerate() {
                    if i > 0 {
                        f.write_str("; ")?;
                    }
                    write!(f, "{s}")?;
                }
                Ok(())
            }
        }
    }
}

/// Builder for single-structure caps.
pub struct CapsBuilder {
    structure: Structure,
}

impl CapsBuilder {
    /// Add a field.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.structure.set(name, value);
        self
    }

    /// Finish.
    pub fn build(self) -> Caps {
        Caps::from_structure(self.structure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio(format: &str, rate: Value) -> Caps {
        Caps::builder("audio/x-raw")
            .field("format", format)
            .field("rate", rate)
            .build()
    }

    #[test]
    fn test_intersect_ranges_then_fixate() {
        let a = audio("S16LE", Value::from(1..=100));
        let b = audio("S16LE", Value::from(50..=200));
        let common = a.intersect(&b);
        assert!(!common.is_empty());
        assert!(!common.is_fixed());

        let fixed = common.fixate();
        assert!(fixed.is_fixed());
        let rate = fixed.structure(0).unwrap().get_int("rate").unwrap();
        assert!((50..=100).contains(&rate));
    }

    #[test]
    fn test_format_mismatch_is_empty() {
        let a = audio("X", Value::Int(8_000));
        let b = audio("Y", Value::Int(8_000));
        assert!(a.intersect(&b).is_empty());
        assert!(!a.can_intersect(&b));
    }

    #[test]
    fn test_name_mismatch_is_empty() {
        let audio = Caps::new_empty_simple("audio/x-raw");
        let video = Caps::new_empty_simple("video/x-raw");
        assert!(audio.intersect(&video).is_empty());
    }

    #[test]
    fn test_any_is_identity() {
        let a = audio("S16LE", Value::Int(44_100));
        assert_eq!(Caps::new_any().intersect(&a), a);
        assert_eq!(a.intersect(&Caps::new_any()), a);
        assert!(Caps::new_any().intersect(&Caps::new_any()).is_any());
        assert!(Caps::new_empty().intersect(&Caps::new_any()).is_empty());
    }

    #[test]
    fn test_one_sided_fields_are_kept() {
        let a = Caps::builder("audio/x-raw").field("channels", 2).build();
        let b = Caps::builder("audio/x-raw").field("rate", 8_000).build();
        let s = a.intersect(&b);
        let s = s.structure(0).unwrap();
        assert_eq!(s.get_int("channels"), Some(2));
        assert_eq!(s.get_int("rate"), Some(8_000));
    }

    #[test]
    fn test_multi_structure_intersection_keeps_order() {
        let src: Caps = [
            Structure::new("video/x-raw"),
            Structure::new("audio/x-raw"),
        ]
        .into_iter()
        .collect();
        let sink = Caps::new_empty_simple("audio/x-raw");
        let common = src.intersect(&sink);
        assert_eq!(common.size(), 1);
        assert_eq!(common.structure(0).unwrap().name(), "audio/x-raw");
    }

    #[test]
    fn test_display() {
        assert_eq!(Caps::new_any().to_string(), "ANY");
        assert_eq!(Caps::new_empty().to_string(), "EMPTY");
        let caps = audio("S16LE", Value::from(1..=100));
        assert_eq!(
            caps.to_string(),
            "audio/x-raw, format=(string)S16LE, rate=[ 1, 100 ]"
        );
    }
}
