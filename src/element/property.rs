//! Dynamic property values.
//!
//! Every built-in element keeps its configuration in a typed settings struct.
//! [`PropertyValue`] is the loosely typed layer on top, used by
//! `Element::set_property` and by the launch parser, which only sees text.
//! The getters coerce where the conversion is lossless (an `Int` for a `uint`
//! property, a string `"5"` for an integer) and report a
//! [`PropertyError::TypeMismatch`] otherwise.

use crate::caps::Caps;
use crate::error::PropertyError;
use std::fmt;

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Double(f64),
    /// String (also used for enum nicks like `"downstream"`).
    Str(String),
    /// Caps.
    Caps(Caps),
}

impl PropertyValue {
    /// Name of the value type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "boolean",
            Self::Int(_) => "int",
            Self::UInt(_) => "uint",
            Self::Double(_) => "double",
            Self::Str(_) => "string",
            Self::Caps(_) => "caps",
        }
    }

    fn mismatch(&self, name: &str, expected: &'static str) -> PropertyError {
        PropertyError::TypeMismatch {
            name: name.to_string(),
            expected,
            found: self.type_name(),
        }
    }

    /// Read as a boolean.
    pub fn get_bool(&self, name: &str) -> Result<bool, PropertyError> {
        match self {
            Self::Bool(v) => Ok(*v),
            Self::Str(s) => match s.as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(self.mismatch(name, "boolean")),
            },
            _ => Err(self.mismatch(name, "boolean")),
        }
    }

    /// Read as a signed integer.
    pub fn get_i64(&self, name: &str) -> Result<i64, PropertyError> {
        match self {
            Self::Int(v) => Ok(*v),
            Self::UInt(v) => {
                i64::try_from(*v).map_err(|_| PropertyError::invalid(name, "out of range"))
            }
            Self::Str(s) => s.trim().parse().map_err(|_| self.mismatch(name, "int")),
            _ => Err(self.mismatch(name, "int")),
        }
    }

    /// Read as an unsigned integer.
    pub fn get_u64(&self, name: &str) -> Result<u64, PropertyError> {
        match self {
            Self::UInt(v) => Ok(*v),
            Self::Int(v) => {
                u64::try_from(*v).map_err(|_| PropertyError::invalid(name, "must not be negative"))
            }
            Self::Str(s) => s.trim().parse().map_err(|_| self.mismatch(name, "uint")),
            _ => Err(self.mismatch(name, "uint")),
        }
    }

    /// Read as an unsigned 32-bit integer.
    pub fn get_u32(&self, name: &str) -> Result<u32, PropertyError> {
        let v = self.get_u64(name)?;
        u32::try_from(v).map_err(|_| PropertyError::invalid(name, "out of range"))
    }

    /// Read as a float.
    pub fn get_f64(&self, name: &str) -> Result<f64, PropertyError> {
        match self {
            Self::Double(v) => Ok(*v),
            Self::Int(v) => Ok(*v as f64),
            Self::UInt(v) => Ok(*v as f64),
            Self::Str(s) => s.trim().parse().map_err(|_| self.mismatch(name, "double")),
            _ => Err(self.mismatch(name, "double")),
        }
    }

    /// Read as a string.
    pub fn get_string(&self, name: &str) -> Result<String, PropertyError> {
        match self {
            Self::Str(s) => Ok(s.clone()),
            _ => Err(self.mismatch(name, "string")),
        }
    }

    /// Read as caps; strings are parsed.
    pub fn get_caps(&self, name: &str) -> Result<Caps, PropertyError> {
        match self {
            Self::Caps(c) => Ok(c.clone()),
            Self::Str(s) => s
                .parse()
                .map_err(|e| PropertyError::invalid(name, format!("{e}"))),
            _ => Err(self.mismatch(name, "caps")),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::UInt(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Str(s) => f.write_str(s),
            Self::Caps(c) => write!(f, "{c}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::UInt(v as u64)
    }
}

impl From<u64> for PropertyValue {
    fn from(v: u64) -> Self {
        Self::UInt(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Caps> for PropertyValue {
    fn from(v: Caps) -> Self {
        Self::Caps(v)
    }
}
