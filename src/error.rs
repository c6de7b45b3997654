//! Error types for padflow.
//!
//! Construction and linking errors are returned synchronously from the call
//! that caused them. Errors raised on streaming threads never unwind across
//! threads: they are posted on the bus as [`Message::Error`](crate::bus::Message).

use thiserror::Error;

/// Result type alias using padflow's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for padflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No factory is registered under the requested type name.
    #[error("no element factory named '{0}'")]
    ElementNotFound(String),

    /// An element has no pad with the requested name.
    #[error("element '{element}' has no pad named '{pad}'")]
    PadNotFound {
        /// Element that was searched.
        element: String,
        /// Requested pad name.
        pad: String,
    },

    /// Linking two pads failed.
    #[error("link failed: {0}")]
    Link(#[from] LinkError),

    /// A state transition failed.
    #[error(transparent)]
    StateChange(#[from] StateChangeError),

    /// Setting or reading a property failed.
    #[error(transparent)]
    Property(#[from] PropertyError),

    /// A data-flow operation failed.
    #[error("flow error: {0}")]
    Flow(#[from] FlowError),

    /// Caps could not be parsed or are unusable.
    #[error("caps error: {0}")]
    Caps(String),

    /// A launch description could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// Element-specific failure (bin membership, ghost target, ...).
    #[error("element error: {0}")]
    Element(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a pad link can be refused.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkError {
    /// The pads do not share a parent bin.
    #[error("pads have no common grandparent")]
    WrongHierarchy,
    /// One of the pads is already linked.
    #[error("pad was already linked")]
    WasLinked,
    /// The pads have wrong direction (not src to sink).
    #[error("pads have wrong direction")]
    WrongDirection,
    /// The pads have no common format.
    #[error("pads do not have common format")]
    NoFormat,
    /// The elements refused the link.
    #[error("link refused")]
    Refused,
    /// No compatible pads were found on the elements.
    #[error("no compatible pads")]
    NoPads,
}

/// A state change could not be performed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[error("state change failed")]
pub struct StateChangeError;

/// Result of pushing a buffer or event into a pad.
pub type FlowResult = std::result::Result<FlowSuccess, FlowError>;

/// Successful flow return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowSuccess {
    /// The data was accepted.
    Ok,
}

/// Unsuccessful flow returns.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowError {
    /// The pad is flushing (state change to READY or below in progress).
    #[error("flushing")]
    Flushing,
    /// The pad already received end-of-stream.
    #[error("end of stream")]
    Eos,
    /// The pad has no peer.
    #[error("not linked")]
    NotLinked,
    /// Data arrived before caps were agreed.
    #[error("not negotiated")]
    NotNegotiated,
    /// Fatal element error; an error message was posted.
    #[error("error")]
    Error,
}

/// Property access failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropertyError {
    /// The element has no such property.
    #[error("no property named '{name}'")]
    Unknown {
        /// Property name.
        name: String,
    },
    /// The value has the wrong type.
    #[error("property '{name}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Property name.
        name: String,
        /// Expected value type.
        expected: &'static str,
        /// Provided value type.
        found: &'static str,
    },
    /// The value has the right type but is out of range.
    #[error("invalid value for property '{name}': {reason}")]
    Invalid {
        /// Property name.
        name: String,
        /// Human-readable reason.
        reason: String,
    },
}

impl PropertyError {
    /// Shorthand for [`PropertyError::Unknown`].
    pub fn unknown(name: &str) -> Self {
        Self::Unknown {
            name: name.to_string(),
        }
    }

    /// Shorthand for [`PropertyError::Invalid`].
    pub fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_error_converts_into_error() {
        let err: Error = LinkError::NoFormat.into();
        assert!(matches!(err, Error::Link(LinkError::NoFormat)));
        assert_eq!(err.to_string(), "link failed: pads do not have common format");
    }

    #[test]
    fn property_error_messages() {
        let err = PropertyError::TypeMismatch {
            name: "max-size-bytes".into(),
            expected: "uint",
            found: "string",
        };
        assert_eq!(
            err.to_string(),
            "property 'max-size-bytes' expects uint, got string"
        );
    }
}
